//! Destination address handling
//!
//! Provides address resolution with caching. The forward destination is
//! fixed for the lifetime of the process, so it is resolved once and the
//! result is reused by every connection and session.

use anyhow::{Context, Result};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A destination address with a cached resolved form
///
/// Holds the configured address string and caches the resolved socket
/// address after the first lookup.
#[derive(Debug, Clone)]
pub struct ForwardAddr {
    /// The original address string
    addr: String,
    /// Cached resolved address
    cached: Arc<RwLock<Option<SocketAddr>>>,
}

impl ForwardAddr {
    /// Create a new address without cached resolution
    pub fn new(addr: &str) -> Self {
        ForwardAddr {
            addr: addr.to_string(),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a new address with a pre-resolved address
    pub fn with_cached(addr: &str, resolved: SocketAddr) -> Self {
        ForwardAddr {
            addr: addr.to_string(),
            cached: Arc::new(RwLock::new(Some(resolved))),
        }
    }

    /// Get the original address string
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Get the cached address if available
    pub async fn get_cached(&self) -> Option<SocketAddr> {
        *self.cached.read().await
    }

    /// Resolve the address, using the cache if available
    ///
    /// The first call performs DNS resolution and caches the result;
    /// subsequent calls return the cached value.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        if let Some(cached) = self.get_cached().await {
            return Ok(cached);
        }

        // Use a blocking task for DNS resolution since ToSocketAddrs is blocking
        let addr = self.addr.clone();
        let resolved = tokio::task::spawn_blocking(move || {
            addr.to_socket_addrs()
                .with_context(|| format!("Failed to resolve address: {}", addr))?
                .next()
                .with_context(|| format!("No addresses found for: {}", addr))
        })
        .await
        .with_context(|| "DNS resolution task panicked")??;

        *self.cached.write().await = Some(resolved);

        Ok(resolved)
    }
}

impl From<SocketAddr> for ForwardAddr {
    fn from(addr: SocketAddr) -> Self {
        ForwardAddr {
            addr: addr.to_string(),
            cached: Arc::new(RwLock::new(Some(addr))),
        }
    }
}

impl From<&str> for ForwardAddr {
    fn from(addr: &str) -> Self {
        ForwardAddr::new(addr)
    }
}

impl From<String> for ForwardAddr {
    fn from(addr: String) -> Self {
        ForwardAddr::new(&addr)
    }
}
