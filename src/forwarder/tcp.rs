//! TCP forwarding
//!
//! Accepts connections on the local address and pipes each one to the
//! forward destination. The TCP path is stateless: every accepted
//! connection gets its own upstream connection and a bidirectional relay
//! that ends as soon as either side closes.

use crate::config::TcpConfig;
use crate::forwarder::addr::ForwardAddr;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Socket options applied to both legs of a TCP relay
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs),
            keepalive_interval: Some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// TCP half of the forwarder
#[derive(Debug)]
pub struct TcpForwarder {
    listener: TcpListener,
    forward_addr: ForwardAddr,
    socket_opts: SocketOpts,
    connect_timeout: Duration,
}

impl TcpForwarder {
    /// Bind the local listener. Bind failure is fatal to startup.
    pub async fn bind(
        listen_addr: &str,
        forward_addr: ForwardAddr,
        socket_opts: SocketOpts,
    ) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to bind TCP listener on {}", listen_addr))?;

        info!(
            "TCP forwarder listening on {}, forwarding to {}",
            listener.local_addr()?,
            forward_addr.addr()
        );

        Ok(TcpForwarder {
            listener,
            forward_addr,
            socket_opts,
            connect_timeout: Duration::from_secs(10),
        })
    }

    /// Set the upstream connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Local address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Runs until the listener itself fails; per-connection
    /// errors only end that connection.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        loop {
            let (inbound, peer) = self
                .listener
                .accept()
                .await
                .with_context(|| "TCP accept failed")?;

            debug!("Accepted TCP connection from {}", peer);

            let forwarder = self.clone();
            tokio::spawn(async move {
                if let Err(e) = forwarder.forward(inbound, peer).await {
                    warn!("TCP forward for {} ended: {:#}", peer, e);
                }
            });
        }
    }

    /// Connect upstream and relay both directions until either side closes
    async fn forward(&self, inbound: TcpStream, peer: SocketAddr) -> Result<()> {
        let resolved = self.forward_addr.resolve().await?;

        let outbound = tokio::time::timeout(self.connect_timeout, TcpStream::connect(resolved))
            .await
            .with_context(|| format!("Connection timeout to {}", self.forward_addr.addr()))?
            .with_context(|| format!("Failed to connect to {}", self.forward_addr.addr()))?;

        if let Err(e) = self.socket_opts.apply(&inbound) {
            warn!("Failed to apply socket options for {}: {}", peer, e);
        }
        self.socket_opts.apply(&outbound)?;

        debug!("TCP relay established: {} <-> {}", peer, resolved);

        relay(inbound, outbound).await
    }
}

/// Relay data bidirectionally between two streams
///
/// Copies data in both directions concurrently and returns when either
/// direction encounters an error or EOF.
pub async fn relay<A, B>(a: A, b: B) -> Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let a_to_b = tokio::io::copy(&mut a_read, &mut b_write);
    let b_to_a = tokio::io::copy(&mut b_read, &mut a_write);

    tokio::select! {
        result = a_to_b => {
            match result {
                Ok(bytes) => debug!("Downstream closed: {} bytes forwarded", bytes),
                Err(e) => debug!("Downstream read error: {}", e),
            }
        }
        result = b_to_a => {
            match result {
                Ok(bytes) => debug!("Upstream closed: {} bytes returned", bytes),
                Err(e) => debug!("Upstream read error: {}", e),
            }
        }
    }

    Ok(())
}
