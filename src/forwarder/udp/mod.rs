//! UDP forwarding with session emulation
//!
//! UDP has no connections, so the forwarder synthesizes them. Every
//! datagram is attributed to its source address and each distinct source
//! gets a registered session with its own upstream socket. Upstream
//! replies are routed back through the shared listener socket. Sessions
//! idle past the timeout are reclaimed by a janitor task.
//!
//! One listener socket serves all clients. The first datagram from a new
//! source turns its dispatch task into that session's relay worker, which
//! owns the upstream-to-downstream direction for the session's lifetime.

mod janitor;
mod registry;
mod session;
mod worker;

pub use registry::SessionRegistry;
pub use session::{Session, UpstreamState};

use crate::config::UdpConfig;
use crate::forwarder::addr::ForwardAddr;
use crate::observer::{NoopObserver, SessionObserver};
use anyhow::{Context, Result};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

/// Datagram buffer size for both directions
const BUFFER_SIZE: usize = 40960;

/// UDP half of the forwarder
#[derive(Debug)]
pub struct UdpForwarder {
    /// Shared listener socket, also the return path for every session
    listener: Arc<UdpSocket>,
    forward_addr: ForwardAddr,
    registry: SessionRegistry,
    observer: Arc<dyn SessionObserver>,
    idle_timeout: Duration,
    /// Caps how many upstream sockets may be opening at once
    dial_permits: Semaphore,
    shutdown: Notify,
    closed: AtomicBool,
}

impl UdpForwarder {
    /// Bind the local listener. Bind failure is fatal to startup.
    pub async fn bind(
        listen_addr: &str,
        forward_addr: ForwardAddr,
        config: &UdpConfig,
    ) -> Result<Self> {
        let listener = UdpSocket::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to bind UDP listener on {}", listen_addr))?;

        info!(
            "UDP forwarder listening on {}, forwarding to {}",
            listener.local_addr()?,
            forward_addr.addr()
        );

        Ok(UdpForwarder {
            listener: Arc::new(listener),
            forward_addr,
            registry: SessionRegistry::new(),
            observer: Arc::new(NoopObserver),
            idle_timeout: config.idle_timeout(),
            dial_permits: Semaphore::new(config.max_pending_dials),
            shutdown: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Replace the session observer
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Override the session idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Local address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    /// Whether a client identity currently has a session
    pub async fn has_session(&self, identity: &str) -> bool {
        self.registry.contains(identity).await
    }

    /// Receive loop. Runs the janitor alongside and dispatches every
    /// datagram to its session. A listener read error is fatal to the
    /// whole UDP half; per-session errors never reach here.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        tokio::spawn(self.clone().run_janitor());

        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            match self.listener.recv_from(&mut buf).await {
                Ok((n, peer)) => {
                    let payload = Bytes::copy_from_slice(&buf[..n]);
                    let forwarder = self.clone();
                    tokio::spawn(async move {
                        forwarder.dispatch(payload, peer).await;
                    });
                }
                Err(e) => {
                    self.shutdown();
                    return Err(e).with_context(|| "UDP listener read failed, terminating");
                }
            }
        }
    }

    /// Stop the janitor and mark the forwarder closed
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Whether the forwarder has been shut down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Route one datagram. The task that creates a session becomes its
    /// relay worker and does not return until the session dies; everyone
    /// else forwards and returns.
    async fn dispatch(self: Arc<Self>, payload: Bytes, peer: SocketAddr) {
        let (session, created) = self.registry.get_or_insert(peer).await;
        if created {
            debug!("New UDP session for {}", session.identity());
            self.run_worker(session, payload).await;
        } else {
            self.relay_to_upstream(&session, payload).await;
        }
    }

    /// Forward a datagram over an existing session, waiting for the
    /// session's upstream socket if it is still being opened
    async fn relay_to_upstream(&self, session: &Arc<Session>, payload: Bytes) {
        let Some(upstream) = session.wait_ready().await else {
            debug!(
                "Session for {} closed before ready, dropping datagram",
                session.identity()
            );
            return;
        };

        if let Err(e) = upstream.send(&payload).await {
            warn!("Error sending datagram to server: {}", e);
        }

        self.registry
            .refresh_if_idle(session.identity(), self.idle_timeout)
            .await;
    }
}
