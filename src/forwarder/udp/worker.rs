//! Relay worker for new sessions
//!
//! The dispatch task that creates a session becomes its relay worker: it
//! opens the upstream socket, publishes it on the session and forwards
//! the datagram that created it. From then on the worker owns the
//! upstream to downstream direction until the session ends.

use super::session::Session;
use super::{UdpForwarder, BUFFER_SIZE};
use anyhow::{Context, Result};
use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Local endpoint to dial the upstream socket from
///
/// Loopback destinations are dialed from a loopback source so the traffic
/// stays on the loopback interface; everything else binds the unspecified
/// address of the destination's family.
fn local_bind_addr(dest: &SocketAddr) -> SocketAddr {
    let ip: IpAddr = match (dest, dest.ip().is_loopback()) {
        (SocketAddr::V4(_), true) => Ipv4Addr::LOCALHOST.into(),
        (SocketAddr::V4(_), false) => Ipv4Addr::UNSPECIFIED.into(),
        (SocketAddr::V6(_), true) => Ipv6Addr::LOCALHOST.into(),
        (SocketAddr::V6(_), false) => Ipv6Addr::UNSPECIFIED.into(),
    };
    SocketAddr::new(ip, 0)
}

impl UdpForwarder {
    /// Establish a new session and relay for it until it dies
    ///
    /// On dial failure the placeholder is removed and the session closed,
    /// which releases any dispatch tasks already waiting on it; their
    /// datagrams are dropped. No lifecycle hooks fire for a session that
    /// never connected.
    pub(super) async fn run_worker(self: Arc<Self>, session: Arc<Session>, first_payload: Bytes) {
        let upstream = match self.dial_upstream().await {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                warn!("Failed to dial upstream for {}: {:#}", session.identity(), e);
                self.registry.remove(&session).await;
                session.close();
                return;
            }
        };

        // Publishing the socket and firing the readiness signal are one
        // transition. It can only fail if the janitor evicted the pending
        // session first; the eviction owner handles cleanup then.
        if !session.attach(upstream.clone()) {
            debug!("Session for {} closed during dial", session.identity());
            return;
        }

        self.observer.on_connect(session.identity()).await;

        if let Err(e) = upstream.send(&first_payload).await {
            warn!("Error sending initial datagram to server: {}", e);
        }

        self.relay_downstream(&session, upstream).await;
    }

    /// Open and connect the upstream socket for one session
    ///
    /// The dial permit caps how many sessions may be mid-dial at once and
    /// is released as soon as the socket is connected.
    async fn dial_upstream(&self) -> Result<UdpSocket> {
        let dest = self.forward_addr.resolve().await?;

        let _permit = self
            .dial_permits
            .acquire()
            .await
            .with_context(|| "Dial limiter closed")?;

        let socket = UdpSocket::bind(local_bind_addr(&dest))
            .await
            .with_context(|| "Failed to bind upstream UDP socket")?;
        socket
            .connect(dest)
            .await
            .with_context(|| format!("Failed to connect UDP socket to {}", dest))?;

        Ok(socket)
    }

    /// Upstream-to-downstream relay loop
    ///
    /// Replies from the server go back to the client through the shared
    /// listener socket. A send error is logged and the session carries
    /// on; a read error tears the session down. The loop also ends when
    /// the session is closed from outside, which is how eviction stops a
    /// worker blocked in `recv`.
    async fn relay_downstream(&self, session: &Arc<Session>, upstream: Arc<UdpSocket>) {
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            let received = tokio::select! {
                result = upstream.recv(&mut buf) => result,
                _ = session.closed() => {
                    debug!("Session for {} closed, stopping relay", session.identity());
                    return;
                }
            };

            match received {
                Ok(n) => {
                    if let Err(e) = self.listener.send_to(&buf[..n], session.peer()).await {
                        warn!("Error sending datagram to client: {}", e);
                    }
                    if session.needs_refresh(self.idle_timeout) {
                        session.touch();
                    }
                }
                Err(e) => {
                    debug!(
                        "Abnormal upstream read for {}, closing: {}",
                        session.identity(),
                        e
                    );
                    // Remove only our own registration; when the janitor
                    // got there first it also owns the disconnect hook
                    if self.registry.remove(session).await {
                        session.close();
                        self.observer.on_disconnect(session.identity()).await;
                    }
                    return;
                }
            }
        }
    }
}
