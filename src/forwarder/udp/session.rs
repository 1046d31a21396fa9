//! UDP session state
//!
//! A session binds one downstream client address to one upstream socket.
//! The session itself is passive data shared between the dispatcher, the
//! relay worker and the janitor; the registry owns the map of live sessions.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// Upstream socket state for a session
#[derive(Debug, Clone, Default)]
pub enum UpstreamState {
    /// Created but not yet connected upstream
    #[default]
    Pending,
    /// Upstream socket connected and usable
    Ready(Arc<UdpSocket>),
    /// Torn down; no more traffic flows through this session
    Closed,
}

/// A single forwarding session for one downstream client
///
/// State moves `Pending -> Ready -> Closed` (or `Pending -> Closed` when
/// the upstream dial fails). Transitions are broadcast on a watch channel
/// so any number of dispatch tasks can wait for readiness without racing
/// the worker that attaches the socket.
#[derive(Debug)]
pub struct Session {
    /// Textual client identity, the registry key
    identity: String,
    /// Client address replies are sent to
    peer: SocketAddr,
    state_tx: watch::Sender<UpstreamState>,
    /// Creation time, the zero point for `last_active`
    epoch: Instant,
    /// Milliseconds since `epoch` of the last observed activity
    last_active: AtomicU64,
}

impl Session {
    /// Create a new pending session for a client address
    pub fn new(peer: SocketAddr) -> Self {
        let (state_tx, _) = watch::channel(UpstreamState::Pending);
        Session {
            identity: peer.to_string(),
            peer,
            state_tx,
            epoch: Instant::now(),
            last_active: AtomicU64::new(0),
        }
    }

    /// The client identity this session belongs to
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The client address replies are sent to
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Attach the connected upstream socket, moving `Pending -> Ready`
    ///
    /// Fires the readiness signal and stamps activity in the same
    /// transition. Returns false without touching anything if the session
    /// has already left `Pending`, so readiness can only ever fire once.
    pub fn attach(&self, socket: Arc<UdpSocket>) -> bool {
        let fired = self.state_tx.send_if_modified(|state| {
            if matches!(state, UpstreamState::Pending) {
                *state = UpstreamState::Ready(socket);
                true
            } else {
                false
            }
        });
        if fired {
            self.touch();
        }
        fired
    }

    /// Move to `Closed`, releasing all waiters. Idempotent.
    ///
    /// Returns whether the session was `Ready` at the moment it closed,
    /// which tells the caller if the connect hook ever fired for it.
    /// Replacing `Ready` also drops the state's socket handle, so the
    /// upstream socket closes once the worker drops its own clone.
    pub fn close(&self) -> bool {
        let mut was_ready = false;
        self.state_tx.send_if_modified(|state| match state {
            UpstreamState::Closed => false,
            other => {
                was_ready = matches!(other, UpstreamState::Ready(_));
                *other = UpstreamState::Closed;
                true
            }
        });
        was_ready
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        matches!(*self.state_tx.borrow(), UpstreamState::Closed)
    }

    /// The upstream socket, if currently ready
    pub fn upstream(&self) -> Option<Arc<UdpSocket>> {
        match &*self.state_tx.borrow() {
            UpstreamState::Ready(socket) => Some(socket.clone()),
            _ => None,
        }
    }

    /// Wait until the session leaves `Pending`
    ///
    /// Returns the upstream socket once ready, or `None` if the session
    /// was closed first (the caller should drop its datagram).
    pub async fn wait_ready(&self) -> Option<Arc<UdpSocket>> {
        let mut rx = self.state_tx.subscribe();
        let state = rx
            .wait_for(|state| !matches!(state, UpstreamState::Pending))
            .await
            .ok()?;
        match &*state {
            UpstreamState::Ready(socket) => Some(socket.clone()),
            _ => None,
        }
    }

    /// Wait until the session is closed
    pub async fn closed(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx
            .wait_for(|state| matches!(state, UpstreamState::Closed))
            .await;
    }

    /// Stamp activity now
    ///
    /// `fetch_max` keeps the timestamp monotonically non-decreasing under
    /// concurrent stamping from the dispatch and worker paths.
    pub fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.last_active.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Time since the last observed activity
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_active.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last)
    }

    /// Whether the session has been idle longer than `timeout`
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }

    /// Whether the activity stamp is stale enough to be worth refreshing
    ///
    /// The forwarding paths only re-stamp a session once more than a
    /// quarter of the timeout window has passed without traffic.
    pub fn needs_refresh(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout / 4
    }
}
