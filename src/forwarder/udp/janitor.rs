//! Idle session reclamation
//!
//! A periodic task sweeps the registry and evicts every session that has
//! been idle longer than the timeout. Eviction closes the session, which
//! is also what stops its relay worker; disconnect hooks run only after
//! all registry locks are released.

use super::UdpForwarder;
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

impl UdpForwarder {
    /// Periodic eviction loop
    ///
    /// The sweep period equals the idle timeout and the first sweep only
    /// happens one full period after start, so no session can be evicted
    /// before it had a whole timeout window to itself. Runs until the
    /// forwarder shuts down.
    pub(super) async fn run_janitor(self: Arc<Self>) {
        let period = self.idle_timeout;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.is_closed() {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = ticker.tick() => self.sweep().await,
            }
        }

        debug!("UDP janitor terminated");
    }

    /// One eviction cycle
    ///
    /// The disconnect hook fires only for sessions whose connect hook ran;
    /// a still-pending session is reclaimed silently.
    async fn sweep(&self) {
        let evicted = self.registry.sweep_idle(self.idle_timeout).await;
        for session in evicted {
            debug!("Evicting idle UDP session for {}", session.identity());
            let was_ready = session.close();
            if was_ready {
                self.observer.on_disconnect(session.identity()).await;
            }
        }
    }
}
