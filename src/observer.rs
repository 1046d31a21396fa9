//! Session lifecycle observation
//!
//! This module provides the [`SessionObserver`] trait, the hook surface for
//! UDP session lifecycle events. The forwarder invokes the observer after a
//! session's upstream socket becomes usable and after a session has been
//! removed from the registry. Hooks are always invoked outside registry
//! locks, so implementations may block or perform IO.

use std::fmt::Debug;
use tracing::info;

/// Trait for observing UDP session lifecycle events.
///
/// Both methods have no-op defaults, so implementations only override the
/// events they care about.
///
/// # Delivery guarantees
///
/// `on_connect` fires exactly once per session, after the upstream socket is
/// connected and before the first payload is forwarded. `on_disconnect`
/// fires exactly once per session that saw `on_connect`, whether the session
/// ended through idle eviction or an upstream read error. A session whose
/// upstream dial fails sees neither event.
///
/// # Example
///
/// ```rust,ignore
/// use portward::observer::SessionObserver;
///
/// #[derive(Debug)]
/// struct MyObserver;
///
/// #[async_trait::async_trait]
/// impl SessionObserver for MyObserver {
///     async fn on_connect(&self, identity: &str) {
///         println!("client {} connected", identity);
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait SessionObserver: Send + Sync + Debug {
    /// Called once when a session's upstream socket has been connected.
    async fn on_connect(&self, _identity: &str) {}

    /// Called once when a session has been removed from the registry.
    async fn on_disconnect(&self, _identity: &str) {}
}

/// Observer that ignores all events. The default when none is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait::async_trait]
impl SessionObserver for NoopObserver {}

/// Observer that logs session events at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

#[async_trait::async_trait]
impl SessionObserver for LogObserver {
    async fn on_connect(&self, identity: &str) {
        info!(client = %identity, "UDP session established");
    }

    async fn on_disconnect(&self, identity: &str) {
        info!(client = %identity, "UDP session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct CountingObserver {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SessionObserver for CountingObserver {
        async fn on_connect(&self, _identity: &str) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_disconnect(&self, _identity: &str) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_default_methods_are_noops() {
        let observer = NoopObserver;
        observer.on_connect("127.0.0.1:4000").await;
        observer.on_disconnect("127.0.0.1:4000").await;
    }

    #[tokio::test]
    async fn test_observer_as_trait_object() {
        let counting = Arc::new(CountingObserver::default());
        let observer: Arc<dyn SessionObserver> = counting.clone();
        observer.on_connect("127.0.0.1:4000").await;
        observer.on_connect("127.0.0.1:4001").await;
        observer.on_disconnect("127.0.0.1:4000").await;

        assert_eq!(counting.connects.load(Ordering::SeqCst), 2);
        assert_eq!(counting.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_counting_observer() {
        let observer = CountingObserver::default();
        observer.on_connect("127.0.0.1:4000").await;
        observer.on_disconnect("127.0.0.1:4000").await;
        assert_eq!(observer.connects.load(Ordering::SeqCst), 1);
        assert_eq!(observer.disconnects.load(Ordering::SeqCst), 1);
    }
}
