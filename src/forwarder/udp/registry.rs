//! Session registry
//!
//! Tracks live UDP sessions keyed by client identity. The map itself is
//! never exposed; every operation is a short critical section with no IO
//! and no hook invocations under the lock.

use super::session::Session;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Registry of live sessions keyed by client identity
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        SessionRegistry {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Look up the session for a client, creating a pending one if absent
    ///
    /// Lookup and creation are one critical section, so for any client
    /// exactly one caller observes `created == true`. That caller becomes
    /// the session's relay worker; everyone else waits on readiness.
    pub async fn get_or_insert(&self, peer: SocketAddr) -> (Arc<Session>, bool) {
        let mut sessions = self.sessions.write().await;
        match sessions.entry(peer.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let session = Arc::new(Session::new(peer));
                entry.insert(session.clone());
                (session, true)
            }
        }
    }

    /// Get the session for an identity if present
    pub async fn get(&self, identity: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(identity).cloned()
    }

    /// Remove a session if the map still holds that exact session
    ///
    /// Guarded by pointer identity: a stale worker tearing down its old
    /// session cannot evict a successor registered under the same
    /// identity. Returns whether this call removed it.
    pub async fn remove(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(session.identity()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(session.identity());
                true
            }
            _ => false,
        }
    }

    /// Collect and remove every session idle longer than `timeout`
    ///
    /// Two phases: candidates are collected under the read lock, removal
    /// happens under the write lock. The evicted sessions are returned so
    /// the caller can close them and run hooks with no lock held.
    pub async fn sweep_idle(&self, timeout: Duration) -> Vec<Arc<Session>> {
        let expired: Vec<Arc<Session>> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|session| session.is_expired(timeout))
                .cloned()
                .collect()
        };

        if expired.is_empty() {
            return Vec::new();
        }

        let mut evicted = Vec::with_capacity(expired.len());
        {
            let mut sessions = self.sessions.write().await;
            for session in expired {
                if let Some(current) = sessions.get(session.identity()) {
                    if Arc::ptr_eq(current, &session) {
                        sessions.remove(session.identity());
                        evicted.push(session);
                    }
                }
            }
        }

        evicted
    }

    /// Refresh a session's activity stamp if it is still registered and
    /// stale enough to be worth stamping
    pub async fn refresh_if_idle(&self, identity: &str, timeout: Duration) {
        let sessions = self.sessions.read().await;
        if let Some(session) = sessions.get(identity) {
            if session.needs_refresh(timeout) {
                session.touch();
            }
        }
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the registry has no live sessions
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Whether an identity is currently registered
    pub async fn contains(&self, identity: &str) -> bool {
        self.sessions.read().await.contains_key(identity)
    }
}
