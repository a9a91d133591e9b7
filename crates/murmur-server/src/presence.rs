//! Presence registry: which users currently own live connections.
//!
//! A user is online iff at least one of their connections is live. The map
//! never retains empty sets, so `snapshot` is exactly the online roster.

use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// Process-wide mapping of user id → live connection ids.
///
/// Supports multiple concurrent connections per user (multi-device). All
/// mutations happen under a single write lock, so readers never observe a
/// partially-updated set. The lock is only held around map mutation, never
/// across store I/O.
#[derive(Default)]
pub struct PresenceRegistry {
    connections: RwLock<HashMap<String, HashSet<u64>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection for `user_id`. Returns `true` iff this is the
    /// user's first live connection — the caller broadcasts the online
    /// transition exactly once.
    pub async fn register(&self, user_id: &str, conn_id: u64) -> bool {
        let mut map = self.connections.write().await;
        let set = map.entry(user_id.to_string()).or_default();
        let first = set.is_empty();
        set.insert(conn_id);
        debug!(user = %user_id, conn_id, first, "presence registered");
        first
    }

    /// Remove a connection. Returns `true` iff the user has no connections
    /// left; the entry is dropped entirely in that case.
    pub async fn unregister(&self, user_id: &str, conn_id: u64) -> bool {
        let mut map = self.connections.write().await;
        let Some(set) = map.get_mut(user_id) else {
            return false;
        };
        set.remove(&conn_id);
        if set.is_empty() {
            map.remove(user_id);
            debug!(user = %user_id, conn_id, "presence removed (last connection)");
            true
        } else {
            false
        }
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.connections.read().await.contains_key(user_id)
    }

    /// All currently online users, for the roster sent right after connect.
    pub async fn snapshot(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    /// Number of online users.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}
