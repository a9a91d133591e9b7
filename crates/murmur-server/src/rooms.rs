//! Conversation room router: which connections are subscribed to which
//! conversation.
//!
//! Rooms with zero subscribers are pruned on leave, so abandoned
//! conversations never grow the map.

use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// Mapping of conversation id → subscribed connection ids.
#[derive(Default)]
pub struct RoomRouter {
    rooms: RwLock<HashMap<String, HashSet<u64>>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a room. Idempotent: joining twice does not
    /// duplicate delivery.
    pub async fn join(&self, conversation_id: &str, conn_id: u64) {
        let mut rooms = self.rooms.write().await;
        let inserted = rooms
            .entry(conversation_id.to_string())
            .or_default()
            .insert(conn_id);
        if inserted {
            debug!(conversation = %conversation_id, conn_id, "joined room");
        }
    }

    /// Subscribe a connection to every listed conversation (the auto-join
    /// performed right after authentication).
    pub async fn join_all(&self, conversation_ids: &[String], conn_id: u64) {
        let mut rooms = self.rooms.write().await;
        for id in conversation_ids {
            rooms.entry(id.clone()).or_default().insert(conn_id);
        }
        debug!(conn_id, count = conversation_ids.len(), "auto-joined rooms");
    }

    /// Remove a connection from every room it was subscribed to, pruning
    /// rooms that become empty. Returns the ids of the rooms left.
    pub async fn leave_all(&self, conn_id: u64) -> Vec<String> {
        let mut rooms = self.rooms.write().await;
        let mut left = Vec::new();
        rooms.retain(|id, subscribers| {
            if subscribers.remove(&conn_id) {
                left.push(id.clone());
            }
            !subscribers.is_empty()
        });
        if !left.is_empty() {
            debug!(conn_id, count = left.len(), "left rooms");
        }
        left
    }

    /// Current subscribers of a room.
    pub async fn subscribers(&self, conversation_id: &str) -> Vec<u64> {
        self.rooms
            .read()
            .await
            .get(conversation_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
