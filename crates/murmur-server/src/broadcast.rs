//! Event broadcaster: fans a server event out to sets of connections.
//!
//! Each live connection owns an outbound mpsc channel drained by its own
//! session loop. Delivery is `try_send`, fire-and-forget per connection: a
//! slow or dead connection drops its copy instead of blocking the rest.

use murmur_core::ServerEvent;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Per-connection outbound senders, keyed by connection id.
#[derive(Default)]
pub struct Broadcaster {
    senders: RwLock<HashMap<u64, mpsc::Sender<ServerEvent>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, conn_id: u64, tx: mpsc::Sender<ServerEvent>) {
        self.senders.write().await.insert(conn_id, tx);
    }

    pub async fn remove(&self, conn_id: u64) {
        self.senders.write().await.remove(&conn_id);
    }

    /// Deliver an event to a single connection.
    pub async fn send_to(&self, conn_id: u64, event: ServerEvent) {
        let senders = self.senders.read().await;
        if let Some(tx) = senders.get(&conn_id) {
            if tx.try_send(event).is_err() {
                warn!(conn_id, "dropping event for slow or closed connection");
            }
        }
    }

    /// Deliver an event to every listed connection, optionally excluding one
    /// (the typical "everyone else in the room" case).
    pub async fn broadcast(&self, targets: &[u64], event: &ServerEvent, exclude: Option<u64>) {
        let senders = self.senders.read().await;
        for conn_id in targets {
            if Some(*conn_id) == exclude {
                continue;
            }
            if let Some(tx) = senders.get(conn_id) {
                if tx.try_send(event.clone()).is_err() {
                    warn!(conn_id, "dropping event for slow or closed connection");
                }
            }
        }
    }

    /// Deliver an event to every live connection (presence transitions).
    pub async fn broadcast_global(&self, event: &ServerEvent, exclude: Option<u64>) {
        let senders = self.senders.read().await;
        debug!(targets = senders.len(), "global broadcast");
        for (conn_id, tx) in senders.iter() {
            if Some(*conn_id) == exclude {
                continue;
            }
            if tx.try_send(event.clone()).is_err() {
                warn!(conn_id, "dropping event for slow or closed connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<ServerEvent>, mpsc::Receiver<ServerEvent>) {
        mpsc::channel(8)
    }

    #[tokio::test]
    async fn broadcast_excludes_one_connection() {
        let broadcaster = Broadcaster::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        broadcaster.add(1, tx1).await;
        broadcaster.add(2, tx2).await;

        let event = ServerEvent::UserOnline("alice".into());
        broadcaster.broadcast(&[1, 2], &event, Some(1)).await;

        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), event);
    }

    #[tokio::test]
    async fn full_channel_does_not_block_other_targets() {
        let broadcaster = Broadcaster::new();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, mut rx2) = channel();
        broadcaster.add(1, tx1.clone()).await;
        broadcaster.add(2, tx2).await;

        // Fill connection 1's buffer so further sends fail.
        tx1.try_send(ServerEvent::Error("filler".into())).unwrap();

        let event = ServerEvent::UserOffline("bob".into());
        broadcaster.broadcast_global(&event, None).await;
        assert_eq!(rx2.try_recv().unwrap(), event);
    }

    #[tokio::test]
    async fn removed_connection_receives_nothing() {
        let broadcaster = Broadcaster::new();
        let (tx1, mut rx1) = channel();
        broadcaster.add(1, tx1).await;
        broadcaster.remove(1).await;

        broadcaster
            .send_to(1, ServerEvent::Error("gone".into()))
            .await;
        assert!(rx1.try_recv().is_err());
    }
}
