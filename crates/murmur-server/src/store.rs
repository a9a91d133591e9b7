//! Message store gateway.
//!
//! The relational store is owned by the web application; this service only
//! reads conversation membership and writes message rows through this seam.
//! `MemoryStore` backs the dev binary and the tests.

use async_trait::async_trait;
use murmur_core::{ChatError, ChatResult, Conversation, Message, MessageKind, SharedPostStub};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Interface to the persisted message store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn find_conversation(&self, conversation_id: &str) -> ChatResult<Option<Conversation>>;

    /// All conversations `user_id` participates in (for auto-join).
    async fn conversations_for(&self, user_id: &str) -> ChatResult<Vec<Conversation>>;

    async fn is_participant(&self, conversation_id: &str, user_id: &str) -> ChatResult<bool>;

    /// Persist a new message. Fails with `ChatError::Store` if the
    /// conversation does not exist.
    async fn create_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        shared_post: Option<SharedPostStub>,
    ) -> ChatResult<Message>;

    async fn find_message_author(&self, message_id: &str) -> ChatResult<Option<String>>;

    /// Replace a message's content and set its edited flag.
    async fn update_message_content(
        &self,
        message_id: &str,
        new_content: &str,
    ) -> ChatResult<Message>;

    async fn delete_message(&self, message_id: &str) -> ChatResult<()>;
}

/// In-memory store used by the dev binary and tests.
#[derive(Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    messages: RwLock<HashMap<String, Message>>,
    next_message_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a conversation row (dev seeding and tests).
    pub async fn seed_conversation(&self, id: &str, user_a: &str, user_b: &str) {
        self.conversations.write().await.insert(
            id.to_string(),
            Conversation {
                id: id.to_string(),
                user_a_id: user_a.to_string(),
                user_b_id: user_b.to_string(),
            },
        );
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn find_conversation(&self, conversation_id: &str) -> ChatResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(conversation_id).cloned())
    }

    async fn conversations_for(&self, user_id: &str) -> ChatResult<Vec<Conversation>> {
        Ok(self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect())
    }

    async fn is_participant(&self, conversation_id: &str, user_id: &str) -> ChatResult<bool> {
        Ok(self
            .conversations
            .read()
            .await
            .get(conversation_id)
            .is_some_and(|c| c.has_participant(user_id)))
    }

    async fn create_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        shared_post: Option<SharedPostStub>,
    ) -> ChatResult<Message> {
        if !self.conversations.read().await.contains_key(conversation_id) {
            return Err(ChatError::Store(format!(
                "conversation not found: {conversation_id}"
            )));
        }

        let id = format!("msg-{}", self.next_message_id.fetch_add(1, Ordering::Relaxed));
        let message = Message {
            id: id.clone(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            kind: if shared_post.is_some() {
                MessageKind::SharedPost
            } else {
                MessageKind::Text
            },
            shared_post,
            created_at: unix_millis(),
            is_edited: false,
        };
        self.messages.write().await.insert(id, message.clone());
        Ok(message)
    }

    async fn find_message_author(&self, message_id: &str) -> ChatResult<Option<String>> {
        Ok(self
            .messages
            .read()
            .await
            .get(message_id)
            .map(|m| m.sender_id.clone()))
    }

    async fn update_message_content(
        &self,
        message_id: &str,
        new_content: &str,
    ) -> ChatResult<Message> {
        let mut messages = self.messages.write().await;
        let message = messages
            .get_mut(message_id)
            .ok_or_else(|| ChatError::Store(format!("message not found: {message_id}")))?;
        message.content = new_content.to_string();
        message.is_edited = true;
        Ok(message.clone())
    }

    async fn delete_message(&self, message_id: &str) -> ChatResult<()> {
        self.messages
            .write()
            .await
            .remove(message_id)
            .map(|_| ())
            .ok_or_else(|| ChatError::Store(format!("message not found: {message_id}")))
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_message_requires_conversation() {
        let store = MemoryStore::new();
        let err = store
            .create_message("nope", "alice", "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Store(_)));
    }

    #[tokio::test]
    async fn shared_post_sets_kind() {
        let store = MemoryStore::new();
        store.seed_conversation("c1", "alice", "bob").await;
        let msg = store
            .create_message(
                "c1",
                "alice",
                "check this out",
                Some(SharedPostStub {
                    id: "post-1".into(),
                    title: "Hello world".into(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(msg.kind, MessageKind::SharedPost);
        assert_eq!(msg.shared_post.unwrap().id, "post-1");
    }

    #[tokio::test]
    async fn edit_sets_flag_and_keeps_author() {
        let store = MemoryStore::new();
        store.seed_conversation("c1", "alice", "bob").await;
        let msg = store.create_message("c1", "alice", "hi", None).await.unwrap();
        assert!(!msg.is_edited);

        let edited = store
            .update_message_content(&msg.id, "hi there")
            .await
            .unwrap();
        assert!(edited.is_edited);
        assert_eq!(edited.content, "hi there");
        assert_eq!(
            store.find_message_author(&msg.id).await.unwrap().as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn delete_removes_message() {
        let store = MemoryStore::new();
        store.seed_conversation("c1", "alice", "bob").await;
        let msg = store.create_message("c1", "alice", "hi", None).await.unwrap();
        store.delete_message(&msg.id).await.unwrap();
        assert!(store.find_message_author(&msg.id).await.unwrap().is_none());
        assert!(store.delete_message(&msg.id).await.is_err());
    }

    #[tokio::test]
    async fn conversations_for_filters_by_participant() {
        let store = MemoryStore::new();
        store.seed_conversation("c1", "alice", "bob").await;
        store.seed_conversation("c2", "alice", "carol").await;
        store.seed_conversation("c3", "bob", "carol").await;

        let mut ids: Vec<String> = store
            .conversations_for("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["c1".to_string(), "c2".to_string()]);
    }
}
