//! Conversation and message models, as seen by the delivery service.
//!
//! The relational store owns these rows; serde renames keep the wire shape
//! (camelCase) identical to what the web clients already consume.

use serde::{Deserialize, Serialize};

/// A two-party conversation. The participant pair is fixed at creation and
/// is the unit of subscription and authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_a_id: String,
    pub user_b_id: String,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.user_a_id == user_id || self.user_b_id == user_id
    }

    pub fn participants(&self) -> [&str; 2] {
        [&self.user_a_id, &self.user_b_id]
    }
}

/// Message kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    SharedPost,
}

/// Stub describing a shared post, assembled from the send payload so
/// clients can render a preview without another fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedPostStub {
    pub id: String,
    pub title: String,
}

/// A persisted chat message.
///
/// Author and conversation are immutable once sent; `content` and
/// `is_edited` are the only mutable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_post: Option<SharedPostStub>,
    /// Creation time, unix milliseconds.
    pub created_at: u64,
    pub is_edited: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_check() {
        let conv = Conversation {
            id: "c1".into(),
            user_a_id: "alice".into(),
            user_b_id: "bob".into(),
        };
        assert!(conv.has_participant("alice"));
        assert!(conv.has_participant("bob"));
        assert!(!conv.has_participant("carol"));
    }

    #[test]
    fn message_wire_shape() {
        let msg = Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "alice".into(),
            content: "hi".into(),
            kind: MessageKind::Text,
            shared_post: None,
            created_at: 1700000000000,
            is_edited: false,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["senderId"], "alice");
        assert_eq!(json["type"], "text");
        assert_eq!(json["isEdited"], false);
        assert!(json.get("sharedPost").is_none());
    }
}
