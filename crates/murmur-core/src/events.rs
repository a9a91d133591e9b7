//! Wire events for the chat connection.
//!
//! Each frame is a JSON text message tagged by event name:
//! `{"event": "sendMessage", "data": {...}}`. The event names and payload
//! shapes match what the web clients already emit and listen for.

use crate::error::{ChatError, ChatResult};
use crate::model::Message;
use serde::{Deserialize, Serialize};

/// Client → server events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Explicit room join; payload is the bare conversation id.
    #[serde(rename = "joinConversation")]
    JoinConversation(String),

    #[serde(rename = "sendMessage")]
    SendMessage(SendMessage),

    #[serde(rename = "deleteMessage")]
    DeleteMessage(DeleteMessage),

    #[serde(rename = "editMessage")]
    EditMessage(EditMessage),

    #[serde(rename = "typing")]
    Typing(TypingPayload),

    #[serde(rename = "stop_typing")]
    StopTyping(TypingPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub conversation_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_post_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessage {
    pub message_id: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessage {
    pub message_id: String,
    pub new_content: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: String,
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "receiveMessage")]
    ReceiveMessage(Message),

    #[serde(rename = "messageDeleted")]
    MessageDeleted(MessageDeleted),

    #[serde(rename = "messageEdited")]
    MessageEdited(MessageEdited),

    #[serde(rename = "user_typing")]
    UserTyping(TypingNotice),

    #[serde(rename = "user_stop_typing")]
    UserStopTyping(TypingNotice),

    /// Full online roster, sent once right after connect.
    #[serde(rename = "online_users_list")]
    OnlineUsersList(Vec<String>),

    #[serde(rename = "user_online")]
    UserOnline(String),

    #[serde(rename = "user_offline")]
    UserOffline(String),

    #[serde(rename = "error")]
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub deleted_message_id: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEdited {
    pub message_id: String,
    pub new_content: String,
    pub is_edited: bool,
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub conversation_id: String,
    pub user_id: String,
}

/// Decode an inbound text frame. Malformed JSON or an unknown event name
/// is a protocol error; it never reaches business logic.
pub fn decode_client_event(text: &str) -> ChatResult<ClientEvent> {
    serde_json::from_str(text).map_err(|e| ChatError::Protocol(e.to_string()))
}

/// Encode an outbound event as a JSON text frame.
pub fn encode_server_event(event: &ServerEvent) -> ChatResult<String> {
    serde_json::to_string(event).map_err(|e| ChatError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_send_message() {
        let text = r#"{"event":"sendMessage","data":{"conversationId":"c1","content":"hi"}}"#;
        let event = decode_client_event(text).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage(SendMessage {
                conversation_id: "c1".into(),
                content: "hi".into(),
                shared_post_id: None,
                shared_post_title: None,
            })
        );
    }

    #[test]
    fn decode_join_with_bare_string_payload() {
        let text = r#"{"event":"joinConversation","data":"c42"}"#;
        assert_eq!(
            decode_client_event(text).unwrap(),
            ClientEvent::JoinConversation("c42".into())
        );
    }

    #[test]
    fn decode_typing_events() {
        let typing = r#"{"event":"typing","data":{"conversationId":"c1"}}"#;
        let stop = r#"{"event":"stop_typing","data":{"conversationId":"c1"}}"#;
        assert!(matches!(
            decode_client_event(typing).unwrap(),
            ClientEvent::Typing(_)
        ));
        assert!(matches!(
            decode_client_event(stop).unwrap(),
            ClientEvent::StopTyping(_)
        ));
    }

    #[test]
    fn unknown_event_is_protocol_error() {
        let text = r#"{"event":"launchMissiles","data":{}}"#;
        assert!(matches!(
            decode_client_event(text),
            Err(ChatError::Protocol(_))
        ));
    }

    #[test]
    fn malformed_json_is_protocol_error() {
        assert!(matches!(
            decode_client_event("not json"),
            Err(ChatError::Protocol(_))
        ));
    }

    #[test]
    fn encode_presence_events() {
        let json = encode_server_event(&ServerEvent::UserOnline("alice".into())).unwrap();
        assert_eq!(json, r#"{"event":"user_online","data":"alice"}"#);

        let json =
            encode_server_event(&ServerEvent::OnlineUsersList(vec!["a".into(), "b".into()]))
                .unwrap();
        assert_eq!(json, r#"{"event":"online_users_list","data":["a","b"]}"#);
    }

    #[test]
    fn encode_message_edited_casing() {
        let json = encode_server_event(&ServerEvent::MessageEdited(MessageEdited {
            message_id: "m1".into(),
            new_content: "fixed".into(),
            is_edited: true,
            conversation_id: "c1".into(),
        }))
        .unwrap();
        assert!(json.contains(r#""event":"messageEdited""#));
        assert!(json.contains(r#""messageId":"m1""#));
        assert!(json.contains(r#""isEdited":true"#));
    }
}
