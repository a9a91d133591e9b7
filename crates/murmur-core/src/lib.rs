//! murmur-core: Shared protocol library for the murmur chat service.
//!
//! Provides the JSON wire events, conversation/message models, HMAC access
//! tokens, and the error taxonomy shared by the server and by anything that
//! issues tokens on its behalf.

pub mod error;
pub mod events;
pub mod model;
pub mod token;

// Re-export commonly used items at crate root.
pub use error::{ChatError, ChatResult};
pub use events::{decode_client_event, encode_server_event, ClientEvent, ServerEvent};
pub use model::{Conversation, Message, MessageKind, SharedPostStub};
pub use token::{generate_secret, issue_token, verify_token};
