use thiserror::Error;

/// Errors produced by the chat protocol and delivery layers.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    TokenExpired,

    #[error("not a participant of conversation {0}")]
    NotAParticipant(String),

    #[error("not the author of message {0}")]
    NotMessageAuthor(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ChatResult<T> = Result<T, ChatError>;
