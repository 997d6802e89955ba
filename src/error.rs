use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed before the action was acknowledged")]
    ConnectionClosed,

    #[error("timed out waiting for action acknowledgement")]
    AckTimeout,

    #[error("action rejected: {0}")]
    ActionRejected(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("unknown message: {0}")]
    UnknownMessage(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
