//! Error types for stompkit.

use thiserror::Error;

/// Main error type for stompkit operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Broker URL is empty or malformed
    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),

    /// Destination is empty or malformed
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// A connect attempt is already outstanding
    #[error("Connect already in progress")]
    ConnectInProgress,

    /// No live session to operate on
    #[error("Not connected")]
    NotConnected,

    /// The transport could not establish a session
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// An established connection was lost
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The transport dropped a pending connect without answering it
    #[error("Connect attempt aborted")]
    ConnectAborted,

    /// The broker refused a SUBSCRIBE
    #[error("Subscription rejected for destination: {0}")]
    SubscribeRejected(String),

    /// Low level transport error (I/O, framing)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error raised while handling a frame (payload conversion, handler failure)
    #[error("Application error: {0}")]
    Application(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
