//! Session identity and connection state types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one broker session.
///
/// Transports usually hand out their own identifiers (the broker's
/// `session` header); [`SessionId::generate`] covers transports that don't.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an identifier issued by a transport or broker.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random session ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection status of a client.
///
/// The lifecycle flows through these states:
/// - `Disconnected` -> `Connecting` (connect requested)
/// - `Connecting` -> `Connected` (handshake completed)
/// - `Disconnected` -> `Connected` (transport-driven reconnect)
/// - `Connecting` -> `Disconnected` (connect attempt failed)
/// - `Connected` -> `Disconnected` (disconnect or shutdown)
/// - `Connected` -> `Connecting` (reconnect requested while a session is live)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionState {
    /// No session has been established, or the last one was closed
    #[default]
    Disconnected = 0,
    /// A connect attempt is outstanding
    Connecting = 1,
    /// The broker accepted a session
    Connected = 2,
}

impl ConnectionState {
    /// Short identifier for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    /// Decode from the `u8` representation used by atomic holders.
    ///
    /// Unknown values decode as `Disconnected`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Whether the transition `self -> next` is part of the lifecycle.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Disconnected, Connected)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Connected, Connecting)
                | (Connected, Connected)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
