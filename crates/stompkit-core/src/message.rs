//! Application message envelope exchanged over destinations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of an application message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Ordinary informational message
    #[default]
    Info,
    /// Error notification
    Error,
    /// A participant joined
    Join,
    /// A participant left
    Leave,
}

/// JSON message envelope carried in frame bodies.
///
/// Two messages are equal when their ids are equal; the remaining fields are
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StompMessage<I, C> {
    /// Message identifier
    pub id: Option<I>,

    /// Message kind
    #[serde(rename = "type", default)]
    pub kind: MessageType,

    /// Sender name
    #[serde(default)]
    pub sender: Option<String>,

    /// Creation time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Message body
    pub content: Option<C>,
}

impl<I, C> StompMessage<I, C> {
    /// Create an empty `Info` message stamped with the current time.
    pub fn new() -> Self {
        Self {
            id: None,
            kind: MessageType::Info,
            sender: None,
            timestamp: Utc::now(),
            content: None,
        }
    }

    /// Set the id.
    pub fn id(mut self, id: I) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the message kind.
    pub fn kind(mut self, kind: MessageType) -> Self {
        self.kind = kind;
        self
    }

    /// Set the sender.
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the content.
    pub fn content(mut self, content: C) -> Self {
        self.content = Some(content);
        self
    }
}

impl<I, C> Default for StompMessage<I, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: PartialEq, C> PartialEq for StompMessage<I, C> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<I: Eq, C> Eq for StompMessage<I, C> {}

impl<I: std::hash::Hash, C> std::hash::Hash for StompMessage<I, C> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
