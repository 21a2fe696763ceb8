//! Frame-level vocabulary shared by transports and handlers.
//!
//! Encoding and decoding frames is the transport's job; these types only carry
//! what a decoded frame looks like to the session layer.

use serde::{Deserialize, Serialize};

/// Header name for the target destination.
pub const DESTINATION: &str = "destination";
/// Header name for the subscription id on MESSAGE frames.
pub const SUBSCRIPTION: &str = "subscription";
/// Header name for the broker-assigned message id.
pub const MESSAGE_ID: &str = "message-id";
/// Header name for the body content type.
pub const CONTENT_TYPE: &str = "content-type";
/// Header name carrying the broker session id on CONNECTED frames.
pub const SESSION: &str = "session";

/// STOMP frame commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StompCommand {
    /// Client connect request
    Connect,
    /// Broker accepted the connection
    Connected,
    /// Client subscribes to a destination
    Subscribe,
    /// Client drops a subscription
    Unsubscribe,
    /// Client publishes to a destination
    Send,
    /// Broker delivers a message for a subscription
    Message,
    /// Broker acknowledges a receipt request
    Receipt,
    /// Broker reports an error
    Error,
    /// Client closes the session
    Disconnect,
}

impl StompCommand {
    /// Wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Send => "SEND",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
            StompCommand::Disconnect => "DISCONNECT",
        }
    }
}

impl std::fmt::Display for StompCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered frame headers.
///
/// STOMP allows repeated header names; the first occurrence wins on lookup,
/// matching how brokers interpret repeated entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StompHeaders(Vec<(String, String)>);

impl StompHeaders {
    /// Create an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, value);
        self
    }

    /// Append a header.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Replace every value of `name` with a single entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.retain(|(k, _)| *k != name);
        self.0.push((name, value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The `destination` header.
    pub fn destination(&self) -> Option<&str> {
        self.get(DESTINATION)
    }

    /// The `subscription` header.
    pub fn subscription(&self) -> Option<&str> {
        self.get(SUBSCRIPTION)
    }

    /// The `message-id` header.
    pub fn message_id(&self) -> Option<&str> {
        self.get(MESSAGE_ID)
    }

    /// The `content-type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE)
    }

    /// Number of header entries, repeats included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl std::fmt::Display for StompHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (k, v) in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}
