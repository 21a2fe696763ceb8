//! # stompkit-core
//!
//! Core types for stompkit.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other stompkit crates. It provides:
//!
//! - Session types (SessionId, ConnectionState)
//! - Frame vocabulary (StompCommand, StompHeaders)
//! - The application message envelope (StompMessage)
//! - The transport contract (Transport, StompSession, Subscription,
//!   FrameHandler, SessionEventSink, PendingSession)
//! - Configuration, validation and error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other stompkit crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod session;
pub mod transport;
pub mod validate;

// Re-export commonly used types
pub use config::{
    BrokerSettings, ClientConfig, DestinationSettings, LoggingSettings, SessionSettings,
};
pub use error::{Error, Result};
pub use frame::{StompCommand, StompHeaders};
pub use message::{MessageType, StompMessage};
pub use session::{ConnectionState, SessionId};
pub use transport::{
    FrameHandler, HandlerRef, PendingSession, SessionEventSink, SessionPromise, SessionRef,
    StompSession, Subscription, SubscriptionRef, Transport,
};
pub use validate::{validate_destination, validate_url};
