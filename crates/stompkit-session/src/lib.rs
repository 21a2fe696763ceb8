//! # stompkit-session
//!
//! Session lifecycle management for stompkit.
//!
//! This crate provides:
//! - The session lifecycle controller (connect, session replacement, shutdown)
//! - Connection state and current-session tracking
//! - The subscription registry and the auto-subscription list
//! - Frame handlers (trace logging, typed JSON)
//! - An in-process broker transport
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on stompkit-core and
//! drives any transport implementing its contract.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auto;
pub mod controller;
pub mod handler;
pub mod memory;
pub mod registry;
pub mod state;

// Re-export commonly used types
pub use auto::AutoSubscriptions;
pub use controller::{ConnectFuture, ControllerOptions, SessionController};
pub use handler::{JsonFrameHandler, LoggingFrameHandler};
pub use memory::{MemoryBroker, MemorySession, MemoryTransport, StatsSnapshot};
pub use registry::{ActiveSubscription, SubscriptionRegistry};
pub use state::SessionState;
