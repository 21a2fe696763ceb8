//! stompkit demo client library
//!
//! Command line handling and the chat session driven by the binary.
//! The actual binary is in main.rs.

pub mod chat;
pub mod cli;

// Re-export commonly used types
pub use chat::{ChatMessage, ChatReport};
pub use cli::CliArgs;
