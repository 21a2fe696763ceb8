//! # stompkit
//!
//! Demo client for the stompkit session manager.
//!
//! ## Overview
//!
//! Loads a YAML client configuration, connects a session controller to the
//! in-process broker, chats on the public topic, drops the connection and
//! reconnects, then shuts down and prints a JSON report.
//!
//! ## Architecture
//!
//! This is Layer 2 - the binary that ties together:
//! - stompkit-core: Core types, configuration, transport contract
//! - stompkit-session: Session lifecycle and the in-memory transport

use stompkit::{chat, CliArgs};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = CliArgs::parse(std::env::args().skip(1))?;
    if args.help {
        println!("{}", stompkit::cli::USAGE);
        return Ok(());
    }

    let config = args.load_config()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "stompkit v{} connecting to {}",
        env!("CARGO_PKG_VERSION"),
        config.broker.url
    );

    let sender = args.sender.as_deref().unwrap_or("stompkit");
    let report = chat::run(&config, sender).await.map_err(|e| {
        tracing::error!("Chat session failed: {}", e);
        e
    })?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    tracing::info!("stompkit shutting down");

    Ok(())
}
