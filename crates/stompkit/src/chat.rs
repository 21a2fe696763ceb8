//! Chat-room session against the in-process broker.
//!
//! Joins the public topic, posts a message, survives a dropped connection and
//! leaves again. Used by the binary to show a session being carried across a
//! reconnect.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use stompkit_core::{ClientConfig, MessageType, StompHeaders, StompMessage};
use stompkit_session::{JsonFrameHandler, MemoryTransport, SessionController};

/// Chat message exchanged on the public topic.
pub type ChatMessage = StompMessage<String, String>;

/// What happened during a [`run`].
#[derive(Debug, Clone, Serialize)]
pub struct ChatReport {
    /// Sessions used, in order
    pub sessions: Vec<String>,
    /// Destinations subscribed just before shutdown
    pub subscriptions: Vec<String>,
    /// Messages delivered to the chat handler
    pub received: Vec<ChatMessage>,
    /// SUBSCRIBE frames sent
    pub subscribes: usize,
    /// DISCONNECT frames sent
    pub disconnects: usize,
}

fn chat_message(kind: MessageType, sender: &str, content: impl Into<String>) -> ChatMessage {
    StompMessage::new()
        .id(Uuid::new_v4().to_string())
        .kind(kind)
        .sender(sender)
        .content(content.into())
}

/// Run the chat session as `sender`.
pub async fn run(config: &ClientConfig, sender: &str) -> anyhow::Result<ChatReport> {
    let transport = Arc::new(MemoryTransport::new());
    let controller = SessionController::from_config(config, transport.clone());
    controller.start()?;

    let topic = config.destinations.topic_endpoint("public");
    let inbox: Arc<Mutex<Vec<ChatMessage>>> = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::clone(&inbox);
    controller.add_auto_subscription(
        topic.as_str(),
        Arc::new(JsonFrameHandler::new(
            move |_: &StompHeaders, message: ChatMessage| {
                info!(
                    "{:?} from {}: {}",
                    message.kind,
                    message.sender.as_deref().unwrap_or("anonymous"),
                    message.content.as_deref().unwrap_or_default()
                );
                if let Ok(mut inbox) = store.lock() {
                    inbox.push(message);
                }
            },
        )),
    );

    let url = config.broker.url.as_str();
    let first = controller.connect_and_wait(url).await?;
    controller.send_json(
        &topic,
        &chat_message(MessageType::Join, sender, format!("{sender} joined")),
    )?;

    info!("Dropping connection of session {}", first.id());
    transport.drop_connection(first.id());

    let second = controller.connect_and_wait(url).await?;
    controller.send_json(
        &topic,
        &chat_message(MessageType::Info, sender, "still here after reconnect"),
    )?;
    controller.send_json(
        &topic,
        &chat_message(MessageType::Leave, sender, format!("{sender} left")),
    )?;

    let subscriptions = controller.subscriptions();
    controller.shutdown();
    if controller.is_connected() {
        warn!("Controller still connected after shutdown");
    }

    let received = inbox
        .lock()
        .map(|inbox| inbox.clone())
        .unwrap_or_default();
    let stats = transport.stats();
    Ok(ChatReport {
        sessions: vec![first.id().to_string(), second.id().to_string()],
        subscriptions,
        received,
        subscribes: stats.subscribes,
        disconnects: stats.disconnects,
    })
}
