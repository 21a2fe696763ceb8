//! Session lifecycle controller.
//!
//! [`SessionController`] owns one logical broker connection. It asks the
//! transport for sessions, adopts each new session as it is reported, carries
//! subscriptions over from the session it replaces, and applies the
//! auto-subscription list after every handshake.
//!
//! Connection state, the current session, the subscription registry and the
//! auto-subscription list are guarded independently. Transport callbacks may
//! run concurrently with application calls on the same controller.
//!
//! ```
//! # use std::sync::Arc;
//! # use stompkit_core::StompHeaders;
//! # use stompkit_session::{MemoryTransport, SessionController};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> stompkit_core::Result<()> {
//! let controller = SessionController::new(Arc::new(MemoryTransport::new()));
//! controller.add_auto_subscription(
//!     "/topic/public",
//!     Arc::new(|_: &StompHeaders, payload: &[u8]| println!("{}", payload.len())),
//! );
//!
//! controller.connect("ws://broker/ws")?.await?;
//! assert!(controller.is_subscribed("/topic/public"));
//!
//! controller.shutdown();
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use stompkit_core::frame::CONTENT_TYPE;
use stompkit_core::{
    validate_destination, ClientConfig, ConnectionState, Error, HandlerRef, PendingSession,
    Result, SessionEventSink, SessionRef, StompCommand, StompHeaders, Transport,
};

use crate::auto::AutoSubscriptions;
use crate::handler::LoggingFrameHandler;
use crate::registry::{ActiveSubscription, SubscriptionRegistry};
use crate::state::SessionState;

/// Tunables for a [`SessionController`].
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Resubscribe carried-over destinations with their original handler
    /// instead of the default logging handler
    pub restore_handlers: bool,

    /// Upper bound used by [`SessionController::connect_and_wait`]
    pub connect_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            restore_handlers: false,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ClientConfig> for ControllerOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            restore_handlers: config.session.restore_handlers,
            connect_timeout: Duration::from_millis(config.broker.connect_timeout_ms),
        }
    }
}

struct ControllerShared {
    transport: Arc<dyn Transport>,
    state: SessionState,
    registry: SubscriptionRegistry,
    auto: AutoSubscriptions,
    default_handler: HandlerRef,
    options: ControllerOptions,
    /// Attempts up to this number were retired by a shutdown
    shut_down_through: AtomicU64,
}

/// Client-side manager of one logical STOMP connection.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<ControllerShared>,
}

impl SessionController {
    /// Create a controller with default options.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_options(transport, ControllerOptions::default())
    }

    /// Create a controller with custom options.
    pub fn with_options(transport: Arc<dyn Transport>, options: ControllerOptions) -> Self {
        Self {
            shared: Arc::new(ControllerShared {
                transport,
                state: SessionState::new(),
                registry: SubscriptionRegistry::new(),
                auto: AutoSubscriptions::new(),
                default_handler: Arc::new(LoggingFrameHandler),
                options,
                shut_down_through: AtomicU64::new(0),
            }),
        }
    }

    /// Create a controller from configuration.
    ///
    /// Configured auto-subscriptions are registered with the default handler.
    pub fn from_config(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let controller = Self::with_options(transport, ControllerOptions::from(config));
        for destination in &config.auto_subscriptions {
            controller.add_auto_subscription(
                destination.as_str(),
                Arc::clone(&controller.shared.default_handler),
            );
        }
        controller
    }

    /// Options this controller was built with.
    pub fn options(&self) -> &ControllerOptions {
        &self.shared.options
    }

    /// Start the underlying transport.
    pub fn start(&self) -> Result<()> {
        debug!("Starting transport");
        self.shared.transport.start()
    }

    /// Begin connecting to `url`.
    ///
    /// Returns as soon as the transport has accepted the request. The
    /// returned future resolves once the transport answers; the session is
    /// adopted through the connected callback either way, so the future may
    /// be dropped. A failure reported after the future was dropped still ends
    /// the attempt. A second call while an attempt is outstanding fails with
    /// [`Error::ConnectInProgress`].
    pub fn connect(&self, url: &str) -> Result<ConnectFuture> {
        if url.trim().is_empty() {
            return Err(Error::InvalidUrl("URL is empty".to_string()));
        }

        let attempt = self.shared.state.begin_connect()?;
        debug!("Connecting to: {} (attempt {})", url, attempt);

        let sink: Arc<dyn SessionEventSink> = Arc::new(ControllerSink {
            shared: Arc::downgrade(&self.shared),
            attempt,
        });
        match self.shared.transport.connect(url, sink) {
            Ok(pending) => {
                let shared = Arc::downgrade(&self.shared);
                pending.on_abandoned_failure(move |error| {
                    if let Some(shared) = shared.upgrade() {
                        warn!("Connect attempt {} failed: {}", attempt, error);
                        shared.state.connect_failed(attempt);
                    }
                });
                Ok(ConnectFuture {
                    pending: Some(pending),
                    attempt,
                    shared: Arc::clone(&self.shared),
                })
            }
            Err(e) => {
                warn!("Transport refused connect to {}: {}", url, e);
                self.shared.state.connect_failed(attempt);
                Err(e)
            }
        }
    }

    /// Connect to `url` and wait up to the configured timeout for a session.
    pub async fn connect_and_wait(&self, url: &str) -> Result<SessionRef> {
        let timeout = self.shared.options.connect_timeout;
        let pending = self.connect(url)?;
        let attempt = pending.attempt;
        match tokio::time::timeout(timeout, pending).await {
            Ok(result) => result,
            Err(_) => {
                self.shared.state.connect_failed(attempt);
                Err(Error::ConnectFailed(format!(
                    "no session from {} after {}ms",
                    url,
                    timeout.as_millis()
                )))
            }
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.state()
    }

    /// Whether a connect attempt is outstanding.
    pub fn is_connecting(&self) -> bool {
        self.shared.state.is_connecting()
    }

    /// Whether the current session exists and is still connected.
    pub fn is_connected(&self) -> bool {
        self.shared.state.has_live_session()
    }

    /// The session currently in use.
    pub fn current_session(&self) -> Option<SessionRef> {
        self.shared.state.current()
    }

    /// Disconnect the current session.
    ///
    /// Returns false if not connected or if the transport failed to
    /// disconnect; failures are logged.
    pub fn disconnect(&self) -> bool {
        self.shared.disconnect()
    }

    /// Subscribe `destination` on the current session unless it is already
    /// subscribed.
    ///
    /// Returns false, leaving the registry untouched, when not connected,
    /// when the destination is already subscribed, or when the session
    /// refuses the subscription.
    pub fn subscribe(&self, destination: &str, handler: HandlerRef) -> bool {
        self.shared.subscribe(destination, handler)
    }

    /// Drop the subscription for `destination`.
    ///
    /// Returns false if there was none, or if the UNSUBSCRIBE failed; the
    /// registry entry is removed either way.
    pub fn unsubscribe(&self, destination: &str) -> bool {
        self.shared.unsubscribe(destination)
    }

    /// Drop every subscription, returning the destinations removed.
    pub fn unsubscribe_all(&self) -> Vec<String> {
        self.shared
            .drain()
            .into_iter()
            .map(|(destination, _)| destination)
            .collect()
    }

    /// Whether `destination` is subscribed on the current session.
    pub fn is_subscribed(&self, destination: &str) -> bool {
        self.shared.registry.contains(destination)
    }

    /// Subscribed destinations in order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.shared
            .registry
            .snapshot_destinations()
            .into_iter()
            .collect()
    }

    /// Register `destination` to be subscribed after every successful
    /// connect.
    ///
    /// Does not subscribe now.
    pub fn add_auto_subscription(&self, destination: impl Into<String>, handler: HandlerRef) {
        let destination = destination.into();
        debug!("Adding auto-subscription: {}", destination);
        self.shared.auto.put(destination, handler);
    }

    /// Stop auto-subscribing `destination`.
    ///
    /// An active subscription for it is left in place.
    pub fn remove_auto_subscription(&self, destination: &str) -> bool {
        self.shared.auto.remove(destination)
    }

    /// Destinations auto-subscribed on connect.
    pub fn auto_subscriptions(&self) -> Vec<String> {
        self.shared.auto.destinations()
    }

    /// Send `payload` to `destination` over the current session.
    pub fn send(&self, destination: &str, headers: StompHeaders, payload: &[u8]) -> Result<()> {
        validate_destination(destination)?;
        let session = self
            .shared
            .state
            .live_session()
            .ok_or(Error::NotConnected)?;
        trace!(
            "Sending {} bytes to {} in session: {}",
            payload.len(),
            destination,
            session.id()
        );
        session.send(destination, headers, payload)
    }

    /// Serialize `value` as JSON and send it to `destination`.
    pub fn send_json<T: Serialize>(&self, destination: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        let headers = StompHeaders::new().with(CONTENT_TYPE, "application/json");
        self.send(destination, headers, &payload)
    }

    /// Tear down the connection and release the transport.
    ///
    /// If connected, unsubscribes everything and then disconnects; the
    /// disconnect runs even if unsubscribing panics. The transport is stopped
    /// afterwards if it reports running. Failures are logged and never abort
    /// later steps. A connect still in flight is retired: a session it
    /// reports later is disconnected instead of adopted.
    pub fn shutdown(&self) {
        debug!("Shutting down session controller");
        self.shared
            .shut_down_through
            .fetch_max(self.shared.state.last_attempt(), Ordering::AcqRel);

        if self.is_connected() {
            let _disconnect = DisconnectGuard {
                shared: &self.shared,
            };
            let removed = self.unsubscribe_all();
            debug!("Unsubscribed {} destinations before disconnect", removed.len());
        }
        self.shared.state.reset();

        let transport = &self.shared.transport;
        if transport.is_running() {
            match transport.stop() {
                Ok(()) => info!("Transport stopped"),
                Err(e) => warn!("Failed to stop transport: {}", e),
            }
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .field("session", &self.current_session().map(|s| s.id().clone()))
            .field("subscriptions", &self.subscriptions())
            .field("auto_subscriptions", &self.auto_subscriptions())
            .finish()
    }
}

impl SessionEventSink for SessionController {
    fn on_connected(&self, session: SessionRef, headers: &StompHeaders) {
        self.shared.on_connected(session, headers);
    }

    fn on_frame(&self, headers: &StompHeaders, payload: &[u8]) {
        self.shared.on_frame(headers, payload);
    }

    fn on_transport_error(&self, error: &Error) {
        self.shared.on_transport_error(error);
    }

    fn on_application_error(
        &self,
        command: Option<StompCommand>,
        headers: &StompHeaders,
        payload: &[u8],
        error: &Error,
    ) {
        self.shared
            .on_application_error(command, headers, payload, error);
    }
}

impl ControllerShared {
    fn on_connected(&self, session: SessionRef, _headers: &StompHeaders) {
        self.state.mark_connected();
        info!("Stomp session connected: id={}", session.id());

        // No lock is held here: the transport may report events while closing.
        if let Some(previous) = self.state.live_session() {
            if previous.id() != session.id() {
                debug!("Disconnecting replaced session: id={}", previous.id());
                if let Err(e) = previous.disconnect() {
                    warn!(
                        "Failed to disconnect replaced session {}: {}",
                        previous.id(),
                        e
                    );
                }
            }
        }
        self.state.adopt(Arc::clone(&session));

        let carried = self.drain();
        for (destination, previous) in carried {
            let handler = if self.options.restore_handlers {
                previous.handler
            } else {
                Arc::clone(&self.default_handler)
            };
            if !self.subscribe_on(&session, &destination, handler) {
                warn!(
                    "Failed to resubscribe {} in session: {}",
                    destination,
                    session.id()
                );
            }
        }

        self.auto.for_each(|destination, handler| {
            if self.subscribe_on(&session, destination, Arc::clone(handler)) {
                debug!("Auto-subscribed {} in session: {}", destination, session.id());
            } else if !self.registry.contains(destination) {
                warn!(
                    "Failed to auto-subscribe {} in session: {}",
                    destination,
                    session.id()
                );
            }
        });

        debug!(
            "Session {} ready with {} subscriptions",
            session.id(),
            self.registry.len()
        );
    }

    fn on_frame(&self, headers: &StompHeaders, payload: &[u8]) {
        trace!(
            "Received unrouted frame: headers=[{}], {} bytes",
            headers,
            payload.len()
        );
    }

    fn on_transport_error(&self, error: &Error) {
        warn!("Transport error: {}", error);
        if !self.state.has_live_session() {
            self.state.mark_disconnected();
        }
    }

    fn on_application_error(
        &self,
        command: Option<StompCommand>,
        headers: &StompHeaders,
        payload: &[u8],
        error: &Error,
    ) {
        warn!(
            "Error handling {} frame for {:?} ({} bytes): {}",
            command.map_or("unknown", |c| c.as_str()),
            headers.destination(),
            payload.len(),
            error
        );
    }

    /// Whether `attempt` was retired by a shutdown.
    fn is_retired(&self, attempt: u64) -> bool {
        attempt <= self.shut_down_through.load(Ordering::Acquire)
    }

    fn disconnect(&self) -> bool {
        let Some(session) = self.state.live_session() else {
            return false;
        };
        match session.disconnect() {
            Ok(()) => {
                self.state.mark_disconnected();
                info!("Disconnected session: id={}", session.id());
                true
            }
            Err(e) => {
                warn!("Exception disconnecting from session {}: {}", session.id(), e);
                false
            }
        }
    }

    fn subscribe(&self, destination: &str, handler: HandlerRef) -> bool {
        if let Err(e) = validate_destination(destination) {
            debug!("Not subscribing: {}", e);
            return false;
        }
        let Some(session) = self.state.live_session() else {
            trace!("Not subscribing {}: not connected", destination);
            return false;
        };
        self.subscribe_on(&session, destination, handler)
    }

    fn subscribe_on(&self, session: &SessionRef, destination: &str, handler: HandlerRef) -> bool {
        if !session.is_connected() {
            return false;
        }
        let success = self.registry.put_if_absent_with(destination, || {
            session
                .subscribe(destination, Arc::clone(&handler))
                .map(|subscription| ActiveSubscription {
                    subscription,
                    handler,
                    session_id: session.id().clone(),
                })
        });
        trace!(
            "Subscribed {} = {}, remaining: {} in session: {}",
            destination,
            success,
            self.registry.len(),
            session.id()
        );
        success
    }

    fn unsubscribe(&self, destination: &str) -> bool {
        let Some(active) = self.registry.remove(destination) else {
            return false;
        };
        let success = match active.subscription.unsubscribe() {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to unsubscribe {}: {}", destination, e);
                false
            }
        };
        trace!(
            "Unsubscribed {} = {}, remaining: {} in session: {}",
            destination,
            success,
            self.registry.len(),
            active.session_id
        );
        success
    }

    /// Empty the registry, sending UNSUBSCRIBE for each entry.
    ///
    /// Every drained entry is returned; UNSUBSCRIBE failures are logged.
    fn drain(&self) -> Vec<(String, ActiveSubscription)> {
        let drained = self.registry.remove_all();
        for (destination, active) in &drained {
            if let Err(e) = active.subscription.unsubscribe() {
                warn!(
                    "Failed to unsubscribe {} in session {}: {}",
                    destination, active.session_id, e
                );
            }
        }
        trace!("Drained {} subscriptions", drained.len());
        drained
    }
}

/// Disconnects the current session when dropped.
struct DisconnectGuard<'a> {
    shared: &'a ControllerShared,
}

impl Drop for DisconnectGuard<'_> {
    fn drop(&mut self) {
        self.shared.disconnect();
    }
}

/// Sink handed to the transport.
///
/// Holds the controller weakly so a transport keeping its sinks alive does not
/// keep the controller alive.
struct ControllerSink {
    shared: Weak<ControllerShared>,
    attempt: u64,
}

impl ControllerSink {
    fn with_shared<F: FnOnce(&ControllerShared)>(&self, event: &str, f: F) {
        match self.shared.upgrade() {
            Some(shared) => f(shared.as_ref()),
            None => debug!("Controller dropped, ignoring {} event", event),
        }
    }
}

impl SessionEventSink for ControllerSink {
    fn on_connected(&self, session: SessionRef, headers: &StompHeaders) {
        let reason = match self.shared.upgrade() {
            Some(shared) if !shared.is_retired(self.attempt) => {
                shared.on_connected(session, headers);
                return;
            }
            Some(_) => "controller shut down",
            None => "controller dropped",
        };
        debug!("{}, closing orphan session: id={}", reason, session.id());
        if let Err(e) = session.disconnect() {
            debug!("Failed to close orphan session {}: {}", session.id(), e);
        }
    }

    fn on_frame(&self, headers: &StompHeaders, payload: &[u8]) {
        self.with_shared("frame", |shared| shared.on_frame(headers, payload));
    }

    fn on_transport_error(&self, error: &Error) {
        self.with_shared("transport error", |shared| shared.on_transport_error(error));
    }

    fn on_application_error(
        &self,
        command: Option<StompCommand>,
        headers: &StompHeaders,
        payload: &[u8],
        error: &Error,
    ) {
        self.with_shared("application error", |shared| {
            shared.on_application_error(command, headers, payload, error)
        });
    }
}

/// Future of a connect attempt started by [`SessionController::connect`].
///
/// A failed attempt returns the controller to its previous state, whether the
/// failure is observed by polling or when the future is dropped.
pub struct ConnectFuture {
    pending: Option<PendingSession>,
    attempt: u64,
    shared: Arc<ControllerShared>,
}

impl Future for ConnectFuture {
    type Output = Result<SessionRef>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(pending) = this.pending.as_mut() else {
            return Poll::Ready(Err(Error::ConnectAborted));
        };
        match Pin::new(pending).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                this.pending = None;
                if let Err(e) = &result {
                    warn!("Connect attempt {} failed: {}", this.attempt, e);
                    this.shared.state.connect_failed(this.attempt);
                }
                Poll::Ready(result)
            }
        }
    }
}

impl Drop for ConnectFuture {
    fn drop(&mut self) {
        if let Some(mut pending) = self.pending.take() {
            if let Some(Err(e)) = pending.abandon() {
                warn!("Connect attempt {} failed: {}", self.attempt, e);
                self.shared.state.connect_failed(self.attempt);
            }
        }
    }
}

impl std::fmt::Debug for ConnectFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectFuture")
            .field("attempt", &self.attempt)
            .field("resolved", &self.pending.is_none())
            .finish()
    }
}
