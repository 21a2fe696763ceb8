//! In-process broker and transport.
//!
//! [`MemoryTransport`] implements the transport contract without any network:
//! sessions talk to a shared [`MemoryBroker`] that routes sends to the
//! handlers subscribed on the same destination. It backs the demo binary and
//! the integration tests, and offers hooks to simulate dropped connections,
//! refused connects and rejected subscriptions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, trace};

use stompkit_core::frame::{DESTINATION, MESSAGE_ID, SESSION, SUBSCRIPTION};
use stompkit_core::{
    validate_url, Error, HandlerRef, PendingSession, Result, SessionEventSink, SessionId,
    SessionRef, StompHeaders, StompSession, Subscription, SubscriptionRef, Transport,
};

#[derive(Clone)]
struct Route {
    subscription_id: String,
    session_id: SessionId,
    handler: HandlerRef,
}

#[derive(Default)]
struct BrokerState {
    routes: BTreeMap<String, Vec<Route>>,
    rejected_prefixes: Vec<String>,
}

/// Process-local broker routing sends to subscribers.
#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    next_subscription: AtomicU64,
    next_message: AtomicU64,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse SUBSCRIBE for destinations starting with `prefix`.
    pub fn reject_destination(&self, prefix: impl Into<String>) {
        self.lock().rejected_prefixes.push(prefix.into());
    }

    /// Accept every destination again.
    pub fn clear_rejections(&self) {
        self.lock().rejected_prefixes.clear();
    }

    /// Number of subscribers bound to `destination`.
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.lock().routes.get(destination).map_or(0, Vec::len)
    }

    /// Deliver `payload` to every subscriber of `destination`.
    ///
    /// Returns the number of handlers the message was delivered to.
    pub fn publish(&self, destination: &str, headers: StompHeaders, payload: &[u8]) -> usize {
        let routes = self
            .lock()
            .routes
            .get(destination)
            .cloned()
            .unwrap_or_default();

        let message_id = self.next_message.fetch_add(1, Ordering::Relaxed);
        for route in &routes {
            let mut frame_headers = headers.clone();
            frame_headers.set(DESTINATION, destination);
            frame_headers.set(SUBSCRIPTION, route.subscription_id.as_str());
            frame_headers.set(MESSAGE_ID, format!("{}-{}", route.session_id, message_id));
            route.handler.handle_frame(&frame_headers, payload);
        }

        trace!(
            "Published to {}: {} bytes, {} subscribers",
            destination,
            payload.len(),
            routes.len()
        );
        routes.len()
    }

    fn subscribe(
        &self,
        session_id: &SessionId,
        destination: &str,
        handler: HandlerRef,
    ) -> Option<String> {
        let mut state = self.lock();
        if state
            .rejected_prefixes
            .iter()
            .any(|prefix| destination.starts_with(prefix.as_str()))
        {
            debug!("Broker rejected SUBSCRIBE to {}", destination);
            return None;
        }

        let subscription_id = format!(
            "sub-{}",
            self.next_subscription.fetch_add(1, Ordering::Relaxed)
        );
        state
            .routes
            .entry(destination.to_string())
            .or_default()
            .push(Route {
                subscription_id: subscription_id.clone(),
                session_id: session_id.clone(),
                handler,
            });
        Some(subscription_id)
    }

    fn unsubscribe(&self, destination: &str, subscription_id: &str) -> bool {
        let mut state = self.lock();
        let Some(routes) = state.routes.get_mut(destination) else {
            return false;
        };
        let before = routes.len();
        routes.retain(|route| route.subscription_id != subscription_id);
        let removed = routes.len() != before;
        if routes.is_empty() {
            state.routes.remove(destination);
        }
        removed
    }

    fn drop_session(&self, session_id: &SessionId) {
        let mut state = self.lock();
        for routes in state.routes.values_mut() {
            routes.retain(|route| &route.session_id != session_id);
        }
        state.routes.retain(|_, routes| !routes.is_empty());
    }
}

/// Call counters kept by a [`MemoryTransport`].
#[derive(Debug, Default)]
pub struct TransportStats {
    connects: AtomicUsize,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    sends: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Connect requests
    pub connects: usize,
    /// SUBSCRIBE frames, accepted or not
    pub subscribes: usize,
    /// UNSUBSCRIBE frames
    pub unsubscribes: usize,
    /// SEND frames
    pub sends: usize,
    /// DISCONNECT frames
    pub disconnects: usize,
}

impl TransportStats {
    /// Copy the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connects: self.connects.load(Ordering::SeqCst),
            subscribes: self.subscribes.load(Ordering::SeqCst),
            unsubscribes: self.unsubscribes.load(Ordering::SeqCst),
            sends: self.sends.load(Ordering::SeqCst),
            disconnects: self.disconnects.load(Ordering::SeqCst),
        }
    }
}

/// Session opened by a [`MemoryTransport`].
pub struct MemorySession {
    id: SessionId,
    connected: AtomicBool,
    broker: Arc<MemoryBroker>,
    stats: Arc<TransportStats>,
}

impl MemorySession {
    fn close(&self) -> bool {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            self.broker.drop_session(&self.id);
        }
        was_connected
    }
}

impl StompSession for MemorySession {
    fn id(&self) -> &SessionId {
        &self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self, destination: &str, handler: HandlerRef) -> Option<SubscriptionRef> {
        self.stats.subscribes.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return None;
        }
        let subscription_id = self.broker.subscribe(&self.id, destination, handler)?;
        Some(Arc::new(MemorySubscription {
            id: subscription_id,
            destination: destination.to_string(),
            broker: Arc::clone(&self.broker),
            stats: Arc::clone(&self.stats),
        }))
    }

    fn send(&self, destination: &str, headers: StompHeaders, payload: &[u8]) -> Result<()> {
        self.stats.sends.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.broker.publish(destination, headers, payload);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.close() {
            debug!("Memory session disconnected: id={}", self.id);
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

/// Subscription made through a [`MemorySession`].
pub struct MemorySubscription {
    id: String,
    destination: String,
    broker: Arc<MemoryBroker>,
    stats: Arc<TransportStats>,
}

impl Subscription for MemorySubscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn destination(&self) -> &str {
        &self.destination
    }

    fn unsubscribe(&self) -> Result<()> {
        self.stats.unsubscribes.fetch_add(1, Ordering::SeqCst);
        // Routes of a closed session are already gone.
        self.broker.unsubscribe(&self.destination, &self.id);
        Ok(())
    }
}

struct OpenSession {
    session: Arc<MemorySession>,
    sink: Arc<dyn SessionEventSink>,
}

/// Transport backed by a [`MemoryBroker`].
pub struct MemoryTransport {
    broker: Arc<MemoryBroker>,
    running: AtomicBool,
    refuse_connections: AtomicBool,
    sessions: Mutex<BTreeMap<SessionId, OpenSession>>,
    stats: Arc<TransportStats>,
}

impl MemoryTransport {
    /// Create a transport with its own broker.
    pub fn new() -> Self {
        Self::with_broker(MemoryBroker::new())
    }

    /// Create a transport sharing `broker` with other transports.
    pub fn with_broker(broker: Arc<MemoryBroker>) -> Self {
        Self {
            broker,
            running: AtomicBool::new(false),
            refuse_connections: AtomicBool::new(false),
            sessions: Mutex::new(BTreeMap::new()),
            stats: Arc::new(TransportStats::default()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, BTreeMap<SessionId, OpenSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The broker sessions of this transport talk to.
    pub fn broker(&self) -> &Arc<MemoryBroker> {
        &self.broker
    }

    /// Current call counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Make subsequent connects fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Simulate a lost connection: close the session without DISCONNECT and
    /// report [`Error::ConnectionLost`] to its sink.
    ///
    /// Returns false if the session is unknown or already closed.
    pub fn drop_connection(&self, session_id: &SessionId) -> bool {
        let open = self
            .sessions()
            .get(session_id)
            .map(|open| (Arc::clone(&open.session), Arc::clone(&open.sink)));
        let Some((session, sink)) = open else {
            return false;
        };
        if !session.close() {
            return false;
        }
        info!("Memory session dropped: id={}", session_id);
        sink.on_transport_error(&Error::ConnectionLost(format!(
            "session {session_id} dropped"
        )));
        true
    }

    /// Identifiers of sessions whose connection is still open.
    pub fn open_sessions(&self) -> Vec<SessionId> {
        self.sessions()
            .values()
            .filter(|open| open.session.is_connected())
            .map(|open| open.session.id.clone())
            .collect()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn connect(&self, url: &str, sink: Arc<dyn SessionEventSink>) -> Result<PendingSession> {
        validate_url(url)?;
        self.stats.connects.fetch_add(1, Ordering::SeqCst);

        if self.refuse_connections.load(Ordering::SeqCst) {
            let error = Error::ConnectFailed(format!("{url} refused the connection"));
            sink.on_transport_error(&error);
            return Ok(PendingSession::ready(Err(error)));
        }

        let session = Arc::new(MemorySession {
            id: SessionId::generate(),
            connected: AtomicBool::new(true),
            broker: Arc::clone(&self.broker),
            stats: Arc::clone(&self.stats),
        });
        self.sessions().insert(
            session.id.clone(),
            OpenSession {
                session: Arc::clone(&session),
                sink: Arc::clone(&sink),
            },
        );
        debug!("Memory session opened: id={}, url={}", session.id, url);

        let headers = StompHeaders::new()
            .with(SESSION, session.id.as_str())
            .with("version", "1.2");
        let session: SessionRef = session;
        sink.on_connected(Arc::clone(&session), &headers);

        Ok(PendingSession::ready(Ok(session)))
    }

    fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        let sessions = std::mem::take(&mut *self.sessions());
        for open in sessions.values() {
            open.session.close();
        }
        debug!("Memory transport stopped, closed {} sessions", sessions.len());
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use stompkit_core::StompCommand;

    #[derive(Default)]
    struct RecordingSink {
        connected: StdMutex<Vec<SessionId>>,
        transport_errors: StdMutex<Vec<String>>,
    }

    impl SessionEventSink for RecordingSink {
        fn on_connected(&self, session: SessionRef, _headers: &StompHeaders) {
            self.connected.lock().unwrap().push(session.id().clone());
        }

        fn on_frame(&self, _headers: &StompHeaders, _payload: &[u8]) {}

        fn on_transport_error(&self, error: &Error) {
            self.transport_errors.lock().unwrap().push(error.to_string());
        }

        fn on_application_error(
            &self,
            _command: Option<StompCommand>,
            _headers: &StompHeaders,
            _payload: &[u8],
            _error: &Error,
        ) {
        }
    }

    #[tokio::test]
    async fn test_connect_reports_session() {
        let transport = MemoryTransport::new();
        let sink = Arc::new(RecordingSink::default());

        let session = transport
            .connect("ws://broker/ws", sink.clone())
            .unwrap()
            .await
            .unwrap();

        assert!(session.is_connected());
        assert_eq!(sink.connected.lock().unwrap().as_slice(), &[session.id().clone()]);
        assert_eq!(transport.stats().connects, 1);
    }

    #[test]
    fn test_connect_rejects_bad_url() {
        let transport = MemoryTransport::new();
        let sink = Arc::new(RecordingSink::default());
        assert!(matches!(
            transport.connect("", sink.clone()),
            Err(Error::InvalidUrl(_))
        ));
        assert_eq!(transport.stats().connects, 0);
    }

    #[tokio::test]
    async fn test_refused_connect() {
        let transport = MemoryTransport::new();
        transport.refuse_connections(true);
        let sink = Arc::new(RecordingSink::default());

        let result = transport.connect("ws://broker/ws", sink.clone()).unwrap().await;
        assert!(matches!(result, Err(Error::ConnectFailed(_))));
        assert_eq!(sink.transport_errors.lock().unwrap().len(), 1);
        assert!(sink.connected.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let transport = MemoryTransport::new();
        let sink = Arc::new(RecordingSink::default());
        let session = transport
            .connect("ws://broker/ws", sink)
            .unwrap()
            .await
            .unwrap();

        let received = Arc::new(StdMutex::new(Vec::new()));
        let store = Arc::clone(&received);
        let subscription = session
            .subscribe(
                "/topic/a",
                Arc::new(move |headers: &StompHeaders, payload: &[u8]| {
                    store.lock().unwrap().push((
                        headers.destination().map(str::to_string),
                        payload.to_vec(),
                    ));
                }),
            )
            .unwrap();

        session
            .send("/topic/a", StompHeaders::new(), b"hello")
            .unwrap();
        assert_eq!(
            received.lock().unwrap().as_slice(),
            &[(Some("/topic/a".to_string()), b"hello".to_vec())]
        );

        subscription.unsubscribe().unwrap();
        assert_eq!(transport.broker().subscriber_count("/topic/a"), 0);
        session
            .send("/topic/a", StompHeaders::new(), b"again")
            .unwrap();
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_destination() {
        let transport = MemoryTransport::new();
        transport.broker().reject_destination("/topic/secret");
        let session = transport
            .connect("ws://broker/ws", Arc::new(RecordingSink::default()))
            .unwrap()
            .await
            .unwrap();

        let noop: HandlerRef = Arc::new(|_: &StompHeaders, _: &[u8]| {});
        assert!(session.subscribe("/topic/secret/x", noop.clone()).is_none());
        assert!(session.subscribe("/topic/public", noop).is_some());
        assert_eq!(transport.stats().subscribes, 2);
    }

    #[tokio::test]
    async fn test_drop_connection_notifies_sink() {
        let transport = MemoryTransport::new();
        let sink = Arc::new(RecordingSink::default());
        let session = transport
            .connect("ws://broker/ws", sink.clone())
            .unwrap()
            .await
            .unwrap();
        let noop: HandlerRef = Arc::new(|_: &StompHeaders, _: &[u8]| {});
        session.subscribe("/topic/a", noop).unwrap();

        assert!(transport.drop_connection(session.id()));
        assert!(!session.is_connected());
        assert_eq!(transport.broker().subscriber_count("/topic/a"), 0);
        assert_eq!(sink.transport_errors.lock().unwrap().len(), 1);
        assert!(!transport.drop_connection(session.id()));
        assert!(transport.open_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_twice() {
        let transport = MemoryTransport::new();
        let session = transport
            .connect("ws://broker/ws", Arc::new(RecordingSink::default()))
            .unwrap()
            .await
            .unwrap();

        assert!(session.disconnect().is_ok());
        assert!(matches!(session.disconnect(), Err(Error::NotConnected)));
        assert_eq!(transport.stats().disconnects, 2);
    }

    #[tokio::test]
    async fn test_stop_closes_sessions() {
        let transport = MemoryTransport::new();
        transport.start().unwrap();
        assert!(transport.is_running());
        let session = transport
            .connect("ws://broker/ws", Arc::new(RecordingSink::default()))
            .unwrap()
            .await
            .unwrap();

        transport.stop().unwrap();
        assert!(!transport.is_running());
        assert!(!session.is_connected());
    }
}
