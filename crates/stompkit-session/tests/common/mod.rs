//! Recording transport shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use stompkit_core::{
    Error, HandlerRef, PendingSession, Result, SessionEventSink, SessionId, SessionPromise,
    StompHeaders, StompSession, Subscription, SubscriptionRef, Transport,
};

/// Ordered log of every call the mock transport saw.
#[derive(Debug, Default)]
pub struct CallLog(Mutex<Vec<String>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

pub struct MockSession {
    id: SessionId,
    connected: AtomicBool,
    log: Arc<CallLog>,
    rejected: Mutex<Vec<String>>,
    fail_disconnect: AtomicBool,
    close_listener: Mutex<Option<Arc<dyn SessionEventSink>>>,
}

impl MockSession {
    pub fn new(id: &str, log: &Arc<CallLog>) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::new(id),
            connected: AtomicBool::new(true),
            log: Arc::clone(log),
            rejected: Mutex::new(Vec::new()),
            fail_disconnect: AtomicBool::new(false),
            close_listener: Mutex::new(None),
        })
    }

    /// Refuse SUBSCRIBE for `destination`.
    pub fn reject(&self, destination: &str) {
        self.rejected.lock().unwrap().push(destination.to_string());
    }

    /// Make DISCONNECT fail.
    pub fn fail_disconnect(&self) {
        self.fail_disconnect.store(true, Ordering::SeqCst);
    }

    /// Report the closed connection to `sink` from inside DISCONNECT, the way
    /// a transport noticing the socket going away would.
    pub fn report_close_to(&self, sink: Arc<dyn SessionEventSink>) {
        *self.close_listener.lock().unwrap() = Some(sink);
    }

    /// Mark the connection dead without a DISCONNECT.
    pub fn lose_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl StompSession for MockSession {
    fn id(&self) -> &SessionId {
        &self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self, destination: &str, _handler: HandlerRef) -> Option<SubscriptionRef> {
        self.log.push(format!("subscribe {} {}", self.id, destination));
        if self
            .rejected
            .lock()
            .unwrap()
            .iter()
            .any(|d| d == destination)
        {
            return None;
        }
        Some(Arc::new(MockSubscription {
            id: format!("{}-{}", self.id, destination),
            destination: destination.to_string(),
            session_id: self.id.clone(),
            log: Arc::clone(&self.log),
        }))
    }

    fn send(&self, destination: &str, _headers: StompHeaders, payload: &[u8]) -> Result<()> {
        self.log
            .push(format!("send {} {} {}", self.id, destination, payload.len()));
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.log.push(format!("disconnect {}", self.id));
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(Error::Transport("socket already closed".to_string()));
        }
        self.connected.store(false, Ordering::SeqCst);
        let listener = self.close_listener.lock().unwrap().clone();
        if let Some(sink) = listener {
            sink.on_transport_error(&Error::ConnectionLost(format!("{} closed", self.id)));
        }
        Ok(())
    }
}

pub struct MockSubscription {
    id: String,
    destination: String,
    session_id: SessionId,
    log: Arc<CallLog>,
}

impl Subscription for MockSubscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn destination(&self) -> &str {
        &self.destination
    }

    fn unsubscribe(&self) -> Result<()> {
        self.log
            .push(format!("unsubscribe {} {}", self.session_id, self.destination));
        Ok(())
    }
}

/// Transport that records calls and leaves connects pending until the test
/// resolves them.
pub struct MockTransport {
    pub log: Arc<CallLog>,
    running: AtomicBool,
    fail_stop: AtomicBool,
    promises: Mutex<Vec<SessionPromise>>,
    sinks: Mutex<Vec<Arc<dyn SessionEventSink>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(CallLog::default()),
            running: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            promises: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_stop(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    /// Answer the oldest pending connect.
    pub fn resolve_next(&self, result: Result<Arc<MockSession>>) {
        let promise = self.promises.lock().unwrap().remove(0);
        promise.complete(result.map(|s| s as Arc<dyn StompSession>));
    }

    /// Drop the oldest pending connect without answering it.
    pub fn abandon_next(&self) {
        drop(self.promises.lock().unwrap().remove(0));
    }

    /// Sink registered by the most recent connect.
    pub fn last_sink(&self) -> Arc<dyn SessionEventSink> {
        self.sinks.lock().unwrap().last().cloned().unwrap()
    }

    /// Deliver a handshake for `session` to the most recent sink.
    pub fn handshake(&self, session: &Arc<MockSession>) {
        self.last_sink()
            .on_connected(session.clone(), &StompHeaders::new());
    }

    pub fn pending_connects(&self) -> usize {
        self.promises.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    fn connect(&self, url: &str, sink: Arc<dyn SessionEventSink>) -> Result<PendingSession> {
        stompkit_core::validate_url(url)?;
        self.log.push(format!("connect {url}"));
        let (promise, pending) = PendingSession::channel();
        self.promises.lock().unwrap().push(promise);
        self.sinks.lock().unwrap().push(sink);
        Ok(pending)
    }

    fn start(&self) -> Result<()> {
        self.log.push("start");
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.log.push("stop");
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(Error::Transport("stop failed".to_string()));
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub fn noop() -> HandlerRef {
    Arc::new(|_: &StompHeaders, _: &[u8]| {})
}
