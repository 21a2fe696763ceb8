//! Contract between the session layer and a broker transport.
//!
//! A transport owns the physical connection and frame codec. The session layer
//! only ever sees the narrow traits in this module:
//!
//! - [`Transport`] opens sessions and is started/stopped as a resource
//! - [`StompSession`] is one live broker session
//! - [`Subscription`] is one destination binding on a session
//! - [`FrameHandler`] receives MESSAGE frames for a subscription
//! - [`SessionEventSink`] receives lifecycle events from the transport

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::{Error, Result, SessionId, StompCommand, StompHeaders};

/// Shared handle to a live session.
pub type SessionRef = Arc<dyn StompSession>;

/// Shared handle to a subscription.
pub type SubscriptionRef = Arc<dyn Subscription>;

/// Shared handle to a frame handler.
pub type HandlerRef = Arc<dyn FrameHandler>;

/// Receives frames delivered to a subscribed destination.
pub trait FrameHandler: Send + Sync {
    /// Handle one MESSAGE frame.
    fn handle_frame(&self, headers: &StompHeaders, payload: &[u8]);
}

impl<F> FrameHandler for F
where
    F: Fn(&StompHeaders, &[u8]) + Send + Sync,
{
    fn handle_frame(&self, headers: &StompHeaders, payload: &[u8]) {
        self(headers, payload)
    }
}

/// One destination binding on a session.
pub trait Subscription: Send + Sync {
    /// Subscription id assigned by the session.
    fn id(&self) -> &str;

    /// Destination this subscription is bound to.
    fn destination(&self) -> &str;

    /// Send UNSUBSCRIBE for this binding.
    fn unsubscribe(&self) -> Result<()>;
}

/// One live broker session.
pub trait StompSession: Send + Sync {
    /// Session identifier.
    fn id(&self) -> &SessionId;

    /// Whether the underlying connection is still usable.
    fn is_connected(&self) -> bool;

    /// Send SUBSCRIBE for `destination`.
    ///
    /// Returns `None` when the session cannot subscribe (closed, rejected).
    fn subscribe(&self, destination: &str, handler: HandlerRef) -> Option<SubscriptionRef>;

    /// Send a payload to `destination`.
    fn send(&self, destination: &str, headers: StompHeaders, payload: &[u8]) -> Result<()>;

    /// Send DISCONNECT and close the session.
    fn disconnect(&self) -> Result<()>;
}

/// Lifecycle callbacks a transport delivers for the sessions it opens.
///
/// Callbacks run on the transport's own threads.
pub trait SessionEventSink: Send + Sync {
    /// A session completed its handshake.
    fn on_connected(&self, session: SessionRef, headers: &StompHeaders);

    /// A frame arrived that no subscription claimed.
    fn on_frame(&self, headers: &StompHeaders, payload: &[u8]);

    /// Low level failure: I/O error, codec failure, connection lost.
    fn on_transport_error(&self, error: &Error);

    /// Failure while processing a frame: ERROR frame, payload conversion,
    /// handler failure.
    fn on_application_error(
        &self,
        command: Option<StompCommand>,
        headers: &StompHeaders,
        payload: &[u8],
        error: &Error,
    );
}

/// A broker transport.
pub trait Transport: Send + Sync {
    /// Begin establishing a session to `url`.
    ///
    /// Returns immediately. The session is reported both through
    /// [`SessionEventSink::on_connected`] and through the returned
    /// [`PendingSession`].
    fn connect(&self, url: &str, sink: Arc<dyn SessionEventSink>) -> Result<PendingSession>;

    /// Acquire transport resources.
    fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Release transport resources.
    fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the transport currently holds resources.
    fn is_running(&self) -> bool {
        false
    }
}

type FailureHook = Box<dyn FnOnce(&Error) + Send>;

#[derive(Default)]
struct Handoff {
    abandoned: bool,
    hook: Option<FailureHook>,
}

/// State shared by the two halves of a pending connect.
///
/// The promise sends while holding this lock, so once the waiting side has
/// marked itself abandoned a result is either already in the channel or will
/// be routed to the failure hook.
#[derive(Default)]
struct Shared(Mutex<Handoff>);

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Handoff> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write half of a pending connect, held by the transport.
pub struct SessionPromise {
    tx: Option<oneshot::Sender<Result<SessionRef>>>,
    shared: Arc<Shared>,
}

impl SessionPromise {
    /// Resolve the pending connect.
    ///
    /// Returns false if the waiting side already went away. A failure nobody
    /// waits for any more is passed to the hook installed with
    /// [`PendingSession::on_abandoned_failure`].
    pub fn complete(mut self, result: Result<SessionRef>) -> bool {
        let Some(tx) = self.tx.take() else {
            return false;
        };
        let mut handoff = self.shared.lock();
        let unsent = if handoff.abandoned {
            Err(result)
        } else {
            tx.send(result)
        };
        match unsent {
            Ok(()) => true,
            Err(Err(error)) => {
                let hook = handoff.hook.take();
                drop(handoff);
                if let Some(hook) = hook {
                    hook(&error);
                }
                false
            }
            Err(Ok(_)) => false,
        }
    }
}

impl Drop for SessionPromise {
    fn drop(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let mut handoff = self.shared.lock();
        // A live receiver observes the closed channel itself.
        drop(tx);
        if !handoff.abandoned {
            return;
        }
        let hook = handoff.hook.take();
        drop(handoff);
        if let Some(hook) = hook {
            hook(&Error::ConnectAborted);
        }
    }
}

impl std::fmt::Debug for SessionPromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPromise")
            .field("completed", &self.tx.is_none())
            .finish()
    }
}

/// Future of a session being established by a transport.
///
/// Resolves to [`Error::ConnectAborted`] if the transport drops its
/// [`SessionPromise`] without completing it.
pub struct PendingSession {
    rx: oneshot::Receiver<Result<SessionRef>>,
    shared: Arc<Shared>,
}

impl PendingSession {
    /// Create a linked promise/future pair.
    pub fn channel() -> (SessionPromise, PendingSession) {
        let (tx, rx) = oneshot::channel();
        let shared = Arc::new(Shared::default());
        (
            SessionPromise {
                tx: Some(tx),
                shared: Arc::clone(&shared),
            },
            PendingSession { rx, shared },
        )
    }

    /// A pending session that has already resolved.
    pub fn ready(result: Result<SessionRef>) -> Self {
        let (promise, pending) = Self::channel();
        promise.complete(result);
        pending
    }

    /// Take the result if the transport has already answered.
    pub fn try_take(&mut self) -> Option<Result<SessionRef>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::ConnectAborted)),
        }
    }

    /// Run `hook` if the connect fails after this future has been abandoned.
    ///
    /// Replaces any hook installed earlier.
    pub fn on_abandoned_failure<F>(&self, hook: F)
    where
        F: FnOnce(&Error) + Send + 'static,
    {
        self.shared.lock().hook = Some(Box::new(hook));
    }

    /// Stop waiting, returning the result if the transport already answered.
    ///
    /// Results arriving afterwards never reach this future; failures go to
    /// the abandoned-failure hook instead.
    pub fn abandon(&mut self) -> Option<Result<SessionRef>> {
        self.shared.lock().abandoned = true;
        self.try_take()
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        self.shared.lock().abandoned = true;
    }
}

impl std::fmt::Debug for PendingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSession")
            .field("abandoned", &self.shared.lock().abandoned)
            .finish()
    }
}

impl Future for PendingSession {
    type Output = Result<SessionRef>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectAborted)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for dyn StompSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StompSession")
            .field("id", self.id())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl std::fmt::Debug for dyn Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id())
            .field("destination", &self.destination())
            .finish()
    }
}
