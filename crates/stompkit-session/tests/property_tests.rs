//! Property-based tests for the subscription bookkeeping.
//!
//! Uses proptest to drive the controller with random operation sequences over
//! the in-process transport.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

use stompkit_core::{
    Error, HandlerRef, SessionEventSink, SessionRef, StompCommand, StompHeaders, StompSession,
    Transport,
};
use stompkit_session::{MemoryTransport, SessionController};

fn noop() -> HandlerRef {
    Arc::new(|_: &StompHeaders, _: &[u8]| {})
}

/// Destinations drawn from a small pool so operations collide.
fn destination() -> impl Strategy<Value = String> {
    (0u8..6).prop_map(|n| format!("/topic/{n}"))
}

#[derive(Debug, Clone)]
enum Op {
    Subscribe(String),
    Unsubscribe(String),
    UnsubscribeAll,
    Reconnect,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => destination().prop_map(Op::Subscribe),
        2 => destination().prop_map(Op::Unsubscribe),
        1 => Just(Op::UnsubscribeAll),
        1 => Just(Op::Reconnect),
    ]
}

fn connected() -> (Arc<MemoryTransport>, SessionController) {
    let transport = Arc::new(MemoryTransport::new());
    let controller = SessionController::new(transport.clone());
    drop(controller.connect("ws://broker/ws").unwrap());
    (transport, controller)
}

proptest! {
    /// The registry behaves like a set of destinations.
    #[test]
    fn registry_tracks_model(ops in prop::collection::vec(op(), 1..40)) {
        let (transport, controller) = connected();
        let mut model = BTreeSet::new();

        for op in ops {
            match op {
                Op::Subscribe(dest) => {
                    let accepted = controller.subscribe(&dest, noop());
                    prop_assert_eq!(accepted, model.insert(dest));
                }
                Op::Unsubscribe(dest) => {
                    let removed = controller.unsubscribe(&dest);
                    prop_assert_eq!(removed, model.remove(&dest));
                }
                Op::UnsubscribeAll => {
                    let removed = controller.unsubscribe_all();
                    prop_assert_eq!(removed, model.iter().cloned().collect::<Vec<_>>());
                    model.clear();
                }
                Op::Reconnect => {
                    drop(controller.connect("ws://broker/ws").unwrap());
                }
            }
            prop_assert_eq!(
                controller.subscriptions(),
                model.iter().cloned().collect::<Vec<_>>()
            );
        }

        for dest in &model {
            prop_assert_eq!(transport.broker().subscriber_count(dest), 1);
        }
    }

    /// Subscribing twice never produces a second entry.
    #[test]
    fn subscribe_is_idempotent(dests in prop::collection::vec(destination(), 1..20)) {
        let (_transport, controller) = connected();
        for dest in &dests {
            controller.subscribe(dest, noop());
            prop_assert!(!controller.subscribe(dest, noop()));
        }
        let unique: BTreeSet<_> = dests.into_iter().collect();
        prop_assert_eq!(controller.subscriptions().len(), unique.len());
    }

    /// Subscribing without a live session never touches the registry.
    #[test]
    fn subscribe_while_disconnected_is_rejected(
        kept in prop::collection::vec(destination(), 0..6),
        attempted in prop::collection::vec(destination(), 1..10),
    ) {
        let (transport, controller) = connected();
        for dest in &kept {
            controller.subscribe(dest, noop());
        }
        let before = controller.subscriptions();

        let session = controller.current_session().unwrap();
        transport.drop_connection(session.id());

        for dest in &attempted {
            prop_assert!(!controller.subscribe(dest, noop()));
        }
        prop_assert_eq!(controller.subscriptions(), before);
    }

    /// Session replacement carries every destination across exactly once.
    #[test]
    fn replacement_preserves_destinations(
        dests in prop::collection::vec(destination(), 0..10),
        auto in prop::collection::vec(destination(), 0..4),
    ) {
        let (transport, controller) = connected();
        for dest in &dests {
            controller.subscribe(dest, noop());
        }
        for dest in &auto {
            controller.add_auto_subscription(dest.as_str(), noop());
        }

        let replacement = MemoryTransport::with_broker(transport.broker().clone());
        controller.on_connected(open_detached_session(&replacement), &StompHeaders::new());

        let expected: BTreeSet<_> = dests.iter().chain(auto.iter()).cloned().collect();
        prop_assert_eq!(
            controller.subscriptions(),
            expected.iter().cloned().collect::<Vec<_>>()
        );
        for dest in &expected {
            prop_assert_eq!(transport.broker().subscriber_count(dest), 1);
        }
    }
}

/// Sink for sessions opened outside a controller.
struct Detached;

impl SessionEventSink for Detached {
    fn on_connected(&self, _: SessionRef, _: &StompHeaders) {}
    fn on_frame(&self, _: &StompHeaders, _: &[u8]) {}
    fn on_transport_error(&self, _: &Error) {}
    fn on_application_error(&self, _: Option<StompCommand>, _: &StompHeaders, _: &[u8], _: &Error) {}
}

fn open_detached_session(transport: &MemoryTransport) -> SessionRef {
    let mut pending = transport
        .connect("ws://broker/ws", Arc::new(Detached))
        .unwrap();
    pending.try_take().unwrap().unwrap()
}
