//! Destinations re-established on every successful connect.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use stompkit_core::HandlerRef;

/// Connection-independent list of (destination, handler) pairs.
///
/// Only the application adds or removes entries; the controller reads them
/// after each handshake.
#[derive(Default)]
pub struct AutoSubscriptions {
    entries: Mutex<BTreeMap<String, HandlerRef>>,
}

impl AutoSubscriptions {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, HandlerRef>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace the handler for `destination`.
    pub fn put(&self, destination: impl Into<String>, handler: HandlerRef) {
        self.lock().insert(destination.into(), handler);
    }

    /// Remove `destination`. Returns true if it was present.
    pub fn remove(&self, destination: &str) -> bool {
        self.lock().remove(destination).is_some()
    }

    /// Visit every entry in destination order while holding the list lock.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &HandlerRef),
    {
        for (destination, handler) in self.lock().iter() {
            visitor(destination, handler);
        }
    }

    /// Whether `destination` is listed.
    pub fn contains(&self, destination: &str) -> bool {
        self.lock().contains_key(destination)
    }

    /// Listed destinations in order.
    pub fn destinations(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl std::fmt::Debug for AutoSubscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSubscriptions")
            .field("destinations", &self.destinations())
            .finish()
    }
}
