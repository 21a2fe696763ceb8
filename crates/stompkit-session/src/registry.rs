//! Destination-keyed registry of active subscriptions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use stompkit_core::{HandlerRef, SessionId, SubscriptionRef};

/// A subscription bound on a specific session.
#[derive(Clone)]
pub struct ActiveSubscription {
    /// Underlying subscription handle
    pub subscription: SubscriptionRef,
    /// Handler receiving frames for this destination
    pub handler: HandlerRef,
    /// Session the subscription was made on
    pub session_id: SessionId,
}

impl std::fmt::Debug for ActiveSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSubscription")
            .field("subscription", &self.subscription)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Thread-safe map of destination to active subscription.
///
/// Every method is one critical section. A destination maps to at most one
/// subscription.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<BTreeMap<String, ActiveSubscription>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, ActiveSubscription>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the entry for `destination`.
    ///
    /// Returns the replaced entry.
    pub fn put(
        &self,
        destination: impl Into<String>,
        subscription: ActiveSubscription,
    ) -> Option<ActiveSubscription> {
        self.lock().insert(destination.into(), subscription)
    }

    /// Insert the result of `subscribe` unless `destination` is already
    /// present.
    ///
    /// `subscribe` runs inside the critical section, so two concurrent callers
    /// cannot both subscribe the same destination. Returns true if an entry was
    /// inserted.
    pub fn put_if_absent_with<F>(&self, destination: &str, subscribe: F) -> bool
    where
        F: FnOnce() -> Option<ActiveSubscription>,
    {
        let mut entries = self.lock();
        if entries.contains_key(destination) {
            return false;
        }
        match subscribe() {
            Some(subscription) => {
                entries.insert(destination.to_string(), subscription);
                true
            }
            None => false,
        }
    }

    /// Entry for `destination`.
    pub fn get(&self, destination: &str) -> Option<ActiveSubscription> {
        self.lock().get(destination).cloned()
    }

    /// Whether `destination` has an entry.
    pub fn contains(&self, destination: &str) -> bool {
        self.lock().contains_key(destination)
    }

    /// Remove the entry for `destination`.
    pub fn remove(&self, destination: &str) -> Option<ActiveSubscription> {
        self.lock().remove(destination)
    }

    /// Destinations currently registered.
    pub fn snapshot_destinations(&self) -> BTreeSet<String> {
        self.lock().keys().cloned().collect()
    }

    /// Atomically empty the registry, returning what it held in destination
    /// order.
    pub fn remove_all(&self) -> Vec<(String, ActiveSubscription)> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use stompkit_core::{Result, StompHeaders, Subscription};

    struct FakeSubscription {
        destination: String,
    }

    impl Subscription for FakeSubscription {
        fn id(&self) -> &str {
            "sub-0"
        }

        fn destination(&self) -> &str {
            &self.destination
        }

        fn unsubscribe(&self) -> Result<()> {
            Ok(())
        }
    }

    fn entry(destination: &str) -> ActiveSubscription {
        ActiveSubscription {
            subscription: Arc::new(FakeSubscription {
                destination: destination.to_string(),
            }),
            handler: Arc::new(|_: &StompHeaders, _: &[u8]| {}),
            session_id: SessionId::new("s1"),
        }
    }

    #[test]
    fn test_registry_empty() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("/topic/a").is_none());
        assert!(registry.snapshot_destinations().is_empty());
    }

    #[test]
    fn test_put_and_get() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.put("/topic/a", entry("/topic/a")).is_none());
        let found = registry.get("/topic/a").unwrap();
        assert_eq!(found.subscription.destination(), "/topic/a");
        assert!(registry.put("/topic/a", entry("/topic/a")).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_put_if_absent_skips_existing() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.put_if_absent_with("/topic/a", || Some(entry("/topic/a"))));
        let inserted = registry.put_if_absent_with("/topic/a", || {
            panic!("subscribe must not run for a registered destination")
        });
        assert!(!inserted);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_put_if_absent_failed_subscribe() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.put_if_absent_with("/topic/a", || None));
        assert!(!registry.contains("/topic/a"));
    }

    #[test]
    fn test_remove() {
        let registry = SubscriptionRegistry::new();
        registry.put("/topic/a", entry("/topic/a"));
        assert!(registry.remove("/topic/a").is_some());
        assert!(registry.remove("/topic/a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_all_drains() {
        let registry = SubscriptionRegistry::new();
        registry.put("/topic/b", entry("/topic/b"));
        registry.put("/topic/a", entry("/topic/a"));

        let before = registry.snapshot_destinations();
        let drained: Vec<String> = registry
            .remove_all()
            .into_iter()
            .map(|(destination, _)| destination)
            .collect();

        assert_eq!(drained, vec!["/topic/a", "/topic/b"]);
        assert_eq!(before.into_iter().collect::<Vec<_>>(), drained);
        assert!(registry.snapshot_destinations().is_empty());
    }

    #[test]
    fn test_concurrent_put_if_absent() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    registry.put_if_absent_with("/topic/shared", || {
                        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        Some(entry("/topic/shared"))
                    })
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }
}
