// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Change notification fan-out shared by every backend.
//
// Subscribers register a callback against a collection name and receive a
// `ChangeEvent` carrying the written key. A callback that fails (returns an
// error or panics) is logged and dropped; the remaining callbacks for that
// event are still invoked.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

/// Error type a subscriber callback may return.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// A registered change callback.
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) -> Result<(), SubscriberError> + Send + Sync>;

/// Wrap a closure as a [`ChangeCallback`].
pub fn callback<F>(f: F) -> ChangeCallback
where
    F: Fn(&ChangeEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A committed write to a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Collection that was written.
    pub collection: String,
    /// Key of the written document.
    pub key: String,
}

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric value, for logging.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Per-collection registry of change callbacks.
#[derive(Default)]
pub struct ChangeNotifier {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<String, Vec<(SubscriptionId, ChangeCallback)>>>,
}

impl ChangeNotifier {
    /// Create an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `collection`.
    pub fn subscribe(&self, collection: &str, callback: ChangeCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .entry(collection.to_string())
            .or_default()
            .push((id, callback));
        debug!(collection, subscription = %id, "subscribed to changes");
        id
    }

    /// Remove a subscription. Returns `false` if `id` was not registered
    /// for `collection`.
    pub fn unsubscribe(&self, collection: &str, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(list) = subscribers.get_mut(collection) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.remove(collection);
        }
        removed
    }

    /// Number of live subscriptions for `collection`.
    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.subscribers
            .read()
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Deliver a change for `key` to every subscriber of `collection`.
    ///
    /// Callbacks run outside the registry lock, in registration order, so
    /// they may subscribe or unsubscribe without deadlocking.
    pub fn notify(&self, collection: &str, key: &str) {
        let snapshot: Vec<(SubscriptionId, ChangeCallback)> = match self.subscribers.read().get(collection) {
            Some(list) => list.clone(),
            None => return,
        };

        let event = ChangeEvent {
            collection: collection.to_string(),
            key: key.to_string(),
        };

        let mut failed = Vec::new();
        for (id, cb) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| cb(&event)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(collection, subscription = %id, error = %err, "change callback failed, removing it");
                    failed.push(id);
                }
                Err(_) => {
                    warn!(collection, subscription = %id, "change callback panicked, removing it");
                    failed.push(id);
                }
            }
        }

        for id in failed {
            self.unsubscribe(collection, id);
        }
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self.subscribers.read();
        let counts: HashMap<&str, usize> = subscribers
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, ChangeCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb = callback(move |event| {
            sink.lock().push(event.key.clone());
            Ok(())
        });
        (seen, cb)
    }

    #[test]
    fn test_notify_reaches_subscriber() {
        let notifier = ChangeNotifier::new();
        let (seen, cb) = recorder();
        notifier.subscribe("widgets", cb);

        notifier.notify("widgets", "k1");
        notifier.notify("gadgets", "k2");

        assert_eq!(*seen.lock(), vec!["k1".to_string()]);
    }

    #[test]
    fn test_registration_order() {
        let notifier = ChangeNotifier::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            notifier.subscribe(
                "widgets",
                callback(move |_| {
                    order.lock().push(tag);
                    Ok(())
                }),
            );
        }

        notifier.notify("widgets", "k");
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let notifier = ChangeNotifier::new();
        let (seen, cb) = recorder();
        let id = notifier.subscribe("widgets", cb);

        notifier.notify("widgets", "before");
        assert!(notifier.unsubscribe("widgets", id));
        notifier.notify("widgets", "after");

        assert_eq!(*seen.lock(), vec!["before".to_string()]);
        assert_eq!(notifier.subscriber_count("widgets"), 0);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let notifier = ChangeNotifier::new();
        let (_seen, cb) = recorder();
        let id = notifier.subscribe("widgets", cb);

        assert!(!notifier.unsubscribe("gadgets", id));
        assert!(notifier.unsubscribe("widgets", id));
        assert!(!notifier.unsubscribe("widgets", id));
    }

    #[test]
    fn test_failing_callback_is_removed() {
        let notifier = ChangeNotifier::new();
        notifier.subscribe("widgets", callback(|_| Err("nope".into())));
        let (seen, cb) = recorder();
        notifier.subscribe("widgets", cb);

        notifier.notify("widgets", "k1");
        assert_eq!(notifier.subscriber_count("widgets"), 1);

        notifier.notify("widgets", "k2");
        assert_eq!(*seen.lock(), vec!["k1".to_string(), "k2".to_string()]);
    }

    #[test]
    fn test_panicking_callback_is_removed() {
        let notifier = ChangeNotifier::new();
        notifier.subscribe("widgets", callback(|_| panic!("subscriber bug")));
        let (seen, cb) = recorder();
        notifier.subscribe("widgets", cb);

        notifier.notify("widgets", "k1");

        assert_eq!(notifier.subscriber_count("widgets"), 1);
        assert_eq!(*seen.lock(), vec!["k1".to_string()]);
    }

    #[test]
    fn test_event_carries_collection() {
        let notifier = ChangeNotifier::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        notifier.subscribe(
            "widgets",
            callback(move |event| {
                sink.lock().push(event.clone());
                Ok(())
            }),
        );

        notifier.notify("widgets", "abc");
        assert_eq!(
            *events.lock(),
            vec![ChangeEvent {
                collection: "widgets".to_string(),
                key: "abc".to_string(),
            }]
        );
    }

    #[test]
    fn test_ids_are_unique() {
        let notifier = ChangeNotifier::new();
        let (_a, cb_a) = recorder();
        let (_b, cb_b) = recorder();
        let a = notifier.subscribe("widgets", cb_a);
        let b = notifier.subscribe("gadgets", cb_b);
        assert_ne!(a, b);
    }
}
