//! Change feed for observing committed mutations.
//!
//! Each committed reconciliation batch produces at most one
//! [`ChangeEvent`]. Events describe keys and change types only; readers
//! re-query the cache for current record state. Callbacks are invoked
//! after the table lock is released, so a callback may freely read the
//! collection it was notified about.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::record::RecordKey;

/// Type of change applied to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// The record was first seen and inserted.
    Insert,
    /// At least one field of an existing record was rewritten.
    Update,
    /// The record was removed.
    Delete,
}

/// A single record-level change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    /// Key of the affected record.
    pub key: RecordKey,
    /// What happened to it.
    pub change_type: ChangeType,
}

impl RecordChange {
    /// Creates an insert change.
    pub fn insert(key: RecordKey) -> Self {
        Self {
            key,
            change_type: ChangeType::Insert,
        }
    }

    /// Creates an update change.
    pub fn update(key: RecordKey) -> Self {
        Self {
            key,
            change_type: ChangeType::Update,
        }
    }

    /// Creates a delete change.
    pub fn delete(key: RecordKey) -> Self {
        Self {
            key,
            change_type: ChangeType::Delete,
        }
    }
}

/// The changes committed by one reconciliation batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Collection the batch applied to.
    pub collection: String,
    /// Record-level changes in application order.
    pub changes: Vec<RecordChange>,
}

/// Callback invoked once per committed batch.
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Identifier of one feed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Distributes committed mutation batches to subscribers.
pub struct ChangeFeed {
    subscribers: RwLock<HashMap<u64, ChangeCallback>>,
    next_id: AtomicU64,
}

impl ChangeFeed {
    /// Creates a feed with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a callback and returns its subscription id.
    pub fn subscribe(&self, callback: ChangeCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(id, callback);
        SubscriptionId(id)
    }

    /// Removes a subscription. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().remove(&id.0);
    }

    /// Delivers one committed batch to every subscriber.
    ///
    /// The subscriber list is snapshotted before invocation, so a
    /// callback may subscribe or unsubscribe reentrantly.
    pub fn emit(&self, event: &ChangeEvent) {
        let callbacks: Vec<ChangeCallback> = self.subscribers.read().values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription handle that unsubscribes when dropped.
pub struct ChangeSubscription {
    feed: Arc<ChangeFeed>,
    id: SubscriptionId,
}

impl ChangeSubscription {
    pub(crate) fn new(feed: Arc<ChangeFeed>, id: SubscriptionId) -> Self {
        Self { feed, id }
    }

    /// The subscription id held by this handle.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.feed.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(collection: &str) -> ChangeEvent {
        ChangeEvent {
            collection: collection.to_owned(),
            changes: vec![RecordChange::insert(RecordKey::from(1))],
        }
    }

    #[test]
    fn emit_reaches_every_subscriber() {
        let feed = ChangeFeed::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            feed.subscribe(Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }

        feed.emit(&event("messages"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let feed = ChangeFeed::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = {
            let hits = Arc::clone(&hits);
            feed.subscribe(Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }))
        };

        feed.emit(&event("messages"));
        feed.unsubscribe(id);
        feed.emit(&event("messages"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_the_handle_unsubscribes() {
        let feed = Arc::new(ChangeFeed::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let subscription = {
            let hits = Arc::clone(&hits);
            let id = feed.subscribe(Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
            ChangeSubscription::new(Arc::clone(&feed), id)
        };
        assert_eq!(feed.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(feed.subscriber_count(), 0);
        feed.emit(&event("messages"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callbacks_may_unsubscribe_reentrantly() {
        let feed = Arc::new(ChangeFeed::new());
        let inner = Arc::clone(&feed);
        let slot: Arc<RwLock<Option<SubscriptionId>>> = Arc::new(RwLock::new(None));
        let slot_inner = Arc::clone(&slot);
        let id = feed.subscribe(Arc::new(move |_| {
            if let Some(id) = slot_inner.read().as_ref() {
                inner.unsubscribe(*id);
            }
        }));
        *slot.write() = Some(id);

        feed.emit(&event("messages"));
        assert_eq!(feed.subscriber_count(), 0);
    }
}
