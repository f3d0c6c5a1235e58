//! Live queries: parameter-driven refetch with supersession.
//!
//! A [`LiveQuery`] owns a query (a find or a get), keeps its derived
//! items in step with the cache, and refetches when the query is
//! replaced. In-flight fetches are never aborted; a generation counter
//! decides on arrival whether an outcome may publish, so a stale
//! response can still be reconciled into the cache without ever
//! overwriting newer published state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use mirrorstore_core::{ChangeSubscription, EntityCache, FindResult, Params, Record};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::dispatch::Dispatcher;
use crate::error::ClientError;

/// Selects what a live query fetches.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryMethod {
    /// Fetch records with find semantics.
    Find(Params),
    /// Fetch one record by id.
    Get(Value, Params),
}

impl QueryMethod {
    /// A find over `params`.
    pub fn find(params: Params) -> Self {
        Self::Find(params)
    }

    /// A get of `id`.
    pub fn get(id: impl Into<Value>, params: Params) -> Self {
        Self::Get(id.into(), params)
    }
}

/// Result of a per-item hook.
pub type HookResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Side-effecting hook invoked once per fetched item.
pub type ItemHook = Arc<dyn Fn(&Record) -> HookResult + Send + Sync>;

/// Options for starting a live query.
pub struct LiveOptions {
    query: QueryMethod,
    hooks: Vec<ItemHook>,
}

impl LiveOptions {
    /// Starts from a find query.
    pub fn find(params: Params) -> Self {
        Self {
            query: QueryMethod::find(params),
            hooks: Vec::new(),
        }
    }

    /// Starts from a get query.
    pub fn get(id: impl Into<Value>, params: Params) -> Self {
        Self {
            query: QueryMethod::get(id, params),
            hooks: Vec::new(),
        }
    }

    /// Appends a per-item hook. Hooks run in registration order over
    /// each fetched result; a hook failure is logged and swallowed,
    /// never failing the fetch.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Record) -> HookResult + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }
}

impl fmt::Debug for LiveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveOptions")
            .field("query", &self.query)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Lifecycle state of a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
    /// The first fetch is in flight.
    Initializing,
    /// A replacement fetch is in flight.
    Fetching,
    /// The snapshot reflects the latest issued query.
    Ready,
    /// The latest fetch failed; the query stays usable.
    Error,
}

/// Server pagination metadata for the current items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Pre-pagination match count.
    pub total: usize,
    /// Limit applied by the server, 0 when unknown.
    pub limit: i64,
    /// Skip applied by the server, 0 when unknown.
    pub skip: u64,
}

/// Published state of a live query.
#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    /// Lifecycle state.
    pub state: LiveState,
    /// Current derived items. A get publishes one item or none.
    pub items: Vec<Record>,
    /// Server pagination metadata, zeroed until a paginated response
    /// arrives.
    pub pagination: PageInfo,
    /// Collection the query runs over.
    pub collection: String,
    /// Remote service path of the collection.
    pub path: String,
    /// Failure of the latest fetch, present while state is `Error`.
    pub error: Option<Arc<ClientError>>,
}

struct LiveShared {
    dispatcher: Arc<Dispatcher>,
    cache: Arc<EntityCache>,
    collection: String,
    hooks: Vec<ItemHook>,
    query: Mutex<QueryMethod>,
    generation: AtomicU64,
    tx: watch::Sender<LiveSnapshot>,
}

/// A live subscription over one collection.
///
/// Holding the value keeps the cache subscription alive; dropping it
/// detaches from the feed. Fetches already in flight are left to finish
/// and are discarded on arrival.
pub struct LiveQuery {
    shared: Arc<LiveShared>,
    rx: watch::Receiver<LiveSnapshot>,
    _subscription: ChangeSubscription,
}

impl LiveQuery {
    /// Starts a live query and issues its first fetch.
    ///
    /// Must be called within a tokio runtime; fetches run as spawned
    /// tasks.
    pub(crate) fn start(
        dispatcher: Arc<Dispatcher>,
        cache: Arc<EntityCache>,
        options: LiveOptions,
    ) -> Result<Self, ClientError> {
        let collection = dispatcher.collection().to_owned();
        let path = dispatcher.path().to_owned();
        let initial = LiveSnapshot {
            state: LiveState::Initializing,
            items: Vec::new(),
            pagination: PageInfo::default(),
            collection: collection.clone(),
            path,
            error: None,
        };
        let (tx, rx) = watch::channel(initial);
        let shared = Arc::new(LiveShared {
            dispatcher,
            cache: Arc::clone(&cache),
            collection: collection.clone(),
            hooks: options.hooks,
            query: Mutex::new(options.query),
            generation: AtomicU64::new(0),
            tx,
        });

        let weak: Weak<LiveShared> = Arc::downgrade(&shared);
        let subscription = cache.subscribe(
            &collection,
            Arc::new(move |_event| {
                if let Some(shared) = weak.upgrade() {
                    shared.rederive_from_cache();
                }
            }),
        )?;

        shared.spawn_fetch();
        Ok(Self {
            shared,
            rx,
            _subscription: subscription,
        })
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> LiveSnapshot {
        self.rx.borrow().clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LiveState {
        self.rx.borrow().state
    }

    /// The query currently driving this subscription.
    pub fn query(&self) -> QueryMethod {
        self.shared.query.lock().clone()
    }

    /// A watch receiver over published snapshots.
    pub fn watch(&self) -> watch::Receiver<LiveSnapshot> {
        self.rx.clone()
    }

    /// Replaces the query and issues exactly one replacement fetch.
    /// The previous fetch, if still in flight, is superseded.
    pub fn set_query(&self, query: QueryMethod) {
        *self.shared.query.lock() = query;
        self.shared.spawn_fetch();
    }

    /// Issues a replacement fetch with the current query.
    pub fn refetch(&self) {
        self.shared.spawn_fetch();
    }
}

impl LiveShared {
    fn spawn_fetch(self: &Arc<Self>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let query = self.query.lock().clone();
        let state = if generation == 1 {
            LiveState::Initializing
        } else {
            LiveState::Fetching
        };
        self.tx.send_modify(|snapshot| snapshot.state = state);

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = shared.run_fetch(&query).await;
            shared.publish_outcome(generation, outcome);
        });
    }

    async fn run_fetch(
        &self,
        query: &QueryMethod,
    ) -> Result<(Vec<Record>, PageInfo), ClientError> {
        match query {
            QueryMethod::Find(params) => {
                let result = self.dispatcher.find(params).await?;
                let pagination = match &result {
                    FindResult::Page(envelope) => PageInfo {
                        total: envelope.total,
                        limit: envelope.limit,
                        skip: envelope.skip,
                    },
                    FindResult::Records(_) => PageInfo::default(),
                };
                Ok((result.into_records(), pagination))
            }
            QueryMethod::Get(id, params) => {
                let record = self.dispatcher.get(id, params).await?;
                Ok((record.into_iter().collect(), PageInfo::default()))
            }
        }
    }

    /// Publishes a fetch outcome unless a newer fetch was issued while
    /// it ran. Superseded successes were already reconciled into the
    /// cache by the dispatcher; only their publication is suppressed.
    fn publish_outcome(
        &self,
        generation: u64,
        outcome: Result<(Vec<Record>, PageInfo), ClientError>,
    ) {
        if self.superseded(generation) {
            return;
        }
        match outcome {
            Ok((items, pagination)) => {
                self.run_hooks(&items);
                if self.superseded(generation) {
                    return;
                }
                self.tx.send_modify(|snapshot| {
                    snapshot.state = LiveState::Ready;
                    snapshot.items = items;
                    snapshot.pagination = pagination;
                    snapshot.error = None;
                });
            }
            Err(error) => {
                tracing::warn!(collection = %self.collection, %error, "live fetch failed");
                self.tx.send_modify(|snapshot| {
                    snapshot.state = LiveState::Error;
                    snapshot.error = Some(Arc::new(error));
                });
            }
        }
    }

    fn superseded(&self, generation: u64) -> bool {
        let newest = self.generation.load(Ordering::SeqCst);
        if newest != generation {
            tracing::debug!(
                collection = %self.collection,
                generation,
                newest,
                "discarding superseded fetch outcome"
            );
            return true;
        }
        false
    }

    fn run_hooks(&self, items: &[Record]) {
        for hook in &self.hooks {
            for item in items {
                if let Err(error) = hook(item) {
                    tracing::warn!(
                        collection = %self.collection,
                        error = %error,
                        "live query hook failed"
                    );
                }
            }
        }
    }

    /// Recomputes items from the cache after a committed mutation. No
    /// remote call is made and the lifecycle state is left alone.
    fn rederive_from_cache(&self) {
        let query = self.query.lock().clone();
        let derived = match &query {
            QueryMethod::Find(params) => self
                .cache
                .find(&self.collection, params)
                .map(FindResult::into_records),
            QueryMethod::Get(id, params) => self
                .cache
                .get(&self.collection, id, params)
                .map(|record| record.into_iter().collect()),
        };
        match derived {
            Ok(items) => self.tx.send_modify(|snapshot| snapshot.items = items),
            Err(error) => {
                tracing::warn!(collection = %self.collection, %error, "live re-derive failed");
            }
        }
    }
}
