//! The store facade: registered collections behind three primitives.
//!
//! Hosts embed a [`Store`] and drive it with synchronous [`commit`]
//! (confirmed data straight into the cache), asynchronous [`dispatch`]
//! (remote call paired with reconciliation), and synchronous [`read`]
//! (cache-only queries). Server-push events route through
//! [`Store::apply_event`] into the same reconciler entry points, so no
//! mutation bypasses the cache's single write surface.
//!
//! [`commit`]: Store::commit
//! [`dispatch`]: Store::dispatch
//! [`read`]: Store::read

use std::collections::HashMap;
use std::sync::Arc;

use mirrorstore_core::{
    ChangeCallback, ChangeSubscription, CollectionConfig, CoreError, EntityCache, FindResult,
    Params, ReconcileOutcome, Reconciler, Record, Registry,
};
use parking_lot::RwLock;
use serde_json::Value;

use crate::dispatch::Dispatcher;
use crate::error::ClientResult;
use crate::live::{LiveOptions, LiveQuery};
use crate::remote::{RemoteService, ServiceEvent};

/// A mutation of confirmed data, applied synchronously to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Upsert records with update semantics.
    Update(Vec<Record>),
    /// Upsert records with patch semantics.
    Patch(Vec<Record>),
    /// Remove records or bare id values.
    Remove(Vec<Value>),
}

/// An action: one remote call paired with one reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Create a record remotely.
    Create {
        /// Fields of the record to create.
        data: Record,
        /// Parameters forwarded to the remote.
        params: Params,
    },
    /// Fetch records matching parameters.
    Find {
        /// Query parameters; server-only keys are forwarded untouched.
        params: Params,
    },
    /// Read-through fetch of one record.
    Get {
        /// Id of the record.
        id: Value,
        /// Parameters forwarded to the remote on a miss.
        params: Params,
    },
    /// Replace a record remotely.
    Update {
        /// Id of the record; must carry a value.
        id: Value,
        /// Replacement fields.
        data: Record,
        /// Parameters forwarded to the remote.
        params: Params,
    },
    /// Partially modify a record remotely.
    Patch {
        /// Id of the record; must carry a value.
        id: Value,
        /// Fields to modify.
        data: Record,
        /// Parameters forwarded to the remote.
        params: Params,
    },
    /// Remove a record remotely.
    Remove {
        /// Id of the record.
        id: Value,
        /// Parameters forwarded to the remote.
        params: Params,
    },
}

/// A synchronous, cache-only read.
#[derive(Debug, Clone, PartialEq)]
pub enum Read {
    /// Find over the local table.
    Find {
        /// Query parameters.
        params: Params,
    },
    /// Direct lookup by id.
    Get {
        /// Id of the record.
        id: Value,
        /// Parameters; only `$select` applies to a lookup.
        params: Params,
    },
    /// Count of matching records, ignoring pagination filters.
    Count {
        /// Query parameters.
        params: Params,
    },
}

/// Result of a dispatched action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// Cache-backed record from create, get, update, patch, or remove.
    Record(Option<Record>),
    /// Result of a find.
    Find(FindResult),
}

impl ActionOutput {
    /// The record, when the action produced one.
    pub fn into_record(self) -> Option<Record> {
        match self {
            Self::Record(record) => record,
            Self::Find(_) => None,
        }
    }

    /// The find result, when the action was a find.
    pub fn into_find(self) -> Option<FindResult> {
        match self {
            Self::Find(result) => Some(result),
            Self::Record(_) => None,
        }
    }
}

/// Result of a synchronous read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutput {
    /// Result of a find.
    Find(FindResult),
    /// Result of a lookup.
    Record(Option<Record>),
    /// Number of matching records.
    Count(usize),
}

struct CollectionHandle {
    dispatcher: Arc<Dispatcher>,
    reconciler: Reconciler,
}

/// Registered collections over one entity cache.
pub struct Store {
    registry: Arc<Registry>,
    cache: Arc<EntityCache>,
    collections: RwLock<HashMap<String, Arc<CollectionHandle>>>,
}

impl Store {
    /// Creates a store over a host-owned registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        let cache = Arc::new(EntityCache::new(Arc::clone(&registry)));
        Self {
            registry,
            cache,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// The cache behind this store.
    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// The registry behind this store.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Registers a collection and binds it to a remote service.
    pub fn register(
        &self,
        config: CollectionConfig,
        remote: Arc<dyn RemoteService>,
    ) -> ClientResult<()> {
        let config = self.registry.register(config)?;
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.cache),
            &config.name,
            remote,
        )?);
        let reconciler = self.cache.reconciler(&config.name)?;
        self.collections.write().insert(
            config.name.clone(),
            Arc::new(CollectionHandle {
                dispatcher,
                reconciler,
            }),
        );
        Ok(())
    }

    /// Applies confirmed data synchronously. There is no optimistic
    /// write path; only server-confirmed records belong here.
    pub fn commit(&self, collection: &str, mutation: Mutation) -> ClientResult<ReconcileOutcome> {
        let handle = self.handle(collection)?;
        Ok(match mutation {
            Mutation::Update(records) => handle.reconciler.update(&records),
            Mutation::Patch(records) => handle.reconciler.patch(&records),
            Mutation::Remove(items) => handle.reconciler.remove(&items),
        })
    }

    /// Dispatches an action: one remote call, one reconciliation, and a
    /// cache-backed result.
    pub async fn dispatch(&self, collection: &str, action: Action) -> ClientResult<ActionOutput> {
        let handle = self.handle(collection)?;
        let dispatcher = &handle.dispatcher;
        Ok(match action {
            Action::Create { data, params } => {
                ActionOutput::Record(dispatcher.create(data, &params).await?)
            }
            Action::Find { params } => ActionOutput::Find(dispatcher.find(&params).await?),
            Action::Get { id, params } => {
                ActionOutput::Record(dispatcher.get(&id, &params).await?)
            }
            Action::Update { id, data, params } => {
                ActionOutput::Record(dispatcher.update(&id, data, &params).await?)
            }
            Action::Patch { id, data, params } => {
                ActionOutput::Record(dispatcher.patch(&id, data, &params).await?)
            }
            Action::Remove { id, params } => {
                ActionOutput::Record(dispatcher.remove(&id, &params).await?)
            }
        })
    }

    /// Reads the cache synchronously; the remote is never consulted.
    pub fn read(&self, collection: &str, read: Read) -> ClientResult<ReadOutput> {
        Ok(match read {
            Read::Find { params } => ReadOutput::Find(self.cache.find(collection, &params)?),
            Read::Get { id, params } => {
                ReadOutput::Record(self.cache.get(collection, &id, &params)?)
            }
            Read::Count { params } => ReadOutput::Count(self.cache.count(collection, &params)?),
        })
    }

    /// Routes a server-push event through the collection's reconciler.
    pub fn apply_event(
        &self,
        collection: &str,
        event: ServiceEvent,
    ) -> ClientResult<ReconcileOutcome> {
        let handle = self.handle(collection)?;
        Ok(match event {
            ServiceEvent::Created(record)
            | ServiceEvent::Updated(record)
            | ServiceEvent::Patched(record) => {
                handle.reconciler.update(std::slice::from_ref(&record))
            }
            ServiceEvent::Removed(record) => handle
                .reconciler
                .remove(std::slice::from_ref(&Value::Object(record))),
        })
    }

    /// Subscribes to a collection's committed mutations.
    pub fn subscribe(
        &self,
        collection: &str,
        callback: ChangeCallback,
    ) -> ClientResult<ChangeSubscription> {
        Ok(self.cache.subscribe(collection, callback)?)
    }

    /// Starts a live query on a registered collection.
    pub fn live(&self, collection: &str, options: LiveOptions) -> ClientResult<LiveQuery> {
        let handle = self.handle(collection)?;
        LiveQuery::start(
            Arc::clone(&handle.dispatcher),
            Arc::clone(&self.cache),
            options,
        )
    }

    /// Typed access to a registered collection's dispatcher.
    pub fn dispatcher(&self, collection: &str) -> ClientResult<Arc<Dispatcher>> {
        Ok(Arc::clone(&self.handle(collection)?.dispatcher))
    }

    fn handle(&self, collection: &str) -> ClientResult<Arc<CollectionHandle>> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .ok_or_else(|| CoreError::unknown_collection(collection).into())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Arc::new(Registry::new()))
    }
}
