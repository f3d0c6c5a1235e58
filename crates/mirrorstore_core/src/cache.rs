//! The entity cache: per-collection tables, change feeds, and the read
//! paths.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::changes::{ChangeCallback, ChangeFeed, ChangeSubscription};
use crate::config::{CollectionConfig, Registry};
use crate::error::CoreResult;
use crate::query::{self, FindResult, Params};
use crate::reconcile::Reconciler;
use crate::record::Record;
use crate::table::EntityTable;

/// Everything the cache holds for one collection.
pub(crate) struct CollectionState {
    pub(crate) config: Arc<CollectionConfig>,
    pub(crate) table: RwLock<EntityTable>,
    pub(crate) feed: Arc<ChangeFeed>,
}

/// Normalized entity cache over all registered collections.
///
/// Reads take a short-lived lock on one collection's table. All
/// mutation goes through [`Reconciler`] handles obtained from
/// [`EntityCache::reconciler`]; there is no other write path.
pub struct EntityCache {
    registry: Arc<Registry>,
    states: RwLock<HashMap<String, Arc<CollectionState>>>,
}

impl EntityCache {
    /// Creates a cache over a host-owned registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// The registry this cache resolves collections against.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Runs a find over a collection's current table state.
    pub fn find(&self, collection: &str, params: &Params) -> CoreResult<FindResult> {
        let state = self.state(collection)?;
        let table = state.table.read();
        query::find(&table, &state.config, params)
    }

    /// Counts records matching a query, ignoring pagination filters.
    pub fn count(&self, collection: &str, params: &Params) -> CoreResult<usize> {
        let state = self.state(collection)?;
        let table = state.table.read();
        query::count(&table, &state.config, params)
    }

    /// Looks up one record by id. Unknown ids are a miss, not an error.
    pub fn get(&self, collection: &str, id: &Value, params: &Params) -> CoreResult<Option<Record>> {
        let state = self.state(collection)?;
        let table = state.table.read();
        query::get(&table, &state.config, id, params)
    }

    /// Number of records currently cached for a collection.
    pub fn record_count(&self, collection: &str) -> CoreResult<usize> {
        let state = self.state(collection)?;
        let len = state.table.read().len();
        Ok(len)
    }

    /// Subscribes to a collection's committed mutations. The
    /// subscription ends when the returned handle drops.
    pub fn subscribe(
        &self,
        collection: &str,
        callback: ChangeCallback,
    ) -> CoreResult<ChangeSubscription> {
        let state = self.state(collection)?;
        let id = state.feed.subscribe(callback);
        Ok(ChangeSubscription::new(Arc::clone(&state.feed), id))
    }

    /// Creates a mutation handle for a collection.
    pub fn reconciler(&self, collection: &str) -> CoreResult<Reconciler> {
        let state = self.state(collection)?;
        Ok(Reconciler::new(state))
    }

    /// Resolves (and lazily creates) the state for a registered
    /// collection.
    pub(crate) fn state(&self, collection: &str) -> CoreResult<Arc<CollectionState>> {
        if let Some(state) = self.states.read().get(collection) {
            return Ok(Arc::clone(state));
        }
        let config = self.registry.get(collection)?;
        let mut states = self.states.write();
        let state = states
            .entry(collection.to_owned())
            .or_insert_with(|| {
                Arc::new(CollectionState {
                    config,
                    table: RwLock::new(EntityTable::new()),
                    feed: Arc::new(ChangeFeed::new()),
                })
            });
        Ok(Arc::clone(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use serde_json::json;

    fn registry() -> Arc<Registry> {
        let registry = Registry::new();
        registry
            .register(CollectionConfig::new("things").with_id_field("id"))
            .unwrap();
        Arc::new(registry)
    }

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn reads_of_unregistered_collections_fail() {
        let cache = EntityCache::new(Arc::new(Registry::new()));
        let err = cache.find("missing", &Params::empty()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownCollection { .. }));
    }

    #[test]
    fn empty_collection_reads_succeed() {
        let cache = EntityCache::new(registry());
        let result = cache.find("things", &Params::empty()).unwrap();
        assert_eq!(result.total(), Some(0));
        assert_eq!(cache.record_count("things").unwrap(), 0);
        assert!(cache
            .get("things", &json!(1), &Params::empty())
            .unwrap()
            .is_none());
    }

    #[test]
    fn reconciled_records_are_visible_to_reads() {
        let cache = EntityCache::new(registry());
        let reconciler = cache.reconciler("things").unwrap();
        reconciler.update(&[record(json!({"id": 1, "a": 1}))]);

        assert_eq!(cache.record_count("things").unwrap(), 1);
        let found = cache.get("things", &json!(1), &Params::empty()).unwrap();
        assert_eq!(found.unwrap()["a"], json!(1));
        assert_eq!(cache.count("things", &Params::empty()).unwrap(), 1);
    }

    #[test]
    fn states_are_shared_between_handles() {
        let cache = EntityCache::new(registry());
        let first = cache.reconciler("things").unwrap();
        let second = cache.reconciler("things").unwrap();
        first.update(&[record(json!({"id": 1}))]);
        second.update(&[record(json!({"id": 2}))]);
        assert_eq!(cache.record_count("things").unwrap(), 2);
    }
}
