//! Pairs each remote call with exactly one reconciliation.

use std::slice;
use std::sync::Arc;

use mirrorstore_core::{
    id_value, CollectionConfig, EntityCache, FindResult, Params, Reconciler, Record, RecordKey,
    RemoveLookup, ResultEnvelope,
};
use serde_json::Value;

use crate::error::{ClientError, ClientResult};
use crate::remote::{FindResponse, RemoteService};

/// Per-collection action orchestrator.
///
/// Every action performs one remote call and reconciles the confirmed
/// response before returning, and returned records are read back from
/// the cache so callers always observe the canonical normalized
/// instance. A failed remote call propagates unchanged and leaves the
/// cache in its last-confirmed state.
pub struct Dispatcher {
    config: Arc<CollectionConfig>,
    cache: Arc<EntityCache>,
    reconciler: Reconciler,
    remote: Arc<dyn RemoteService>,
}

impl Dispatcher {
    /// Creates a dispatcher for a registered collection.
    pub fn new(
        cache: Arc<EntityCache>,
        collection: &str,
        remote: Arc<dyn RemoteService>,
    ) -> ClientResult<Self> {
        let config = cache.registry().get(collection)?;
        let reconciler = cache.reconciler(collection)?;
        Ok(Self {
            config,
            cache,
            reconciler,
            remote,
        })
    }

    /// Collection this dispatcher serves.
    pub fn collection(&self) -> &str {
        &self.config.name
    }

    /// Remote service path of the collection.
    pub fn path(&self) -> &str {
        &self.config.path
    }

    /// Creates a record remotely, reconciles the response, and returns
    /// the cache-backed instance.
    pub async fn create(&self, data: Record, params: &Params) -> ClientResult<Option<Record>> {
        let response = self.remote.create(&self.config.path, &data, params).await?;
        self.reconciler.update(slice::from_ref(&response));
        let id = self.response_id(&response);
        Ok(self.cache.get(self.collection(), &id, params)?)
    }

    /// Fetches records matching `params`, reconciles them, and
    /// re-derives the result locally.
    ///
    /// For a paginated response the server's `total`/`limit`/`skip`
    /// metadata is kept, while `data` is recomputed from the cache so
    /// the page also reflects concurrently confirmed local changes.
    pub async fn find(&self, params: &Params) -> ClientResult<FindResult> {
        let response = self.remote.find(&self.config.path, params).await?;
        match response {
            FindResponse::Page(envelope) => {
                self.reconciler.update(&envelope.data);
                tracing::debug!(
                    collection = %self.collection(),
                    fetched = envelope.data.len(),
                    total = envelope.total,
                    "reconciled find page"
                );
                let local = self.cache.find(self.collection(), params)?;
                Ok(FindResult::Page(ResultEnvelope {
                    total: envelope.total,
                    limit: envelope.limit,
                    skip: envelope.skip,
                    data: local.into_records(),
                }))
            }
            FindResponse::Records(records) => {
                self.reconciler.update(&records);
                tracing::debug!(
                    collection = %self.collection(),
                    fetched = records.len(),
                    "reconciled bare find response"
                );
                Ok(self.cache.find(self.collection(), params)?)
            }
        }
    }

    /// Read-through get: a cache hit returns without touching the
    /// remote; a miss fetches once, reconciles, and re-reads.
    pub async fn get(&self, id: &Value, params: &Params) -> ClientResult<Option<Record>> {
        if let Some(record) = self.cache.get(self.collection(), id, params)? {
            return Ok(Some(record));
        }
        tracing::debug!(collection = %self.collection(), %id, "cache miss, fetching record");
        let response = self.remote.get(&self.config.path, id, params).await?;
        self.reconciler.update(slice::from_ref(&response));
        Ok(self.cache.get(self.collection(), id, params)?)
    }

    /// Replaces a record remotely, reconciles the response, and returns
    /// the cache-backed instance.
    ///
    /// Rejects with a missing-id error before any remote call when `id`
    /// carries no identifying value.
    pub async fn update(
        &self,
        id: &Value,
        data: Record,
        params: &Params,
    ) -> ClientResult<Option<Record>> {
        self.require_id(id)?;
        let response = self
            .remote
            .update(&self.config.path, id, &data, params)
            .await?;
        self.reconciler.update(slice::from_ref(&response));
        let id = self.response_id_or(&response, id);
        Ok(self.cache.get(self.collection(), &id, params)?)
    }

    /// Partially modifies a record remotely; orchestration matches
    /// [`Dispatcher::update`].
    pub async fn patch(
        &self,
        id: &Value,
        data: Record,
        params: &Params,
    ) -> ClientResult<Option<Record>> {
        self.require_id(id)?;
        let response = self
            .remote
            .patch(&self.config.path, id, &data, params)
            .await?;
        self.reconciler.patch(slice::from_ref(&response));
        let id = self.response_id_or(&response, id);
        Ok(self.cache.get(self.collection(), &id, params)?)
    }

    /// Removes a record remotely and reconciles the removal. The
    /// post-remove cache lookup is keyed per the collection's
    /// `remove_lookup`, so a successful remove returns `None` once the
    /// record is gone.
    pub async fn remove(&self, id: &Value, params: &Params) -> ClientResult<Option<Record>> {
        let response = self.remote.remove(&self.config.path, id, params).await?;
        self.reconciler
            .remove(slice::from_ref(&Value::Object(response.clone())));
        let lookup = match self.config.remove_lookup {
            RemoveLookup::RequestId => id.clone(),
            RemoveLookup::ResponseId => self.response_id(&response),
        };
        Ok(self.cache.get(self.collection(), &lookup, params)?)
    }

    fn require_id(&self, id: &Value) -> ClientResult<()> {
        if RecordKey::from_value(id).is_none() {
            return Err(ClientError::missing_id(
                self.collection(),
                &self.config.id_field,
            ));
        }
        Ok(())
    }

    fn response_id(&self, response: &Record) -> Value {
        id_value(response, &self.config.id_field)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Response id when present, otherwise the id the caller sent.
    fn response_id_or(&self, response: &Record, requested: &Value) -> Value {
        id_value(response, &self.config.id_field)
            .cloned()
            .unwrap_or_else(|| requested.clone())
    }
}
