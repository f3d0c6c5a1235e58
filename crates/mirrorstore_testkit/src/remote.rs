//! An in-memory remote service.
//!
//! [`InMemoryRemote`] simulates a backing API with real behavior: it
//! stores records per served path, evaluates find queries with the same
//! engine the cache uses, and assigns ids on create. Latency and
//! scripted failures can be injected, which keeps paused-clock
//! supersession tests deterministic without a scripted response queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mirrorstore_client::{CallCounts, FindResponse, RemoteError, RemoteResult, RemoteService};
use mirrorstore_core::{
    id_value, CollectionConfig, CoreError, EntityCache, FindResult, Params, Record, Registry,
};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

/// A remote service holding its records in memory.
pub struct InMemoryRemote {
    registry: Arc<Registry>,
    cache: EntityCache,
    latency: Mutex<Option<Duration>>,
    failures: Mutex<VecDeque<RemoteError>>,
    calls: Mutex<CallCounts>,
}

impl InMemoryRemote {
    /// Creates a remote serving no paths.
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            cache: EntityCache::new(Arc::clone(&registry)),
            registry,
            latency: Mutex::new(None),
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(CallCounts::default()),
        }
    }

    /// Serves a collection under its configured path, mirroring the id
    /// field, server-only keys, and operator whitelist of the client
    /// configuration. Server-only keys are accepted and ignored, the
    /// way a server consumes them before querying.
    ///
    /// # Panics
    ///
    /// Panics when the path is already served or the configuration is
    /// invalid.
    pub fn serve(&self, config: &CollectionConfig) {
        let server_side = CollectionConfig::new(&config.path)
            .with_id_field(&config.id_field)
            .with_server_only_params(config.server_only_params.iter().cloned())
            .with_extra_operators(config.extra_operators.iter().cloned());
        self.registry
            .register(server_side)
            .expect("served path must register");
    }

    /// Stores records under a served path, bypassing create semantics.
    ///
    /// # Panics
    ///
    /// Panics when the path is not served.
    pub fn seed(&self, path: &str, records: &[Record]) {
        self.cache
            .reconciler(path)
            .expect("path must be served before seeding")
            .update(records);
    }

    /// Applies `latency` to every following call, on the tokio clock.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Removes any injected latency.
    pub fn clear_latency(&self) {
        *self.latency.lock() = None;
    }

    /// Fails the next call with `error`, consuming one queued failure
    /// per call.
    pub fn fail_next(&self, error: RemoteError) {
        self.failures.lock().push_back(error);
    }

    /// Counts of calls made so far.
    pub fn calls(&self) -> CallCounts {
        *self.calls.lock()
    }

    /// Number of records stored under a served path.
    pub fn stored(&self, path: &str) -> usize {
        self.cache.record_count(path).unwrap_or(0)
    }

    async fn begin(&self, path: &str) -> RemoteResult<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        if !self.registry.contains(path) {
            return Err(RemoteError::not_found(format!("no service at {path:?}")));
        }
        Ok(())
    }

    fn stored_record(&self, path: &str, id: &Value) -> RemoteResult<Option<Record>> {
        self.cache
            .get(path, id, &Params::empty())
            .map_err(to_remote)
    }

    fn require_record(&self, path: &str, id: &Value) -> RemoteResult<Record> {
        self.stored_record(path, id)?
            .ok_or_else(|| RemoteError::not_found(format!("no record {id} at {path:?}")))
    }

    fn keyed(&self, path: &str, id: &Value, data: &Record) -> RemoteResult<Record> {
        let config = self.registry.get(path).map_err(to_remote)?;
        let mut record = data.clone();
        record.insert(config.id_field.clone(), id.clone());
        Ok(record)
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn to_remote(error: CoreError) -> RemoteError {
    match error {
        CoreError::UnknownCollection { collection } => {
            RemoteError::not_found(format!("no service at {collection:?}"))
        }
        other => RemoteError::bad_request(other.to_string()),
    }
}

#[async_trait]
impl RemoteService for InMemoryRemote {
    async fn find(&self, path: &str, params: &Params) -> RemoteResult<FindResponse> {
        self.calls.lock().find += 1;
        self.begin(path).await?;
        let result = self.cache.find(path, params).map_err(to_remote)?;
        Ok(match result {
            FindResult::Page(envelope) => FindResponse::Page(envelope),
            FindResult::Records(records) => FindResponse::Records(records),
        })
    }

    async fn get(&self, path: &str, id: &Value, params: &Params) -> RemoteResult<Record> {
        self.calls.lock().get += 1;
        self.begin(path).await?;
        self.cache
            .get(path, id, params)
            .map_err(to_remote)?
            .ok_or_else(|| RemoteError::not_found(format!("no record {id} at {path:?}")))
    }

    async fn create(&self, path: &str, data: &Record, _params: &Params) -> RemoteResult<Record> {
        self.calls.lock().create += 1;
        self.begin(path).await?;
        let config = self.registry.get(path).map_err(to_remote)?;
        let mut record = data.clone();
        let id = match id_value(&record, &config.id_field) {
            Some(id) => id.clone(),
            None => {
                let id = Value::String(Uuid::new_v4().to_string());
                record.insert(config.id_field.clone(), id.clone());
                id
            }
        };
        self.cache
            .reconciler(path)
            .map_err(to_remote)?
            .update(&[record]);
        self.require_record(path, &id)
    }

    async fn update(
        &self,
        path: &str,
        id: &Value,
        data: &Record,
        _params: &Params,
    ) -> RemoteResult<Record> {
        self.calls.lock().update += 1;
        self.begin(path).await?;
        self.require_record(path, id)?;
        // replacement semantics: drop the stored record, then insert
        let reconciler = self.cache.reconciler(path).map_err(to_remote)?;
        reconciler.remove(std::slice::from_ref(id));
        reconciler.update(&[self.keyed(path, id, data)?]);
        self.require_record(path, id)
    }

    async fn patch(
        &self,
        path: &str,
        id: &Value,
        data: &Record,
        _params: &Params,
    ) -> RemoteResult<Record> {
        self.calls.lock().patch += 1;
        self.begin(path).await?;
        self.require_record(path, id)?;
        self.cache
            .reconciler(path)
            .map_err(to_remote)?
            .patch(&[self.keyed(path, id, data)?]);
        self.require_record(path, id)
    }

    async fn remove(&self, path: &str, id: &Value, _params: &Params) -> RemoteResult<Record> {
        self.calls.lock().remove += 1;
        self.begin(path).await?;
        let stored = self.require_record(path, id)?;
        self.cache
            .reconciler(path)
            .map_err(to_remote)?
            .remove(std::slice::from_ref(id));
        Ok(stored)
    }
}
