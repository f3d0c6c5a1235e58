//! The remote service boundary.
//!
//! [`RemoteService`] abstracts the backing API behind the six collection
//! operations. Implementations own transport, auth, and encoding; the
//! client layer only pairs each call with a reconciliation. A scripted
//! [`MockRemoteService`] is included for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mirrorstore_core::{Params, Record, ResultEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RemoteError, RemoteResult};

/// Response shape of a remote find: servers answer with a paginated
/// envelope or a bare record sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FindResponse {
    /// Paginated envelope.
    Page(ResultEnvelope),
    /// Bare record sequence.
    Records(Vec<Record>),
}

impl FindResponse {
    /// The records, regardless of shape.
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Page(envelope) => &envelope.data,
            Self::Records(records) => records,
        }
    }

    /// Consumes the response into its records.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Page(envelope) => envelope.data,
            Self::Records(records) => records,
        }
    }
}

/// A change announced by the remote service outside any local action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "record", rename_all = "lowercase")]
pub enum ServiceEvent {
    /// A record was created remotely.
    Created(Record),
    /// A record was replaced remotely.
    Updated(Record),
    /// A record was partially modified remotely.
    Patched(Record),
    /// A record was removed remotely.
    Removed(Record),
}

impl ServiceEvent {
    /// The record carried by the event.
    pub fn record(&self) -> &Record {
        match self {
            Self::Created(record)
            | Self::Updated(record)
            | Self::Patched(record)
            | Self::Removed(record) => record,
        }
    }
}

/// A remote collection API.
///
/// One implementation typically serves every registered collection; the
/// `path` argument selects the endpoint. Implementations must surface
/// failures as [`RemoteError`] and must not retry internally, so the
/// caller controls retry policy.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Finds records matching `params`.
    async fn find(&self, path: &str, params: &Params) -> RemoteResult<FindResponse>;

    /// Fetches one record by id; not-found when absent.
    async fn get(&self, path: &str, id: &Value, params: &Params) -> RemoteResult<Record>;

    /// Creates a record and returns the stored representation.
    async fn create(&self, path: &str, data: &Record, params: &Params) -> RemoteResult<Record>;

    /// Replaces a record and returns the stored representation.
    async fn update(
        &self,
        path: &str,
        id: &Value,
        data: &Record,
        params: &Params,
    ) -> RemoteResult<Record>;

    /// Partially modifies a record and returns the stored
    /// representation.
    async fn patch(
        &self,
        path: &str,
        id: &Value,
        data: &Record,
        params: &Params,
    ) -> RemoteResult<Record>;

    /// Removes a record and returns the removed representation.
    async fn remove(&self, path: &str, id: &Value, params: &Params) -> RemoteResult<Record>;
}

/// Per-operation call counters of a scripted or simulated remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Number of find calls.
    pub find: usize,
    /// Number of get calls.
    pub get: usize,
    /// Number of create calls.
    pub create: usize,
    /// Number of update calls.
    pub update: usize,
    /// Number of patch calls.
    pub patch: usize,
    /// Number of remove calls.
    pub remove: usize,
}

type Scripted<T> = Mutex<VecDeque<(RemoteResult<T>, Option<Duration>)>>;

/// A scripted remote for tests.
///
/// Responses are queued per operation and consumed in order; a call
/// with an empty queue fails. An optional delay is applied with the
/// tokio clock, so paused-time tests can interleave slow and fast
/// responses deterministically.
#[derive(Default)]
pub struct MockRemoteService {
    find_queue: Scripted<FindResponse>,
    get_queue: Scripted<Record>,
    create_queue: Scripted<Record>,
    update_queue: Scripted<Record>,
    patch_queue: Scripted<Record>,
    remove_queue: Scripted<Record>,
    calls: Mutex<CallCounts>,
}

impl MockRemoteService {
    /// Creates a mock with all queues empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a find response.
    pub fn push_find(&self, response: RemoteResult<FindResponse>) {
        self.find_queue.lock().unwrap().push_back((response, None));
    }

    /// Queues a find response delivered after `delay`.
    pub fn push_find_after(&self, delay: Duration, response: RemoteResult<FindResponse>) {
        self.find_queue
            .lock()
            .unwrap()
            .push_back((response, Some(delay)));
    }

    /// Queues a get response.
    pub fn push_get(&self, response: RemoteResult<Record>) {
        self.get_queue.lock().unwrap().push_back((response, None));
    }

    /// Queues a get response delivered after `delay`.
    pub fn push_get_after(&self, delay: Duration, response: RemoteResult<Record>) {
        self.get_queue
            .lock()
            .unwrap()
            .push_back((response, Some(delay)));
    }

    /// Queues a create response.
    pub fn push_create(&self, response: RemoteResult<Record>) {
        self.create_queue.lock().unwrap().push_back((response, None));
    }

    /// Queues an update response.
    pub fn push_update(&self, response: RemoteResult<Record>) {
        self.update_queue.lock().unwrap().push_back((response, None));
    }

    /// Queues a patch response.
    pub fn push_patch(&self, response: RemoteResult<Record>) {
        self.patch_queue.lock().unwrap().push_back((response, None));
    }

    /// Queues a remove response.
    pub fn push_remove(&self, response: RemoteResult<Record>) {
        self.remove_queue.lock().unwrap().push_back((response, None));
    }

    /// Counts of calls made so far.
    pub fn calls(&self) -> CallCounts {
        *self.calls.lock().unwrap()
    }

    async fn next<T: Clone>(queue: &Scripted<T>, operation: &str) -> RemoteResult<T> {
        let entry = queue.lock().unwrap().pop_front();
        match entry {
            Some((response, Some(delay))) => {
                tokio::time::sleep(delay).await;
                response
            }
            Some((response, None)) => response,
            None => Err(RemoteError::other(format!(
                "no scripted {operation} response left"
            ))),
        }
    }
}

#[async_trait]
impl RemoteService for MockRemoteService {
    async fn find(&self, _path: &str, _params: &Params) -> RemoteResult<FindResponse> {
        self.calls.lock().unwrap().find += 1;
        Self::next(&self.find_queue, "find").await
    }

    async fn get(&self, _path: &str, _id: &Value, _params: &Params) -> RemoteResult<Record> {
        self.calls.lock().unwrap().get += 1;
        Self::next(&self.get_queue, "get").await
    }

    async fn create(&self, _path: &str, _data: &Record, _params: &Params) -> RemoteResult<Record> {
        self.calls.lock().unwrap().create += 1;
        Self::next(&self.create_queue, "create").await
    }

    async fn update(
        &self,
        _path: &str,
        _id: &Value,
        _data: &Record,
        _params: &Params,
    ) -> RemoteResult<Record> {
        self.calls.lock().unwrap().update += 1;
        Self::next(&self.update_queue, "update").await
    }

    async fn patch(
        &self,
        _path: &str,
        _id: &Value,
        _data: &Record,
        _params: &Params,
    ) -> RemoteResult<Record> {
        self.calls.lock().unwrap().patch += 1;
        Self::next(&self.patch_queue, "patch").await
    }

    async fn remove(&self, _path: &str, _id: &Value, _params: &Params) -> RemoteResult<Record> {
        self.calls.lock().unwrap().remove += 1;
        Self::next(&self.remove_queue, "remove").await
    }
}
