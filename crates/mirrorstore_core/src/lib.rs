//! # Mirrorstore Core
//!
//! Normalized entity cache and local query engine for Mirrorstore, a
//! client-side mirror of remote record collections.
//!
//! This crate provides:
//!
//! - **Entity tables**: per-collection record storage keyed by
//!   normalized ids
//! - **Query engine**: MongoDB-style filtering, sorting, pagination,
//!   and projection evaluated locally
//! - **Reconciler**: the single mutation surface that merges confirmed
//!   server records by field diff
//! - **Change feed**: per-collection notification of committed batches
//! - **Registry**: host-owned collection configuration, validated at
//!   registration
//!
//! ## Architecture
//!
//! The cache holds only server-confirmed data. Records enter a table
//! through a [`Reconciler`] handle, reads go through [`EntityCache`]
//! against a table snapshot, and every committed batch is announced on
//! the collection's change feed:
//!
//! ```text
//! confirmed records ──> Reconciler ──> EntityTable ──> find/get/count
//!                            │
//!                            └──> ChangeFeed ──> subscribers
//! ```
//!
//! ## Key Invariants
//!
//! - A record without an id value is never inserted
//! - Reconciliation is idempotent; replaying a batch changes nothing
//!   and notifies no one
//! - A find's `total` always counts the filtered candidates before
//!   pagination
//! - Change callbacks run after the table lock is released
//!
//! ## Example
//!
//! ```
//! use mirrorstore_core::{CollectionConfig, EntityCache, Params, Registry};
//! use serde_json::{json, Map};
//! use std::sync::Arc;
//!
//! # fn main() -> mirrorstore_core::CoreResult<()> {
//! let registry = Arc::new(Registry::new());
//! registry.register(CollectionConfig::new("messages").with_id_field("id"))?;
//!
//! let cache = EntityCache::new(registry);
//! let reconciler = cache.reconciler("messages")?;
//! let record: Map<String, _> = match json!({"id": 1, "text": "hello"}) {
//!     serde_json::Value::Object(map) => map,
//!     _ => unreachable!(),
//! };
//! reconciler.update(&[record]);
//!
//! let params = Params::from_query(json!({"text": {"$in": ["hello"]}}))?;
//! let result = cache.find("messages", &params)?;
//! assert_eq!(result.total(), Some(1));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod changes;
mod config;
mod error;
pub mod query;
mod record;
mod reconcile;
mod table;

pub use cache::EntityCache;
pub use changes::{
    ChangeCallback, ChangeEvent, ChangeFeed, ChangeSubscription, ChangeType, RecordChange,
    SubscriptionId,
};
pub use config::{CollectionConfig, Registry, RemoveLookup};
pub use error::{CoreError, CoreResult};
pub use query::{FindFilters, FindResult, Params, ResultEnvelope, SortDirection};
pub use record::{id_value, record_key, Record, RecordKey};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use table::EntityTable;
