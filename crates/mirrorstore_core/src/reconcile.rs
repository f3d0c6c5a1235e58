//! Applies confirmed records into the cache.
//!
//! The reconciler is the only mutation surface of a collection table.
//! Confirmed server records enter through [`Reconciler::update`] and
//! [`Reconciler::patch`] (insert on first sight, field-diff merge
//! otherwise) and leave through [`Reconciler::remove`]. A batch commits
//! under one table write lock and announces at most one change event,
//! emitted after the lock is released; an idempotent replay changes
//! nothing and notifies no one.

use std::sync::Arc;

use serde_json::Value;

use crate::cache::CollectionState;
use crate::changes::{ChangeEvent, RecordChange};
use crate::record::{record_key, seed_with_defaults, Record, RecordKey};

/// Counts from one reconciliation batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Records seen for the first time and inserted.
    pub inserted: usize,
    /// Existing records with at least one field rewritten.
    pub updated: usize,
    /// Records removed.
    pub removed: usize,
    /// Items dropped because they carry no usable id value.
    pub skipped: usize,
}

impl ReconcileOutcome {
    /// True when the batch left the table untouched.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.removed == 0
    }

    /// Total records whose table state changed.
    pub fn changed(&self) -> usize {
        self.inserted + self.updated + self.removed
    }
}

/// Mutation handle for one collection. Cheap to clone; clones share the
/// same table.
#[derive(Clone)]
pub struct Reconciler {
    state: Arc<CollectionState>,
}

impl Reconciler {
    pub(crate) fn new(state: Arc<CollectionState>) -> Self {
        Self { state }
    }

    /// Collection this handle mutates.
    pub fn collection(&self) -> &str {
        &self.state.config.name
    }

    /// Applies confirmed records: insert on first sight of an id (seeded
    /// from collection defaults), field-diff merge otherwise. Records
    /// without an id value are skipped, never an error.
    pub fn update(&self, records: &[Record]) -> ReconcileOutcome {
        self.apply_upserts(records)
    }

    /// Applies partial records with the same merge semantics as
    /// [`Reconciler::update`].
    pub fn patch(&self, records: &[Record]) -> ReconcileOutcome {
        self.apply_upserts(records)
    }

    /// Removes records. Items may be full records or bare id values;
    /// ids not present in the table are a no-op.
    pub fn remove(&self, items: &[Value]) -> ReconcileOutcome {
        let config = &self.state.config;
        let mut outcome = ReconcileOutcome::default();
        let mut changes = Vec::new();
        {
            let mut table = self.state.table.write();
            for item in items {
                let key = match item {
                    Value::Object(record) => record_key(record, &config.id_field),
                    other => RecordKey::from_value(other),
                };
                match key {
                    Some(key) => {
                        if table.delete(&key) {
                            outcome.removed += 1;
                            changes.push(RecordChange::delete(key));
                        }
                    }
                    None => outcome.skipped += 1,
                }
            }
        }
        self.finish(changes, outcome)
    }

    fn apply_upserts(&self, records: &[Record]) -> ReconcileOutcome {
        let config = &self.state.config;
        let mut outcome = ReconcileOutcome::default();
        let mut changes = Vec::new();
        {
            let mut table = self.state.table.write();
            for record in records {
                let Some(key) = record_key(record, &config.id_field) else {
                    outcome.skipped += 1;
                    continue;
                };
                if table.contains(&key) {
                    if table.merge(&key, record) > 0 {
                        outcome.updated += 1;
                        changes.push(RecordChange::update(key));
                    }
                } else {
                    let seeded = seed_with_defaults(&config.defaults, record);
                    table.insert(key.clone(), seeded);
                    outcome.inserted += 1;
                    changes.push(RecordChange::insert(key));
                }
            }
        }
        self.finish(changes, outcome)
    }

    /// Logs the batch and emits its change event with no lock held.
    fn finish(&self, changes: Vec<RecordChange>, outcome: ReconcileOutcome) -> ReconcileOutcome {
        if outcome.skipped > 0 {
            tracing::debug!(
                collection = %self.collection(),
                skipped = outcome.skipped,
                "dropped items without an id value"
            );
        }
        if !changes.is_empty() {
            tracing::debug!(
                collection = %self.collection(),
                inserted = outcome.inserted,
                updated = outcome.updated,
                removed = outcome.removed,
                "committed reconciliation batch"
            );
            self.state.feed.emit(&ChangeEvent {
                collection: self.collection().to_owned(),
                changes,
            });
        }
        outcome
    }
}
