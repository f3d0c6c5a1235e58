//! Normalized per-collection record storage.

use std::collections::HashMap;

use crate::record::{diff_merge, Record, RecordKey};

/// Id-keyed record storage for one collection.
///
/// Keys are unique and iteration follows first-insertion order, which is
/// the tie-break order for unsorted and equal-sort-key query results.
/// Mutation is crate-internal; the reconciler is the only write surface.
#[derive(Debug, Default)]
pub struct EntityTable {
    entries: HashMap<RecordKey, Record>,
    order: Vec<RecordKey>,
}

impl EntityTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record stored under `key`.
    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.entries.get(key)
    }

    /// Returns true when `key` is present.
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true when the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates records in first-insertion order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.order.iter().filter_map(|key| self.entries.get(key))
    }

    /// Iterates keys in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.order.iter()
    }

    /// Stores `record` under `key`. A replaced record keeps its original
    /// position in the iteration order.
    pub(crate) fn insert(&mut self, key: RecordKey, record: Record) {
        if self.entries.insert(key.clone(), record).is_none() {
            self.order.push(key);
        }
    }

    /// Merges `incoming` into the record under `key`, writing only fields
    /// whose value changed. Returns the written-field count; a missing
    /// key writes nothing.
    pub(crate) fn merge(&mut self, key: &RecordKey, incoming: &Record) -> usize {
        match self.entries.get_mut(key) {
            Some(existing) => diff_merge(existing, incoming),
            None => 0,
        }
    }

    /// Removes the record under `key`. Returns false when absent.
    pub(crate) fn delete(&mut self, key: &RecordKey) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }
}
