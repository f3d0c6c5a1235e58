//! Records and normalized id keys.
//!
//! A record is a JSON object with one designated id field. Table keys
//! normalize the id to its string form, so the numeric id `1` and the
//! string id `"1"` address the same entry.

use std::fmt;

use serde_json::{Map, Value};

/// A single cached record: field names to JSON values.
pub type Record = Map<String, Value>;

/// Normalized table key for a record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(String);

impl RecordKey {
    /// Normalizes an id value into a table key.
    ///
    /// Numbers and strings normalize to their string form. Null,
    /// booleans, arrays, and objects do not identify a record and yield
    /// `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self(n.to_string())),
            Value::String(s) => Some(Self(s.clone())),
            _ => None,
        }
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for RecordKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for RecordKey {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// Reads the id value of a record, treating an explicit null as absent.
pub fn id_value<'a>(record: &'a Record, id_field: &str) -> Option<&'a Value> {
    record.get(id_field).filter(|value| !value.is_null())
}

/// Extracts the normalized key of a record, if it carries an id value.
pub fn record_key(record: &Record, id_field: &str) -> Option<RecordKey> {
    id_value(record, id_field).and_then(RecordKey::from_value)
}

/// Merges `incoming` into `existing`, writing only fields whose value
/// differs. Returns the number of fields written.
pub(crate) fn diff_merge(existing: &mut Record, incoming: &Record) -> usize {
    let mut written = 0;
    for (field, value) in incoming {
        if existing.get(field) != Some(value) {
            existing.insert(field.clone(), value.clone());
            written += 1;
        }
    }
    written
}

/// Builds a first-sight record from collection defaults plus incoming
/// fields. Incoming fields win over defaults.
pub(crate) fn seed_with_defaults(defaults: &Record, incoming: &Record) -> Record {
    let mut record = defaults.clone();
    for (field, value) in incoming {
        record.insert(field.clone(), value.clone());
    }
    record
}

/// Projects a record down to the selected fields. The id field is always
/// retained so the result stays addressable.
pub(crate) fn project(record: &Record, fields: &[String], id_field: &str) -> Record {
    let mut projected = Record::new();
    for field in fields {
        if let Some(value) = record.get(field) {
            projected.insert(field.clone(), value.clone());
        }
    }
    if let Some(id) = record.get(id_field) {
        projected.insert(id_field.to_owned(), id.clone());
    }
    projected
}
