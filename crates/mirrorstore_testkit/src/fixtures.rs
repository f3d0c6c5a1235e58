//! Canonical records and configurations used across the test suites.

use std::sync::Arc;

use mirrorstore_core::{CollectionConfig, Record, Registry};
use serde_json::{json, Value};

/// Converts a JSON object literal into a record.
///
/// # Panics
///
/// Panics when `value` is not an object; fixtures are always literals.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture must be an object, got {other}"),
    }
}

/// The canonical three-record collection: ids 1..=3 with a duplicated
/// `a` value, so equality filters match multiple records and sorts have
/// ties to keep stable.
pub fn things() -> Vec<Record> {
    vec![
        record(json!({"id": 1, "a": 1})),
        record(json!({"id": 2, "a": 2})),
        record(json!({"id": 3, "a": 1})),
    ]
}

/// Configuration matching the [`things`] fixtures.
pub fn things_config() -> CollectionConfig {
    CollectionConfig::new("things").with_id_field("id")
}

/// A message collection with string ids, defaults, and a nested author
/// object for dot-path queries.
pub fn messages(count: usize) -> Vec<Record> {
    (0..count)
        .map(|index| {
            record(json!({
                "id": format!("msg-{index}"),
                "text": format!("message {index}"),
                "read": index % 2 == 0,
                "author": {"name": format!("user-{}", index % 3)},
            }))
        })
        .collect()
}

/// Configuration matching the [`messages`] fixtures.
pub fn messages_config() -> CollectionConfig {
    CollectionConfig::new("messages")
        .with_id_field("id")
        .with_defaults(record(json!({"read": false})))
}

/// A registry with the given collections registered.
///
/// # Panics
///
/// Panics on registration failure; fixture configurations are valid.
pub fn registry_with<I>(configs: I) -> Arc<Registry>
where
    I: IntoIterator<Item = CollectionConfig>,
{
    let registry = Registry::new();
    for config in configs {
        registry
            .register(config)
            .expect("fixture configuration must register");
    }
    Arc::new(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn things_have_distinct_ids_and_tied_values() {
        let things = things();
        assert_eq!(things.len(), 3);
        let tied = things.iter().filter(|r| r["a"] == json!(1)).count();
        assert_eq!(tied, 2);
    }

    #[test]
    fn registry_fixture_registers_everything() {
        let registry = registry_with([things_config(), messages_config()]);
        assert!(registry.contains("things"));
        assert!(registry.contains("messages"));
    }
}
