//! Benchmark utilities.

use std::sync::Arc;

use mirrorstore_core::{CollectionConfig, EntityCache, Reconciler, Record, Registry};
use rand::Rng;
use serde_json::json;

/// Generate a batch of records with sequential integer ids and randomly
/// distributed field values.
pub fn generate_records(count: usize) -> Vec<Record> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|id| {
            let value = json!({
                "id": id,
                "a": rng.gen_range(0..100),
                "name": format!("record-{id}"),
                "flag": rng.gen::<bool>(),
                "author": {"name": format!("user-{}", rng.gen_range(0..10))},
            });
            match value {
                serde_json::Value::Object(map) => map,
                _ => unreachable!(),
            }
        })
        .collect()
}

/// Create a cache with one registered collection keyed by `id`.
pub fn bench_cache() -> (Arc<EntityCache>, Reconciler) {
    let registry = Registry::new();
    registry
        .register(CollectionConfig::new("bench").with_id_field("id"))
        .expect("fresh registry accepts the collection");
    let cache = Arc::new(EntityCache::new(Arc::new(registry)));
    let reconciler = cache.reconciler("bench").expect("registered above");
    (cache, reconciler)
}

/// Create a cache preloaded with `count` generated records.
pub fn seeded_cache(count: usize) -> (Arc<EntityCache>, Reconciler) {
    let (cache, reconciler) = bench_cache();
    reconciler.update(&generate_records(count));
    (cache, reconciler)
}
