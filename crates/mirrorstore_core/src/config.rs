//! Collection configuration and the registry.
//!
//! Each mirrored collection is described by a [`CollectionConfig`]:
//! which field identifies records, which query keys are forwarded to the
//! remote but never applied locally, which extra predicate operators are
//! allowed, and the defaults seeded onto first-sight records. Configs
//! live in a host-owned [`Registry`] and are validated at registration,
//! so a bad collection fails fast instead of at first use.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::query::is_known_extra_operator;
use crate::record::Record;

/// Which identity the post-remove cache lookup uses.
///
/// Remote services disagree on whether a remove response echoes the
/// requested id or a server-assigned one. Both behaviors exist in the
/// wild, so the choice is per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveLookup {
    /// Look up by the id the caller passed to the remove action.
    #[default]
    RequestId,
    /// Look up by the id carried in the remove response record.
    ResponseId,
}

/// Configuration for one mirrored collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection name, used as the registry key.
    pub name: String,
    /// Remote service path.
    pub path: String,
    /// Field that identifies records.
    pub id_field: String,
    /// Query keys forwarded to the remote and stripped before local
    /// evaluation.
    #[serde(default)]
    pub server_only_params: Vec<String>,
    /// Additional predicate operators allowed in queries.
    #[serde(default)]
    pub extra_operators: Vec<String>,
    /// Fields seeded onto records on first sight of a new id.
    #[serde(default)]
    pub defaults: Record,
    /// Identity used for the cache lookup after a remove.
    #[serde(default)]
    pub remove_lookup: RemoveLookup,
}

impl CollectionConfig {
    /// Creates a configuration for `name`, reusing the name as the
    /// remote service path.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            id_field: "_id".to_owned(),
            server_only_params: Vec::new(),
            extra_operators: Vec::new(),
            defaults: Record::new(),
            remove_lookup: RemoveLookup::default(),
        }
    }

    /// Sets the remote service path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the field that identifies records.
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Declares query keys that are forwarded to the remote only.
    pub fn with_server_only_params<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_only_params = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Whitelists additional predicate operators.
    pub fn with_extra_operators<I, S>(mut self, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_operators = operators.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the defaults seeded onto first-sight records.
    pub fn with_defaults(mut self, defaults: Record) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the post-remove lookup identity.
    pub fn with_remove_lookup(mut self, lookup: RemoveLookup) -> Self {
        self.remove_lookup = lookup;
        self
    }
}

/// Host-owned mapping of collection name to configuration.
pub struct Registry {
    configs: RwLock<HashMap<String, Arc<CollectionConfig>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a collection configuration.
    ///
    /// Fails when the name or path does not resolve, when the name is
    /// already registered, or when an extra operator is outside the
    /// known whitelist.
    pub fn register(&self, config: CollectionConfig) -> CoreResult<Arc<CollectionConfig>> {
        if config.name.trim().is_empty() || config.path.trim().is_empty() {
            return Err(CoreError::unresolved_path(config.name));
        }
        for operator in &config.extra_operators {
            if !is_known_extra_operator(operator) {
                return Err(CoreError::unsupported_operator(operator));
            }
        }

        let mut configs = self.configs.write();
        if configs.contains_key(&config.name) {
            return Err(CoreError::duplicate_collection(config.name));
        }
        let config = Arc::new(config);
        configs.insert(config.name.clone(), Arc::clone(&config));
        tracing::debug!(collection = %config.name, path = %config.path, "registered collection");
        Ok(config)
    }

    /// Looks up a collection configuration.
    pub fn get(&self, name: &str) -> CoreResult<Arc<CollectionConfig>> {
        self.configs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::unknown_collection(name))
    }

    /// Returns true when `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.configs.read().contains_key(name)
    }

    /// Registered collection names, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.configs.read().keys().cloned().collect()
    }

    /// Number of registered collections.
    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    /// Returns true when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
