//! Error types for the core cache and query engine.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by collection configuration and query validation.
///
/// Local reads never fail on missing data; lookups against unknown ids
/// return `None`. Errors are reserved for misconfiguration and for
/// queries that cannot be evaluated.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A collection was registered without a resolvable service path.
    #[error("collection {collection:?} has no resolvable service path")]
    UnresolvedPath {
        /// Collection name as registered.
        collection: String,
    },

    /// A collection name was registered twice.
    #[error("collection {collection:?} is already registered")]
    DuplicateCollection {
        /// Collection name as registered.
        collection: String,
    },

    /// An operation referenced a collection that was never registered.
    #[error("collection {collection:?} is not registered")]
    UnknownCollection {
        /// Collection name as requested.
        collection: String,
    },

    /// A query used an operator outside the supported set or the
    /// collection's whitelist.
    #[error("query operator {operator:?} is not supported")]
    UnsupportedOperator {
        /// Operator as written in the query.
        operator: String,
    },

    /// A query could not be parsed into a match clause and filters.
    #[error("invalid query: {reason}")]
    InvalidQuery {
        /// Why the query was rejected.
        reason: String,
    },
}

impl CoreError {
    /// Creates an unresolved-path error.
    pub fn unresolved_path(collection: impl Into<String>) -> Self {
        Self::UnresolvedPath {
            collection: collection.into(),
        }
    }

    /// Creates a duplicate-collection error.
    pub fn duplicate_collection(collection: impl Into<String>) -> Self {
        Self::DuplicateCollection {
            collection: collection.into(),
        }
    }

    /// Creates an unknown-collection error.
    pub fn unknown_collection(collection: impl Into<String>) -> Self {
        Self::UnknownCollection {
            collection: collection.into(),
        }
    }

    /// Creates an unsupported-operator error.
    pub fn unsupported_operator(operator: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
        }
    }

    /// Creates an invalid-query error.
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }
}
