//! Error types for the client layer.

use std::fmt;

use mirrorstore_core::CoreError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type for remote service calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Category of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The requested record does not exist on the remote.
    NotFound,
    /// The remote rejected the request as malformed.
    BadRequest,
    /// The remote could not be reached.
    Unavailable,
    /// Any other remote failure.
    Other,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::BadRequest => "bad request",
            Self::Unavailable => "unavailable",
            Self::Other => "error",
        };
        f.write_str(name)
    }
}

/// A failure produced by the remote service, surfaced unchanged.
///
/// The client layer never retries, rewrites, or absorbs remote
/// failures; they propagate to the caller exactly as categorized here,
/// and the cache keeps its last-confirmed state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote service {kind}: {message}")]
pub struct RemoteError {
    /// Failure category.
    pub kind: RemoteErrorKind,
    /// Message as produced by the remote.
    pub message: String,
}

impl RemoteError {
    /// Creates a not-found failure.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::NotFound,
            message: message.into(),
        }
    }

    /// Creates a bad-request failure.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::BadRequest,
            message: message.into(),
        }
    }

    /// Creates an unreachable-remote failure.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Unavailable,
            message: message.into(),
        }
    }

    /// Creates an uncategorized failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Other,
            message: message.into(),
        }
    }

    /// True for not-found failures.
    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }
}

/// Errors from dispatching actions and reading the cache.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A mutation required an id value that is absent from the target
    /// record. The action rejects before any remote call, so neither
    /// the remote nor the cache is touched.
    #[error("record in {collection:?} is missing a {id_field:?} id value")]
    MissingId {
        /// Collection the mutation targeted.
        collection: String,
        /// The collection's configured id field.
        id_field: String,
    },

    /// Configuration or query validation failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Remote failure, surfaced unchanged.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ClientError {
    /// Creates a missing-id validation error.
    pub fn missing_id(collection: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self::MissingId {
            collection: collection.into(),
            id_field: id_field.into(),
        }
    }

    /// True when this wraps a remote not-found failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote(remote) if remote.is_not_found())
    }
}
