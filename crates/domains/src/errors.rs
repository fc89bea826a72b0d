//! # Errors
//!
//! Centralized error handling for the forum content layer.
//! `DomainError` is what every repository and the `Forum` facade return;
//! `StoreError` is the opaque failure surface of a `ContentStore` adapter.

use thiserror::Error;

/// Failures raised by a `ContentStore` adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A path segment is empty or contains a reserved character,
    /// or a multi-path update lists overlapping paths.
    #[error("invalid store path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A stored value could not be decoded into (or encoded from) a record.
    #[error("malformed value at `{path}`: {source}")]
    Serialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Optimistic write kept losing against concurrent writers.
    #[error("write conflict at `{path}` after {attempts} attempts")]
    Conflict { path: String, attempts: u32 },

    /// Infrastructure failure (network, backend down).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The adapter has no change-notification support.
    #[error("subscriptions are not supported by this store")]
    SubscriptionUnsupported,
}

/// Taxonomy kind of a `DomainError`, for callers that branch on the class
/// of failure rather than on the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    LimitExceeded,
    Authorization,
    Duplicate,
    Store,
}

/// The primary error type for all forum operations.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Field length or emptiness violation (title, content, location, tag text, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation target does not exist (thread, comment, user, tag)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// A per-entity cap was reached (e.g. tags per thread)
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Caller is blocked, or is neither the owner nor an admin
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Handle or email collision in the user directory
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Underlying store failure, passed through untouched
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(entity.to_string(), id.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(..) => ErrorKind::NotFound,
            Self::LimitExceeded(_) => ErrorKind::LimitExceeded,
            Self::Unauthorized(_) => ErrorKind::Authorization,
            Self::Duplicate(_) => ErrorKind::Duplicate,
            Self::Store(_) => ErrorKind::Store,
        }
    }
}

/// A specialized Result type for forum logic.
pub type Result<T> = std::result::Result<T, DomainError>;
