//! Error types for the key/value layer
//!
//! Every error belongs to exactly one [`ErrorCategory`]. Wrappers may add
//! context to an error but never move it to another category.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Error Category ==
/// Coarse classification of a [`KvError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input, raised before any I/O. Never retried.
    Validation,
    /// Timeouts, connection resets, rate limiting. Eligible for retry/fallback.
    Transient,
    /// Only produced by the explicit raise-on-missing adapter.
    NotFound,
    /// A record or value could not be encoded or decoded.
    Serialization,
    /// An optional capability was invoked on a store that lacks it.
    Unsupported,
    /// Any other, permanent backend failure.
    Backend,
}

// == KV Error Enum ==
/// Unified error type for stores and wrappers.
#[derive(Error, Debug)]
pub enum KvError {
    /// TTL is zero, negative, non-finite or below the clock resolution
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Key is empty or otherwise malformed
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Collection name is empty or otherwise malformed
    #[error("Invalid collection: {0}")]
    InvalidCollection(String),

    /// Positional batch arguments disagree in length
    #[error("Batch length mismatch: expected {expected} {what}, got {actual}")]
    BatchLengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Serialized entry is larger than allowed
    #[error("Entry too large: {size} bytes exceeds limit of {max_size} bytes (collection: {collection}, key: {key})")]
    EntryTooLarge {
        size: usize,
        max_size: usize,
        collection: String,
        key: String,
    },

    /// Write attempted through a read-only wrapper
    #[error("Store is read-only: {operation} rejected (collection: {collection}, key: {key})")]
    ReadOnly {
        operation: &'static str,
        collection: String,
        key: String,
    },

    /// Wrapper chain would contain the same instance twice
    #[error("Invalid store composition: {0}")]
    InvalidComposition(String),

    /// Store or wrapper constructed with an unusable setting
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Key was required but not found (raise-on-missing adapter only)
    #[error("Missing key: {key} (collection: {collection}, operation: {operation})")]
    MissingKey {
        operation: &'static str,
        collection: String,
        key: String,
    },

    /// Value could not be serialized for storage
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Stored record could not be decoded
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Optional capability not implemented by this store
    #[error("Unsupported operation: {capability} is not supported by {store}")]
    Unsupported {
        capability: &'static str,
        store: &'static str,
    },

    /// Operation did not complete in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Backend connection failed or was reset
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend is throttling requests
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Calls are blocked by an open circuit breaker
    #[error("Circuit open after {failure_count} consecutive failures, retry in {retry_in:.1}s")]
    CircuitOpen { failure_count: u32, retry_in: f64 },

    /// Permanent backend failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// An error with additional context attached by a wrapper
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<KvError>,
    },
}

impl KvError {
    // == Category ==
    /// Returns the taxonomy bucket of this error.
    ///
    /// Context wrappers report the category of the error they wrap.
    pub fn category(&self) -> ErrorCategory {
        match self {
            KvError::InvalidTtl(_)
            | KvError::InvalidKey(_)
            | KvError::InvalidCollection(_)
            | KvError::BatchLengthMismatch { .. }
            | KvError::EntryTooLarge { .. }
            | KvError::ReadOnly { .. }
            | KvError::InvalidComposition(_)
            | KvError::InvalidArgument(_) => ErrorCategory::Validation,
            KvError::MissingKey { .. } => ErrorCategory::NotFound,
            KvError::Serialization(_) | KvError::Deserialization(_) => {
                ErrorCategory::Serialization
            }
            KvError::Unsupported { .. } => ErrorCategory::Unsupported,
            KvError::Timeout(_)
            | KvError::Connection(_)
            | KvError::RateLimited(_)
            | KvError::CircuitOpen { .. } => ErrorCategory::Transient,
            KvError::Backend(_) => ErrorCategory::Backend,
            KvError::Context { source, .. } => source.category(),
        }
    }

    /// Returns true if the error is worth retrying.
    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Wraps this error with context, preserving its category.
    pub fn context(self, context: impl Into<String>) -> Self {
        KvError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error behind any context layers.
    pub fn root(&self) -> &KvError {
        match self {
            KvError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for KvError {
    fn into_response(self) -> Response {
        let status = match (self.root(), self.category()) {
            (KvError::ReadOnly { .. }, _) => StatusCode::FORBIDDEN,
            (KvError::EntryTooLarge { .. }, _) => StatusCode::PAYLOAD_TOO_LARGE,
            (_, ErrorCategory::Validation) => StatusCode::BAD_REQUEST,
            (_, ErrorCategory::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorCategory::Unsupported) => StatusCode::NOT_IMPLEMENTED,
            (_, ErrorCategory::Transient) => StatusCode::SERVICE_UNAVAILABLE,
            (_, ErrorCategory::Serialization) | (_, ErrorCategory::Backend) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the key/value layer.
pub type Result<T> = std::result::Result<T, KvError>;
