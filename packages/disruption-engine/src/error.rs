//! Typed errors for the disruption engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during extraction and validation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Generator rate-limited, overloaded, or unreachable. Retryable.
    #[error("transient upstream error: {0}")]
    TransientUpstream(String),

    /// Generator call exceeded its deadline. Retryable.
    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    /// Generator output did not satisfy the event schema.
    #[error("schema violation: {0}")]
    SchemaViolation(#[from] SchemaViolation),

    /// External dataset could not be fetched for this run
    #[error("source unavailable: {dataset}: {source}")]
    SourceUnavailable {
        dataset: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Same event id, different content
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// No adapter registered under this name
    #[error("unknown dataset: {name}")]
    UnknownDataset { name: String },

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether a failed generator call may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientUpstream(_) | Self::Timeout(_) | Self::SchemaViolation(_)
        )
    }

    /// Wrap any error as a dataset-level fetch failure.
    pub fn source_unavailable(
        dataset: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SourceUnavailable {
            dataset: dataset.into(),
            source: source.into(),
        }
    }
}

/// Ways the generator output can violate the event schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    /// No JSON value could be recovered from the output
    #[error("output is not JSON: {0}")]
    NotJson(String),

    /// A required field is absent or null
    #[error("missing required field `{0}`")]
    MissingField(String),

    /// A field is present but has the wrong type or format
    #[error("invalid value for `{field}`: {value}")]
    InvalidValue { field: String, value: String },

    /// `event_type` is not one of the allowed values
    #[error("unknown event_type `{0}`")]
    UnknownEventType(String),
}

/// Raised when an upsert collides with an existing event of different content.
///
/// Event ids are derived deterministically, so a collision means either the
/// derivation or the producer is non-deterministic. Never silently overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event id conflict for {event_id}: stored content {existing_hash} != incoming {incoming_hash}")]
pub struct ConflictError {
    pub event_id: String,
    pub existing_hash: String,
    pub incoming_hash: String,
}

/// Per-record normalization failure inside an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// A field the adapter needs is absent
    #[error("missing field `{field}`")]
    MissingField { field: String },

    /// A date field could not be parsed in any known encoding
    #[error("unparsable date in `{field}`: {value}")]
    InvalidDate { field: String, value: String },

    /// Coordinates present but not numeric or out of range
    #[error("invalid coordinate in `{field}`: {value}")]
    InvalidCoordinate { field: String, value: String },
}

impl NormalizeError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for adapter normalization.
pub type NormalizeResult<T> = std::result::Result<T, NormalizeError>;
