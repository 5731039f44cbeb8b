//! Error taxonomy for the ingestion and query pipeline.
//!
//! Every failure the pipeline can report maps onto one [`Error`] variant, and every
//! variant has a stable machine-readable [`Error::code`]. The MCP tool layer renders
//! errors as `CODE: message`, so one error kind always produces one kind of message.
//!
//! Variants fall into three propagation classes (see [`Error::scope`]):
//!
//! - **record** errors are collected per record and never abort a batch,
//! - **chunk** errors fail the records of one chunk and are captured in the outcome,
//! - **call** errors abort the whole operation before or instead of any batch work.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// The record at this position has no usable identifier.
    #[error("record {index} has no identifier (field '{field}')")]
    MissingIdentifier { index: usize, field: String },

    #[error("vector for '{id}' has {actual} dimensions, index expects {expected}")]
    InvalidVectorDimension {
        id: String,
        expected: usize,
        actual: usize,
    },

    /// Text or field shape errors in caller-supplied data.
    #[error("{0}")]
    InvalidInput(String),

    #[error("unsupported filter operator '{operator}' on field '{field}' (supported: $eq, $in, $range)")]
    UnsupportedOperator { field: String, operator: String },

    #[error("invalid $range on field '{field}': {reason}")]
    InvalidRange { field: String, reason: String },

    /// Filter condition that is not a single-field, single-operator object.
    #[error("malformed filter condition at position {position}: {reason}")]
    MalformedFilter { position: usize, reason: String },

    #[error("embeddings are disabled (provider 'none')")]
    EmbeddingDisabled,

    #[error("embedding provider failed: {0}")]
    EmbeddingProvider(String),

    #[error("vector database unavailable: {0}")]
    StorageUnavailable(String),

    #[error("vector database request failed{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    StorageRequest {
        status: Option<u16>,
        message: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// How far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Record,
    Chunk,
    Call,
}

impl Error {
    /// Machine-readable SCREAMING_SNAKE code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingIdentifier { .. } => "MISSING_IDENTIFIER",
            Self::InvalidVectorDimension { .. } => "INVALID_VECTOR_DIMENSION",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::UnsupportedOperator { .. } => "UNSUPPORTED_OPERATOR",
            Self::InvalidRange { .. } => "INVALID_RANGE",
            Self::MalformedFilter { .. } => "MALFORMED_FILTER",
            Self::EmbeddingDisabled => "EMBEDDING_DISABLED",
            Self::EmbeddingProvider(_) => "EMBEDDING_PROVIDER_ERROR",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::StorageRequest { .. } => "STORAGE_REQUEST_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    pub const fn scope(&self) -> ErrorScope {
        match self {
            Self::MissingIdentifier { .. }
            | Self::InvalidVectorDimension { .. }
            | Self::InvalidInput(_) => ErrorScope::Record,
            Self::EmbeddingDisabled
            | Self::EmbeddingProvider(_)
            | Self::StorageUnavailable(_)
            | Self::StorageRequest { .. } => ErrorScope::Chunk,
            Self::UnsupportedOperator { .. }
            | Self::InvalidRange { .. }
            | Self::MalformedFilter { .. }
            | Self::Configuration(_) => ErrorScope::Call,
        }
    }

    /// Whether this is a filter validation error.
    pub const fn is_filter_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedOperator { .. } | Self::InvalidRange { .. } | Self::MalformedFilter { .. }
        )
    }

    /// User-facing rendering used by the tool layer.
    pub fn to_tool_message(&self) -> String {
        format!("{}: {self}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_carries_code() {
        let err = Error::UnsupportedOperator {
            field: "price".into(),
            operator: "$gt".into(),
        };
        let msg = err.to_tool_message();
        assert!(msg.starts_with("UNSUPPORTED_OPERATOR: "));
        assert!(msg.contains("'price'"));
        assert!(msg.contains("$gt"));
    }

    #[test]
    fn storage_request_display_includes_status() {
        let err = Error::StorageRequest {
            status: Some(404),
            message: "index not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "vector database request failed (HTTP 404): index not found"
        );

        let err = Error::StorageRequest {
            status: None,
            message: "bad body".into(),
        };
        assert_eq!(err.to_string(), "vector database request failed: bad body");
    }

    #[test]
    fn scopes_follow_propagation_policy() {
        assert_eq!(
            Error::MissingIdentifier { index: 0, field: "id".into() }.scope(),
            ErrorScope::Record
        );
        assert_eq!(Error::EmbeddingDisabled.scope(), ErrorScope::Chunk);
        assert_eq!(
            Error::StorageUnavailable("refused".into()).scope(),
            ErrorScope::Chunk
        );
        assert_eq!(Error::Configuration("x".into()).scope(), ErrorScope::Call);
        assert!(Error::InvalidRange {
            field: "f".into(),
            reason: "r".into()
        }
        .is_filter_error());
    }
}
