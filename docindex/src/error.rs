//! Error types for docindex
//!
//! Errors are grouped by the layer that raises them. Schema and
//! composability errors are raised before any backend call is made;
//! storage errors wrap whatever the transport reported; mutation errors
//! come out of writes through bound document views.

use thiserror::Error;

/// Errors raised while deriving or validating a storage schema
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// No backend column kind matches the field's semantic kind
    #[error("Unsupported field type for field '{field}': {kind}")]
    Unsupported { field: String, kind: String },

    /// A vector field has no static dimension and no configured default
    #[error("Missing dimension for vector field '{field}'")]
    MissingDimension { field: String },

    /// A configuration value is outside the backend's allow-list
    #[error("Invalid {setting} '{value}' provided. Must be one of: {allowed}")]
    InvalidConfig {
        setting: String,
        value: String,
        allowed: String,
    },

    /// The document type has no field with this name
    #[error("Unknown field '{field}' on document type '{doc_type}'")]
    UnknownField { doc_type: String, field: String },

    /// Two fields of one document type share a name
    #[error("Duplicate field '{field}' on document type '{doc_type}'")]
    DuplicateField { doc_type: String, field: String },

    /// A value does not satisfy the field's validation rules
    #[error("Invalid value for field '{field}': expected {expected}, got {got}")]
    InvalidValue {
        field: String,
        expected: String,
        got: String,
    },
}

impl SchemaError {
    pub(crate) fn invalid_config(
        setting: impl Into<String>,
        value: impl Into<String>,
        allowed: &[&str],
    ) -> Self {
        Self::InvalidConfig {
            setting: setting.into(),
            value: value.into(),
            allowed: allowed.join(", "),
        }
    }
}

/// Errors raised while building or compiling a query
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComposabilityError {
    /// The fragment kind cannot be used (again) in one query on this backend
    #[error("{kind} is not composable on the {backend} backend")]
    NotComposable { kind: String, backend: String },

    /// The combination of fragments does not match any accepted shape
    #[error("Unsupported query shape: expected {expected}, got {observed}")]
    UnsupportedQueryShape { expected: String, observed: String },
}

/// Errors reported by a backend transport, surfaced unchanged
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Unknown index name: {0}")]
    UnknownIndex(String),

    #[error("Index already exists: {0}")]
    IndexExists(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Syntax error in query: {0}")]
    Syntax(String),

    #[error("Command failed: {0}")]
    Command(String),
}

/// Errors raised by the storage layer (column stores and backends)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    /// None of the requested documents exist
    #[error("No document with id {ids:?} found")]
    NotFound { ids: Vec<String> },

    /// The field holds an immutable tensor and the document is bound
    #[error(
        "Field '{field}' holds an immutable tensor; unstack the document or write the column directly"
    )]
    ImmutableField { field: String },

    /// The backend could not serve the request
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] TransportError),

    /// A bound view outlived its column store or was detached by an unstack
    #[error("Document view is stale: its column store was dropped or unstacked")]
    StaleView,

    /// Row index past the end of a column store
    #[error("Index {index} out of bounds for column store of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Batch insert stopped at a row without an id
    #[error("Row {position} has no id; batch stopped after {written} documents")]
    MalformedRow { position: usize, written: usize },
}

/// Errors raised by in-place writes through bound views
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    /// The new value does not fit the column's fixed row shape
    #[error("Shape mismatch for field '{field}': expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        field: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// A failed write could not be undone
    #[error("Rollback of field '{field}' failed after '{cause}': {reason}")]
    RollbackFailed {
        field: String,
        cause: String,
        reason: String,
    },
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Query error: {0}")]
    Composability(#[from] ComposabilityError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A backend row could not be turned back into a document
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<TransportError> for IndexError {
    fn from(err: TransportError) -> Self {
        Self::Storage(StorageError::BackendUnavailable(err))
    }
}

impl IndexError {
    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Check if this error means the requested documents do not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound { .. }))
    }

    /// Errors that are raised before any backend call is made
    pub fn is_fail_fast(&self) -> bool {
        matches!(self, Self::Schema(_) | Self::Composability(_))
    }
}

/// Result type for docindex operations
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_allowed_values() {
        let err = SchemaError::invalid_config("distance metric", "MANHATTAN", &["L2", "IP"]);
        assert_eq!(
            err.to_string(),
            "Invalid distance metric 'MANHATTAN' provided. Must be one of: L2, IP"
        );
    }

    #[test]
    fn test_transport_error_surfaces_verbatim() {
        let err: IndexError = TransportError::Connection("refused".to_string()).into();
        assert!(err.to_string().contains("Connection error: refused"));
        assert!(matches!(
            err,
            IndexError::Storage(StorageError::BackendUnavailable(TransportError::Connection(_)))
        ));
    }

    #[test]
    fn test_not_found_predicate() {
        let err: IndexError = StorageError::NotFound {
            ids: vec!["a".to_string()],
        }
        .into();
        assert!(err.is_not_found());
        assert!(!err.is_fail_fast());
    }

    #[test]
    fn test_fail_fast_predicate() {
        let err: IndexError = ComposabilityError::NotComposable {
            kind: "find".to_string(),
            backend: "redis".to_string(),
        }
        .into();
        assert!(err.is_fail_fast());
        assert_eq!(
            err.to_string(),
            "Query error: find is not composable on the redis backend"
        );
    }
}
