use crate::model::FieldType;
use thiserror::Error;

/// Operation-level error taxonomy.
///
/// Validation and not-found failures are expected, recoverable conditions;
/// callers can map them to 4xx-style responses. `Store` wraps infrastructure
/// failures (connectivity, constraint violations) that aborted the enclosing
/// transaction and must be treated as fatal for the request.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SchemaError {
    pub fn validation(message: impl Into<String>) -> Self {
        SchemaError::Validation(vec![message.into()])
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        SchemaError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SchemaError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SchemaError::NotFound { .. })
    }
}

/// Raised when a raw value cannot be cast to a field's declared type.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("cannot convert {value} to {target}")]
pub struct CoercionError {
    pub value: String,
    pub target: FieldType,
}

impl CoercionError {
    pub fn new(value: &serde_json::Value, target: FieldType) -> Self {
        Self {
            value: value.to_string(),
            target,
        }
    }
}
