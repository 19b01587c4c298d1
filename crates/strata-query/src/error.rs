//! Error types for criteria compilation and translation

use thiserror::Error;

use crate::criteria::{Arity, Evaluation};

/// Result type alias for query operations
pub type Result<T> = std::result::Result<T, CriteriaError>;

/// Errors raised before any backend is called
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CriteriaError {
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("{operator} expects {expected} value(s), got {actual}")]
    Arity {
        operator: Evaluation,
        expected: Arity,
        actual: usize,
    },

    #[error("Field '{field}': {reason}")]
    TypeMismatch { field: String, reason: String },

    #[error("{backend} cannot express {what}")]
    Unsupported { backend: &'static str, what: String },
}

impl CriteriaError {
    pub fn type_mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CriteriaError::TypeMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
