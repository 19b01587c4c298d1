//! Error types for ingestion jobs

use std::path::PathBuf;

use strata_common::EntityKind;
use thiserror::Error;
use uuid::Uuid;

use crate::validator::Violation;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Boxed collaborator error (repository failures arrive as `anyhow::Error`)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can go wrong while reading, validating or persisting records
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Source unreadable: {location}: {source}")]
    SourceUnreadable {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed header in {location}: {reason}")]
    MalformedHeader { location: String, reason: String },

    #[error("Line {line}: cannot convert '{value}' in field '{field}' to {expected}")]
    FieldConversion {
        line: usize,
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("Line {line}: unresolved {kind} '{token}'")]
    UnresolvedEntity {
        line: usize,
        kind: EntityKind,
        token: String,
    },

    #[error("Line {line}: validation failed: {}", join_violations(.violations))]
    Validation {
        line: usize,
        violations: Vec<Violation>,
    },

    #[error("Lookup of {kind} '{token}' failed: {source}")]
    Lookup {
        kind: EntityKind,
        token: String,
        #[source]
        source: BoxError,
    },

    #[error("Write failed: {message}: {source}")]
    Write {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("Bulk import of {} failed: {source}", .path.display())]
    Import {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No processor registered for data type '{0}'")]
    UnknownDataType(String),

    #[error("Job cancelled")]
    Cancelled,
}

impl IngestError {
    /// Whether this error concerns a single record and may be skipped by policy.
    ///
    /// Resource acquisition, write/import and configuration failures are
    /// always fatal.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            IngestError::FieldConversion { .. }
                | IngestError::UnresolvedEntity { .. }
                | IngestError::Validation { .. }
        )
    }

    pub fn write(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        IngestError::Write {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        IngestError::InvalidState(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        IngestError::Config(message.into())
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A fatal job failure with the context needed to locate it
#[derive(Error, Debug)]
#[error("Job {job_id} ({data_type} from {location}) failed: {cause}")]
pub struct JobError {
    pub job_id: Uuid,
    pub location: String,
    pub data_type: String,
    #[source]
    pub cause: IngestError,
}

impl JobError {
    pub fn new(
        job_id: Uuid,
        location: impl Into<String>,
        data_type: impl Into<String>,
        cause: IngestError,
    ) -> Self {
        Self {
            job_id,
            location: location.into(),
            data_type: data_type.into(),
            cause,
        }
    }
}
