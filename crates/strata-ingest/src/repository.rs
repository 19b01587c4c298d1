//! Storage contract consumed by the pipeline
//!
//! The storage engine is an external collaborator. Implementations persist
//! records to their own tables and answer reference-entity lookups for the
//! resolver. Errors are returned as `anyhow::Error`; the writer and importer
//! wrap them with job context.

use anyhow::Result;
use std::path::Path;

use crate::model::{JobOutcome, Record, SourceDescriptor};
use crate::resolver::EntityLookup;

/// Repository the writers and importer persist through
pub trait Repository: EntityLookup {
    /// Insert a batch of new records
    fn insert(&self, records: &[Record]) -> Result<usize>;

    /// Update a batch of existing records in place
    fn update(&self, records: &[Record]) -> Result<usize>;

    /// Load a staging file written by the staging writer (one JSON record per line)
    ///
    /// Returns the number of records loaded.
    fn bulk_load(&self, staged_file: &Path) -> Result<usize>;

    /// Persist the descriptor with its terminal status
    fn record_job(&self, descriptor: &SourceDescriptor, outcome: &JobOutcome) -> Result<()>;
}
