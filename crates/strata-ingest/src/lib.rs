//! Strata Ingestion Pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Reads flat scientific data files, resolves identifiers against reference
//! entities, validates records and persists them through a [`Repository`].
//!
//! - **Readers**: column-mapped tables, GCT-style matrices and MAF-style
//!   annotated calls behind one [`RecordSource`] trait
//! - **Resolution**: tiered best-guess lookup with a job-scoped cache
//! - **Persistence**: batched direct writes, or JSON-lines staging followed by
//!   a bulk import
//! - **Orchestration**: a [`Pipeline`] that runs one job at a time and always
//!   releases its reader and writer
//!
//! # Example
//!
//! ```no_run
//! use strata_ingest::{
//!     ImportOptions, InMemoryRepository, Pipeline, ProcessorRegistry, SourceDescriptor,
//! };
//!
//! let repository = InMemoryRepository::new();
//! repository.add_gene(672, "672", "BRCA1", &["RNF53"]);
//! repository.add_sample(1, "TCGA-A1-0001-01");
//!
//! let registry = ProcessorRegistry::standard();
//! let mut pipeline = Pipeline::new(&repository, &registry, ImportOptions::default())?;
//!
//! let descriptor = SourceDescriptor::new("gene_expression", "/data/brca.gct");
//! let result = pipeline.run_job(&descriptor)?;
//! println!("{} records written", result.records_written);
//! # Ok::<(), strata_ingest::IngestError>(())
//! ```

pub mod config;
pub mod error;
pub mod fields;
pub mod importer;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod validator;
pub mod writer;

pub use config::{ImportOptions, SkipPolicy, WriteMode};
pub use error::{IngestError, JobError, Result};
pub use importer::{BulkImporter, Importer};
pub use memory::InMemoryRepository;
pub use model::{
    FieldValue, IngestWarning, JobOutcome, JobStatus, Record, RecordKind, SourceDescriptor,
};
pub use pipeline::{CancellationToken, JobResult, Pipeline, PipelineState};
pub use reader::{ReaderOptions, ReaderState, RecordSource};
pub use registry::{ProcessorRegistry, ProcessorSpec, ReaderStrategy};
pub use repository::Repository;
pub use resolver::{EntityLookup, EntityResolver, MatchTier};
pub use validator::{SchemaValidator, Validator, Violation};
pub use writer::{RecordSink, RepositoryWriter, SinkSummary, StagingWriter};
