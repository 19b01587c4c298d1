//! Pipeline orchestrator
//!
//! Runs one job: reader -> validator -> writer -> (optional) bulk importer.
//!
//! ```text
//! Idle -> Configuring -> Running -> Completed
//!                    \-----------\-> Failed
//! ```
//!
//! A finished pipeline refuses to run again until [`Pipeline::reset`] is
//! called. The reader and writer are closed on every exit path, including
//! failure and cancellation.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{ImportOptions, SkipPolicy};
use crate::error::{IngestError, JobError, Result};
use crate::importer::{BulkImporter, Importer};
use crate::model::{IngestWarning, JobOutcome, JobStatus, SourceDescriptor};
use crate::reader::{ReaderOptions, RecordSource};
use crate::registry::ProcessorRegistry;
use crate::repository::Repository;
use crate::validator::Validator;
use crate::writer::{RecordSink, RepositoryWriter, StagingWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Configuring,
    Running,
    Completed,
    Failed,
}

/// Shared flag for cancelling a running job from another thread.
///
/// Checked between records.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Outcome of one job
#[derive(Debug)]
pub struct JobResult {
    pub job_id: Uuid,
    /// Records produced by the reader
    pub records_read: usize,
    /// Records persisted by the writer or the bulk importer
    pub records_written: usize,
    /// Records dropped for validation violations
    pub records_discarded: usize,
    /// Everything skipped, by reader or validator
    pub warnings: Vec<IngestWarning>,
    pub error: Option<JobError>,
}

impl JobResult {
    fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            records_read: 0,
            records_written: 0,
            records_discarded: 0,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Reader and sink for one job, closed together when dropped
struct JobStage<'a> {
    reader: Box<dyn RecordSource + 'a>,
    sink: Box<dyn RecordSink + 'a>,
    importer: Option<Box<dyn Importer + 'a>>,
    validator: Box<dyn Validator + 'a>,
}

impl Drop for JobStage<'_> {
    fn drop(&mut self) {
        self.reader.close();
        if let Err(e) = self.sink.close() {
            warn!(error = %e, "Failed to close writer during release");
        }
    }
}

pub struct Pipeline<'r, R: Repository> {
    repository: &'r R,
    registry: &'r ProcessorRegistry,
    options: ImportOptions,
    state: PipelineState,
    cancellation: CancellationToken,
}

impl<'r, R: Repository> Pipeline<'r, R> {
    /// Build a pipeline; the options are validated here, once
    pub fn new(
        repository: &'r R,
        registry: &'r ProcessorRegistry,
        options: ImportOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            repository,
            registry,
            options,
            state: PipelineState::Idle,
            cancellation: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Token that cancels the current (or next) job
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Return a finished pipeline to `Idle` and clear any cancellation
    pub fn reset(&mut self) {
        debug!(from = ?self.state, "Pipeline reset");
        self.state = PipelineState::Idle;
        self.cancellation.clear();
    }

    /// Run one job to completion.
    ///
    /// Job failures are reported in [`JobResult::error`]; the outer error is
    /// only returned when the pipeline is not idle.
    #[tracing::instrument(
        skip(self, descriptor),
        fields(
            data_type = %descriptor.source_type,
            location = %descriptor.location,
            job_id = tracing::field::Empty
        )
    )]
    pub fn run_job(&mut self, descriptor: &SourceDescriptor) -> Result<JobResult> {
        if self.state != PipelineState::Idle {
            return Err(IngestError::invalid_state(format!(
                "pipeline is {:?}; reset before running another job",
                self.state
            )));
        }

        let job_id = Uuid::new_v4();
        tracing::Span::current().record("job_id", tracing::field::display(job_id));
        let mut result = JobResult::new(job_id);

        self.state = PipelineState::Configuring;
        let outcome = match self.configure(descriptor, job_id) {
            Ok(stage) => {
                self.state = PipelineState::Running;
                info!("Job started");
                self.execute(stage, descriptor, &mut result)
            },
            Err(cause) => Err(cause),
        };

        match outcome {
            Ok(()) => {
                self.state = PipelineState::Completed;
                info!(
                    read = result.records_read,
                    written = result.records_written,
                    discarded = result.records_discarded,
                    warnings = result.warnings.len(),
                    "Job completed"
                );
            },
            Err(cause) => {
                self.state = PipelineState::Failed;
                error!(error = %cause, "Job failed");
                result.error = Some(JobError::new(
                    job_id,
                    &descriptor.location,
                    &descriptor.source_type,
                    cause,
                ));
            },
        }

        self.record(descriptor, &result);
        Ok(result)
    }

    /// Wire reader, validator, writer and importer for the descriptor's data type
    fn configure(&self, descriptor: &SourceDescriptor, job_id: Uuid) -> Result<JobStage<'r>> {
        let processor = self.registry.get(&descriptor.source_type)?;
        let reader_options = ReaderOptions::from_import_options(&self.options)?;
        let repository: &'r dyn Repository = self.repository;

        let (sink, importer): (Box<dyn RecordSink + 'r>, Option<Box<dyn Importer + 'r>>) =
            if self.options.staged {
                (
                    Box::new(StagingWriter::new(self.options.temp_directory.clone(), job_id)),
                    Some(Box::new(BulkImporter::new(
                        repository,
                        self.options.keep_staging_files,
                    ))),
                )
            } else {
                (
                    Box::new(RepositoryWriter::new(
                        repository,
                        self.options.batch_size,
                        self.options.write_mode,
                    )),
                    None,
                )
            };

        debug!(reader = ?processor.reader, staged = self.options.staged, "Configured job");

        Ok(JobStage {
            reader: processor.reader(self.repository, reader_options),
            sink,
            importer,
            validator: Box::new(processor.validator()),
        })
    }

    fn execute(
        &self,
        mut stage: JobStage<'r>,
        descriptor: &SourceDescriptor,
        result: &mut JobResult,
    ) -> Result<()> {
        let looped = self.run_stage(&mut stage, descriptor, result);

        result.warnings.extend(stage.reader.drain_warnings());

        if let Err(cause) = looped {
            result.records_written = stage.sink.on_failure(&cause);
            return Err(cause);
        }

        let summary = match stage.sink.close() {
            Ok(summary) => summary,
            Err(cause) => {
                // earlier batches may already have landed
                result.records_written = stage.sink.on_failure(&cause);
                return Err(cause);
            },
        };
        stage.reader.close();

        result.records_written = match (&stage.importer, summary.staged.as_deref()) {
            (Some(importer), Some(staged)) => importer.import(staged)?,
            _ => summary.records_written,
        };

        Ok(())
    }

    fn run_stage(
        &self,
        stage: &mut JobStage<'r>,
        descriptor: &SourceDescriptor,
        result: &mut JobResult,
    ) -> Result<()> {
        stage.reader.open(descriptor)?;
        stage.sink.open(descriptor)?;
        self.pump(stage, self.options.skip_policy(), result)
    }

    /// Read, validate and write until the reader is exhausted
    fn pump(
        &self,
        stage: &mut JobStage<'r>,
        policy: SkipPolicy,
        result: &mut JobResult,
    ) -> Result<()> {
        loop {
            if self.cancellation.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            let Some(record) = stage.reader.next_record()? else {
                return Ok(());
            };
            result.records_read += 1;

            let violations = stage.validator.validate(&record);
            if !violations.is_empty() {
                let error = IngestError::Validation {
                    line: record.line,
                    violations,
                };
                if !policy.allows(&error) {
                    return Err(error);
                }
                warn!(error = %error, "Discarding invalid record");
                result.records_discarded += 1;
                result
                    .warnings
                    .push(IngestWarning::at_line(record.line, error.to_string()));
                continue;
            }

            stage.sink.write(record)?;
        }
    }

    /// Persist the descriptor with its terminal status
    fn record(&self, descriptor: &SourceDescriptor, result: &JobResult) {
        let outcome = JobOutcome {
            status: if result.is_success() {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            },
            records_written: result.records_written,
            warnings: result.warnings.len(),
            error: result.error.as_ref().map(|e| e.cause.to_string()),
            finished_at: Utc::now(),
        };

        if let Err(e) = self.repository.record_job(descriptor, &outcome) {
            warn!(error = %e, status = outcome.status.as_str(), "Failed to record job outcome");
        }
    }
}
