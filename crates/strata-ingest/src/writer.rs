//! Record sinks
//!
//! - [`RepositoryWriter`]: batches records and writes them straight through
//!   the repository (insert or update)
//! - [`StagingWriter`]: appends JSON lines to a staging file for a later bulk
//!   import

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WriteMode;
use crate::error::{IngestError, Result};
use crate::model::{Record, SourceDescriptor};
use crate::repository::Repository;

/// What a sink reports when it is closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkSummary {
    pub records_written: usize,
    /// Staging file awaiting a bulk import, if the sink stages
    pub staged: Option<PathBuf>,
}

/// Destination of validated records
pub trait RecordSink {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<()>;

    fn write(&mut self, record: Record) -> Result<()>;

    /// Flush anything buffered and release resources.
    ///
    /// Idempotent: later calls return the first summary.
    fn close(&mut self) -> Result<SinkSummary>;

    /// Called once when the job fails, before `close`.
    ///
    /// Returns how many records already reached the repository.
    fn on_failure(&mut self, error: &IngestError) -> usize;

    /// Path of the staging file, for sinks that stage
    fn staged_output(&self) -> Option<&Path> {
        None
    }
}

// ============================================================================
// Direct writer
// ============================================================================

pub struct RepositoryWriter<'r> {
    repository: &'r dyn Repository,
    batch_size: usize,
    mode: WriteMode,
    buffer: Vec<Record>,
    written: usize,
    is_open: bool,
    summary: Option<SinkSummary>,
}

impl<'r> RepositoryWriter<'r> {
    pub fn new(repository: &'r dyn Repository, batch_size: usize, mode: WriteMode) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            repository,
            batch_size,
            mode,
            buffer: Vec::with_capacity(batch_size),
            written: 0,
            is_open: false,
            summary: None,
        }
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.buffer);
        let count = batch.len();
        let written = match self.mode {
            WriteMode::Insert => self.repository.insert(&batch),
            WriteMode::Update => self.repository.update(&batch),
        }
        .map_err(|e| {
            IngestError::write(
                format!("{:?} of {} records failed", self.mode, count),
                e,
            )
        })?;

        self.written += written;
        debug!(batch = count, written, total = self.written, "Flushed batch");
        Ok(())
    }
}

impl RecordSink for RepositoryWriter<'_> {
    fn open(&mut self, _descriptor: &SourceDescriptor) -> Result<()> {
        self.buffer.clear();
        self.written = 0;
        self.summary = None;
        self.is_open = true;
        Ok(())
    }

    fn write(&mut self, record: Record) -> Result<()> {
        if !self.is_open {
            return Err(IngestError::invalid_state("write called on a closed writer"));
        }
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<SinkSummary> {
        if let Some(summary) = &self.summary {
            return Ok(summary.clone());
        }

        // partial final batch
        let flushed = self.flush();
        self.is_open = false;
        flushed?;

        let summary = SinkSummary {
            records_written: self.written,
            staged: None,
        };
        self.summary = Some(summary.clone());
        Ok(summary)
    }

    fn on_failure(&mut self, error: &IngestError) -> usize {
        if !self.buffer.is_empty() {
            warn!(
                discarded = self.buffer.len(),
                error = %error,
                "Discarding unflushed records after job failure"
            );
        }
        self.buffer.clear();
        self.summary = Some(SinkSummary {
            records_written: self.written,
            staged: None,
        });
        self.is_open = false;
        self.written
    }
}

// ============================================================================
// Staging writer
// ============================================================================

pub struct StagingWriter {
    temp_directory: PathBuf,
    job_id: Uuid,
    path: Option<PathBuf>,
    out: Option<BufWriter<File>>,
    written: usize,
    summary: Option<SinkSummary>,
}

impl StagingWriter {
    pub fn new(temp_directory: impl Into<PathBuf>, job_id: Uuid) -> Self {
        Self {
            temp_directory: temp_directory.into(),
            job_id,
            path: None,
            out: None,
            written: 0,
            summary: None,
        }
    }

    fn staging_error(&self, action: &str, source: std::io::Error) -> IngestError {
        let path = self.path.as_deref().unwrap_or(&self.temp_directory);
        IngestError::write(format!("Failed to {} {}", action, path.display()), source)
    }
}

impl RecordSink for StagingWriter {
    fn open(&mut self, _descriptor: &SourceDescriptor) -> Result<()> {
        fs::create_dir_all(&self.temp_directory)
            .map_err(|e| self.staging_error("create staging directory", e))?;

        let path = self.temp_directory.join(format!("{}.jsonl", self.job_id));
        self.path = Some(path.clone());
        let file = File::create(&path).map_err(|e| self.staging_error("create", e))?;

        self.out = Some(BufWriter::new(file));
        self.written = 0;
        self.summary = None;
        debug!(path = %path.display(), "Opened staging file");
        Ok(())
    }

    fn write(&mut self, record: Record) -> Result<()> {
        let Some(out) = self.out.as_mut() else {
            return Err(IngestError::invalid_state("write called on a closed writer"));
        };

        serde_json::to_writer(&mut *out, &record)
            .map_err(|e| IngestError::write("Failed to serialize staged record", e))?;
        out.write_all(b"\n")
            .map_err(|e| IngestError::write("Failed to append to staging file", e))?;

        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<SinkSummary> {
        if let Some(summary) = &self.summary {
            return Ok(summary.clone());
        }

        if let Some(mut out) = self.out.take() {
            out.flush().map_err(|e| self.staging_error("flush", e))?;
        }

        let summary = SinkSummary {
            records_written: self.written,
            staged: self.path.clone(),
        };
        info!(
            records = self.written,
            path = ?summary.staged,
            "Staging file complete"
        );
        self.summary = Some(summary.clone());
        Ok(summary)
    }

    fn on_failure(&mut self, error: &IngestError) -> usize {
        if let Some(mut out) = self.out.take() {
            if let Err(e) = out.flush() {
                warn!(error = %e, "Failed to flush staging file");
            }
        }
        if let Some(path) = &self.path {
            warn!(
                path = %path.display(),
                records = self.written,
                error = %error,
                "Job failed, staging file kept for inspection"
            );
        }
        // staged records only land through the bulk import
        0
    }

    fn staged_output(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
