//! Record sources
//!
//! One [`RecordSource`] trait with three independent strategies:
//!
//! - [`ColumnMappedReader`]: header + one record per line
//! - [`MatrixReader`]: GCT-style matrix, one record per (row, sample) cell
//! - [`AnnotatedLineReader`]: MAF-style calls, one record per line with two
//!   resolved entities and opaque extra columns
//!
//! All readers share the same state machine:
//!
//! ```text
//! Closed --open--> Open --next*--> Exhausted --close--> Closed
//! ```
//!
//! `next_record` on a closed reader is a usage error. Once exhausted, it keeps
//! returning `None`.

mod annotated;
mod column_mapped;
mod matrix;

pub use annotated::AnnotatedLineReader;
pub use column_mapped::ColumnMappedReader;
pub use matrix::MatrixReader;

use csv::StringRecord;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use strata_common::{EntityId, EntityKind};
use tracing::{debug, warn};

use crate::config::{ImportOptions, SkipPolicy};
use crate::error::{IngestError, Result};
use crate::model::{IngestWarning, Record, SourceDescriptor};
use crate::resolver::{EntityLookup, EntityResolver};

/// Lifecycle of a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Closed,
    Open,
    Exhausted,
}

/// Lazy, format-specific producer of records
pub trait RecordSource {
    /// Open the descriptor's location. Re-opening starts over from the top.
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<()>;

    /// Next record, or `None` once the input is exhausted
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Release the input handle. Idempotent.
    fn close(&mut self);

    fn state(&self) -> ReaderState;

    /// Skip warnings collected since the last call
    fn drain_warnings(&mut self) -> Vec<IngestWarning>;
}

/// Per-job reader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub delimiter: u8,
    pub skip: SkipPolicy,
}

impl ReaderOptions {
    pub fn from_import_options(options: &ImportOptions) -> Result<Self> {
        Ok(Self {
            delimiter: options.delimiter_byte()?,
            skip: options.skip_policy(),
        })
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            skip: SkipPolicy::default(),
        }
    }
}

// ============================================================================
// Line source
// ============================================================================

/// One physical line split into cells
#[derive(Debug, Clone)]
pub(crate) struct Line {
    /// 1-based line number in the (decompressed) input
    pub number: usize,
    pub cells: StringRecord,
}

impl Line {
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index)
    }

    pub fn is_comment(&self) -> bool {
        self.cells
            .get(0)
            .is_some_and(|first| first.trim_start().starts_with('#'))
    }

    fn is_blank(&self) -> bool {
        self.cells.iter().all(|cell| cell.trim().is_empty())
    }
}

/// Delimited lines from a plain or gzip-compressed file
pub(crate) struct LineSource {
    reader: csv::Reader<Box<dyn Read + Send>>,
    location: String,
    lines_read: usize,
}

impl LineSource {
    pub fn open(location: &str, delimiter: u8) -> Result<Self> {
        let path = local_path(location)?;
        let file = File::open(&path).map_err(|e| unreadable(location, e))?;

        let input: Box<dyn Read + Send> = if is_gzip(&path) {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(input);

        debug!(location, path = %path.display(), "Opened source");

        Ok(Self {
            reader,
            location: location.to_string(),
            lines_read: 0,
        })
    }

    /// Next non-blank line
    pub fn next_line(&mut self) -> Result<Option<Line>> {
        loop {
            let mut cells = StringRecord::new();
            let more = self
                .reader
                .read_record(&mut cells)
                .map_err(|e| unreadable(&self.location, io::Error::from(e)))?;
            if !more {
                return Ok(None);
            }

            self.lines_read += 1;
            let number = cells
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(self.lines_read);

            let line = Line { number, cells };
            if !line.is_blank() {
                return Ok(Some(line));
            }
        }
    }
}

/// Plain path or `file://` URI to a local path
fn local_path(location: &str) -> Result<PathBuf> {
    if let Some(path) = location.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if let Some((scheme, _)) = location.split_once("://") {
        return Err(unreadable(
            location,
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported location scheme '{}'", scheme),
            ),
        ));
    }
    Ok(PathBuf::from(location))
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

fn unreadable(location: &str, source: io::Error) -> IngestError {
    IngestError::SourceUnreadable {
        location: location.to_string(),
        source,
    }
}

// ============================================================================
// Shared reader plumbing
// ============================================================================

/// State, input handle and warning buffer every reader carries
pub(crate) struct ReaderCore {
    options: ReaderOptions,
    state: ReaderState,
    source: Option<LineSource>,
    descriptor: Option<SourceDescriptor>,
    warnings: Vec<IngestWarning>,
}

impl ReaderCore {
    pub fn new(options: ReaderOptions) -> Self {
        Self {
            options,
            state: ReaderState::Closed,
            source: None,
            descriptor: None,
            warnings: Vec::new(),
        }
    }

    pub fn open(&mut self, descriptor: &SourceDescriptor) -> Result<()> {
        self.source = None;
        self.state = ReaderState::Closed;
        // set before opening so a failed reopen never reports the previous location
        self.descriptor = Some(descriptor.clone());
        self.warnings.clear();

        let source = LineSource::open(&descriptor.location, self.options.delimiter)?;
        self.source = Some(source);
        self.state = ReaderState::Open;
        Ok(())
    }

    pub fn close(&mut self) {
        if self.source.take().is_some() {
            debug!(location = %self.location(), "Closed source");
        }
        self.state = ReaderState::Closed;
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Fails when the reader has not been opened
    pub fn ensure_open(&self) -> Result<()> {
        match self.state {
            ReaderState::Closed => Err(IngestError::invalid_state("next called on a closed reader")),
            ReaderState::Open | ReaderState::Exhausted => Ok(()),
        }
    }

    /// Next non-blank line; marks the reader exhausted at end of input
    pub fn next_line(&mut self) -> Result<Option<Line>> {
        self.ensure_open()?;
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };

        match source.next_line()? {
            Some(line) => Ok(Some(line)),
            None => {
                self.source = None;
                self.state = ReaderState::Exhausted;
                Ok(None)
            },
        }
    }

    pub fn descriptor(&self) -> Result<&SourceDescriptor> {
        self.descriptor
            .as_ref()
            .ok_or_else(|| IngestError::invalid_state("reader has not been opened"))
    }

    pub fn location(&self) -> &str {
        self.descriptor
            .as_ref()
            .map(|d| d.location.as_str())
            .unwrap_or("")
    }

    /// Apply the job's skip policy to a per-record error.
    ///
    /// Skippable errors become a warning; everything else is returned.
    pub fn skip_or_fail(&mut self, error: IngestError) -> Result<()> {
        if !self.options.skip.allows(&error) {
            return Err(error);
        }
        warn!(location = %self.location(), error = %error, "Skipping");
        self.warnings.push(IngestWarning {
            line: error_line(&error),
            message: error.to_string(),
        });
        Ok(())
    }

    pub fn warn(&mut self, warning: IngestWarning) {
        warn!(location = %self.location(), warning = %warning, "Reader warning");
        self.warnings.push(warning);
    }

    pub fn drain_warnings(&mut self) -> Vec<IngestWarning> {
        std::mem::take(&mut self.warnings)
    }
}

fn error_line(error: &IngestError) -> Option<usize> {
    match error {
        IngestError::FieldConversion { line, .. }
        | IngestError::UnresolvedEntity { line, .. }
        | IngestError::Validation { line, .. } => Some(*line),
        _ => None,
    }
}

/// Gene and sample resolvers for one job
pub(crate) struct Resolvers<'a> {
    lookup: &'a dyn EntityLookup,
    genes: EntityResolver<'a>,
    samples: EntityResolver<'a>,
}

impl<'a> Resolvers<'a> {
    pub fn new(lookup: &'a dyn EntityLookup) -> Self {
        Self {
            lookup,
            genes: EntityResolver::new(lookup, EntityKind::Gene),
            samples: EntityResolver::new(lookup, EntityKind::Sample),
        }
    }

    /// Fresh caches for a new job
    pub fn reset(&mut self) {
        *self = Self::new(self.lookup);
    }

    pub fn resolve(&mut self, kind: EntityKind, token: &str) -> Result<Option<EntityId>> {
        match kind {
            EntityKind::Gene => self.genes.resolve(token),
            EntityKind::Sample => self.samples.resolve(token),
        }
    }

    /// Resolve or fail with [`IngestError::UnresolvedEntity`]
    pub fn require(&mut self, kind: EntityKind, token: &str, line: usize) -> Result<EntityId> {
        self.resolve(kind, token)?
            .ok_or_else(|| IngestError::UnresolvedEntity {
                line,
                kind,
                token: token.trim().to_string(),
            })
    }
}

/// Store a resolved reference on the record
pub(crate) fn set_reference(record: &mut Record, kind: EntityKind, id: EntityId) {
    match kind {
        EntityKind::Gene => record.gene_id = Some(id),
        EntityKind::Sample => record.sample_id = Some(id),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_line_source_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tsv");
        std::fs::write(&path, "a\tb\n\n   \t \nc\td\n").unwrap();

        let mut source = LineSource::open(path.to_str().unwrap(), b'\t').unwrap();
        let first = source.next_line().unwrap().unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(first.cell(1), Some("b"));

        let second = source.next_line().unwrap().unwrap();
        assert_eq!(second.number, 4);
        assert_eq!(second.cell(0), Some("c"));
        assert!(source.next_line().unwrap().is_none());
    }

    #[test]
    fn test_line_source_reads_gzip_and_file_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.tsv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"# comment\nx\t\"quoted\n").unwrap();
        encoder.finish().unwrap();

        let uri = format!("file://{}", path.display());
        let mut source = LineSource::open(&uri, b'\t').unwrap();
        assert!(source.next_line().unwrap().unwrap().is_comment());
        // quotes are data, not syntax
        assert_eq!(source.next_line().unwrap().unwrap().cell(1), Some("\"quoted"));
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = LineSource::open("/definitely/not/here.tsv", b'\t').err().unwrap();
        assert!(matches!(err, IngestError::SourceUnreadable { .. }));
    }

    #[test]
    fn test_remote_scheme_is_unreadable() {
        let err = LineSource::open("s3://bucket/key.tsv", b'\t').err().unwrap();
        assert!(matches!(err, IngestError::SourceUnreadable { ref location, .. } if location == "s3://bucket/key.tsv"));
    }

    #[test]
    fn test_failed_reopen_reports_new_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("first.tsv");
        std::fs::write(&path, "a\n").unwrap();

        let mut core = ReaderCore::new(ReaderOptions::default());
        core.open(&SourceDescriptor::new("sample_attributes", path.to_str().unwrap()))
            .unwrap();
        assert_eq!(core.state(), ReaderState::Open);

        let missing = SourceDescriptor::new("sample_attributes", "/definitely/not/here.tsv");
        assert!(core.open(&missing).is_err());
        assert_eq!(core.state(), ReaderState::Closed);
        assert_eq!(core.location(), "/definitely/not/here.tsv");
        assert_eq!(core.descriptor().unwrap().id, missing.id);
    }

    #[test]
    fn test_core_rejects_next_when_closed() {
        let mut core = ReaderCore::new(ReaderOptions::default());
        assert!(matches!(core.next_line(), Err(IngestError::InvalidState(_))));
        core.close();
        core.close();
        assert_eq!(core.state(), ReaderState::Closed);
    }
}
