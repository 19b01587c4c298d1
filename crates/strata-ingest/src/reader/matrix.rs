//! GCT-style matrix reader
//!
//! ```text
//! #1.2                                  optional version line
//! 2       3                             optional "rows  columns" line
//! Name    Description  S1   S2   S3     header
//! BRCA1   na           1.0  2.0  0.5    one row per feature
//! ```
//!
//! Every (row, sample) cell becomes one expression record. Sample columns are
//! resolved once at header time; the row gene is resolved before any of its
//! cells is emitted.

use std::collections::VecDeque;
use strata_common::{text::normalize_header, EntityId, EntityKind};
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::fields::{is_missing, FieldSpec, RecordSchema};
use crate::model::{FieldValue, IngestWarning, Record, SourceDescriptor};
use crate::resolver::EntityLookup;

use super::{Line, ReaderCore, ReaderOptions, ReaderState, RecordSource, Resolvers};

/// A sample column that resolved
#[derive(Debug, Clone)]
struct SampleColumn {
    index: usize,
    sample_id: EntityId,
}

#[derive(Debug, Default)]
struct Layout {
    /// GCT version line seen
    versioned: bool,
    /// Declared (rows, columns) from the dimensions line
    declared: Option<(usize, usize)>,
    /// Columns before the first sample column
    leading: usize,
    samples: Vec<SampleColumn>,
    header_parsed: bool,
}

pub struct MatrixReader<'a> {
    core: ReaderCore,
    schema: &'static RecordSchema,
    value_field: Option<&'static FieldSpec>,
    resolvers: Resolvers<'a>,
    layout: Layout,
    pending: VecDeque<Record>,
    rows_seen: usize,
    /// Non-blank lines seen before the header
    preamble_lines: usize,
}

impl<'a> MatrixReader<'a> {
    pub fn new(
        schema: &'static RecordSchema,
        lookup: &'a dyn EntityLookup,
        options: ReaderOptions,
    ) -> Self {
        Self {
            core: ReaderCore::new(options),
            schema,
            value_field: schema.field("value"),
            resolvers: Resolvers::new(lookup),
            layout: Layout::default(),
            pending: VecDeque::new(),
            rows_seen: 0,
            preamble_lines: 0,
        }
    }

    /// Handle one line before the header: version line, dimensions line or the header itself
    fn read_preamble(&mut self, line: &Line) -> Result<()> {
        self.preamble_lines += 1;

        if self.preamble_lines == 1 && line.is_comment() {
            self.layout.versioned = true;
            debug!(version = line.cell(0).unwrap_or_default(), "Matrix version line");
            return Ok(());
        }
        if self.preamble_lines <= 2 && self.layout.declared.is_none() {
            if let Some(dims) = parse_dimensions(line) {
                self.layout.declared = Some(dims);
                return Ok(());
            }
        }
        if line.is_comment() {
            return Ok(());
        }

        self.parse_header(line)
    }

    fn parse_header(&mut self, line: &Line) -> Result<()> {
        let second = line.cell(1).map(normalize_header).unwrap_or_default();
        self.layout.leading = if self.layout.versioned || second == "description" {
            2
        } else {
            1
        };

        let mut samples = Vec::new();
        for (index, name) in line.cells.iter().enumerate().skip(self.layout.leading) {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            match self.resolvers.require(EntityKind::Sample, name, line.number) {
                Ok(sample_id) => samples.push(SampleColumn { index, sample_id }),
                Err(error) if error.is_record_level() => self.core.skip_or_fail(error)?,
                Err(error) => return Err(error),
            }
        }

        let declared_columns = line.cells.len().saturating_sub(self.layout.leading);
        if let Some((_, columns)) = self.layout.declared {
            if columns != declared_columns {
                self.core.warn(IngestWarning::at_line(
                    line.number,
                    format!(
                        "header has {} sample columns, dimensions line declares {}",
                        declared_columns, columns
                    ),
                ));
            }
        }

        debug!(
            location = %self.core.location(),
            leading = self.layout.leading,
            samples = samples.len(),
            "Parsed matrix header"
        );
        self.layout.samples = samples;
        self.layout.header_parsed = true;
        Ok(())
    }

    /// Resolve the row gene, then queue one record per resolved sample column
    fn read_row(&mut self, line: &Line) -> Result<()> {
        self.rows_seen += 1;

        let token = line.cell(0).unwrap_or_default();
        let gene_id = match self.resolvers.require(EntityKind::Gene, token, line.number) {
            Ok(id) => id,
            Err(error) if error.is_record_level() => return self.core.skip_or_fail(error),
            Err(error) => return Err(error),
        };

        let descriptor = self.core.descriptor()?.clone();
        let mut row = Vec::with_capacity(self.layout.samples.len());
        for column in &self.layout.samples {
            let mut record = Record::new(self.schema.kind, line.number).for_source(&descriptor);
            record.gene_id = Some(gene_id);
            record.sample_id = Some(column.sample_id);

            let raw = line.cell(column.index).unwrap_or_default();
            match self.convert(raw, line.number) {
                Ok(Some(value)) => record.set("value", value),
                Ok(None) => {},
                Err(error) => {
                    self.core.skip_or_fail(error)?;
                    continue;
                },
            }
            row.push(record);
        }

        self.pending.extend(row);
        Ok(())
    }

    fn convert(&self, raw: &str, line: usize) -> Result<Option<FieldValue>> {
        if is_missing(raw) {
            return Ok(None);
        }
        match self.value_field {
            Some(spec) => spec.convert(raw, line),
            None => Err(IngestError::config(format!(
                "{} schema has no value field",
                self.schema.kind.as_str()
            ))),
        }
    }

    fn check_row_count(&mut self) {
        if let Some((rows, _)) = self.layout.declared {
            if rows != self.rows_seen {
                self.core.warn(IngestWarning::general(format!(
                    "read {} data rows, dimensions line declares {}",
                    self.rows_seen, rows
                )));
            }
        }
    }
}

/// `rows<TAB>columns`: exactly two non-negative integers
fn parse_dimensions(line: &Line) -> Option<(usize, usize)> {
    let mut cells = line.cells.iter().map(str::trim).filter(|c| !c.is_empty());
    let rows = cells.next()?.parse().ok()?;
    let columns = cells.next()?.parse().ok()?;
    if cells.next().is_some() {
        return None;
    }
    Some((rows, columns))
}

impl RecordSource for MatrixReader<'_> {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<()> {
        self.layout = Layout::default();
        self.pending.clear();
        self.rows_seen = 0;
        self.preamble_lines = 0;
        self.resolvers.reset();
        self.core.open(descriptor)
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        self.core.ensure_open()?;

        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            if self.core.state() == ReaderState::Exhausted {
                return Ok(None);
            }

            let Some(line) = self.core.next_line()? else {
                self.check_row_count();
                return Ok(None);
            };

            if self.layout.header_parsed {
                self.read_row(&line)?;
            } else {
                self.read_preamble(&line)?;
            }
        }
    }

    fn close(&mut self) {
        self.pending.clear();
        self.core.close();
    }

    fn state(&self) -> ReaderState {
        self.core.state()
    }

    fn drain_warnings(&mut self) -> Vec<IngestWarning> {
        self.core.drain_warnings()
    }
}
