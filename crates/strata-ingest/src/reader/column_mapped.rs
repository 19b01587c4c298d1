//! Header-driven tabular reader
//!
//! The first non-blank, non-`#` line is the header. Every following line is
//! one record whose fields are mapped by the header through a
//! [`RecordSchema`]. Reference columns are resolved into `gene_id` /
//! `sample_id`.

use tracing::debug;

use crate::error::Result;
use crate::fields::{FieldKind, HeaderMap, RecordSchema};
use crate::model::{IngestWarning, Record, SourceDescriptor};
use crate::resolver::EntityLookup;

use super::{set_reference, Line, ReaderCore, ReaderOptions, ReaderState, RecordSource, Resolvers};

pub struct ColumnMappedReader<'a> {
    core: ReaderCore,
    schema: &'static RecordSchema,
    resolvers: Resolvers<'a>,
    header: Option<HeaderMap>,
}

impl<'a> ColumnMappedReader<'a> {
    pub fn new(
        schema: &'static RecordSchema,
        lookup: &'a dyn EntityLookup,
        options: ReaderOptions,
    ) -> Self {
        Self {
            core: ReaderCore::new(options),
            schema,
            resolvers: Resolvers::new(lookup),
            header: None,
        }
    }

    fn build_record(&mut self, header: &HeaderMap, line: &Line) -> Result<Record> {
        let descriptor = self.core.descriptor()?;
        let mut record = Record::new(self.schema.kind, line.number).for_source(descriptor);

        // Short lines leave trailing fields unset
        for (index, spec) in header.matched() {
            let Some(raw) = line.cell(index) else {
                continue;
            };

            match spec.kind {
                FieldKind::Reference(kind) => {
                    if raw.trim().is_empty() {
                        continue;
                    }
                    let id = self.resolvers.require(kind, raw, line.number)?;
                    set_reference(&mut record, kind, id);
                },
                _ => {
                    if let Some(value) = spec.convert(raw, line.number)? {
                        record.set(spec.name, value);
                    }
                },
            }
        }

        Ok(record)
    }
}

impl RecordSource for ColumnMappedReader<'_> {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<()> {
        self.header = None;
        self.resolvers.reset();
        self.core.open(descriptor)
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let Some(line) = self.core.next_line()? else {
                return Ok(None);
            };
            if line.is_comment() {
                continue;
            }

            let Some(header) = self.header.take() else {
                let header = HeaderMap::build(self.schema, line.cells.iter());
                debug!(
                    location = %self.core.location(),
                    columns = header.len(),
                    matched = header.matched().count(),
                    "Parsed header"
                );
                self.header = Some(header);
                continue;
            };

            let result = self.build_record(&header, &line);
            self.header = Some(header);

            match result {
                Ok(record) => return Ok(Some(record)),
                Err(error) => self.core.skip_or_fail(error)?,
            }
        }
    }

    fn close(&mut self) {
        self.core.close();
    }

    fn state(&self) -> ReaderState {
        self.core.state()
    }

    fn drain_warnings(&mut self) -> Vec<IngestWarning> {
        self.core.drain_warnings()
    }
}
