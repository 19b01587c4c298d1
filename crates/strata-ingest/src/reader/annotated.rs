//! MAF-style annotated line reader
//!
//! `#` lines are comments. The header must name at least one gene column
//! (`Hugo_Symbol` or `Entrez_Gene_Id`) and the `Tumor_Sample_Barcode` column.
//! Each data line resolves its gene and sample first; well-known columns are
//! typed through the schema and every other column is kept as an opaque
//! attribute.

use strata_common::{EntityId, EntityKind};
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::fields::{HeaderMap, RecordSchema};
use crate::model::{IngestWarning, Record, SourceDescriptor};
use crate::resolver::EntityLookup;

use super::{Line, ReaderCore, ReaderOptions, ReaderState, RecordSource, Resolvers};

const GENE_SYMBOL: &str = "hugo_symbol";
const GENE_ENTREZ: &str = "entrez_gene_id";
const SAMPLE_BARCODE: &str = "tumor_sample_barcode";

/// Column positions of the identifying columns
#[derive(Debug, Clone)]
struct Columns {
    header: HeaderMap,
    symbol: Option<usize>,
    entrez: Option<usize>,
    sample: usize,
}

pub struct AnnotatedLineReader<'a> {
    core: ReaderCore,
    schema: &'static RecordSchema,
    resolvers: Resolvers<'a>,
    columns: Option<Columns>,
}

impl<'a> AnnotatedLineReader<'a> {
    pub fn new(
        schema: &'static RecordSchema,
        lookup: &'a dyn EntityLookup,
        options: ReaderOptions,
    ) -> Self {
        Self {
            core: ReaderCore::new(options),
            schema,
            resolvers: Resolvers::new(lookup),
            columns: None,
        }
    }

    fn parse_header(&self, line: &Line) -> Result<Columns> {
        let header = HeaderMap::build(self.schema, line.cells.iter());
        let symbol = header.position(GENE_SYMBOL);
        let entrez = header.position(GENE_ENTREZ);

        if symbol.is_none() && entrez.is_none() {
            return Err(self.malformed("no Hugo_Symbol or Entrez_Gene_Id column"));
        }
        let sample = header
            .position(SAMPLE_BARCODE)
            .ok_or_else(|| self.malformed("no Tumor_Sample_Barcode column"))?;

        debug!(
            location = %self.core.location(),
            typed = header.matched().count(),
            extra = header.unmatched().len(),
            "Parsed MAF header"
        );

        Ok(Columns {
            header,
            symbol,
            entrez,
            sample,
        })
    }

    fn malformed(&self, reason: &str) -> IngestError {
        IngestError::MalformedHeader {
            location: self.core.location().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Entrez id when present and non-zero, otherwise the symbol
    fn resolve_gene(&mut self, columns: &Columns, line: &Line) -> Result<EntityId> {
        let entrez = columns
            .entrez
            .and_then(|i| line.cell(i))
            .map(str::trim)
            .filter(|raw| raw.parse::<i64>().is_ok_and(|id| id != 0));
        let symbol = columns
            .symbol
            .and_then(|i| line.cell(i))
            .map(str::trim)
            .filter(|raw| !raw.is_empty());

        if let Some(entrez) = entrez {
            if let Some(id) = self.resolvers.resolve(EntityKind::Gene, entrez)? {
                return Ok(id);
            }
        }

        let token = symbol.or(entrez).unwrap_or_default();
        self.resolvers.require(EntityKind::Gene, token, line.number)
    }

    fn build_record(&mut self, columns: &Columns, line: &Line) -> Result<Record> {
        let gene_id = self.resolve_gene(columns, line)?;
        let barcode = line.cell(columns.sample).unwrap_or_default();
        let sample_id = self.resolvers.require(EntityKind::Sample, barcode, line.number)?;

        let descriptor = self.core.descriptor()?;
        let mut record = Record::new(self.schema.kind, line.number).for_source(descriptor);
        record.gene_id = Some(gene_id);
        record.sample_id = Some(sample_id);

        for (index, spec) in columns.header.matched() {
            if let Some(value) = line.cell(index).map(|raw| spec.convert(raw, line.number)) {
                if let Some(value) = value? {
                    record.set(spec.name, value);
                }
            }
        }

        for (index, name) in columns.header.unmatched() {
            if let Some(raw) = line.cell(*index).filter(|raw| !raw.trim().is_empty()) {
                record.attributes.insert(name.clone(), raw.to_string());
            }
        }

        Ok(record)
    }
}

impl RecordSource for AnnotatedLineReader<'_> {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<()> {
        self.columns = None;
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

            let Some(columns) = self.columns.take() else {
                self.columns = Some(self.parse_header(&line)?);
                continue;
            };

            let result = self.build_record(&columns, &line);
            self.columns = Some(columns);

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
