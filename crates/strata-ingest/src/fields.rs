//! Field registration tables
//!
//! Each record type declares its columns once, as a static [`RecordSchema`]:
//! canonical name, accepted header aliases and value kind. Readers match file
//! headers against these tables with [`normalize_header`], so `Hugo_Symbol`,
//! `hugo symbol` and `HUGO-SYMBOL` all land on the same field.

use chrono::NaiveDate;
use strata_common::{text::normalize_header, EntityKind};
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::model::{FieldValue, RecordKind};

/// Tokens treated as "no value" for non-text fields
const MISSING_TOKENS: &[&str] = &["na", "n/a", "nan", "null", "none", "[notavailable]"];

/// Value kind of a registered field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    /// Resolved to an entity id instead of being stored as a field
    Reference(EntityKind),
}

impl FieldKind {
    fn expected(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Reference(_) => "reference",
        }
    }
}

/// One entry of a field-registration table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub kind: FieldKind,
    pub non_negative: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            aliases: &[],
            kind,
            non_negative: false,
        }
    }

    pub const fn aliases(self, aliases: &'static [&'static str]) -> Self {
        Self { aliases, ..self }
    }

    pub const fn non_negative(self) -> Self {
        Self {
            non_negative: true,
            ..self
        }
    }

    /// Whether a file header names this field
    pub fn matches(&self, normalized_header: &str) -> bool {
        normalize_header(self.name) == normalized_header
            || self
                .aliases
                .iter()
                .any(|alias| normalize_header(alias) == normalized_header)
    }

    /// Convert a raw cell into a typed value.
    ///
    /// Blank cells (and missing-value tokens for non-text fields) produce `None`.
    pub fn convert(&self, raw: &str, line: usize) -> Result<Option<FieldValue>> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(None);
        }
        if self.kind != FieldKind::Text && is_missing(value) {
            return Ok(None);
        }

        let converted = match self.kind {
            FieldKind::Text | FieldKind::Reference(_) => Some(FieldValue::Text(value.to_string())),
            FieldKind::Integer => value.parse::<i64>().ok().map(FieldValue::Integer),
            FieldKind::Float => value.parse::<f64>().ok().map(FieldValue::Float),
            FieldKind::Boolean => parse_bool(value).map(FieldValue::Boolean),
            FieldKind::Date => parse_date(value).map(FieldValue::Date),
        };

        converted
            .map(Some)
            .ok_or_else(|| IngestError::FieldConversion {
                line,
                field: self.name.to_string(),
                value: value.to_string(),
                expected: self.kind.expected(),
            })
    }
}

/// Whether a raw cell is a conventional missing-value marker
pub fn is_missing(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    lowered.is_empty() || MISSING_TOKENS.contains(&lowered.as_str())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Accepts `YYYY-MM-DD` and `YYYYMMDD`
fn parse_date(value: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let year = value[0..4].parse::<i32>().ok()?;
    let month = value[4..6].parse::<u32>().ok()?;
    let day = value[6..8].parse::<u32>().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Static metadata describing one record type
#[derive(Debug)]
pub struct RecordSchema {
    pub kind: RecordKind,
    pub fields: &'static [FieldSpec],
    /// Fields that must carry a value
    pub required: &'static [&'static str],
    /// Entity references that must be resolved
    pub required_refs: &'static [EntityKind],
}

impl RecordSchema {
    /// Find the field a header names
    pub fn find(&self, header: &str) -> Option<&'static FieldSpec> {
        let normalized = normalize_header(header);
        if normalized.is_empty() {
            return None;
        }
        self.fields.iter().find(|spec| spec.matches(&normalized))
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }
}

// ============================================================================
// Registered record types
// ============================================================================

pub static SAMPLE_ATTRIBUTES: RecordSchema = RecordSchema {
    kind: RecordKind::SampleAttributes,
    fields: &[
        FieldSpec::new("sample_id", FieldKind::Reference(EntityKind::Sample))
            .aliases(&["sample", "tumor_sample_barcode", "sample_barcode"]),
        FieldSpec::new("patient_id", FieldKind::Text).aliases(&["patient"]),
        FieldSpec::new("sample_type", FieldKind::Text),
        FieldSpec::new("cancer_type", FieldKind::Text).aliases(&["disease", "tumor_type"]),
        FieldSpec::new("age_at_diagnosis", FieldKind::Integer)
            .aliases(&["age"])
            .non_negative(),
        FieldSpec::new("tumor_purity", FieldKind::Float).aliases(&["purity"]),
        FieldSpec::new("is_metastatic", FieldKind::Boolean).aliases(&["metastatic"]),
        FieldSpec::new("collection_date", FieldKind::Date).aliases(&["date_collected"]),
    ],
    required: &[],
    required_refs: &[EntityKind::Sample],
};

pub static GENE_ANNOTATION: RecordSchema = RecordSchema {
    kind: RecordKind::GeneAnnotation,
    fields: &[
        FieldSpec::new("gene", FieldKind::Reference(EntityKind::Gene)).aliases(&[
            "hugo_symbol",
            "gene_symbol",
            "entrez_gene_id",
            "gene_id",
        ]),
        FieldSpec::new("chromosome", FieldKind::Text).aliases(&["chr", "chrom"]),
        FieldSpec::new("start_position", FieldKind::Integer)
            .aliases(&["start"])
            .non_negative(),
        FieldSpec::new("end_position", FieldKind::Integer)
            .aliases(&["end"])
            .non_negative(),
        FieldSpec::new("strand", FieldKind::Text),
        FieldSpec::new("cytoband", FieldKind::Text),
        FieldSpec::new("biotype", FieldKind::Text).aliases(&["gene_type"]),
        FieldSpec::new("description", FieldKind::Text).aliases(&["gene_description"]),
    ],
    required: &[],
    required_refs: &[EntityKind::Gene],
};

pub static EXPRESSION: RecordSchema = RecordSchema {
    kind: RecordKind::Expression,
    fields: &[FieldSpec::new("value", FieldKind::Float)],
    required: &[],
    required_refs: &[EntityKind::Gene, EntityKind::Sample],
};

pub static MUTATION: RecordSchema = RecordSchema {
    kind: RecordKind::Mutation,
    fields: &[
        FieldSpec::new("hugo_symbol", FieldKind::Text),
        FieldSpec::new("entrez_gene_id", FieldKind::Integer),
        FieldSpec::new("center", FieldKind::Text),
        FieldSpec::new("ncbi_build", FieldKind::Text),
        FieldSpec::new("chromosome", FieldKind::Text),
        FieldSpec::new("start_position", FieldKind::Integer).non_negative(),
        FieldSpec::new("end_position", FieldKind::Integer).non_negative(),
        FieldSpec::new("strand", FieldKind::Text),
        FieldSpec::new("variant_classification", FieldKind::Text),
        FieldSpec::new("variant_type", FieldKind::Text),
        FieldSpec::new("reference_allele", FieldKind::Text),
        FieldSpec::new("tumor_seq_allele1", FieldKind::Text),
        FieldSpec::new("tumor_seq_allele2", FieldKind::Text),
        FieldSpec::new("dbsnp_rs", FieldKind::Text),
        FieldSpec::new("tumor_sample_barcode", FieldKind::Text),
        FieldSpec::new("matched_norm_sample_barcode", FieldKind::Text),
        FieldSpec::new("mutation_status", FieldKind::Text),
        FieldSpec::new("validation_status", FieldKind::Text),
        FieldSpec::new("t_ref_count", FieldKind::Integer).non_negative(),
        FieldSpec::new("t_alt_count", FieldKind::Integer).non_negative(),
        FieldSpec::new("n_ref_count", FieldKind::Integer).non_negative(),
        FieldSpec::new("n_alt_count", FieldKind::Integer).non_negative(),
        FieldSpec::new("hgvsp_short", FieldKind::Text).aliases(&["amino_acid_change"]),
        FieldSpec::new("protein_position", FieldKind::Text),
    ],
    required: &[],
    required_refs: &[EntityKind::Gene, EntityKind::Sample],
};

// ============================================================================
// Header mapping
// ============================================================================

/// Column index -> registered field, built from one header line
#[derive(Debug, Clone)]
pub struct HeaderMap {
    columns: Vec<Option<&'static FieldSpec>>,
    unmatched: Vec<(usize, String)>,
}

impl HeaderMap {
    /// Match every header cell against the schema.
    ///
    /// Unknown headers are remembered but otherwise dropped. When two columns
    /// name the same field the first one wins.
    pub fn build<'h>(
        schema: &'static RecordSchema,
        headers: impl IntoIterator<Item = &'h str>,
    ) -> Self {
        let mut columns = Vec::new();
        let mut unmatched = Vec::new();

        for (index, header) in headers.into_iter().enumerate() {
            match schema.find(header) {
                Some(spec) if columns.iter().flatten().any(|s: &&FieldSpec| s.name == spec.name) => {
                    debug!(column = index, header, field = spec.name, "Duplicate column ignored");
                    columns.push(None);
                },
                Some(spec) => columns.push(Some(spec)),
                None => {
                    columns.push(None);
                    unmatched.push((index, header.trim().to_string()));
                },
            }
        }

        Self { columns, unmatched }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&'static FieldSpec> {
        self.columns.get(index).copied().flatten()
    }

    /// Column index of a registered field
    pub fn position(&self, field: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|spec| spec.is_some_and(|s| s.name == field))
    }

    /// Matched columns in file order
    pub fn matched(&self) -> impl Iterator<Item = (usize, &'static FieldSpec)> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(index, spec)| spec.map(|s| (index, s)))
    }

    /// Headers with no registered field, with their column index
    pub fn unmatched(&self) -> &[(usize, String)] {
        &self.unmatched
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_alias_ignores_case_and_punctuation() {
        assert_eq!(SAMPLE_ATTRIBUTES.find("Tumor_Sample_Barcode").unwrap().name, "sample_id");
        assert_eq!(SAMPLE_ATTRIBUTES.find("AGE").unwrap().name, "age_at_diagnosis");
        assert_eq!(MUTATION.find("Start-Position").unwrap().name, "start_position");
        assert!(MUTATION.find("Custom_Annotation").is_none());
        assert!(MUTATION.find("   ").is_none());
    }

    #[test]
    fn test_convert_typed_values() {
        let age = SAMPLE_ATTRIBUTES.field("age_at_diagnosis").unwrap();
        assert_eq!(age.convert("61", 2).unwrap(), Some(FieldValue::Integer(61)));
        assert_eq!(age.convert("NA", 2).unwrap(), None);
        assert_eq!(age.convert("  ", 2).unwrap(), None);

        let metastatic = SAMPLE_ATTRIBUTES.field("is_metastatic").unwrap();
        assert_eq!(metastatic.convert("Yes", 2).unwrap(), Some(FieldValue::Boolean(true)));

        let date = SAMPLE_ATTRIBUTES.field("collection_date").unwrap();
        assert_eq!(
            date.convert("20240115", 2).unwrap(),
            Some(FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()))
        );
    }

    #[test]
    fn test_convert_text_keeps_missing_tokens() {
        let cancer_type = SAMPLE_ATTRIBUTES.field("cancer_type").unwrap();
        assert_eq!(
            cancer_type.convert("NA", 1).unwrap(),
            Some(FieldValue::Text("NA".to_string()))
        );
    }

    #[test]
    fn test_convert_failure_reports_field_and_line() {
        let start = MUTATION.field("start_position").unwrap();
        match start.convert("12x", 14) {
            Err(IngestError::FieldConversion {
                line,
                field,
                value,
                expected,
            }) => {
                assert_eq!(line, 14);
                assert_eq!(field, "start_position");
                assert_eq!(value, "12x");
                assert_eq!(expected, "integer");
            },
            other => panic!("expected conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_header_map() {
        let headers = ["Sample", "AGE", "Favourite_Colour", "sample_barcode"];
        let map = HeaderMap::build(&SAMPLE_ATTRIBUTES, headers.iter().copied());

        assert_eq!(map.len(), 4);
        assert_eq!(map.field(0).unwrap().name, "sample_id");
        assert_eq!(map.field(1).unwrap().name, "age_at_diagnosis");
        assert!(map.field(2).is_none());
        // second column naming sample_id is ignored
        assert!(map.field(3).is_none());
        assert_eq!(map.position("age_at_diagnosis"), Some(1));
        assert_eq!(map.unmatched(), &[(2, "Favourite_Colour".to_string())]);
        assert_eq!(map.matched().count(), 2);
    }
}
