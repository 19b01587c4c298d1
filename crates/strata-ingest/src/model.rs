//! Records, source descriptors and job bookkeeping types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_common::EntityId;
use uuid::Uuid;

/// A typed scalar value on a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Which record type a reader produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// One matrix cell (feature x sample)
    Expression,
    /// One annotated mutation call
    Mutation,
    SampleAttributes,
    GeneAnnotation,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Expression => "expression",
            RecordKind::Mutation => "mutation",
            RecordKind::SampleAttributes => "sample_attributes",
            RecordKind::GeneAnnotation => "gene_annotation",
        }
    }
}

/// One normalized unit of ingested data on its way to storage.
///
/// The entity ids are weak references: they identify rows the repository
/// already holds and are never dereferenced here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub kind: RecordKind,
    pub gene_id: Option<EntityId>,
    pub sample_id: Option<EntityId>,
    pub data_set_id: Option<EntityId>,
    pub data_source_id: Option<Uuid>,
    /// 1-based line in the source file
    pub line: usize,
    pub fields: BTreeMap<String, FieldValue>,
    /// Columns without a registered field, kept verbatim
    pub attributes: BTreeMap<String, String>,
}

impl Record {
    pub fn new(kind: RecordKind, line: usize) -> Self {
        Self {
            kind,
            gene_id: None,
            sample_id: None,
            data_set_id: None,
            data_source_id: None,
            line,
            fields: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Attach the job's data set and source identifiers
    pub fn for_source(mut self, descriptor: &SourceDescriptor) -> Self {
        self.data_set_id = descriptor.data_set_id;
        self.data_source_id = Some(descriptor.id);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }
}

/// Identifies one job's input and its metadata associations.
///
/// Built once per job and never mutated during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: Uuid,
    /// Data type key used to pick a processor, e.g. "gene_expression"
    pub source_type: String,
    /// Plain path or `file://` URI; `.gz` files are decompressed on the fly
    pub location: String,
    pub data_set_id: Option<EntityId>,
    pub format_id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl SourceDescriptor {
    pub fn new(source_type: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_type: source_type.into(),
            location: location.into(),
            data_set_id: None,
            format_id: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_data_set(mut self, data_set_id: EntityId) -> Self {
        self.data_set_id = Some(data_set_id);
        self
    }

    pub fn with_format(mut self, format_id: impl Into<String>) -> Self {
        self.format_id = Some(format_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Terminal status of a job, persisted with its descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// What gets recorded about a finished job for audit and idempotence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub records_written: usize,
    pub warnings: usize,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// A skipped line, column or record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestWarning {
    pub line: Option<usize>,
    pub message: String,
}

impl IngestWarning {
    pub fn at_line(line: usize, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            line: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for IngestWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serde_roundtrip_keeps_types() {
        let descriptor = SourceDescriptor::new("mutation", "/tmp/data.maf")
            .with_data_set(EntityId(12));
        let mut record = Record::new(RecordKind::Mutation, 7).for_source(&descriptor);
        record.gene_id = Some(EntityId(672));
        record.set("start_position", FieldValue::Integer(43044295));
        record.set("t_vaf", FieldValue::Float(0.25));
        record.set(
            "collected",
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        );
        record
            .attributes
            .insert("Custom_Column".to_string(), "x".to_string());

        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.data_source_id, Some(descriptor.id));
        assert_eq!(back.data_set_id, Some(EntityId(12)));
    }

    #[test]
    fn test_warning_display() {
        assert_eq!(
            IngestWarning::at_line(4, "skipped").to_string(),
            "line 4: skipped"
        );
        assert_eq!(IngestWarning::general("header").to_string(), "header");
    }
}
