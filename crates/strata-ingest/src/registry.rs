//! Data type -> processor registry
//!
//! Built once from a static table and passed by reference to the pipeline.

use std::collections::HashMap;

use crate::error::{IngestError, Result};
use crate::fields::{RecordSchema, EXPRESSION, GENE_ANNOTATION, MUTATION, SAMPLE_ATTRIBUTES};
use crate::reader::{
    AnnotatedLineReader, ColumnMappedReader, MatrixReader, ReaderOptions, RecordSource,
};
use crate::resolver::EntityLookup;
use crate::validator::SchemaValidator;

/// Line-to-record strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStrategy {
    /// Header + one record per line
    ColumnMapped,
    /// One record per (row, sample column) cell
    Matrix,
    /// One record per line with gene and sample resolved, extra columns kept
    AnnotatedLine,
}

/// How one data type is read and checked
#[derive(Debug, Clone, Copy)]
pub struct ProcessorSpec {
    pub data_type: &'static str,
    pub reader: ReaderStrategy,
    pub schema: &'static RecordSchema,
}

impl ProcessorSpec {
    /// A fresh reader for one job
    pub fn reader<'a>(
        &self,
        lookup: &'a dyn EntityLookup,
        options: ReaderOptions,
    ) -> Box<dyn RecordSource + 'a> {
        match self.reader {
            ReaderStrategy::ColumnMapped => {
                Box::new(ColumnMappedReader::new(self.schema, lookup, options))
            },
            ReaderStrategy::Matrix => Box::new(MatrixReader::new(self.schema, lookup, options)),
            ReaderStrategy::AnnotatedLine => {
                Box::new(AnnotatedLineReader::new(self.schema, lookup, options))
            },
        }
    }

    pub fn validator(&self) -> SchemaValidator {
        SchemaValidator::new(self.schema)
    }
}

static STANDARD_PROCESSORS: &[ProcessorSpec] = &[
    ProcessorSpec {
        data_type: "gene_expression",
        reader: ReaderStrategy::Matrix,
        schema: &EXPRESSION,
    },
    ProcessorSpec {
        data_type: "mutation",
        reader: ReaderStrategy::AnnotatedLine,
        schema: &MUTATION,
    },
    ProcessorSpec {
        data_type: "sample_attributes",
        reader: ReaderStrategy::ColumnMapped,
        schema: &SAMPLE_ATTRIBUTES,
    },
    ProcessorSpec {
        data_type: "gene_annotation",
        reader: ReaderStrategy::ColumnMapped,
        schema: &GENE_ANNOTATION,
    },
];

#[derive(Debug, Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, ProcessorSpec>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in data type
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for spec in STANDARD_PROCESSORS {
            registry.register(*spec);
        }
        registry
    }

    /// Add or replace the processor for `spec.data_type`
    pub fn register(&mut self, spec: ProcessorSpec) {
        self.processors.insert(spec.data_type.to_string(), spec);
    }

    pub fn get(&self, data_type: &str) -> Result<&ProcessorSpec> {
        self.processors
            .get(data_type.trim())
            .ok_or_else(|| IngestError::UnknownDataType(data_type.to_string()))
    }

    pub fn data_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::RecordKind;

    #[test]
    fn test_standard_table() {
        let registry = ProcessorRegistry::standard();
        assert_eq!(
            registry.data_types(),
            vec!["gene_annotation", "gene_expression", "mutation", "sample_attributes"]
        );

        let expression = registry.get("gene_expression").unwrap();
        assert_eq!(expression.reader, ReaderStrategy::Matrix);
        assert_eq!(expression.schema.kind, RecordKind::Expression);
        assert_eq!(registry.get("mutation").unwrap().reader, ReaderStrategy::AnnotatedLine);
    }

    #[test]
    fn test_unknown_data_type() {
        let registry = ProcessorRegistry::standard();
        assert!(matches!(
            registry.get("copy_number"),
            Err(IngestError::UnknownDataType(t)) if t == "copy_number"
        ));
    }

    #[test]
    fn test_register_overrides() {
        let mut registry = ProcessorRegistry::standard();
        registry.register(ProcessorSpec {
            data_type: "mutation",
            reader: ReaderStrategy::ColumnMapped,
            schema: &MUTATION,
        });
        assert_eq!(registry.get("mutation").unwrap().reader, ReaderStrategy::ColumnMapped);
    }
}
