//! Record validation
//!
//! Validators never mutate records. They return every violation found so the
//! caller can report them together.

use serde::{Deserialize, Serialize};
use strata_common::EntityKind;

use crate::fields::RecordSchema;
use crate::model::{FieldValue, Record};

/// One failed rule on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Checks a record against the rules of its type
pub trait Validator: Send + Sync {
    /// Returns all violations; an empty list means the record is valid
    fn validate(&self, record: &Record) -> Vec<Violation>;
}

/// Validator driven by a [`RecordSchema`]
///
/// Rules:
/// - required fields carry a value
/// - required entity references are resolved
/// - floats are finite
/// - fields flagged non-negative are >= 0
/// - `start_position <= end_position` when both are present
#[derive(Debug, Clone, Copy)]
pub struct SchemaValidator {
    schema: &'static RecordSchema,
}

impl SchemaValidator {
    pub fn new(schema: &'static RecordSchema) -> Self {
        Self { schema }
    }
}

impl Validator for SchemaValidator {
    fn validate(&self, record: &Record) -> Vec<Violation> {
        let mut violations = Vec::new();

        for kind in self.schema.required_refs {
            let resolved = match kind {
                EntityKind::Gene => record.gene_id.is_some(),
                EntityKind::Sample => record.sample_id.is_some(),
            };
            if !resolved {
                violations.push(Violation::new(
                    kind.as_str(),
                    format!("{} reference is required", kind),
                ));
            }
        }

        for name in self.schema.required {
            if record.get(name).is_none() {
                violations.push(Violation::new(*name, "value is required"));
            }
        }

        for (name, value) in &record.fields {
            match value {
                FieldValue::Float(f) if !f.is_finite() => {
                    violations.push(Violation::new(name.as_str(), "must be finite"));
                },
                FieldValue::Float(f) if *f < 0.0 && self.is_non_negative(name) => {
                    violations.push(Violation::new(name.as_str(), "must not be negative"));
                },
                FieldValue::Integer(i) if *i < 0 && self.is_non_negative(name) => {
                    violations.push(Violation::new(name.as_str(), "must not be negative"));
                },
                _ => {},
            }
        }

        if let (Some(start), Some(end)) = (
            record.get("start_position").and_then(FieldValue::as_integer),
            record.get("end_position").and_then(FieldValue::as_integer),
        ) {
            if start > end {
                violations.push(Violation::new(
                    "end_position",
                    format!("end {} is before start {}", end, start),
                ));
            }
        }

        violations
    }
}

impl SchemaValidator {
    fn is_non_negative(&self, name: &str) -> bool {
        self.schema.field(name).is_some_and(|spec| spec.non_negative)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fields::{EXPRESSION, MUTATION};
    use crate::model::RecordKind;
    use strata_common::EntityId;

    fn mutation() -> Record {
        let mut record = Record::new(RecordKind::Mutation, 2);
        record.gene_id = Some(EntityId(7157));
        record.sample_id = Some(EntityId(1));
        record
    }

    #[test]
    fn test_valid_record_has_no_violations() {
        let mut record = mutation();
        record.set("start_position", FieldValue::Integer(100));
        record.set("end_position", FieldValue::Integer(100));
        assert!(SchemaValidator::new(&MUTATION).validate(&record).is_empty());
    }

    #[test]
    fn test_missing_references_reported_together() {
        let record = Record::new(RecordKind::Expression, 3);
        let violations = SchemaValidator::new(&EXPRESSION).validate(&record);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].field, "gene");
        assert_eq!(violations[1].field, "sample");
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let mut record = Record::new(RecordKind::Expression, 3);
        record.gene_id = Some(EntityId(1));
        record.sample_id = Some(EntityId(2));
        record.set("value", FieldValue::Float(f64::NAN));

        let violations = SchemaValidator::new(&EXPRESSION).validate(&record);
        assert_eq!(violations, vec![Violation::new("value", "must be finite")]);
    }

    #[test]
    fn test_negative_count_and_inverted_range() {
        let mut record = mutation();
        record.set("t_alt_count", FieldValue::Integer(-1));
        record.set("start_position", FieldValue::Integer(200));
        record.set("end_position", FieldValue::Integer(150));

        let violations = SchemaValidator::new(&MUTATION).validate(&record);
        let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"t_alt_count"));
        assert!(fields.contains(&"end_position"));
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_validation_does_not_mutate() {
        let mut record = mutation();
        record.set("t_alt_count", FieldValue::Integer(-5));
        let before = record.clone();
        let _ = SchemaValidator::new(&MUTATION).validate(&record);
        assert_eq!(record, before);
    }
}
