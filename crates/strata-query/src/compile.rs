//! Criteria -> typed predicates
//!
//! Compilation resolves field paths, checks arity and operator/type
//! compatibility and coerces string values to the field's type. Every error
//! surfaces here, before a backend sees the query.

use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

use crate::criteria::{Evaluation, QueryCriteria};
use crate::error::{CriteriaError, Result};
use crate::schema::{EntitySchema, FieldShape, FieldType};

/// A typed comparison value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl Value {
    /// Coerce a raw string to `ty`
    pub fn coerce(raw: &str, ty: FieldType) -> Option<Value> {
        let trimmed = raw.trim();
        match ty {
            FieldType::Text => Some(Value::Text(raw.to_string())),
            FieldType::Integer => trimmed.parse().ok().map(Value::Integer),
            FieldType::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float),
            FieldType::Boolean => match trimmed.to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(Value::Boolean(true)),
                "false" | "0" | "no" => Some(Value::Boolean(false)),
                _ => None,
            },
            FieldType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .map(Value::Date),
        }
    }

    /// Ordering between two values of the same type
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Comparison {
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Greater => ordering == Ordering::Greater,
            Comparison::GreaterOrEqual => ordering != Ordering::Less,
            Comparison::Less => ordering == Ordering::Less,
            Comparison::LessOrEqual => ordering != Ordering::Greater,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Contains,
    Prefix,
    Suffix,
}

/// The positive form of a criterion
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    In(Vec<Value>),
    Compare(Comparison, Value),
    /// Inclusive on both ends
    Between(Value, Value),
    /// Case-insensitive; the needle is matched literally
    Pattern(PatternKind, String),
    IsNull,
    IsTrue,
    IsFalse,
}

/// The field a predicate reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub name: String,
    /// Map key for `field.key` paths
    pub key: Option<String>,
    pub ty: FieldType,
    pub shape: FieldShape,
    pub case_insensitive: bool,
}

/// One compiled criterion.
///
/// `negated` predicates match exactly the rows their positive form does not,
/// including rows where the field is null or absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: FieldRef,
    pub condition: Condition,
    pub negated: bool,
}

/// Conjunction of predicates over one entity
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub entity: String,
    pub predicates: Vec<Predicate>,
}

/// Compile criteria against an entity schema
pub fn compile(schema: &EntitySchema, criteria: &[QueryCriteria]) -> Result<CompiledQuery> {
    let predicates = criteria
        .iter()
        .map(|c| compile_one(schema, c))
        .collect::<Result<Vec<_>>>()?;

    debug!(entity = %schema.name, predicates = predicates.len(), "Compiled criteria");

    Ok(CompiledQuery {
        entity: schema.name.clone(),
        predicates,
    })
}

fn compile_one(schema: &EntitySchema, criteria: &QueryCriteria) -> Result<Predicate> {
    let path = criteria.field_path.trim();
    let (def, key) = schema
        .resolve(path)
        .ok_or_else(|| CriteriaError::UnknownField(path.to_string()))?;

    let operator = criteria.operator;
    operator.check_arity(criteria.values.len())?;

    let field = FieldRef {
        name: def.name.clone(),
        key: key.map(str::to_string),
        ty: def.ty,
        shape: def.shape,
        case_insensitive: def.case_insensitive,
    };

    if field.shape == FieldShape::Map
        && field.key.is_none()
        && !matches!(operator.positive(), Evaluation::IsNull)
    {
        return Err(CriteriaError::type_mismatch(
            path,
            format!("map field needs a key (`{}.<key>`) for {}", def.name, operator),
        ));
    }

    let values = &criteria.values;
    let condition = match operator {
        Evaluation::Equals | Evaluation::NotEquals => {
            Condition::Equals(coerce(&field, path, &values[0])?)
        },
        Evaluation::In | Evaluation::NotIn => Condition::In(
            values
                .iter()
                .map(|v| coerce(&field, path, v))
                .collect::<Result<Vec<_>>>()?,
        ),
        Evaluation::GreaterThan => compare(&field, path, operator, Comparison::Greater, &values[0])?,
        Evaluation::GreaterThanEquals => {
            compare(&field, path, operator, Comparison::GreaterOrEqual, &values[0])?
        },
        Evaluation::LessThan => compare(&field, path, operator, Comparison::Less, &values[0])?,
        Evaluation::LessThanEquals => {
            compare(&field, path, operator, Comparison::LessOrEqual, &values[0])?
        },
        Evaluation::Between | Evaluation::Outside => {
            require_ordinal(&field, path, operator)?;
            Condition::Between(
                coerce(&field, path, &values[0])?,
                coerce(&field, path, &values[1])?,
            )
        },
        Evaluation::Like | Evaluation::NotLike => {
            pattern(&field, path, operator, PatternKind::Contains, &values[0])?
        },
        Evaluation::StartsWith => pattern(&field, path, operator, PatternKind::Prefix, &values[0])?,
        Evaluation::EndsWith => pattern(&field, path, operator, PatternKind::Suffix, &values[0])?,
        Evaluation::IsNull | Evaluation::NotNull => Condition::IsNull,
        Evaluation::IsTrue | Evaluation::IsFalse => {
            if field.ty != FieldType::Boolean {
                return Err(CriteriaError::type_mismatch(
                    path,
                    format!("{} needs a boolean field, found {}", operator, field.ty.as_str()),
                ));
            }
            if operator == Evaluation::IsTrue {
                Condition::IsTrue
            } else {
                Condition::IsFalse
            }
        },
    };

    Ok(Predicate {
        field,
        condition,
        negated: operator.is_negated(),
    })
}

fn coerce(field: &FieldRef, path: &str, raw: &str) -> Result<Value> {
    Value::coerce(raw, field.ty).ok_or_else(|| {
        CriteriaError::type_mismatch(
            path,
            format!("'{}' is not a valid {}", raw, field.ty.as_str()),
        )
    })
}

fn require_ordinal(field: &FieldRef, path: &str, operator: Evaluation) -> Result<()> {
    if field.ty.is_ordinal() {
        Ok(())
    } else {
        Err(CriteriaError::type_mismatch(
            path,
            format!("{} needs an ordered field, found {}", operator, field.ty.as_str()),
        ))
    }
}

fn compare(
    field: &FieldRef,
    path: &str,
    operator: Evaluation,
    comparison: Comparison,
    raw: &str,
) -> Result<Condition> {
    require_ordinal(field, path, operator)?;
    Ok(Condition::Compare(comparison, coerce(field, path, raw)?))
}

fn pattern(
    field: &FieldRef,
    path: &str,
    operator: Evaluation,
    kind: PatternKind,
    raw: &str,
) -> Result<Condition> {
    if field.ty != FieldType::Text {
        return Err(CriteriaError::type_mismatch(
            path,
            format!("{} needs a text field, found {}", operator, field.ty.as_str()),
        ));
    }
    Ok(Condition::Pattern(kind, raw.to_string()))
}
