//! PostgreSQL backend
//!
//! Builds a `SELECT` with every value bound as a parameter. Identifiers are
//! quoted; map keys are bound too.

use sqlx::{Postgres, QueryBuilder};
use tracing::debug;

use super::PredicateTranslator;
use crate::compile::{CompiledQuery, Condition, FieldRef, PatternKind, Predicate, Value};
use crate::error::{CriteriaError, Result};
use crate::schema::{FieldShape, FieldType};

const BACKEND: &str = "postgres";

/// Element alias inside `unnest(...)` subqueries
const ELEMENT: &str = "elem";

#[derive(Debug, Clone, Default)]
pub struct PostgresTranslator {
    table: Option<String>,
}

impl PostgresTranslator {
    /// Select from the compiled query's entity name
    pub fn new() -> Self {
        Self::default()
    }

    /// Select from `table` instead of the entity name
    pub fn with_table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
        }
    }
}

impl PredicateTranslator for PostgresTranslator {
    type Output = QueryBuilder<'static, Postgres>;

    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn translate(&self, query: &CompiledQuery) -> Result<QueryBuilder<'static, Postgres>> {
        let table = self.table.as_deref().unwrap_or(&query.entity);

        let mut builder: QueryBuilder<'static, Postgres> = QueryBuilder::new("SELECT * FROM ");
        builder.push(quote_ident(table));

        for (i, predicate) in query.predicates.iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            push_predicate(&mut builder, predicate)?;
        }

        debug!(
            table,
            predicates = query.predicates.len(),
            sql = builder.sql(),
            "Translated criteria"
        );
        Ok(builder)
    }
}

fn push_predicate(
    builder: &mut QueryBuilder<'static, Postgres>,
    predicate: &Predicate,
) -> Result<()> {
    let field = &predicate.field;

    if field.shape == FieldShape::Map
        && field.key.is_none()
        && predicate.condition != Condition::IsNull
    {
        return Err(CriteriaError::Unsupported {
            backend: BACKEND,
            what: format!("a condition on map field '{}' without a key", field.name),
        });
    }

    if predicate.negated {
        builder.push("NOT COALESCE((");
    } else {
        builder.push("(");
    }

    match (field.shape, &predicate.condition) {
        (FieldShape::Collection, Condition::IsNull) => {
            builder.push(quote_ident(&field.name));
            builder.push(" IS NULL");
        },
        (FieldShape::Collection, condition) => {
            builder.push("EXISTS (SELECT 1 FROM unnest(");
            builder.push(quote_ident(&field.name));
            builder.push(format!(") AS t({ELEMENT}) WHERE "));
            push_condition(builder, field, condition, Operand::Element);
            builder.push(")");
        },
        (_, condition) => push_condition(builder, field, condition, Operand::Column),
    }

    if predicate.negated {
        builder.push("), FALSE)");
    } else {
        builder.push(")");
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Operand {
    Column,
    Element,
}

/// Push the value expression a condition reads
fn push_operand(
    builder: &mut QueryBuilder<'static, Postgres>,
    field: &FieldRef,
    operand: Operand,
) {
    match (operand, &field.key) {
        (Operand::Element, _) => {
            builder.push(ELEMENT);
        },
        (Operand::Column, Some(key)) => {
            builder.push("(");
            builder.push(quote_ident(&field.name));
            builder.push(" ->> ");
            builder.push_bind(key.clone());
            builder.push(")");
            if let Some(cast) = cast(field.ty) {
                builder.push(cast);
            }
        },
        (Operand::Column, None) => {
            builder.push(quote_ident(&field.name));
        },
    }
}

fn push_condition(
    builder: &mut QueryBuilder<'static, Postgres>,
    field: &FieldRef,
    condition: &Condition,
    operand: Operand,
) {
    let fold_case = field.case_insensitive && field.ty == FieldType::Text;

    match condition {
        Condition::Equals(value) => {
            push_compared(builder, field, operand, fold_case);
            builder.push(" = ");
            push_value(builder, value, fold_case);
        },
        Condition::In(values) if values.is_empty() => {
            builder.push("FALSE");
        },
        Condition::In(values) => {
            push_compared(builder, field, operand, fold_case);
            builder.push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_value(builder, value, fold_case);
            }
            builder.push(")");
        },
        Condition::Compare(comparison, value) => {
            push_operand(builder, field, operand);
            builder.push(format!(" {} ", comparison.sql()));
            push_value(builder, value, false);
        },
        Condition::Between(low, high) => {
            push_operand(builder, field, operand);
            builder.push(" BETWEEN ");
            push_value(builder, low, false);
            builder.push(" AND ");
            push_value(builder, high, false);
        },
        Condition::Pattern(kind, needle) => {
            push_operand(builder, field, operand);
            builder.push(" ILIKE ");
            builder.push_bind(like_pattern(*kind, needle));
        },
        Condition::IsNull => {
            push_operand(builder, field, operand);
            builder.push(" IS NULL");
        },
        Condition::IsTrue => {
            push_operand(builder, field, operand);
            builder.push(" IS TRUE");
        },
        Condition::IsFalse => {
            push_operand(builder, field, operand);
            builder.push(" IS FALSE");
        },
    }
}

fn push_compared(
    builder: &mut QueryBuilder<'static, Postgres>,
    field: &FieldRef,
    operand: Operand,
    fold_case: bool,
) {
    if fold_case {
        builder.push("lower(");
        push_operand(builder, field, operand);
        builder.push(")");
    } else {
        push_operand(builder, field, operand);
    }
}

fn push_value(builder: &mut QueryBuilder<'static, Postgres>, value: &Value, fold_case: bool) {
    match value.clone() {
        Value::Text(text) if fold_case => {
            builder.push("lower(");
            builder.push_bind(text);
            builder.push(")");
        },
        Value::Text(text) => {
            builder.push_bind(text);
        },
        Value::Integer(n) => {
            builder.push_bind(n);
        },
        Value::Float(f) => {
            builder.push_bind(f);
        },
        Value::Boolean(b) => {
            builder.push_bind(b);
        },
        Value::Date(d) => {
            builder.push_bind(d);
        },
    }
}

fn cast(ty: FieldType) -> Option<&'static str> {
    match ty {
        FieldType::Text => None,
        FieldType::Integer => Some("::bigint"),
        FieldType::Float => Some("::double precision"),
        FieldType::Boolean => Some("::boolean"),
        FieldType::Date => Some("::date"),
    }
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Build an `ILIKE` pattern that matches `needle` literally
pub fn like_pattern(kind: PatternKind, needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    match kind {
        PatternKind::Contains => format!("%{escaped}%"),
        PatternKind::Prefix => format!("{escaped}%"),
        PatternKind::Suffix => format!("%{escaped}"),
    }
}
