//! JSON document backend
//!
//! Documents are `serde_json::Value` objects keyed by field name. Collections
//! are arrays, maps are nested objects. A missing key and JSON `null` both
//! count as null.

use serde_json::Value as Json;
use std::cmp::Ordering;

use super::PredicateTranslator;
use crate::compile::{CompiledQuery, Condition, FieldRef, PatternKind, Predicate, Value};
use crate::error::Result;
use crate::schema::{FieldShape, FieldType};

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryTranslator;

impl MemoryTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl PredicateTranslator for MemoryTranslator {
    type Output = MemoryPredicate;

    fn backend(&self) -> &'static str {
        "memory"
    }

    fn translate(&self, query: &CompiledQuery) -> Result<MemoryPredicate> {
        Ok(MemoryPredicate {
            predicates: query.predicates.clone(),
        })
    }
}

/// Conjunction evaluated against JSON documents
#[derive(Debug, Clone)]
pub struct MemoryPredicate {
    predicates: Vec<Predicate>,
}

impl MemoryPredicate {
    pub fn matches(&self, document: &Json) -> bool {
        self.predicates.iter().all(|p| evaluate(p, document))
    }

    /// Documents that satisfy every predicate, in input order
    pub fn filter<'d, I>(&self, documents: I) -> Vec<&'d Json>
    where
        I: IntoIterator<Item = &'d Json>,
    {
        documents.into_iter().filter(|d| self.matches(d)).collect()
    }
}

fn evaluate(predicate: &Predicate, document: &Json) -> bool {
    let positive = holds(predicate, lookup(&predicate.field, document));
    positive != predicate.negated
}

fn lookup<'d>(field: &FieldRef, document: &'d Json) -> Option<&'d Json> {
    let value = document.get(&field.name).filter(|v| !v.is_null())?;
    match &field.key {
        Some(key) => value.get(key).filter(|v| !v.is_null()),
        None => Some(value),
    }
}

fn holds(predicate: &Predicate, value: Option<&Json>) -> bool {
    let field = &predicate.field;
    if predicate.condition == Condition::IsNull {
        return value.is_none();
    }
    let Some(value) = value else {
        return false;
    };

    match (field.shape, value) {
        (FieldShape::Collection, Json::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .any(|item| check(field, &predicate.condition, item)),
        // a map addressed without a key only supports IS_NULL
        (FieldShape::Map, _) if field.key.is_none() => false,
        _ => check(field, &predicate.condition, value),
    }
}

fn check(field: &FieldRef, condition: &Condition, json: &Json) -> bool {
    let Some(actual) = from_json(json, field.ty) else {
        return false;
    };

    match condition {
        Condition::Equals(expected) => equal(field, &actual, expected),
        Condition::In(expected) => expected.iter().any(|e| equal(field, &actual, e)),
        Condition::Compare(comparison, bound) => actual
            .compare(bound)
            .is_some_and(|ordering| comparison.holds(ordering)),
        Condition::Between(low, high) => {
            actual.compare(low).is_some_and(|o| o != Ordering::Less)
                && actual.compare(high).is_some_and(|o| o != Ordering::Greater)
        },
        Condition::Pattern(kind, needle) => match &actual {
            Value::Text(text) => {
                let text = text.to_lowercase();
                let needle = needle.to_lowercase();
                match kind {
                    PatternKind::Contains => text.contains(&needle),
                    PatternKind::Prefix => text.starts_with(&needle),
                    PatternKind::Suffix => text.ends_with(&needle),
                }
            },
            _ => false,
        },
        Condition::IsNull => false,
        Condition::IsTrue => actual == Value::Boolean(true),
        Condition::IsFalse => actual == Value::Boolean(false),
    }
}

fn equal(field: &FieldRef, actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Text(a), Value::Text(b)) if field.case_insensitive => {
            a.to_lowercase() == b.to_lowercase()
        },
        _ => actual.compare(expected) == Some(Ordering::Equal),
    }
}

/// Read a JSON scalar as the field's type; strings are coerced the way
/// criteria values are
fn from_json(json: &Json, ty: FieldType) -> Option<Value> {
    match (ty, json) {
        (FieldType::Text, Json::String(s)) => Some(Value::Text(s.clone())),
        (FieldType::Text, Json::Number(n)) => Some(Value::Text(n.to_string())),
        (FieldType::Integer, Json::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Value::Integer),
        (FieldType::Float, Json::Number(n)) => n.as_f64().map(Value::Float),
        (FieldType::Boolean, Json::Bool(b)) => Some(Value::Boolean(*b)),
        (_, Json::String(s)) => Value::coerce(s, ty),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::criteria::{Evaluation, QueryCriteria};
    use crate::schema::{EntitySchema, FieldDef};
    use serde_json::json;

    fn schema() -> EntitySchema {
        EntitySchema::new("mutations")
            .field(FieldDef::scalar("symbol", FieldType::Text).case_insensitive())
            .field(FieldDef::scalar("start", FieldType::Integer))
            .field(FieldDef::collection("samples", FieldType::Text))
            .field(FieldDef::map("attributes", FieldType::Text))
    }

    fn predicate(criteria: Vec<QueryCriteria>) -> MemoryPredicate {
        let query = compile(&schema(), &criteria).unwrap();
        MemoryTranslator::new().translate(&query).unwrap()
    }

    #[test]
    fn test_case_insensitive_equality() {
        let p = predicate(vec![QueryCriteria::equals("symbol", "tp53")]);
        assert!(p.matches(&json!({"symbol": "TP53"})));
        assert!(!p.matches(&json!({"symbol": "TP63"})));
    }

    #[test]
    fn test_collection_is_any_match() {
        let p = predicate(vec![QueryCriteria::equals("samples", "S2")]);
        assert!(p.matches(&json!({"samples": ["S1", "S2"]})));
        assert!(!p.matches(&json!({"samples": ["S1"]})));
        assert!(!p.matches(&json!({"samples": []})));

        let not = predicate(vec![QueryCriteria::new(
            "samples",
            Evaluation::NotEquals,
            ["S2"],
        )]);
        assert!(!not.matches(&json!({"samples": ["S1", "S2"]})));
        assert!(not.matches(&json!({"samples": ["S1"]})));
    }

    #[test]
    fn test_map_key_lookup() {
        let p = predicate(vec![QueryCriteria::new(
            "attributes.tissue",
            Evaluation::StartsWith,
            ["LU"],
        )]);
        assert!(p.matches(&json!({"attributes": {"tissue": "lung"}})));
        assert!(!p.matches(&json!({"attributes": {"site": "lung"}})));
        assert!(!p.matches(&json!({})));
    }

    #[test]
    fn test_negation_includes_missing_values() {
        let p = predicate(vec![QueryCriteria::new("start", Evaluation::Outside, ["10", "20"])]);
        assert!(p.matches(&json!({"start": 5})));
        assert!(!p.matches(&json!({"start": 15})));
        assert!(p.matches(&json!({"start": null})));
        assert!(p.matches(&json!({})));
    }

    #[test]
    fn test_integral_floats_read_as_integers() {
        let p = predicate(vec![QueryCriteria::equals("start", "5")]);
        assert!(p.matches(&json!({"start": 5})));
        assert!(p.matches(&json!({"start": 5.0})));
        assert!(!p.matches(&json!({"start": 5.5})));

        let range = predicate(vec![QueryCriteria::between("start", "4", "6")]);
        assert!(range.matches(&json!({"start": 6.0})));
    }

    #[test]
    fn test_filter_keeps_order() {
        let docs = vec![
            json!({"symbol": "A", "start": 1}),
            json!({"symbol": "B", "start": 50}),
            json!({"symbol": "C", "start": 5}),
        ];
        let p = predicate(vec![QueryCriteria::new("start", Evaluation::LessThan, ["10"])]);
        let symbols: Vec<_> = p.filter(&docs).iter().map(|d| d["symbol"].clone()).collect();
        assert_eq!(symbols, vec![json!("A"), json!("C")]);
    }
}
