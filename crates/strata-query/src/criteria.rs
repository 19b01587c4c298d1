//! Backend-independent filter criteria

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CriteriaError, Result};

/// Closed set of filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Evaluation {
    Equals,
    NotEquals,
    In,
    NotIn,
    GreaterThan,
    GreaterThanEquals,
    LessThan,
    LessThanEquals,
    Between,
    Outside,
    Like,
    NotLike,
    StartsWith,
    EndsWith,
    IsNull,
    NotNull,
    IsTrue,
    IsFalse,
}

/// How many values an operator takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Any supplied values are ignored
    None,
    One,
    Two,
    AtLeastOne,
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::None => f.write_str("no"),
            Arity::One => f.write_str("exactly 1"),
            Arity::Two => f.write_str("exactly 2"),
            Arity::AtLeastOne => f.write_str("at least 1"),
        }
    }
}

impl Evaluation {
    pub const ALL: [Evaluation; 18] = [
        Evaluation::Equals,
        Evaluation::NotEquals,
        Evaluation::In,
        Evaluation::NotIn,
        Evaluation::GreaterThan,
        Evaluation::GreaterThanEquals,
        Evaluation::LessThan,
        Evaluation::LessThanEquals,
        Evaluation::Between,
        Evaluation::Outside,
        Evaluation::Like,
        Evaluation::NotLike,
        Evaluation::StartsWith,
        Evaluation::EndsWith,
        Evaluation::IsNull,
        Evaluation::NotNull,
        Evaluation::IsTrue,
        Evaluation::IsFalse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Evaluation::Equals => "EQUALS",
            Evaluation::NotEquals => "NOT_EQUALS",
            Evaluation::In => "IN",
            Evaluation::NotIn => "NOT_IN",
            Evaluation::GreaterThan => "GREATER_THAN",
            Evaluation::GreaterThanEquals => "GREATER_THAN_EQUALS",
            Evaluation::LessThan => "LESS_THAN",
            Evaluation::LessThanEquals => "LESS_THAN_EQUALS",
            Evaluation::Between => "BETWEEN",
            Evaluation::Outside => "OUTSIDE",
            Evaluation::Like => "LIKE",
            Evaluation::NotLike => "NOT_LIKE",
            Evaluation::StartsWith => "STARTS_WITH",
            Evaluation::EndsWith => "ENDS_WITH",
            Evaluation::IsNull => "IS_NULL",
            Evaluation::NotNull => "NOT_NULL",
            Evaluation::IsTrue => "IS_TRUE",
            Evaluation::IsFalse => "IS_FALSE",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Evaluation::IsNull | Evaluation::NotNull | Evaluation::IsTrue | Evaluation::IsFalse => {
                Arity::None
            },
            Evaluation::Between | Evaluation::Outside => Arity::Two,
            Evaluation::In | Evaluation::NotIn => Arity::AtLeastOne,
            _ => Arity::One,
        }
    }

    /// Whether this operator is the complement of another one
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            Evaluation::NotEquals
                | Evaluation::NotIn
                | Evaluation::Outside
                | Evaluation::NotLike
                | Evaluation::NotNull
        )
    }

    /// The operator this one complements, or itself
    pub fn positive(&self) -> Evaluation {
        match self {
            Evaluation::NotEquals => Evaluation::Equals,
            Evaluation::NotIn => Evaluation::In,
            Evaluation::Outside => Evaluation::Between,
            Evaluation::NotLike => Evaluation::Like,
            Evaluation::NotNull => Evaluation::IsNull,
            other => *other,
        }
    }

    /// Check a value count against the operator's arity
    pub fn check_arity(&self, actual: usize) -> Result<()> {
        let expected = self.arity();
        let ok = match expected {
            Arity::None => true,
            Arity::One => actual == 1,
            Arity::Two => actual == 2,
            Arity::AtLeastOne => actual >= 1,
        };
        if ok {
            Ok(())
        } else {
            Err(CriteriaError::Arity {
                operator: *self,
                expected,
                actual,
            })
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Evaluation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace(['-', ' '], "_");
        Evaluation::ALL
            .into_iter()
            .find(|op| op.as_str() == wanted)
            .ok_or_else(|| format!("Unknown operator: {}", s))
    }
}

/// One filter condition as received from a caller.
///
/// Values stay strings until compiled against a schema. Several criteria in
/// one request are combined with AND.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCriteria {
    /// Field name, or `field.key` for map fields
    pub field_path: String,
    pub operator: Evaluation,
    #[serde(default)]
    pub values: Vec<String>,
}

impl QueryCriteria {
    pub fn new<I, S>(field_path: impl Into<String>, operator: Evaluation, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field_path: field_path.into(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn equals(field_path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field_path, Evaluation::Equals, [value.into()])
    }

    pub fn between(
        field_path: impl Into<String>,
        low: impl Into<String>,
        high: impl Into<String>,
    ) -> Self {
        Self::new(field_path, Evaluation::Between, [low.into(), high.into()])
    }

    /// Criteria for a unary operator
    pub fn unary(field_path: impl Into<String>, operator: Evaluation) -> Self {
        Self::new(field_path, operator, Vec::<String>::new())
    }
}
