//! Strata Query Criteria
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! A small filter algebra shared by every storage backend. Callers describe
//! filters as [`QueryCriteria`] (field path, [`Evaluation`] operator, string
//! values), [`compile`] checks them against an [`EntitySchema`], and one
//! [`PredicateTranslator`] per backend turns the result into a native query.
//!
//! # Example
//!
//! ```
//! use strata_query::{
//!     compile, EntitySchema, Evaluation, FieldDef, FieldType, MemoryTranslator,
//!     PredicateTranslator, PostgresTranslator, QueryCriteria,
//! };
//!
//! let schema = EntitySchema::new("samples")
//!     .field(FieldDef::scalar("age", FieldType::Integer))
//!     .field(FieldDef::map("attributes", FieldType::Text));
//!
//! let criteria = vec![
//!     QueryCriteria::between("age", "40", "65"),
//!     QueryCriteria::new("attributes.tissue", Evaluation::Like, ["lung"]),
//! ];
//! let query = compile(&schema, &criteria)?;
//!
//! let predicate = MemoryTranslator::new().translate(&query)?;
//! assert!(predicate.matches(&serde_json::json!({"age": 52, "attributes": {"tissue": "Lung"}})));
//!
//! let sql = PostgresTranslator::new().translate(&query)?;
//! assert!(sql.sql().starts_with("SELECT * FROM \"samples\" WHERE "));
//! # Ok::<(), strata_query::CriteriaError>(())
//! ```

pub mod compile;
pub mod criteria;
pub mod error;
pub mod schema;
pub mod translate;

pub use compile::{compile, CompiledQuery, Condition, Predicate, Value};
pub use criteria::{Arity, Evaluation, QueryCriteria};
pub use error::{CriteriaError, Result};
pub use schema::{EntitySchema, FieldDef, FieldShape, FieldType};
pub use translate::{MemoryPredicate, MemoryTranslator, PostgresTranslator, PredicateTranslator};
