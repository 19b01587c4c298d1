//! Per-backend translation of compiled queries
//!
//! Each backend gets one pure translator. Translators never filter on the
//! client side: what they return is the backend's native form of the whole
//! conjunction.

pub mod memory;
pub mod sql;

pub use memory::{MemoryPredicate, MemoryTranslator};
pub use sql::PostgresTranslator;

use crate::compile::CompiledQuery;
use crate::error::Result;

/// Compiles a [`CompiledQuery`] into a backend's native query form
pub trait PredicateTranslator: Send + Sync {
    type Output;

    /// Short backend name used in errors and logs
    fn backend(&self) -> &'static str;

    fn translate(&self, query: &CompiledQuery) -> Result<Self::Output>;
}
