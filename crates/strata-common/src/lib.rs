//! Strata Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and utilities used by the strata ingestion and query crates.
//!
//! - **Types**: entity identifiers and entity kinds shared by readers and repositories
//! - **Text**: header and token normalisation
//! - **Logging**: `tracing` subscriber initialisation
//!
//! # Example
//!
//! ```
//! use strata_common::text::normalize_header;
//!
//! assert_eq!(normalize_header("Tumor_Sample-Barcode "), "tumorsamplebarcode");
//! ```

pub mod logging;
pub mod text;
pub mod types;

pub use types::{EntityId, EntityKind};
