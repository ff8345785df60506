//! Core data models for sheetwise.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Concrete types with compile-time guarantees
//! - B_i (Beliefs): Wrapped in Result/Option
//! - I^R (Resolvable): Config parameters
//! - I^B (Bounded): Error variants with fallback strategies

mod config;
mod dataset;
mod error;
mod query;
mod table;

pub use config::*;
pub use dataset::*;
pub use error::*;
pub use query::*;
pub use table::*;
