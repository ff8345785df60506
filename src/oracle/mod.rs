//! Oracle boundary: the external model-backed reasoning service.
//!
//! Epistemic foundation:
//! - K_i: An oracle is bound to exactly one relation, via that relation's CSV file
//! - K_i: `run` takes `&mut self`; one oracle never serves two queries at once
//! - B_i: An oracle may answer outside its own format → `SheetwiseError::OutputParse`
//! - I^B: Everything else an oracle raises is a hard failure
//!
//! Any model-backed tabular-reasoning service can stand behind these traits.

mod llm_oracle;

pub use llm_oracle::*;

use crate::models::{RelationKind, Result};
use async_trait::async_trait;
use std::path::Path;

/// A reasoning oracle bound to one relation.
#[async_trait]
pub trait TabularOracle: Send {
    /// Answer `prompt` against the bound relation.
    ///
    /// Returns `SheetwiseError::OutputParse { partial }` when the oracle's
    /// own formatting expectations were violated but text is available.
    async fn run(&mut self, prompt: &str) -> Result<String>;
}

/// Factory binding relations to oracles.
///
/// Binding is expensive; callers bind once per dataset and keep the handle.
#[async_trait]
pub trait OracleBinder: Send + Sync {
    async fn bind(&self, kind: RelationKind, csv_path: &Path) -> Result<Box<dyn TabularOracle>>;
}
