//! sheetwise - Natural-language questions over spreadsheet data.
//!
//! ## Architecture
//!
//! An uploaded sheet is split once into two relations, each bound to its own
//! tabular oracle:
//! - **Main**: every column except the free-text comment column
//! - **Comments**: the identity column plus the comment column (optional)
//!
//! ## Query flow
//!
//! Classify (target + shape) → Enrich (instructions + glossary) →
//! Execute (routed oracle, salvage on parse failure) → Normalize (table or text)
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Compile-time enforced invariants (types, enums)
//! - B_i (Beliefs): Runtime fallible operations (Result, Option)
//! - I^R (Resolvable): User-configurable parameters
//! - I^B (Bounded): Oracle uncertainties (salvage, timeout, retry)

pub mod client;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod transcript;

// Re-exports for convenience
pub use client::{HealthCheckResult, HealthStatus, LlmClient};
pub use models::{Answer, Config, Dataset, Result, SheetwiseError, Table};
pub use oracle::{LlmOracleBinder, OracleBinder, TabularOracle};
pub use pipeline::{Session, SessionOptions, classify, load_dataset, normalize, split};
pub use transcript::{Transcript, TranscriptEntry};
