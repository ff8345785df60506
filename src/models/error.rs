//! Error types for sheetwise.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (bad file, bad dataset, bad config)
//! - I^B materialized: Infrastructure failures (network, timeout, endpoint)
//! - K_i violated: Internal invariant violations (bugs)
//!
//! Note what is *not* here: an unavailable Comments relation and a table
//! recovery miss are ordinary outcomes, not errors.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for sheetwise.
#[derive(Debug, Error)]
pub enum SheetwiseError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED - Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Unsupported file type: {}", .0.display())]
    UnsupportedFile(PathBuf),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED - Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════
    /// The oracle answered, but not in the shape it promised.
    ///
    /// B_i: `partial` still holds a best-effort answer; the executor salvages it.
    #[error("Could not parse oracle output: {partial}")]
    OutputParse { partial: String },

    #[error("Oracle endpoint error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED - Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by the chat-completions endpoint behind an oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl SheetwiseError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this failure still carries a usable answer.
    pub fn salvageable_text(&self) -> Option<&str> {
        match self {
            Self::OutputParse { partial } if !partial.trim().is_empty() => Some(partial.trim()),
            _ => None,
        }
    }
}

/// Result type alias for sheetwise.
pub type Result<T> = std::result::Result<T, SheetwiseError>;
