//! Per-query value types.
//!
//! K_i: These types represent the data flow of a single query:
//! Intent → EnrichedPrompt → ExecutionResult → NormalizedResponse.
//! None of them outlive the query that produced them.

use super::{RelationKind, Table};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Expected shape of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Tabular output (CSV requested)
    Structured,
    /// Prose
    NaturalLanguage,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Structured => write!(f, "structured"),
            Shape::NaturalLanguage => write!(f, "natural_language"),
        }
    }
}

/// What a query is asking for.
///
/// K_i: Derived from the query string alone; recomputed per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub target: RelationKind,
    pub shape: Shape,
}

/// Final instruction payload sent to an oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedPrompt(String);

impl EnrichedPrompt {
    pub(crate) fn new(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnrichedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw oracle text for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub text: String,
    pub shape: Shape,
    /// Text was salvaged from an output-parse failure
    pub recovered: bool,
}

impl ExecutionResult {
    pub fn answered(text: impl Into<String>, shape: Shape) -> Self {
        Self {
            text: text.into(),
            shape,
            recovered: false,
        }
    }

    pub fn salvaged(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            shape: Shape::NaturalLanguage,
            recovered: true,
        }
    }
}

/// Display-ready response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    /// Cleaned oracle text
    pub display_text: String,
    /// Recovered table, if any strategy succeeded
    pub table: Option<Table>,
    /// Prose surrounding the recovered table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
}

/// Everything the sink needs for one answered query.
#[derive(Debug, Clone)]
pub struct Answer {
    pub query: String,
    pub intent: Intent,
    pub response: NormalizedResponse,
    pub recovered: bool,
}
