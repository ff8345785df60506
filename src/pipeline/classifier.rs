//! Intent classifier.
//!
//! Literal substring matching over the lower-cased query. The keyword sets
//! below are the whole behavior; changing them changes routing.

use crate::models::{Intent, RelationKind, Shape};

/// Any of these routes a query to the Comments relation.
pub const COMMENT_KEYWORDS: &[&str] = &["comment", "feedback"];

/// Any of these asks for tabular output.
pub const STRUCTURED_KEYWORDS: &[&str] = &[
    "list",
    "show",
    "filter",
    "table",
    "display",
    "csv",
    "tabular",
    "structured",
    "answer in table format",
];

/// Derive target relation and answer shape from a query.
pub fn classify(query: &str) -> Intent {
    let lowered = query.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    let target = if mentions(COMMENT_KEYWORDS) {
        RelationKind::Comments
    } else {
        RelationKind::Main
    };

    let shape = if mentions(STRUCTURED_KEYWORDS) {
        Shape::Structured
    } else {
        Shape::NaturalLanguage
    };

    Intent { target, shape }
}
