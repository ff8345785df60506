//! Prompt enricher: raw query + shape + glossary → oracle payload.

use crate::models::{EnrichedPrompt, Shape};
use std::collections::BTreeMap;
use std::fmt::Write;

const MATCHING_RULE: &str = "When comparing words from the question with values in the data, \
compare them case-insensitively after trimming and collapsing whitespace, and require an exact \
match on the normalized text. Do not treat partial or fuzzy matches as hits.";

const STRUCTURED_INSTRUCTIONS: &str = "You are a data analyst answering a question about a dataset. \
The answer must be a table. Output it as comma-delimited CSV inside a single fenced code block \
tagged csv (start the block with ```csv and end it with ```). The first line inside the block is \
the header row. Quote any value that contains a comma. Do not write any prose, explanation, or \
markdown outside the fenced block.";

const NATURAL_LANGUAGE_INSTRUCTIONS: &str = "You are a data analyst answering a question about a \
dataset. Answer in clear natural-language prose. When quoting free-text fields such as comments, \
reproduce them in full; never truncate or abbreviate them. Answer exactly what is asked and do not \
add explanations, assumptions, or reasoning that the question did not request.";

/// Known valid values for categorical columns.
///
/// K_i: This is domain configuration supplied by the caller; it is never
/// inferred from the live dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Glossary {
    entries: BTreeMap<String, Vec<String>>,
}

impl Glossary {
    pub fn new(entries: BTreeMap<String, Vec<String>>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as one bullet per column, in column-name order.
    pub fn render(&self) -> String {
        let mut out = String::from("Valid values for categorical columns:\n");
        for (column, values) in &self.entries {
            let _ = writeln!(out, "- {column}: {}", values.join(", "));
        }
        out.push_str("Map words in the question onto these exact values before filtering.");
        out
    }
}

impl From<&BTreeMap<String, Vec<String>>> for Glossary {
    fn from(entries: &BTreeMap<String, Vec<String>>) -> Self {
        Self::new(entries.clone())
    }
}

/// Build the final payload for one query.
pub fn enrich(query: &str, shape: Shape, glossary: &Glossary) -> EnrichedPrompt {
    let instructions = match shape {
        Shape::Structured => STRUCTURED_INSTRUCTIONS,
        Shape::NaturalLanguage => NATURAL_LANGUAGE_INSTRUCTIONS,
    };

    let mut prompt = format!("{instructions}\n\n{MATCHING_RULE}\n\n");
    if !glossary.is_empty() {
        prompt.push_str(&glossary.render());
        prompt.push_str("\n\n");
    }
    prompt.push_str("User Query: ");
    prompt.push_str(query);

    EnrichedPrompt::new(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glossary() -> Glossary {
        let mut entries = BTreeMap::new();
        entries.insert(
            "Status".to_string(),
            vec!["Billable".to_string(), "Bench".to_string()],
        );
        entries.insert(
            "Department".to_string(),
            vec!["HR".to_string(), "Finance".to_string()],
        );
        Glossary::new(entries)
    }

    #[test]
    fn test_structured_prompt_demands_fenced_csv() {
        let prompt = enrich("list bench staff", Shape::Structured, &glossary());
        let text = prompt.as_str();
        assert!(text.contains("```csv"));
        assert!(text.contains("header row"));
        assert!(text.contains("case-insensitively"));
        assert!(!text.contains("natural-language prose"));
        assert!(text.ends_with("User Query: list bench staff"));
    }

    #[test]
    fn test_natural_language_prompt_forbids_truncation() {
        let prompt = enrich("why is Ben on bench?", Shape::NaturalLanguage, &glossary());
        let text = prompt.as_str();
        assert!(text.contains("never truncate"));
        assert!(text.contains("case-insensitively"));
        assert!(!text.contains("```csv"));
    }

    #[test]
    fn test_glossary_appended_to_both_shapes_in_column_order() {
        for shape in [Shape::Structured, Shape::NaturalLanguage] {
            let text = enrich("q", shape, &glossary()).to_string();
            let department = text.find("- Department: HR, Finance").unwrap();
            let status = text.find("- Status: Billable, Bench").unwrap();
            assert!(department < status);
            assert!(status < text.find("User Query:").unwrap());
        }
    }

    #[test]
    fn test_empty_glossary_omits_section() {
        let text = enrich("q", Shape::Structured, &Glossary::default()).to_string();
        assert!(!text.contains("Valid values"));
    }

    #[test]
    fn test_query_is_carried_verbatim() {
        let query = "  Show   HR , please ";
        let text = enrich(query, Shape::Structured, &Glossary::default()).to_string();
        assert!(text.ends_with(query));
    }
}
