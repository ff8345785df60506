//! Chat-completions backed oracle.
//!
//! The relation is embedded into the system prompt once at bind time. Every
//! reply must end with a `Final Answer:` section; a reply without one is an
//! output-parse failure that still carries the reply text.

use crate::client::LlmClient;
use crate::models::{ModelSpec, RelationKind, Result, SheetwiseError};
use crate::oracle::{OracleBinder, TabularOracle};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

static FINAL_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)final\s+answer\s*:").unwrap());

/// Binds relations to [`LlmOracle`]s sharing one client.
pub struct LlmOracleBinder {
    client: Arc<LlmClient>,
    model: ModelSpec,
    max_prompt_rows: usize,
}

impl LlmOracleBinder {
    pub fn new(client: Arc<LlmClient>, model: ModelSpec, max_prompt_rows: usize) -> Self {
        Self {
            client,
            model,
            max_prompt_rows,
        }
    }
}

#[async_trait]
impl OracleBinder for LlmOracleBinder {
    async fn bind(&self, kind: RelationKind, csv_path: &Path) -> Result<Box<dyn TabularOracle>> {
        let snapshot = RelationSnapshot::read(csv_path, self.max_prompt_rows)?;
        if snapshot.truncated {
            warn!(
                relation = %kind,
                total_rows = snapshot.total_rows,
                embedded_rows = self.max_prompt_rows,
                "Relation exceeds max_prompt_rows; oracle sees a prefix"
            );
        }
        info!(
            relation = %kind,
            rows = snapshot.total_rows,
            columns = snapshot.columns.len(),
            "Bound oracle"
        );

        Ok(Box::new(LlmOracle {
            client: Arc::clone(&self.client),
            model: self.model.clone(),
            kind,
            system_prompt: snapshot.system_prompt(kind),
        }))
    }
}

/// Oracle answering prompts about one embedded relation.
pub struct LlmOracle {
    client: Arc<LlmClient>,
    model: ModelSpec,
    kind: RelationKind,
    system_prompt: String,
}

#[async_trait]
impl TabularOracle for LlmOracle {
    async fn run(&mut self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .complete_with_system(&self.model, &self.system_prompt, prompt)
            .await?;

        debug!(
            relation = %self.kind,
            model = %response.model,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            duration_ms = response.duration.as_millis() as u64,
            "Oracle replied"
        );

        extract_final_answer(&response.content)
    }
}

/// Pull the text after the last `Final Answer:` marker.
///
/// B_i(reply follows the format) → Ok, otherwise OutputParse with the reply.
pub fn extract_final_answer(content: &str) -> Result<String> {
    let answer = FINAL_ANSWER
        .find_iter(content)
        .last()
        .map(|m| content[m.end()..].trim())
        .filter(|a| !a.is_empty());

    match answer {
        Some(answer) => Ok(answer.to_string()),
        None => Err(SheetwiseError::OutputParse {
            partial: content.trim().to_string(),
        }),
    }
}

/// What an oracle is told about its relation.
struct RelationSnapshot {
    columns: Vec<String>,
    total_rows: usize,
    truncated: bool,
    csv: String,
}

impl RelationSnapshot {
    fn read(path: &Path, max_rows: usize) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&headers)?;

        let mut total_rows = 0;
        for record in reader.records() {
            let record = record?;
            if total_rows < max_rows {
                writer.write_record(&record)?;
            }
            total_rows += 1;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| SheetwiseError::Internal(format!("buffering relation CSV: {e}")))?;
        let csv = String::from_utf8(bytes)
            .map_err(|e| SheetwiseError::ParseError(format!("relation CSV is not UTF-8: {e}")))?;

        Ok(Self {
            columns: headers.iter().map(str::to_string).collect(),
            total_rows,
            truncated: total_rows > max_rows,
            csv,
        })
    }

    fn system_prompt(&self, kind: RelationKind) -> String {
        let shown = if self.truncated {
            format!(
                "Only the first rows are shown below; the full table has {} rows.",
                self.total_rows
            )
        } else {
            format!("The full table has {} rows and is shown below.", self.total_rows)
        };

        format!(
            r#"You are working with the "{kind}" table of an uploaded spreadsheet.
Columns: {columns}
{shown}

```csv
{csv}```

Reason over this table only. Never invent rows or values.
Work step by step if needed, then end your reply with a line that starts with
"Final Answer:" followed by the complete answer."#,
            columns = self.columns.join(", "),
            csv = self.csv,
        )
    }
}
