//! Query executor: runs an enriched prompt against the targeted relation's oracle.
//!
//! Epistemic foundation:
//! - K_i: One oracle per relation, each behind its own mutex
//! - B_i: Oracle may fail to self-parse → salvage the embedded text
//! - I^B: Any other oracle failure is propagated unchanged
//! - I^B: A stalled oracle is cut off by the per-query timeout

use crate::models::{
    EnrichedPrompt, ExecutionResult, Intent, RelationKind, Result, Shape, SheetwiseError,
};
use crate::oracle::TabularOracle;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Canned answer when the Comments relation does not exist.
pub const NO_COMMENTS_MESSAGE: &str = "No comments data available in the uploaded file.";

type OracleSlot = Mutex<Box<dyn TabularOracle>>;

/// Holds the bound oracles for one dataset.
pub struct QueryExecutor {
    main: OracleSlot,
    comments: Option<OracleSlot>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(
        main: Box<dyn TabularOracle>,
        comments: Option<Box<dyn TabularOracle>>,
        timeout: Duration,
    ) -> Self {
        Self {
            main: Mutex::new(main),
            comments: comments.map(Mutex::new),
            timeout,
        }
    }

    pub fn has_comments(&self) -> bool {
        self.comments.is_some()
    }

    /// Execute `prompt` against the oracle for `intent.target`.
    ///
    /// B_i(oracle answers in format) → answered result
    /// B_i(oracle answers out of format) → salvaged result
    /// Comments targeted but unbound → canned result, no oracle call
    pub async fn execute(&self, intent: Intent, prompt: &EnrichedPrompt) -> Result<ExecutionResult> {
        let slot = match intent.target {
            RelationKind::Main => &self.main,
            RelationKind::Comments => match &self.comments {
                Some(slot) => slot,
                None => {
                    info!("Comments targeted but no comments relation is bound");
                    return Ok(ExecutionResult::answered(
                        NO_COMMENTS_MESSAGE,
                        Shape::NaturalLanguage,
                    ));
                }
            },
        };

        let mut oracle = slot.lock().await;
        let start = Instant::now();

        let outcome = tokio::time::timeout(self.timeout, oracle.run(prompt.as_str()))
            .await
            .map_err(|_| SheetwiseError::Timeout(self.timeout))?;

        debug!(
            relation = %intent.target,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Oracle call finished"
        );

        match outcome {
            Ok(text) => Ok(ExecutionResult::answered(text, intent.shape)),
            Err(err) => match err.salvageable_text().map(str::to_string) {
                Some(text) => {
                    warn!(relation = %intent.target, "Oracle output unparseable; using embedded text");
                    Ok(ExecutionResult::salvaged(text))
                }
                None => Err(err),
            },
        }
    }
}
