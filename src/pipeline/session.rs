//! Query session: one uploaded dataset, its bound oracles, and the per-query flow.
//!
//! Pipeline flow:
//! Dataset → Splitter → relation CSVs → OracleBinder (once)
//! Query → Classifier → Enricher → Executor → Normalizer → Answer
//!
//! K_i: Oracles are bound once per session and reused for every query.
//! K_i: `ask` runs one query to completion; nothing is cached between queries.

use super::{Glossary, QueryExecutor, SplitOptions, classify, enrich, normalize, split};
use crate::models::{Answer, Config, Dataset, Relation, Result, SheetwiseError};
use crate::oracle::{OracleBinder, TabularOracle};
use std::io::BufWriter;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything a session needs besides the dataset and the binder.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub split: SplitOptions,
    pub glossary: Glossary,
    pub query_timeout: Duration,
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            split: SplitOptions::from(&config.dataset),
            glossary: Glossary::from(&config.glossary),
            query_timeout: Duration::from_secs(config.query.timeout_secs),
        }
    }
}

/// A dataset bound to its oracles.
pub struct Session {
    id: Uuid,
    executor: QueryExecutor,
    glossary: Glossary,
    /// Relation files must outlive the oracles bound to them
    _relation_files: Vec<NamedTempFile>,
}

impl Session {
    /// Split the dataset and bind one oracle per relation.
    ///
    /// B_i(binding succeeds) → Result; a failed bind aborts the session.
    pub async fn open(
        dataset: Dataset,
        options: &SessionOptions,
        binder: &dyn OracleBinder,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let start = Instant::now();
        let relations = split(dataset, &options.split);

        let mut files = Vec::with_capacity(2);
        let main = bind_relation(&relations.main, binder, &mut files).await?;
        let comments = match &relations.comments {
            Some(relation) => Some(bind_relation(relation, binder, &mut files).await?),
            None => None,
        };

        let timeout = if options.query_timeout.is_zero() {
            Duration::from_secs(300)
        } else {
            options.query_timeout
        };

        info!(
            session = %id,
            comments = comments.is_some(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Session ready"
        );

        Ok(Self {
            id,
            executor: QueryExecutor::new(main, comments, timeout),
            glossary: options.glossary.clone(),
            _relation_files: files,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn has_comments(&self) -> bool {
        self.executor.has_comments()
    }

    /// Answer one query.
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        let start = Instant::now();
        let intent = classify(query);
        info!(
            session = %self.id,
            target = %intent.target,
            shape = %intent.shape,
            "Processing query"
        );

        let prompt = enrich(query, intent.shape, &self.glossary);
        let result = self.executor.execute(intent, &prompt).await?;
        let response = normalize(&result.text);

        debug!(
            session = %self.id,
            recovered = result.recovered,
            table = response.table.is_some(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query answered"
        );

        Ok(Answer {
            query: query.to_string(),
            intent,
            response,
            recovered: result.recovered,
        })
    }
}

async fn bind_relation(
    relation: &Relation,
    binder: &dyn OracleBinder,
    files: &mut Vec<NamedTempFile>,
) -> Result<Box<dyn TabularOracle>> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("sheetwise-{}-", relation.kind))
        .suffix(".csv")
        .tempfile()
        .map_err(|e| SheetwiseError::io("creating relation file", e))?;

    relation.data.write_csv(BufWriter::new(file.as_file_mut()))?;
    let oracle = binder.bind(relation.kind, file.path()).await?;
    files.push(file);
    Ok(oracle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RelationKind, Shape};
    use crate::pipeline::NO_COMMENTS_MESSAGE;
    use crate::pipeline::executor::tests::ScriptedOracle;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::path::Path;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    /// Hands out scripted oracles and records what each relation file held.
    struct ScriptedBinder {
        scripts: Mutex<HashMap<RelationKind, ScriptedOracle>>,
        bound_csv: Mutex<HashMap<RelationKind, String>>,
    }

    impl ScriptedBinder {
        fn new(scripts: Vec<(RelationKind, ScriptedOracle)>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into_iter().collect()),
                bound_csv: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl OracleBinder for ScriptedBinder {
        async fn bind(
            &self,
            kind: RelationKind,
            csv_path: &Path,
        ) -> Result<Box<dyn TabularOracle>> {
            let csv = std::fs::read_to_string(csv_path)
                .map_err(|e| SheetwiseError::io("reading bound relation", e))?;
            self.bound_csv.lock().unwrap().insert(kind, csv);
            let oracle = self
                .scripts
                .lock()
                .unwrap()
                .remove(&kind)
                .unwrap_or_else(|| ScriptedOracle::new(vec![]));
            Ok(Box::new(oracle))
        }
    }

    fn staff() -> Dataset {
        Dataset::from_rows(
            vec!["Employee Name".into(), "Status".into(), "Comments".into()],
            vec![
                vec![" Ana ".into(), "Bench".into(), " Strong SQL ".into()],
                vec!["Ben".into(), "Billable ".into(), "".into()],
            ],
        )
        .unwrap()
    }

    fn options() -> SessionOptions {
        let mut glossary = BTreeMap::new();
        glossary.insert("Status".to_string(), vec!["Billable".to_string(), "Bench".to_string()]);
        SessionOptions {
            glossary: Glossary::new(glossary),
            query_timeout: Duration::from_secs(5),
            ..SessionOptions::default()
        }
    }

    #[tokio::test]
    async fn test_open_writes_trimmed_relations() {
        let binder = ScriptedBinder::new(vec![]);
        let session = Session::open(staff(), &options(), &binder).await.unwrap();
        assert!(session.has_comments());

        let bound = binder.bound_csv.lock().unwrap();
        assert_eq!(
            bound[&RelationKind::Main],
            "Employee Name,Status\nAna,Bench\nBen,Billable\n"
        );
        assert_eq!(
            bound[&RelationKind::Comments],
            "Employee Name,Comments\nAna,Strong SQL\nBen,\n"
        );
    }

    #[tokio::test]
    async fn test_structured_comment_query_end_to_end() {
        let comments = ScriptedOracle::new(vec![Ok(
            "Here you go:\n```csv\nEmployee Name,Comments\nAna,Strong SQL\n```".to_string(),
        )]);
        let prompts = Arc::clone(&comments.prompts);
        let binder = ScriptedBinder::new(vec![(RelationKind::Comments, comments)]);
        let session = Session::open(staff(), &options(), &binder).await.unwrap();

        let answer = session.ask("List all comments").await.unwrap();
        assert_eq!(answer.intent.target, RelationKind::Comments);
        assert_eq!(answer.intent.shape, Shape::Structured);
        assert!(!answer.recovered);

        let table = answer.response.table.unwrap();
        assert_eq!(table.columns, vec!["Employee Name", "Comments"]);
        assert_eq!(table.rows, vec![vec!["Ana", "Strong SQL"]]);
        assert_eq!(answer.response.commentary.as_deref(), Some("Here you go:"));

        let sent = prompts.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("```csv"));
        assert!(sent[0].contains("- Status: Billable, Bench"));
        assert!(sent[0].ends_with("User Query: List all comments"));
    }

    #[tokio::test]
    async fn test_salvaged_answer_is_flagged() {
        let main = ScriptedOracle::new(vec![Err(SheetwiseError::OutputParse {
            partial: "Two people are on the bench.".to_string(),
        })]);
        let binder = ScriptedBinder::new(vec![(RelationKind::Main, main)]);
        let session = Session::open(staff(), &options(), &binder).await.unwrap();

        let answer = session.ask("Show who is on the bench").await.unwrap();
        assert!(answer.recovered);
        assert_eq!(answer.response.display_text, "Two people are on the bench.");
        assert!(answer.response.table.is_none());
    }

    #[tokio::test]
    async fn test_no_comments_column_gives_canned_answer() {
        let main = ScriptedOracle::new(vec![]);
        let calls = Arc::clone(&main.calls);
        let binder = ScriptedBinder::new(vec![(RelationKind::Main, main)]);
        let dataset = Dataset::from_rows(
            vec!["Employee Name".into()],
            vec![vec!["Ana".into()]],
        )
        .unwrap();
        let session = Session::open(dataset, &options(), &binder).await.unwrap();
        assert!(!session.has_comments());

        let answer = session.ask("Any feedback for Ana?").await.unwrap();
        assert_eq!(answer.response.display_text, NO_COMMENTS_MESSAGE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            binder.bound_csv.lock().unwrap().len(),
            1,
            "only the main relation is bound"
        );
    }

    #[tokio::test]
    async fn test_oracles_are_reused_across_queries() {
        let main = ScriptedOracle::new(vec![Ok("one".to_string()), Ok("two".to_string())]);
        let calls = Arc::clone(&main.calls);
        let binder = ScriptedBinder::new(vec![(RelationKind::Main, main)]);
        let session = Session::open(staff(), &options(), &binder).await.unwrap();

        assert_eq!(session.ask("How many people?").await.unwrap().response.display_text, "one");
        assert_eq!(session.ask("How many on bench?").await.unwrap().response.display_text, "two");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
