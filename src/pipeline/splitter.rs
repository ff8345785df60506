//! Dataset splitter: one uploaded table → Main and optional Comments relations.
//!
//! K_i: Comments presence is keyed on column presence, never on row count.

use crate::models::{DatasetConfig, Dataset, Relation, RelationKind};
use tracing::{debug, warn};

/// Split policy.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Candidate comment column names, first present one wins
    pub comment_columns: Vec<String>,
    pub identity_column: String,
    pub lowercase_values: bool,
}

impl From<&DatasetConfig> for SplitOptions {
    fn from(config: &DatasetConfig) -> Self {
        Self {
            comment_columns: config.comment_columns.clone(),
            identity_column: config.identity_column.clone(),
            lowercase_values: config.lowercase_values,
        }
    }
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self::from(&DatasetConfig::default())
    }
}

/// Output of [`split`].
#[derive(Debug, Clone)]
pub struct SplitDataset {
    pub main: Relation,
    pub comments: Option<Relation>,
}

/// Normalize every cell and project the dataset into its relations.
pub fn split(dataset: Dataset, options: &SplitOptions) -> SplitDataset {
    let lowercase = options.lowercase_values;
    let dataset = dataset.map_cells(|cell| {
        let trimmed = cell.trim();
        if lowercase {
            trimmed.to_lowercase()
        } else {
            trimmed.to_string()
        }
    });

    let comment_column = options
        .comment_columns
        .iter()
        .find(|name| dataset.has_column(name));

    let Some(comment_column) = comment_column else {
        debug!(columns = dataset.columns().len(), "No comment column; main relation only");
        return SplitDataset {
            main: Relation::new(RelationKind::Main, dataset),
            comments: None,
        };
    };

    if !dataset.has_column(&options.identity_column) {
        warn!(
            identity_column = %options.identity_column,
            comment_column = %comment_column,
            "Identity column missing; comments relation holds comments only"
        );
    }

    let comments = dataset.project(&[options.identity_column.as_str(), comment_column.as_str()]);
    let main = dataset.without(comment_column);

    debug!(
        comment_column = %comment_column,
        main_columns = main.columns().len(),
        rows = main.row_count(),
        "Split dataset"
    );

    SplitDataset {
        main: Relation::new(RelationKind::Main, main),
        comments: Some(Relation::new(RelationKind::Comments, comments)),
    }
}
