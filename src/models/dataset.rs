//! Dataset and relation types.
//!
//! K_i: Every cell is text. No numeric or date typing happens here.
//! K_i: A `Dataset` always has equal-length columns with unique names.

use super::{Result, SheetwiseError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::Write;

/// A single named column of text cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<String>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }
}

/// An ordered set of named text columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    /// Build a dataset, checking the column invariants.
    ///
    /// B_i(columns are rectangular and uniquely named) → Result
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SheetwiseError::InvalidDataset(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }

        if let Some(first) = columns.first() {
            let expected = first.cells.len();
            if let Some(bad) = columns.iter().find(|c| c.cells.len() != expected) {
                return Err(SheetwiseError::InvalidDataset(format!(
                    "column '{}' has {} cells, expected {}",
                    bad.name,
                    bad.cells.len(),
                    expected
                )));
            }
        }

        Ok(Self { columns })
    }

    /// Build a dataset from a header row and data rows.
    ///
    /// Short rows are padded with empty cells; cells beyond the header are dropped.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let width = headers.len();
        let mut cells: Vec<Vec<String>> = vec![Vec::with_capacity(rows.len()); width];

        for mut row in rows {
            row.resize(width, String::new());
            for (idx, value) in row.into_iter().enumerate() {
                cells[idx].push(value);
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, cells)| Column::new(name, cells))
            .collect();

        Self::new(columns)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.cells.len())
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Row `idx` as a vector of cell references, in column order.
    pub fn row(&self, idx: usize) -> Option<Vec<&str>> {
        if idx >= self.row_count() {
            return None;
        }
        Some(self.columns.iter().map(|c| c.cells[idx].as_str()).collect())
    }

    /// Apply `f` to every cell, consuming the dataset.
    pub fn map_cells(mut self, f: impl Fn(&str) -> String) -> Self {
        for column in &mut self.columns {
            for cell in &mut column.cells {
                *cell = f(cell);
            }
        }
        self
    }

    /// Keep only the named columns that exist, in the order given.
    pub fn project(&self, names: &[&str]) -> Self {
        let columns = names
            .iter()
            .filter_map(|name| self.column(name).cloned())
            .collect();
        Self { columns }
    }

    /// Every column except `name`.
    pub fn without(&self, name: &str) -> Self {
        let columns = self
            .columns
            .iter()
            .filter(|c| c.name != name)
            .cloned()
            .collect();
        Self { columns }
    }

    /// Write the dataset as comma-delimited CSV, header row first.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(self.column_names())?;
        for idx in 0..self.row_count() {
            csv_writer.write_record(self.columns.iter().map(|c| c.cells[idx].as_str()))?;
        }
        csv_writer
            .flush()
            .map_err(|e| SheetwiseError::io("flushing CSV output", e))?;
        Ok(())
    }
}

/// Which projection of the dataset a relation (or a query) refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// Every column except the comment column
    Main,
    /// Identity column plus comment column
    Comments,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Main => write!(f, "main"),
            RelationKind::Comments => write!(f, "comments"),
        }
    }
}

/// A named projection of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub kind: RelationKind,
    pub data: Dataset,
}

impl Relation {
    pub fn new(kind: RelationKind, data: Dataset) -> Self {
        Self { kind, data }
    }
}
