//! Tabular output recovered from an oracle response.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered column names plus ordered rows of text cells.
///
/// K_i: every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, padding or truncating rows to the header width.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// All values of one column, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }
}

impl fmt::Display for Table {
    /// Render as a left-aligned plain-text grid.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        // Cells past the header width are not rendered
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let write_row = |f: &mut fmt::Formatter<'_>, cells: &[String]| -> fmt::Result {
            let line = cells
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| format!("{cell:<w$}"))
                .collect::<Vec<_>>()
                .join(" | ");
            writeln!(f, "{}", line.trim_end())
        };

        write_row(f, &self.columns)?;
        let rule = widths
            .iter()
            .map(|&w| "-".repeat(w))
            .collect::<Vec<_>>()
            .join("-+-");
        writeln!(f, "{rule}")?;
        for row in &self.rows {
            write_row(f, row)?;
        }
        Ok(())
    }
}
