//! Response normalizer: oracle text → display text and, when possible, a table.
//!
//! Epistemic foundation:
//! - K_i: The oracle may echo its own error scaffolding; it is stripped first
//! - K_i: Table recovery is always attempted, whatever shape was requested
//! - B_i: Each strategy may fail → Option; first success wins
//! - I^B: None succeeding is not an error, the text is shown as-is

use crate::models::{NormalizedResponse, Table};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Literal fragments an oracle may echo back from its own failure paths.
const SCAFFOLDING_MARKERS: &[&str] = &[
    "Could not parse LLM output:",
    "Could not parse oracle output:",
    "[Summary Fallback]",
    "Agent stopped due to iteration limit or time limit.",
    "Invalid or incomplete response",
];

static TROUBLESHOOTING_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:for troubleshooting, visit:\s*)?https?://\S*troubleshooting\S*").unwrap()
});

static LEADING_FINAL_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*final\s+answer\s*:[ \t]*").unwrap());

static FENCED_CSV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```[ \t]*csv[ \t]*\r?\n(.*?)(?:```|\z)").unwrap());

/// A table plus whatever prose surrounded it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Recovered {
    table: Table,
    commentary: Option<String>,
}

type Strategy = fn(&str) -> Option<Recovered>;

/// Recovery strategies in priority order.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("fenced_csv", fenced_csv),
    ("bare_csv", bare_csv),
    ("pipe_table", pipe_table),
];

/// Clean `raw` and try to recover a table from it.
pub fn normalize(raw: &str) -> NormalizedResponse {
    let display_text = clean(raw);

    let recovered = STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(&display_text).map(|r| (*name, r)));

    match recovered {
        Some((strategy, Recovered { table, commentary })) => {
            debug!(
                strategy = strategy,
                columns = table.width(),
                rows = table.height(),
                "Recovered table from response"
            );
            NormalizedResponse {
                display_text,
                table: Some(table),
                commentary,
            }
        }
        None => {
            debug!("No table in response; plain text");
            NormalizedResponse {
                display_text,
                table: None,
                commentary: None,
            }
        }
    }
}

/// Strip scaffolding and surrounding whitespace.
///
/// Markers can hide one another (a backtick-wrapped `Final Answer:`), so
/// passes repeat until nothing changes. Each pass only removes text.
pub fn clean(raw: &str) -> String {
    let mut text = clean_pass(raw);
    loop {
        let next = clean_pass(&text);
        if next == text {
            return text;
        }
        text = next;
    }
}

fn clean_pass(raw: &str) -> String {
    let mut text = TROUBLESHOOTING_URL.replace_all(raw, "").into_owned();
    for marker in SCAFFOLDING_MARKERS {
        text = text.replace(marker, "");
    }
    text = LEADING_FINAL_ANSWER.replace_all(&text, "").into_owned();

    let trimmed = text.trim();
    // `...` wrapping the whole answer is an artifact of error formatting
    let unwrapped = trimmed
        .strip_prefix('`')
        .and_then(|t| t.strip_suffix('`'))
        .filter(|inner| !inner.contains('`'));

    unwrapped.unwrap_or(trimmed).trim().to_string()
}

/// Strategy a: a fenced block tagged `csv`.
fn fenced_csv(text: &str) -> Option<Recovered> {
    let captures = FENCED_CSV.captures(text)?;
    let block = captures.get(0)?;
    let table = parse_csv(captures.get(1)?.as_str(), false)?;

    Some(Recovered {
        table,
        commentary: join_commentary(&text[..block.start()], &text[block.end()..]),
    })
}

/// Strategy b: the whole text is CSV.
///
/// Requires two or more columns, at least one row and no row wider than the
/// header, so that ordinary multi-line prose is never mistaken for a table.
/// Short rows are padded.
fn bare_csv(text: &str) -> Option<Recovered> {
    let table = parse_csv(text, true)?;
    if table.width() < 2 || table.height() == 0 {
        return None;
    }
    Some(Recovered {
        table,
        commentary: None,
    })
}

/// Strategy c: a markdown-style pipe table.
fn pipe_table(text: &str) -> Option<Recovered> {
    let lines: Vec<&str> = text.lines().collect();
    let is_table_line = |line: &str| {
        let t = line.trim();
        t.contains('|') && !t.starts_with('#') && !t.starts_with("//") && !t.starts_with("<!--")
    };

    let mut idx = 0;
    while idx < lines.len() {
        if !is_table_line(lines[idx]) {
            idx += 1;
            continue;
        }
        let start = idx;
        while idx < lines.len() && is_table_line(lines[idx]) {
            idx += 1;
        }

        if let Some(table) = parse_pipe_block(&lines[start..idx]) {
            return Some(Recovered {
                table,
                commentary: join_commentary(&lines[..start].join("\n"), &lines[idx..].join("\n")),
            });
        }
    }
    None
}

fn parse_pipe_block(lines: &[&str]) -> Option<Table> {
    let mut grid: Vec<Vec<String>> = lines
        .iter()
        .map(|line| line.split('|').map(|c| c.trim().to_string()).collect::<Vec<_>>())
        .filter(|cells| !is_separator_row(cells))
        .collect();

    if grid.len() < 2 {
        return None;
    }

    let width = grid.iter().map(Vec::len).max()?;
    for row in &mut grid {
        row.resize(width, String::new());
    }

    let keep: Vec<usize> = (0..width)
        .filter(|&col| grid.iter().any(|row| !row[col].is_empty()))
        .collect();
    if keep.is_empty() {
        return None;
    }

    let mut rows = grid
        .into_iter()
        .map(|row| keep.iter().map(|&col| row[col].clone()).collect::<Vec<_>>());
    let header = rows.next()?;
    Some(Table::new(header, rows.collect()))
}

/// `|---|:---:|` style rows.
fn is_separator_row(cells: &[String]) -> bool {
    let mut saw_dash = false;
    for cell in cells {
        if cell.is_empty() {
            continue;
        }
        let inner = cell.trim_start_matches(':').trim_end_matches(':');
        if inner.is_empty() || !inner.chars().all(|c| c == '-') {
            return false;
        }
        saw_dash = true;
    }
    saw_dash
}

/// Parse comma-delimited text with a header row, trimming every value.
///
/// Short rows are padded. `strict` rejects rows wider than the header;
/// otherwise their extra cells are dropped.
fn parse_csv(text: &str, strict: bool) -> Option<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader.headers().ok()?.iter().map(str::to_string).collect();
    if columns.iter().all(|c| c.is_empty()) {
        return None;
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.ok()?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if strict && record.len() > columns.len() {
            return None;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Some(Table::new(columns, rows))
}

fn join_commentary(before: &str, after: &str) -> Option<String> {
    let parts: Vec<&str> = [before.trim(), after.trim()]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}
