//! Dataset ingestion from spreadsheet and CSV files.
//!
//! K_i: Every cell is read as text.
//! B_i: The file may be missing, unreadable or not a table → Result

use crate::models::{Dataset, Result, SheetwiseError};
use calamine::{Data, ExcelDateTime, Range, Reader, open_workbook_auto};
use chrono::NaiveTime;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Load a dataset, dispatching on file extension.
pub fn load_dataset(path: &Path, sheet: Option<&str>) -> Result<Dataset> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let (headers, rows) = match extension.as_str() {
        "csv" => read_csv(path)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path, sheet)?,
        _ => return Err(SheetwiseError::UnsupportedFile(path.to_path_buf())),
    };

    let dataset = Dataset::from_rows(dedupe_headers(headers), rows)?;
    info!(
        path = %path.display(),
        columns = dataset.columns().len(),
        rows = dataset.row_count(),
        "Loaded dataset"
    );
    Ok(dataset)
}

type RawTable = (Vec<String>, Vec<Vec<String>>);

fn read_csv(path: &Path) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path)?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| SheetwiseError::InvalidDataset("workbook has no sheets".to_string()))?,
    };

    let range = workbook.worksheet_range(&sheet_name)?;
    grid_from_range(&range, &sheet_name)
}

/// First row is the header; fully blank rows below it are dropped.
fn grid_from_range(range: &Range<Data>, sheet_name: &str) -> Result<RawTable> {
    let mut grid = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>());

    let Some(headers) = grid.next() else {
        return Err(SheetwiseError::InvalidDataset(format!(
            "sheet '{sheet_name}' is empty"
        )));
    };

    // Spreadsheets often trail blank rows
    let rows = grid
        .filter(|row: &Vec<String>| row.iter().any(|c| !c.is_empty()))
        .collect();

    Ok((headers, rows))
}

/// Text form of a spreadsheet cell.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::DateTime(dt) => excel_datetime_text(dt),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Dates as `%Y-%m-%d` (with `%H:%M:%S` when a time is set), durations as `H:MM:SS`.
fn excel_datetime_text(dt: &ExcelDateTime) -> String {
    if dt.is_duration() {
        return match dt.as_duration() {
            Some(d) => {
                let secs = d.num_seconds();
                let sign = if secs < 0 { "-" } else { "" };
                let secs = secs.abs();
                format!("{sign}{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
            }
            None => dt.as_f64().to_string(),
        };
    }

    match dt.as_datetime() {
        Some(datetime) if datetime.time() == NaiveTime::MIN => {
            datetime.format("%Y-%m-%d").to_string()
        }
        Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => dt.as_f64().to_string(),
    }
}

/// Name blank headers `Unnamed: {i}` and suffix repeats with `.1`, `.2`, ...
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(headers.len());

    for (idx, header) in headers.into_iter().enumerate() {
        let base = match header.trim() {
            "" => format!("Unnamed: {idx}"),
            trimmed => trimmed.to_string(),
        };

        let mut name = base.clone();
        while let Some(count) = seen.get_mut(&name) {
            *count += 1;
            name = format!("{base}.{count}");
        }
        seen.insert(name.clone(), 0);
        out.push(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::ExcelDateTimeType;
    use std::io::Write;

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(
            file,
            "Employee Name,Department,Comments\nAna,HR,\"Sharp, reliable\"\nBen,IT\n"
        )
        .unwrap();

        let ds = load_dataset(file.path(), None).unwrap();
        assert_eq!(ds.column_names(), vec!["Employee Name", "Department", "Comments"]);
        assert_eq!(ds.row(0).unwrap(), vec!["Ana", "HR", "Sharp, reliable"]);
        assert_eq!(ds.row(1).unwrap(), vec!["Ben", "IT", ""]);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        let err = load_dataset(file.path(), None).unwrap_err();
        assert!(matches!(err, SheetwiseError::UnsupportedFile(_)));
    }

    #[test]
    fn test_dedupe_headers() {
        let headers = vec!["Name", "", "Name", "Name", " Age "]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            dedupe_headers(headers),
            vec!["Name", "Unnamed: 1", "Name.1", "Name.2", "Age"]
        );
    }

    fn date(value: f64) -> Data {
        Data::DateTime(ExcelDateTime::new(value, ExcelDateTimeType::DateTime, false))
    }

    #[test]
    fn test_cell_text_formats_dates() {
        assert_eq!(cell_text(&date(45123.0)), "2023-07-16");
        assert_eq!(cell_text(&date(45123.5)), "2023-07-16 12:00:00");
        assert_eq!(
            cell_text(&Data::DateTime(ExcelDateTime::new(
                1.5,
                ExcelDateTimeType::TimeDelta,
                false
            ))),
            "36:00:00"
        );
        assert_eq!(
            cell_text(&Data::DateTimeIso("2023-07-16T09:30:00".into())),
            "2023-07-16T09:30:00"
        );
        assert_eq!(cell_text(&Data::DurationIso("PT1H".into())), "PT1H");
    }

    #[test]
    fn test_sheet_grid_to_dataset() {
        let mut range: Range<Data> = Range::new((0, 0), (3, 2));
        range.set_value((0, 0), Data::String("Employee Name".into()));
        range.set_value((0, 1), Data::String("Joined".into()));
        range.set_value((0, 2), Data::String("Experience".into()));
        range.set_value((1, 0), Data::String("Ana".into()));
        range.set_value((1, 1), date(45123.0));
        range.set_value((1, 2), Data::Float(4.0));
        // row 2 left blank
        range.set_value((3, 0), Data::String("Ben".into()));
        range.set_value((3, 2), Data::Float(2.5));

        let (headers, rows) = grid_from_range(&range, "Sheet1").unwrap();
        let ds = Dataset::from_rows(dedupe_headers(headers), rows).unwrap();

        assert_eq!(ds.column_names(), vec!["Employee Name", "Joined", "Experience"]);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.row(0).unwrap(), vec!["Ana", "2023-07-16", "4"]);
        assert_eq!(ds.row(1).unwrap(), vec!["Ben", "", "2.5"]);
    }

    #[test]
    fn test_empty_sheet_is_invalid() {
        let range: Range<Data> = Range::empty();
        let err = grid_from_range(&range, "Blank").unwrap_err();
        assert!(matches!(err, SheetwiseError::InvalidDataset(_)));
    }

    #[test]
    fn test_corrupt_workbook_is_a_spreadsheet_error() {
        let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        write!(file, "not a zip archive").unwrap();
        let err = load_dataset(file.path(), None).unwrap_err();
        assert!(matches!(err, SheetwiseError::Spreadsheet(_)));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(30.0)), "30");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("Pune".into())), "Pune");
        assert_eq!(cell_text(&Data::Bool(true)), "true");
    }
}
