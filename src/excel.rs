//! Curated spreadsheet source.
//!
//! The spreadsheet is consumed as a CSV export. Each row is a map from the
//! sheet's column headers to typed cells; a static table maps the headers the
//! registry cares about onto canonical fields.

use crate::config::ExcelConfig;
use crate::dates::RawDate;
use crate::error::Result;
use crate::fetch::Fetched;
use crate::normalize::{RawFields, RawRecord};
use crate::publication::Source;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Canonical field a spreadsheet column feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Authors,
    Journal,
    Date,
    Doi,
}

/// Column header → field.
pub const COLUMNS: &[(&str, Field)] = &[
    ("Title of the contribution in original language", Field::Title),
    ("Contributors-5", Field::Authors),
    ("Journal > Journal-6", Field::Journal),
    ("Current publication status > Date-3", Field::Date),
    (
        "Electronic version(s) of this work > DOI (Digital Object Identifier)-12",
        Field::Doi,
    ),
];

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Date(NaiveDate),
    Number(f64),
    Text(String),
}

impl Cell {
    /// Parse a CSV field. Numbers and dates stay text; the date resolver handles them.
    fn from_field(field: &str) -> Self {
        if field.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(field.to_string())
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(text) => Some(text.clone()),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Date(date) => Some(date.format("%Y-%m-%d").to_string()),
        }
    }

    fn as_raw_date(&self) -> RawDate {
        match self {
            Cell::Date(date) => RawDate::Structured(*date),
            other => other.as_text().into(),
        }
    }
}

/// A spreadsheet row keyed by column header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExcelRow {
    pub cells: HashMap<String, Cell>,
}

impl ExcelRow {
    fn cell(&self, field: Field) -> Option<&Cell> {
        COLUMNS
            .iter()
            .find(|(_, f)| *f == field)
            .and_then(|(header, _)| self.cells.get(*header))
    }

    fn text(&self, field: Field) -> Option<String> {
        self.cell(field).and_then(Cell::as_text)
    }
}

impl RawRecord for ExcelRow {
    const SOURCE: Source = Source::Excel;

    fn raw_fields(&self) -> RawFields {
        // Only text cells can carry a DOI.
        let doi = match self.cell(Field::Doi) {
            Some(Cell::Text(text)) => Some(text.clone()),
            _ => None,
        };

        RawFields {
            title: self.text(Field::Title),
            authors: self.text(Field::Authors),
            journal: self.text(Field::Journal),
            date: self
                .cell(Field::Date)
                .map(Cell::as_raw_date)
                .unwrap_or_default(),
            doi,
        }
    }
}

/// Read every row of a CSV export.
pub fn read_export(path: &Path) -> Result<Vec<ExcelRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let missing: Vec<&str> = COLUMNS
        .iter()
        .map(|(header, _)| *header)
        .filter(|header| !headers.iter().any(|h| h == header))
        .collect();
    if !missing.is_empty() {
        warn!(path = %path.display(), missing = ?missing, "Spreadsheet export lacks expected columns");
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells = headers
            .iter()
            .zip(record.iter())
            .map(|(header, field)| (header.clone(), Cell::from_field(field)))
            .collect();
        rows.push(ExcelRow { cells });
    }

    info!(path = %path.display(), rows = rows.len(), "Read spreadsheet export");
    Ok(rows)
}

/// Load the configured export. An unset path yields an empty batch; an
/// unreadable file is reported as a failure of this source.
pub fn load(config: &ExcelConfig) -> Fetched<ExcelRow> {
    let mut out = Fetched::default();
    let Some(path) = config.path.as_deref() else {
        info!("No spreadsheet export configured");
        return out;
    };

    match read_export(path) {
        Ok(rows) => out.records = rows,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read spreadsheet export");
            out.failures.push(e);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize, Normalized};
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    const HEADER: &str = "\"Title of the contribution in original language\",Contributors-5,Journal > Journal-6,Current publication status > Date-3,Electronic version(s) of this work > DOI (Digital Object Identifier)-12,Other";

    #[test]
    fn test_read_export_and_normalize() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        writeln!(temp, "{}", HEADER)?;
        writeln!(temp, "Organoid atlas,\"Doe, J\",Nature,12/05/2023, 10.1/x ,ignored")?;
        writeln!(temp, ",Roe R,Cell,01/01/2022,,")?;

        let rows = read_export(temp.path())?;
        assert_eq!(rows.len(), 2);

        match normalize(&rows[0]) {
            Normalized::Accepted(p) => {
                assert_eq!(p.title, "Organoid atlas");
                assert_eq!(p.authors, "Doe, J");
                assert_eq!(p.journal, "Nature");
                assert_eq!(p.date, "2023-05-12");
                assert_eq!(p.doi, "10.1/x");
                assert_eq!(p.source, Source::Excel);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(normalize(&rows[1]), Normalized::Rejected(_)));
        Ok(())
    }

    #[test]
    fn test_typed_cells() {
        let mut row = ExcelRow::default();
        row.cells.insert(COLUMNS[0].0.to_string(), Cell::Text("T".to_string()));
        row.cells.insert(
            COLUMNS[3].0.to_string(),
            Cell::Date(NaiveDate::from_ymd_opt(2022, 3, 4).unwrap()),
        );
        row.cells.insert(COLUMNS[4].0.to_string(), Cell::Number(10.5));

        let fields = row.raw_fields();
        assert_eq!(fields.date, RawDate::Structured(NaiveDate::from_ymd_opt(2022, 3, 4).unwrap()));
        assert_eq!(fields.doi, None);

        row.cells.insert(COLUMNS[3].0.to_string(), Cell::Number(2021.0));
        assert_eq!(row.raw_fields().date, RawDate::Text("2021".to_string()));
    }

    #[test]
    fn test_rows_from_json() {
        let json = r#"{
            "Title of the contribution in original language": "Stem cells",
            "Current publication status > Date-3": "2020",
            "Contributors-5": null
        }"#;
        let row: ExcelRow = serde_json::from_str(json).unwrap();
        assert!(matches!(normalize(&row), Normalized::Accepted(ref p) if p.date == "2020"));
    }

    #[test]
    fn test_load_missing_file_is_source_failure() {
        let fetched = load(&ExcelConfig {
            path: Some(PathBuf::from("/nonexistent/sheet.csv")),
        });
        assert!(fetched.is_partial());
        assert!(fetched.records.is_empty());

        let unset = load(&ExcelConfig::default());
        assert!(!unset.is_partial());
    }
}
