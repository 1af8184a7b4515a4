//! Date resolution into the canonical `YYYY-MM-DD` / `YYYY` forms.
//!
//! Dates are civil dates; no timezone handling takes place.

use chrono::{NaiveDate, NaiveDateTime};

/// A date value as it arrives from a source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RawDate {
    #[default]
    Missing,
    /// Native date value (spreadsheet date cells)
    Structured(NaiveDate),
    /// Free-form text
    Text(String),
}

impl From<NaiveDate> for RawDate {
    fn from(date: NaiveDate) -> Self {
        RawDate::Structured(date)
    }
}

impl From<Option<String>> for RawDate {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(text) => RawDate::Text(text),
            None => RawDate::Missing,
        }
    }
}

impl From<&str> for RawDate {
    fn from(text: &str) -> Self {
        RawDate::Text(text.to_string())
    }
}

/// True for exactly four ASCII digits.
pub fn is_bare_year(text: &str) -> bool {
    text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit())
}

/// `%Y` in chrono takes any digit count; the year field must be exactly `YYYY`.
fn leading_year(text: &str) -> bool {
    text.split('-').next().is_some_and(is_bare_year)
}

fn trailing_year(text: &str) -> bool {
    text.rsplit('/').next().is_some_and(is_bare_year)
}

/// Resolve a raw date into canonical form, first match wins:
///
/// 1. structured date → `YYYY-MM-DD`
/// 2. `YYYY-MM-DD` (an ISO date-time keeps its date part)
/// 3. `DD/MM/YYYY` → `YYYY-MM-DD`
/// 4. bare `YYYY` → `YYYY`
/// 5. anything else → empty string
pub fn resolve_date(raw: &RawDate) -> String {
    let text = match raw {
        RawDate::Missing => return String::new(),
        RawDate::Structured(date) => return date.format("%Y-%m-%d").to_string(),
        RawDate::Text(text) => text.trim(),
    };

    if leading_year(text) {
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return date.format("%Y-%m-%d").to_string();
        }
        for pattern in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(stamp) = NaiveDateTime::parse_from_str(text, pattern) {
                return stamp.date().format("%Y-%m-%d").to_string();
            }
        }
    }
    if trailing_year(text) {
        if let Ok(date) = NaiveDate::parse_from_str(text, "%d/%m/%Y") {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    if is_bare_year(text) {
        return text.to_string();
    }
    String::new()
}
