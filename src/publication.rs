//! Canonical publication schema shared by every source.
//!
//! A [`Publication`] is the single record kept per real-world article. Its
//! [`IdentityKey`] decides whether two records denote the same article.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provenance of the last write that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "EuropePMC")]
    EuropePmc,
    #[serde(rename = "OpenAlex")]
    OpenAlex,
    #[serde(rename = "Excel")]
    Excel,
}

impl Source {
    /// Fixed order in which batches are merged into the registry.
    pub const MERGE_ORDER: [Source; 3] = [Source::EuropePmc, Source::OpenAlex, Source::Excel];

    /// Rank used for cross-source conflicts; higher wins.
    ///
    /// Manual curation (Excel) outranks EuropePMC, which outranks OpenAlex.
    pub fn precedence(self) -> u8 {
        match self {
            Source::Excel => 3,
            Source::EuropePmc => 2,
            Source::OpenAlex => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::EuropePmc => "EuropePMC",
            Source::OpenAlex => "OpenAlex",
            Source::Excel => "Excel",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One canonical publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub journal: String,
    /// `YYYY-MM-DD`, `YYYY`, or empty
    #[serde(default)]
    pub date: String,
    /// Bare DOI starting with `10.`, or empty
    #[serde(default)]
    pub doi: String,
    pub source: Source,
}

/// The value deciding whether two records denote the same publication.
///
/// Records without a DOI fall back to `(lowercased title, date)`. Two different
/// articles sharing an identical title and date collapse into one entry under
/// that fallback; this is an accepted approximation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Doi(String),
    TitleDate { title: String, date: String },
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Doi(doi) => write!(f, "doi:{}", doi),
            IdentityKey::TitleDate { title, date } => write!(f, "title:{} @ {}", title, date),
        }
    }
}

/// Case-insensitive form of a title used for matching.
pub fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

impl Publication {
    pub fn identity_key(&self) -> IdentityKey {
        let doi = self.doi.trim();
        if doi.starts_with("10.") {
            IdentityKey::Doi(doi.to_lowercase())
        } else {
            IdentityKey::TitleDate {
                title: title_key(&self.title),
                date: self.date.clone(),
            }
        }
    }

    pub fn has_doi(&self) -> bool {
        !self.doi.trim().is_empty()
    }

    /// Calendar date for sorting; year-only dates map to January 1st.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        if let Ok(date) = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d") {
            return Some(date);
        }
        self.year().and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
    }

    /// Publication year, computed from `date`.
    pub fn year(&self) -> Option<i32> {
        if let Ok(date) = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d") {
            return Some(date.year());
        }
        if crate::dates::is_bare_year(&self.date) {
            return self.date.parse().ok();
        }
        None
    }

    /// Display form: `May 2023` for full dates, `2023` when only the year is known.
    pub fn formatted_date(&self) -> String {
        match NaiveDate::parse_from_str(&self.date, "%Y-%m-%d") {
            Ok(date) => date.format("%B %Y").to_string(),
            Err(_) => self.date.clone(),
        }
    }
}

/// Why a record was kept out of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingTitle,
    UnresolvedDate,
    MissingTitleAndDate,
}

/// A rejected input record, retained for the skip log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    #[serde(flatten)]
    pub record: Publication,
    pub reason: SkipReason,
}
