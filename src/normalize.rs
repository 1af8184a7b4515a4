//! Field normalization: per-source raw records into canonical [`Publication`]s.
//!
//! Each source defines its own raw record type and implements [`RawRecord`]
//! to expose its fields as explicit optional values. Normalization itself is a
//! pure function of those fields.

use crate::dates::{resolve_date, RawDate};
use crate::publication::{Publication, SkipReason, SkipRecord, Source};

/// Source fields before normalization. Absent values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFields {
    pub title: Option<String>,
    pub authors: Option<String>,
    pub journal: Option<String>,
    pub date: RawDate,
    pub doi: Option<String>,
}

/// A raw record of one source, mappable into the canonical schema.
pub trait RawRecord {
    /// Source tag written into every normalized record.
    const SOURCE: Source;

    fn raw_fields(&self) -> RawFields;
}

/// Outcome of normalizing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Accepted(Publication),
    Rejected(SkipRecord),
}

fn clean(value: Option<String>) -> String {
    value.map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Keep a DOI only if, once trimmed, it starts with `10.`; otherwise empty.
pub fn normalize_doi(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(doi) if doi.starts_with("10.") => doi.to_string(),
        _ => String::new(),
    }
}

/// Normalize raw fields for `source`.
///
/// The record is rejected when the title is empty or the date does not resolve.
pub fn normalize_fields(fields: RawFields, source: Source) -> Normalized {
    let publication = Publication {
        title: clean(fields.title),
        authors: clean(fields.authors),
        journal: clean(fields.journal),
        date: resolve_date(&fields.date),
        doi: normalize_doi(fields.doi.as_deref()),
        source,
    };

    let reason = match (publication.title.is_empty(), publication.date.is_empty()) {
        (false, false) => return Normalized::Accepted(publication),
        (true, true) => SkipReason::MissingTitleAndDate,
        (true, false) => SkipReason::MissingTitle,
        (false, true) => SkipReason::UnresolvedDate,
    };
    Normalized::Rejected(SkipRecord {
        record: publication,
        reason,
    })
}

pub fn normalize<R: RawRecord>(record: &R) -> Normalized {
    normalize_fields(record.raw_fields(), R::SOURCE)
}

/// Normalized records produced by one source in one run.
#[derive(Debug, Clone)]
pub struct Batch {
    pub source: Source,
    pub publications: Vec<Publication>,
    pub skipped: Vec<SkipRecord>,
}

impl Batch {
    pub fn empty(source: Source) -> Self {
        Self {
            source,
            publications: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn from_records<R: RawRecord>(records: &[R]) -> Self {
        let mut batch = Batch::empty(R::SOURCE);
        for record in records {
            match normalize(record) {
                Normalized::Accepted(publication) => batch.publications.push(publication),
                Normalized::Rejected(skip) => batch.skipped.push(skip),
            }
        }
        batch
    }
}
