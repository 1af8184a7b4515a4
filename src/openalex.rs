//! OpenAlex API Client
//!
//! Cursor-paginated retrieval of `/works` for one filter. Only works with at
//! least one author affiliation matching the configured keywords are kept.
//!
//! API Best Practices (per OpenAlex docs):
//! - Use `mailto:email` parameter for polite pool (10 req/s vs 1 req/s)
//! - Use `per-page=200` for maximum results per page
//! - Start with `cursor=*` and follow `meta.next_cursor` until it is null

use crate::config::OpenAlexConfig;
use crate::error::{RegistryError, Result};
use crate::fetch::{build_client, get_text, Fetched};
use crate::normalize::{RawFields, RawRecord};
use crate::publication::Source;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Prefixes OpenAlex puts in front of the bare DOI
const DOI_URL_PREFIXES: &[&str] = &["https://doi.org/", "http://doi.org/", "https://dx.doi.org/"];

/// A work as returned by OpenAlex, reduced to the fields the registry needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAlexWork {
    pub title: Option<String>,
    pub display_name: Option<String>,
    pub publication_date: Option<String>,
    pub doi: Option<String>,
    #[serde(default)]
    pub authorships: Vec<OpenAlexAuthorship>,
    pub host_venue: Option<OpenAlexVenue>,
    pub primary_location: Option<OpenAlexLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAlexAuthorship {
    pub author: Option<OpenAlexAuthor>,
    #[serde(default)]
    pub institutions: Vec<OpenAlexInstitution>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAlexAuthor {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAlexInstitution {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAlexVenue {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAlexLocation {
    pub source: Option<OpenAlexVenue>,
}

impl OpenAlexWork {
    fn title_text(&self) -> Option<&str> {
        self.title
            .as_deref()
            .or(self.display_name.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    fn date_text(&self) -> Option<&str> {
        self.publication_date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    /// All institution names across authorships, space-joined.
    pub fn affiliations(&self) -> String {
        self.authorships
            .iter()
            .flat_map(|a| a.institutions.iter())
            .filter_map(|i| i.display_name.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Case-insensitive substring match of any keyword against the affiliations.
    pub fn matches_affiliation(&self, keywords: &[String]) -> bool {
        let affiliations = self.affiliations().to_lowercase();
        keywords
            .iter()
            .any(|k| !k.is_empty() && affiliations.contains(&k.to_lowercase()))
    }

    fn journal(&self) -> Option<String> {
        self.host_venue
            .as_ref()
            .and_then(|v| v.display_name.clone())
            .or_else(|| {
                self.primary_location
                    .as_ref()
                    .and_then(|l| l.source.as_ref())
                    .and_then(|s| s.display_name.clone())
            })
    }
}

/// Strip the resolver URL OpenAlex puts in front of DOIs.
fn bare_doi(doi: &str) -> String {
    let doi = doi.trim();
    DOI_URL_PREFIXES
        .iter()
        .find_map(|prefix| doi.strip_prefix(prefix))
        .unwrap_or(doi)
        .to_string()
}

impl RawRecord for OpenAlexWork {
    const SOURCE: Source = Source::OpenAlex;

    fn raw_fields(&self) -> RawFields {
        let authors: Vec<String> = self
            .authorships
            .iter()
            .map(|a| {
                a.author
                    .as_ref()
                    .and_then(|au| au.display_name.clone())
                    .unwrap_or_default()
            })
            .collect();

        RawFields {
            title: self.title_text().map(str::to_string),
            authors: Some(authors.join("; ")),
            journal: self.journal(),
            date: self.publication_date.clone().into(),
            doi: self.doi.as_deref().map(bare_doi),
        }
    }
}

/// OpenAlex API response structures
#[derive(Debug, Deserialize)]
struct OpenAlexResponse {
    #[serde(default)]
    meta: OpenAlexMeta,
    #[serde(default)]
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAlexMeta {
    next_cursor: Option<String>,
}

pub struct OpenAlexClient {
    client: Client,
    config: OpenAlexConfig,
}

impl OpenAlexClient {
    pub fn new(config: OpenAlexConfig) -> Result<Self> {
        let client = build_client(config.timeout(), Some(&config.mailto))?;
        Ok(Self { client, config })
    }

    /// Build OpenAlex API works URL for one cursor position
    fn build_works_url(&self, cursor: &str) -> String {
        let mut url = format!(
            "{}/works?filter={}&per-page={}&cursor={}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.filter),
            self.config.per_page,
            urlencoding::encode(cursor),
        );
        if !self.config.mailto.is_empty() {
            url.push_str(&format!("&mailto={}", urlencoding::encode(&self.config.mailto)));
        }
        url
    }

    async fn fetch_page(&self, cursor: &str) -> Result<OpenAlexResponse> {
        let url = self.build_works_url(cursor);
        debug!(url = %url, "Fetching OpenAlex page");
        let body = get_text(&self.client, &url, self.config.max_retries).await?;
        serde_json::from_str(&body)
            .map_err(|e| RegistryError::Parse(format!("Failed to parse OpenAlex response: {}", e)))
    }

    /// Fetch every affiliated work for the configured filter.
    ///
    /// Works with neither title nor date are dropped here, before normalization.
    pub async fn fetch(&self) -> Fetched<OpenAlexWork> {
        let mut out = Fetched::default();
        let mut cursor = "*".to_string();
        let mut total_fetched = 0;

        info!(filter = %self.config.filter, "Starting OpenAlex query");

        loop {
            let response = match self.fetch_page(&cursor).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "OpenAlex page failed, keeping partial results");
                    out.failures.push(e);
                    break;
                }
            };

            let count = response.results.len();
            total_fetched += count;

            for work in response.results {
                if work.title_text().is_none() && work.date_text().is_none() {
                    continue;
                }
                if work.matches_affiliation(&self.config.affiliation_keywords) {
                    out.records.push(work);
                }
            }
            debug!(results = count, kept = out.records.len(), "OpenAlex page");

            match response.meta.next_cursor {
                Some(next) if count > 0 && !next.is_empty() => cursor = next,
                _ => break,
            }
        }

        info!(
            fetched = total_fetched,
            kept = out.records.len(),
            partial = out.is_partial(),
            "OpenAlex fetch complete"
        );
        out
    }
}
