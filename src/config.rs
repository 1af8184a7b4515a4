//! Pipeline configuration.
//!
//! One explicit [`PipelineConfig`] is built at startup and handed to each
//! fetcher. It is read from TOML; every section falls back to defaults, so a
//! partial file (or none at all) is valid.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound for `max_retries`; backoff doubles per retry.
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output: OutputConfig,
    pub europepmc: EuropePmcConfig,
    pub openalex: OpenAlexConfig,
    pub excel: ExcelConfig,
    pub site: SiteConfig,
}

/// Where run artefacts are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub registry: PathBuf,
    pub skip_log: PathBuf,
    pub csv: PathBuf,
    pub html: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EuropePmcConfig {
    pub base_url: String,
    pub from_date: String,
    pub to_date: String,
    /// Query templates tried in order; `{FROM_DATE}` and `{TO_DATE}` are substituted.
    pub queries: Vec<String>,
    pub page_size: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAlexConfig {
    pub base_url: String,
    /// Value of the `filter` parameter
    pub filter: String,
    pub per_page: u32,
    /// Contact address for the polite pool; empty to omit
    pub mailto: String,
    /// Case-insensitive substrings, at least one must occur in an author affiliation
    pub affiliation_keywords: Vec<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcelConfig {
    /// CSV export of the curated spreadsheet; the source is skipped when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Text shown on the generated HTML page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    pub source_note: String,
    pub owner: String,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for OutputConfig {
    fn default() -> Self {
        let dir = PathBuf::from("output");
        Self {
            registry: dir.join("publications.json"),
            skip_log: dir.join("skipped_entries.json"),
            csv: dir.join("publications.csv"),
            html: dir.join("index.html"),
        }
    }
}

impl Default for EuropePmcConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.ebi.ac.uk/europepmc/webservices/rest".to_string(),
            from_date: "2022-05-01".to_string(),
            to_date: "2025-05-01".to_string(),
            queries: vec![
                concat!(
                    r#""Novo Nordisk Foundation Center for Stem Cell Medicine" AND "#,
                    r#"(AFF:CPH OR AFF:UCPH OR AFF:"University of Copenhagen" OR AFF:DanStem) AND "#,
                    "FIRST_PDATE:[{FROM_DATE} TO {TO_DATE}]"
                )
                .to_string(),
                r#"AFF:"Novo Nordisk Foundation Center for Stem Cell Medicine" AND FIRST_PDATE:[{FROM_DATE} TO {TO_DATE}]"#
                    .to_string(),
                r#""Stem Cell Medicine" AND AFF:"University of Copenhagen" AND FIRST_PDATE:[{FROM_DATE} TO {TO_DATE}]"#
                    .to_string(),
            ],
            page_size: 1000,
            timeout_secs: 20,
            max_retries: 3,
        }
    }
}

impl Default for OpenAlexConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openalex.org".to_string(),
            filter: "title.search:reNEW".to_string(),
            per_page: 200,
            mailto: String::new(),
            affiliation_keywords: vec![
                "CPH".to_string(),
                "UCPH".to_string(),
                "University of Copenhagen".to_string(),
            ],
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "reNEW Publications – Copenhagen Node".to_string(),
            source_note: "Data sources: EuropePMC, OpenAlex, curated spreadsheet".to_string(),
            owner: "Novo Nordisk Foundation Center for Stem Cell Medicine – reNEW Copenhagen"
                .to_string(),
        }
    }
}

// ─── Helpers ───────────────────────────────────────────────

impl EuropePmcConfig {
    /// Substitute the date window into a query template.
    pub fn render_query(&self, template: &str) -> String {
        template
            .replace("{FROM_DATE}", &self.from_date)
            .replace("{TO_DATE}", &self.to_date)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl OpenAlexConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PipelineConfig {
    /// `<config dir>/pubregistry/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pubregistry").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from [`default_path`](Self::default_path) when `None`.
    ///
    /// A missing default file yields defaults; an explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if explicit {
                return Err(RegistryError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RegistryError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.europepmc.page_size == 0 {
            return Err(RegistryError::Config("europepmc.page_size must be > 0".to_string()));
        }
        if self.openalex.per_page == 0 || self.openalex.per_page > 200 {
            return Err(RegistryError::Config(
                "openalex.per_page must be between 1 and 200".to_string(),
            ));
        }
        if self.europepmc.timeout_secs == 0 || self.openalex.timeout_secs == 0 {
            return Err(RegistryError::Config("timeouts must be > 0".to_string()));
        }
        if self.europepmc.max_retries > MAX_RETRIES || self.openalex.max_retries > MAX_RETRIES {
            return Err(RegistryError::Config(format!(
                "max_retries must be at most {}",
                MAX_RETRIES
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [europepmc]
            from_date = "2024-01-01"

            [excel]
            path = "sheet.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.europepmc.from_date, "2024-01-01");
        assert_eq!(config.europepmc.to_date, "2025-05-01");
        assert_eq!(config.excel.path, Some(PathBuf::from("sheet.csv")));
        assert_eq!(config.openalex.per_page, 200);
    }

    #[test]
    fn test_render_query() {
        let config = EuropePmcConfig {
            from_date: "2021-05-01".to_string(),
            to_date: "2025-05-01".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.render_query("X AND FIRST_PDATE:[{FROM_DATE} TO {TO_DATE}]"),
            "X AND FIRST_PDATE:[2021-05-01 TO 2025-05-01]"
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = PipelineConfig::from_toml_str("[openalex]\nper_page = 500\n").unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
    }

    #[test]
    fn test_excessive_retries_rejected() {
        let err = PipelineConfig::from_toml_str("[europepmc]\nmax_retries = 64\n").unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
        assert!(PipelineConfig::from_toml_str("[openalex]\nmax_retries = 10\n").is_ok());
    }

    #[test]
    fn test_load_explicit_missing_is_error() {
        let err = PipelineConfig::load(Some(Path::new("/nonexistent/pubregistry.toml"))).unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
    }

    #[test]
    fn test_roundtrip_through_file() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        let text = PipelineConfig::default().to_toml_string()?;
        temp.write_all(text.as_bytes())?;

        let loaded = PipelineConfig::load(Some(temp.path()))?;
        assert_eq!(loaded, PipelineConfig::default());
        Ok(())
    }
}
