//! Custom error types for pubregistry.
//!
//! All library functions return `Result<T, RegistryError>` instead of using `unwrap()`.
//! Rejected input records are not errors: they become [`SkipRecord`](crate::publication::SkipRecord)s.

use thiserror::Error;

/// Main error type for pubregistry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Network/HTTP request error (including per-request timeouts)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned a non-2xx status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Error message
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Spreadsheet export could not be read
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Registry or skip log could not be atomically replaced
    #[error("Persist error: {0}")]
    Persist(String),
}

impl From<tempfile::PersistError> for RegistryError {
    fn from(e: tempfile::PersistError) -> Self {
        RegistryError::Persist(e.to_string())
    }
}

impl From<toml::de::Error> for RegistryError {
    fn from(e: toml::de::Error) -> Self {
        RegistryError::Config(e.to_string())
    }
}

/// Result type alias using `RegistryError`
pub type Result<T> = std::result::Result<T, RegistryError>;
