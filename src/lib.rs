//! # pubregistry
//!
//! Institutional publication registry: EuropePMC, OpenAlex and a curated
//! spreadsheet reconciled into one deduplicated list, exported as CSV and HTML.
//!
//! ## Modules
//!
//! - [`europepmc`], [`openalex`], [`excel`] - source fetchers
//! - [`normalize`] / [`dates`] - per-source records into the canonical schema
//! - [`reconcile`] - identity and precedence rules of the registry
//! - [`store`] - atomic registry persistence
//! - [`export`] - CSV export and HTML table
//! - [`pipeline`] - one end-to-end run
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pubregistry::{config::PipelineConfig, pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load(None)?;
//!     let summary = pipeline::run(&config).await?;
//!     println!("Registry holds {} publications", summary.registry_size);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dates;
pub mod error;
pub mod europepmc;
pub mod excel;
pub mod export;
pub mod fetch;
pub mod normalize;
pub mod openalex;
pub mod pipeline;
pub mod publication;
pub mod reconcile;
pub mod store;

pub use error::{RegistryError, Result};
pub use publication::{IdentityKey, Publication, SkipRecord, Source};
pub use reconcile::Registry;
