//! One pipeline run: fetch every source, merge, persist, export.
//!
//! EuropePMC and OpenAlex are fetched concurrently. Merging happens afterwards,
//! one batch at a time, in [`Source::MERGE_ORDER`]. The registry file is only
//! written once every batch has been merged.

use crate::config::PipelineConfig;
use crate::error::{RegistryError, Result};
use crate::europepmc::EuropePmcClient;
use crate::excel;
use crate::export;
use crate::fetch::Fetched;
use crate::normalize::{Batch, RawRecord};
use crate::openalex::OpenAlexClient;
use crate::publication::{Publication, SkipRecord, Source};
use crate::reconcile::{MergeStats, Registry};
use crate::store::{self, RegistryStore};
use tracing::{info, warn};

/// A normalized batch together with how its fetch went.
#[derive(Debug)]
pub struct SourceBatch {
    pub batch: Batch,
    pub fetched: usize,
    pub failures: Vec<RegistryError>,
}

impl SourceBatch {
    pub fn from_fetched<R: RawRecord>(fetched: Fetched<R>) -> Self {
        let batch = Batch::from_records(&fetched.records);
        Self {
            batch,
            fetched: fetched.records.len(),
            failures: fetched.failures,
        }
    }
}

/// Outcome for one source in a run.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: Source,
    pub fetched: usize,
    pub accepted: usize,
    pub skipped: usize,
    pub failures: Vec<String>,
    pub merge: MergeStats,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub sources: Vec<SourceReport>,
    pub registry_size: usize,
    pub skipped: usize,
}

/// Merge batches into `registry` in the fixed source order.
///
/// Returns the reports in merge order and every skipped record.
pub fn reconcile(
    registry: &mut Registry,
    mut batches: Vec<SourceBatch>,
) -> (Vec<SourceReport>, Vec<SkipRecord>) {
    let mut reports = Vec::new();
    let mut skipped = Vec::new();

    for source in Source::MERGE_ORDER {
        let Some(pos) = batches.iter().position(|b| b.batch.source == source) else {
            continue;
        };
        let SourceBatch {
            batch,
            fetched,
            failures,
        } = batches.remove(pos);

        let merge = registry.merge(&batch);
        reports.push(SourceReport {
            source,
            fetched,
            accepted: batch.publications.len(),
            skipped: batch.skipped.len(),
            failures: failures.iter().map(|e| e.to_string()).collect(),
            merge,
        });
        skipped.extend(batch.skipped);
    }

    (reports, skipped)
}

/// Fetch and normalize all three sources.
pub async fn fetch_all(config: &PipelineConfig) -> Result<Vec<SourceBatch>> {
    let europepmc = EuropePmcClient::new(config.europepmc.clone())?;
    let openalex = OpenAlexClient::new(config.openalex.clone())?;

    let (epmc, oa) = futures::join!(europepmc.fetch(), openalex.fetch());
    let sheet = excel::load(&config.excel);

    Ok(vec![
        SourceBatch::from_fetched(epmc),
        SourceBatch::from_fetched(oa),
        SourceBatch::from_fetched(sheet),
    ])
}

/// Write the CSV export and HTML table for the given registry.
pub fn export_outputs(config: &PipelineConfig, registry: &Registry, skipped: usize) -> Result<()> {
    let publications: Vec<Publication> = registry.publications().cloned().collect();
    export::write_csv(&config.output.csv, &publications)?;
    export::write_html(&config.output.html, &publications, skipped, &config.site)?;
    Ok(())
}

/// Regenerate exports from the persisted registry and skip log.
pub fn export_only(config: &PipelineConfig) -> Result<usize> {
    let registry = RegistryStore::new(&config.output.registry).load()?;
    let skipped = store::load_skip_log(&config.output.skip_log).len();
    export_outputs(config, &registry, skipped)?;
    Ok(registry.len())
}

/// Run the whole pipeline once.
pub async fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let store = RegistryStore::new(&config.output.registry);
    let mut registry = store.load()?;
    info!(existing = registry.len(), "Starting run");

    let batches = fetch_all(config).await?;
    let (sources, skipped) = reconcile(&mut registry, batches);

    for report in &sources {
        for failure in &report.failures {
            warn!(source = %report.source, error = %failure, "Source fetch incomplete");
        }
    }

    store.save(&registry)?;
    store::save_skip_log(&config.output.skip_log, &skipped)?;
    export_outputs(config, &registry, skipped.len())?;

    let summary = RunSummary {
        sources,
        registry_size: registry.len(),
        skipped: skipped.len(),
    };
    info!(
        registry = summary.registry_size,
        skipped = summary.skipped,
        "Run complete"
    );
    Ok(summary)
}
