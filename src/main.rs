//! pubregistry - institutional publication registry
//!
//! Pulls EuropePMC, OpenAlex and the curated spreadsheet export, reconciles
//! them into one registry and renders CSV + HTML.
//!
//! ## Usage
//!
//! ### Full run
//! ```bash
//! pubregistry run --config config.toml
//! ```
//!
//! ### Serve the generated table
//! ```bash
//! pubregistry serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use clap::{Parser, Subcommand};
use pubregistry::config::PipelineConfig;
use pubregistry::pipeline::{self, RunSummary};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Institutional publication registry
#[derive(Parser)]
#[command(name = "pubregistry")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (default: <config dir>/pubregistry/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all sources, reconcile into the registry and export
    Run {
        /// Spreadsheet CSV export (overrides [excel].path)
        #[arg(long)]
        excel: Option<PathBuf>,
    },

    /// Regenerate CSV and HTML from the persisted registry
    Export,

    /// Serve the generated HTML table and CSV
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.json_logs {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    let config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run { excel } => run_pipeline(config, excel).await,
        Commands::Export => {
            let count = pipeline::export_only(&config).context("Export failed")?;
            println!("Exported {} publications.", count);
            println!("CSV:  {}", config.output.csv.display());
            println!("HTML: {}", config.output.html.display());
            Ok(())
        }
        Commands::Serve { port, host } => run_server(config, host, port).await,
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

async fn run_pipeline(mut config: PipelineConfig, excel: Option<PathBuf>) -> Result<()> {
    if excel.is_some() {
        config.excel.path = excel;
    }

    println!("Starting publication pipeline...");
    let summary = pipeline::run(&config)
        .await
        .context("Pipeline run aborted; previous registry left untouched")?;

    print_summary(&summary);
    println!("\n✓ Pipeline complete.");
    println!("Registry: {}", config.output.registry.display());
    println!("CSV:      {}", config.output.csv.display());
    println!("HTML:     {}", config.output.html.display());
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "\n{:<10} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "source", "fetched", "accepted", "skipped", "inserted", "replaced", "kept"
    );
    for report in &summary.sources {
        println!(
            "{:<10} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
            report.source.as_str(),
            report.fetched,
            report.accepted,
            report.skipped,
            report.merge.inserted,
            report.merge.replaced,
            report.merge.kept_existing,
        );
        for failure in &report.failures {
            println!("  ⚠ {} incomplete: {}", report.source, failure);
        }
    }
    println!("\nRegistry size: {}", summary.registry_size);
    if summary.skipped > 0 {
        println!("⚠ Skipped {} records (see skip log)", summary.skipped);
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

struct AppState {
    html: PathBuf,
    csv: PathBuf,
}

async fn run_server(config: PipelineConfig, host: String, port: u16) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let app_state = Arc::new(AppState {
        html: config.output.html.clone(),
        csv: config.output.csv.clone(),
    });

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/publications.csv", get(csv_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    match tokio::fs::read_to_string(&state.html).await {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            error!(path = %state.html.display(), error = %e, "HTML not available");
            (StatusCode::NOT_FOUND, "No export yet; run `pubregistry run` first").into_response()
        }
    }
}

async fn csv_handler(State(state): State<Arc<AppState>>) -> Response {
    match tokio::fs::read(&state.csv).await {
        Ok(body) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"publications.csv\"",
                ),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(path = %state.csv.display(), error = %e, "CSV not available");
            (StatusCode::NOT_FOUND, "No export yet").into_response()
        }
    }
}
