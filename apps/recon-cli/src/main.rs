//! Thin invocation wrapper around `recon-orchestrator`. The core's own
//! scope stops at the reconciliation engine (spec §1); this binary loads
//! configuration, wires a tracing subscriber, and runs one pass.

mod dataset;

use std::path::PathBuf;

use clap::Parser;
use recon_orchestrator::{build_provider, build_store, load_config, InMemorySink};

use dataset::JsonLinesDataset;

#[derive(Parser)]
#[command(about = "Reconcile crawled documents against a vector store", long_about = None)]
struct Args {
    /// Path to the TOML configuration file (spec §6 config table).
    #[arg(long)]
    config: PathBuf,

    /// Path to a JSON-lines file of dataset items, one object per line.
    #[arg(long)]
    input: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_source = std::fs::read_to_string(&args.config)?;
    let config = load_config(&config_source).map_err(anyhow::Error::from)?;

    let dataset = JsonLinesDataset::load(&args.input)?;

    let provider = build_provider(&config.embeddings_provider, &config.embeddings_api_key, &config.embeddings_config)
        .map_err(anyhow::Error::from)?;
    let store = build_store(&config.vector_store).await.map_err(anyhow::Error::from)?;
    let sink = InMemorySink::new();

    let report = recon_orchestrator::run(&config, &dataset, provider.as_ref(), store, &sink)
        .await
        .map_err(anyhow::Error::from)?;

    tracing::info!(
        documents_read = report.documents_read,
        chunks_considered = report.chunks_considered,
        added = report.outcome.added.len(),
        touched = report.outcome.touched.len(),
        deleted = report.outcome.deleted.len(),
        expired = report.expired,
        "reconciliation complete"
    );

    Ok(())
}
