//! Shelf CLI entry point

use std::fs;
use std::path::Path;

use anyhow::Context;
use bson::Document;
use clap::Parser;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use shelf_core::{CatalogReport, Config, MemoryStore, ReportPlan, run_scoped};
use shelf_driver::ConnectionManager;

use crate::args::{Cli, OutputFormat};

mod args;
mod display;

fn get_env_filter(configured: &str) -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn init_tracing(configured: &str) {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    Registry::default()
        .with(get_env_filter(configured))
        .with(stderr_layer)
        .init();
}

/// Read a JSON array of documents; `{"$oid": ..}` values become object ids.
fn load_documents(path: &Path) -> anyhow::Result<Vec<Document>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading documents from {}", path.display()))?;
    let docs = serde_json::from_str::<Vec<Document>>(&text)
        .with_context(|| format!("parsing documents in {}", path.display()))?;
    Ok(docs)
}

async fn run(cli: &Cli, config: &Config, plan: &ReportPlan) -> anyhow::Result<CatalogReport> {
    let store_config = &config.store;

    let report = match &cli.memory {
        Some(path) => {
            let docs = load_documents(path)?;
            tracing::info!(documents = docs.len(), "running against in-memory collection");
            let store = MemoryStore::with_documents(
                &store_config.database,
                &store_config.collection,
                docs,
            );
            run_scoped(store, |s| async move { CatalogReport::run(&s, plan).await }).await
        }
        None => {
            ConnectionManager::scoped(store_config, |s| async move {
                CatalogReport::run(&s, plan).await
            })
            .await
        }
    };

    report.with_context(|| format!("catalog report on {}", store_config.uri))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from_path(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);

    init_tracing(&config.logging.filter);

    let plan = ReportPlan::default();
    let report = match run(&cli, &config, &plan).await {
        Ok(report) => report,
        Err(e) => {
            display::print_error(&format!("{e:#}"));
            return Err(e);
        }
    };

    match cli.format {
        OutputFormat::Table => display::print_report(&report, &plan),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(())
}
