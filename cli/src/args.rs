//! Command-line flags. Each one, when given, overrides the config file and
//! the `SHELF_*` environment.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use shelf_core::Config;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Shelf - run the bookstore catalog report against MongoDB
#[derive(Parser, Debug)]
#[command(name = "shelf")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "shelf.toml")]
    pub config: PathBuf,

    /// MongoDB connection string
    #[arg(long)]
    pub uri: Option<String>,

    #[arg(long)]
    pub database: Option<String>,

    #[arg(long)]
    pub collection: Option<String>,

    /// Log filter, e.g. `info` or `shelf_core=debug`
    #[arg(long)]
    pub log: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Run against an in-memory collection loaded from a JSON array of documents
    #[arg(long, value_name = "FILE")]
    pub memory: Option<PathBuf>,
}

impl Cli {
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(uri) = &self.uri {
            config.store.uri = uri.clone();
        }
        if let Some(database) = &self.database {
            config.store.database = database.clone();
        }
        if let Some(collection) = &self.collection {
            config.store.collection = collection.clone();
        }
        if let Some(filter) = &self.log {
            config.logging.filter = filter.clone();
        }
    }
}
