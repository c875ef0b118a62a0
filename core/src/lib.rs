//! Shelf - catalog query client core

pub mod aggregate;
pub mod config;
pub mod error;
pub mod explain;
pub mod index;
pub mod model;
pub mod mutation;
pub mod query;
pub mod report;
pub mod session;
pub mod store;

pub use config::{Config, LoggingConfig, StoreConfig};
pub use error::{ShelfError, ShelfResult};
pub use model::Book;
pub use report::{CatalogReport, ReportPlan};
pub use session::run_scoped;
pub use store::{DocumentStore, MemoryStore, Namespace};

#[cfg(test)]
mod tests;
