//! The store seam every executor talks through.

mod eval;
mod memory;

pub use memory::MemoryStore;

use std::fmt;

use async_trait::async_trait;
use bson::Document;

use crate::aggregate::Pipeline;
use crate::error::ShelfResult;
use crate::index::IndexSpec;
use crate::mutation::{Patch, UpdateOutcome};
use crate::query::{FindQuery, Filter};

/// `database.collection`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// A handle on one collection of a document store.
///
/// Requests arrive already validated. Implementations answer one request at
/// a time; callers await each before issuing the next.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn namespace(&self) -> &Namespace;

    /// Round trip to the store; fails with a connection error when unreachable.
    async fn ping(&self) -> ShelfResult<()>;

    async fn find(&self, query: &FindQuery) -> ShelfResult<Vec<Document>>;

    /// Apply `patch` to the first document matching `filter`.
    async fn update_one(&self, filter: &Filter, patch: &Patch) -> ShelfResult<UpdateOutcome>;

    /// Remove the first document matching `filter`; returns 0 or 1.
    async fn delete_one(&self, filter: &Filter) -> ShelfResult<u64>;

    async fn aggregate(&self, pipeline: &Pipeline) -> ShelfResult<Vec<Document>>;

    /// Create the index unless one with the same keys exists; returns its name.
    async fn create_index(&self, spec: &IndexSpec) -> ShelfResult<String>;

    async fn index_names(&self) -> ShelfResult<Vec<String>>;

    /// `executionStats` for a find with `filter`.
    async fn explain_find(&self, filter: &Filter) -> ShelfResult<Document>;

    /// Release the connection. Further requests fail.
    async fn close(&self) -> ShelfResult<()>;
}
