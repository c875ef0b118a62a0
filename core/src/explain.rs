//! Query-planner diagnostics for point lookups.

use std::fmt;

use bson::{Bson, Document};
use serde::Serialize;

use crate::error::{ShelfError, ShelfResult};
use crate::query::Filter;
use crate::store::DocumentStore;

/// The planner's `executionStats`, exactly as the store returned them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExplainReport {
    stats: Document,
}

impl ExplainReport {
    pub fn new(stats: Document) -> Self {
        Self { stats }
    }

    pub fn stats(&self) -> &Document {
        &self.stats
    }

    pub fn into_stats(self) -> Document {
        self.stats
    }

    pub fn returned(&self) -> Option<i64> {
        self.number("nReturned")
    }

    pub fn docs_examined(&self) -> Option<i64> {
        self.number("totalDocsExamined")
    }

    pub fn keys_examined(&self) -> Option<i64> {
        self.number("totalKeysExamined")
    }

    pub fn millis(&self) -> Option<i64> {
        self.number("executionTimeMillis")
    }

    /// Name of the root execution stage, e.g. `COLLSCAN` or `FETCH`.
    pub fn stage(&self) -> Option<&str> {
        self.stats
            .get_document("executionStages")
            .ok()
            .and_then(|s| s.get_str("stage").ok())
    }

    /// First index any execution stage reports using.
    pub fn index_name(&self) -> Option<&str> {
        self.stats
            .get_document("executionStages")
            .ok()
            .and_then(find_index_name)
    }

    fn number(&self, key: &str) -> Option<i64> {
        match self.stats.get(key)? {
            Bson::Int32(v) => Some(i64::from(*v)),
            Bson::Int64(v) => Some(*v),
            Bson::Double(v) => Some(*v as i64),
            _ => None,
        }
    }
}

fn find_index_name(stage: &Document) -> Option<&str> {
    if let Ok(name) = stage.get_str("indexName") {
        return Some(name);
    }
    if let Ok(input) = stage.get_document("inputStage") {
        return find_index_name(input);
    }
    stage
        .get_array("inputStages")
        .ok()?
        .iter()
        .filter_map(Bson::as_document)
        .find_map(find_index_name)
}

impl fmt::Display for ExplainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<i64>| v.map_or_else(|| "?".to_string(), |n| n.to_string());
        write!(
            f,
            "stage={} index={} returned={} docs_examined={} keys_examined={} millis={}",
            self.stage().unwrap_or("?"),
            self.index_name().unwrap_or("none"),
            show(self.returned()),
            show(self.docs_examined()),
            show(self.keys_examined()),
            show(self.millis()),
        )
    }
}

pub struct ExplainReporter<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> ExplainReporter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Ask the planner how it executes an equality lookup.
    pub async fn explain_point_lookup(&self, filter: &Filter) -> ShelfResult<ExplainReport> {
        filter.validate()?;
        if !filter.is_point_lookup() {
            return Err(ShelfError::invalid(format!(
                "explain expects an equality lookup, got {filter}"
            )));
        }
        tracing::debug!(namespace = %self.store.namespace(), filter = %filter, "explain");
        let stats = self.store.explain_find(filter).await?;
        Ok(ExplainReport::new(stats))
    }
}
