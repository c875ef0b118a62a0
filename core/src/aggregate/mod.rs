//! Group/sort/limit pipelines over the whole collection.

mod pipeline;

pub use pipeline::{Accumulator, GroupKey, GroupStage, Pipeline, Stage};

use bson::{Bson, Document};
use serde::Serialize;

use crate::error::ShelfResult;
use crate::model::{AUTHOR, GENRE, ID, PRICE, PUBLISHED_YEAR};
use crate::query::SortSpec;
use crate::store::DocumentStore;

pub const AVG_PRICE: &str = "avg_price";
pub const COUNT: &str = "count";

/// One output row of a grouping pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: Bson,
    pub metrics: Document,
}

impl GroupSummary {
    pub fn from_document(mut doc: Document) -> Self {
        let key = doc.remove(ID).unwrap_or(Bson::Null);
        Self { key, metrics: doc }
    }

    pub fn key_str(&self) -> Option<&str> {
        self.key.as_str()
    }

    pub fn key_i64(&self) -> Option<i64> {
        as_i64(&self.key)
    }

    pub fn metric(&self, name: &str) -> Option<&Bson> {
        self.metrics.get(name)
    }

    /// Numeric metric as `f64`, whatever its BSON width.
    pub fn metric_f64(&self, name: &str) -> Option<f64> {
        match self.metrics.get(name)? {
            Bson::Double(v) => Some(*v),
            Bson::Int32(v) => Some(f64::from(*v)),
            Bson::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn count(&self) -> Option<i64> {
        self.metrics.get(COUNT).and_then(as_i64)
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    }
}

/// Mean price per genre.
pub fn average_price_by_genre() -> Pipeline {
    Pipeline::new().group(
        GroupStage::by(GroupKey::field(GENRE)).with(AVG_PRICE, Accumulator::Avg(PRICE.into())),
    )
}

/// The `k` authors with the most books, most first.
pub fn top_authors(k: u64) -> Pipeline {
    Pipeline::new()
        .group(GroupStage::by(GroupKey::field(AUTHOR)).with(COUNT, Accumulator::Count))
        .sort(SortSpec::descending(COUNT))
        .limit(k)
}

/// Book count per publication decade, oldest decade first.
pub fn books_by_decade() -> Pipeline {
    Pipeline::new()
        .group(GroupStage::by(GroupKey::decade(PUBLISHED_YEAR)).with(COUNT, Accumulator::Count))
        .sort(SortSpec::ascending(ID))
}

pub struct AggregationEngine<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> AggregationEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn run(&self, pipeline: &Pipeline) -> ShelfResult<Vec<GroupSummary>> {
        pipeline.validate()?;
        tracing::debug!(
            namespace = %self.store.namespace(),
            stages = pipeline.stages().len(),
            "aggregate"
        );
        let docs = self.store.aggregate(pipeline).await?;
        tracing::debug!(groups = docs.len(), "aggregate complete");
        Ok(docs.into_iter().map(GroupSummary::from_document).collect())
    }

    pub async fn average_price_by_genre(&self) -> ShelfResult<Vec<GroupSummary>> {
        self.run(&average_price_by_genre()).await
    }

    pub async fn top_authors(&self, k: u64) -> ShelfResult<Vec<GroupSummary>> {
        self.run(&top_authors(k)).await
    }

    pub async fn books_by_decade(&self) -> ShelfResult<Vec<GroupSummary>> {
        self.run(&books_by_decade()).await
    }
}
