use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use parking_lot::RwLock;

use super::{DocumentStore, Namespace, eval};
use crate::aggregate::Pipeline;
use crate::error::{ShelfError, ShelfResult};
use crate::index::IndexSpec;
use crate::model::{Book, ID};
use crate::mutation::{Patch, UpdateOutcome};
use crate::query::{FindQuery, Filter};

const ID_INDEX: &str = "_id_";

#[derive(Debug, Default)]
struct State {
    docs: Vec<Document>,
    indexes: Vec<IndexSpec>,
    closed: bool,
    close_calls: u32,
}

/// A collection held in process memory.
///
/// Documents keep insertion order, which is also the natural order used for
/// unsorted reads, first-match mutations and sort tie-breaks. Clones share
/// the same collection.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    namespace: Namespace,
    state: Arc<RwLock<State>>,
    reachable: bool,
}

impl MemoryStore {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::with_documents(database, collection, Vec::new())
    }

    /// Seed the collection; documents without an `_id` get a fresh one.
    pub fn with_documents(
        database: impl Into<String>,
        collection: impl Into<String>,
        docs: Vec<Document>,
    ) -> Self {
        let docs = docs.into_iter().map(with_object_id).collect();
        Self {
            namespace: Namespace::new(database, collection),
            state: Arc::new(RwLock::new(State {
                docs,
                ..State::default()
            })),
            reachable: true,
        }
    }

    pub fn from_books(
        database: impl Into<String>,
        collection: impl Into<String>,
        books: &[Book],
    ) -> ShelfResult<Self> {
        let docs = books
            .iter()
            .map(Book::to_document)
            .collect::<ShelfResult<Vec<_>>>()?;
        Ok(Self::with_documents(database, collection, docs))
    }

    /// A store whose every request fails as if the server were down.
    pub fn unreachable(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            reachable: false,
            ..Self::new(database, collection)
        }
    }

    /// Snapshot of the collection in natural order.
    pub fn documents(&self) -> Vec<Document> {
        self.state.read().docs.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    pub fn close_count(&self) -> u32 {
        self.state.read().close_calls
    }

    fn check_available(&self) -> ShelfResult<()> {
        if !self.reachable {
            return Err(ShelfError::Connection(format!(
                "no server reachable for {}",
                self.namespace
            )));
        }
        if self.state.read().closed {
            return Err(ShelfError::Connection(format!(
                "connection to {} is closed",
                self.namespace
            )));
        }
        Ok(())
    }
}

fn with_object_id(doc: Document) -> Document {
    if doc.contains_key(ID) {
        return doc;
    }
    let mut out = Document::new();
    out.insert(ID, ObjectId::new());
    out.extend(doc);
    out
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn ping(&self) -> ShelfResult<()> {
        self.check_available()
    }

    async fn find(&self, query: &FindQuery) -> ShelfResult<Vec<Document>> {
        self.check_available()?;
        let mut docs: Vec<Document> = {
            let state = self.state.read();
            state
                .docs
                .iter()
                .filter(|doc| eval::matches(doc, &query.filter))
                .cloned()
                .collect()
        };

        if let Some(sort) = &query.sort {
            eval::sort_documents(&mut docs, sort);
        }

        if let Some(page) = &query.page {
            let skip = usize::try_from(page.skip).unwrap_or(usize::MAX);
            let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
            docs = docs.into_iter().skip(skip).take(limit).collect();
        }

        if let Some(projection) = &query.projection {
            docs = docs.iter().map(|doc| eval::project(doc, projection)).collect();
        }

        Ok(docs)
    }

    async fn update_one(&self, filter: &Filter, patch: &Patch) -> ShelfResult<UpdateOutcome> {
        self.check_available()?;
        let mut state = self.state.write();
        let Some(doc) = state.docs.iter_mut().find(|doc| eval::matches(doc, filter)) else {
            return Ok(UpdateOutcome::default());
        };

        let mut changed = false;
        for (field, value) in patch.fields() {
            if doc.get(field) != Some(value) {
                doc.insert(field.clone(), value.clone());
                changed = true;
            }
        }

        Ok(UpdateOutcome {
            matched: 1,
            modified: u64::from(changed),
        })
    }

    async fn delete_one(&self, filter: &Filter) -> ShelfResult<u64> {
        self.check_available()?;
        let mut state = self.state.write();
        match state.docs.iter().position(|doc| eval::matches(doc, filter)) {
            Some(i) => {
                state.docs.remove(i);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> ShelfResult<Vec<Document>> {
        self.check_available()?;
        let docs = self.documents();
        eval::run_pipeline(docs, pipeline)
    }

    async fn create_index(&self, spec: &IndexSpec) -> ShelfResult<String> {
        self.check_available()?;
        let mut state = self.state.write();
        if !state.indexes.iter().any(|existing| existing.keys() == spec.keys()) {
            state.indexes.push(spec.clone());
        }
        Ok(spec.name())
    }

    async fn index_names(&self) -> ShelfResult<Vec<String>> {
        self.check_available()?;
        let state = self.state.read();
        let mut names = vec![ID_INDEX.to_string()];
        names.extend(state.indexes.iter().map(IndexSpec::name));
        Ok(names)
    }

    async fn explain_find(&self, filter: &Filter) -> ShelfResult<Document> {
        self.check_available()?;
        let state = self.state.read();
        let total = state.docs.len() as i64;
        let returned = state
            .docs
            .iter()
            .filter(|doc| eval::matches(doc, filter))
            .count() as i64;

        let index = state.indexes.iter().find(|spec| {
            spec.leading_field()
                .is_some_and(|lead| filter.equality_fields().any(|f| f == lead))
        });

        let (stages, keys_examined, docs_examined) = match index {
            Some(spec) => (
                doc! {
                    "stage": "FETCH",
                    "nReturned": returned,
                    "docsExamined": returned,
                    "inputStage": {
                        "stage": "IXSCAN",
                        "nReturned": returned,
                        "keyPattern": spec.to_keys_document(),
                        "indexName": spec.name(),
                        "keysExamined": returned,
                    },
                },
                returned,
                returned,
            ),
            None => (
                doc! {
                    "stage": "COLLSCAN",
                    "filter": filter.to_document(),
                    "nReturned": returned,
                    "docsExamined": total,
                },
                0,
                total,
            ),
        };

        Ok(doc! {
            "executionSuccess": true,
            "nReturned": returned,
            "executionTimeMillis": 0_i64,
            "totalKeysExamined": keys_examined,
            "totalDocsExamined": docs_examined,
            "executionStages": Bson::Document(stages),
        })
    }

    async fn close(&self) -> ShelfResult<()> {
        let mut state = self.state.write();
        state.closed = true;
        state.close_calls += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Page, Projection, SortSpec};
    use pretty_assertions::assert_eq;

    fn store() -> MemoryStore {
        MemoryStore::with_documents(
            "shelf",
            "books",
            vec![
                doc! { "title": "A", "price": 3.0 },
                doc! { "title": "B", "price": 1.0 },
                doc! { "title": "C", "price": 2.0 },
            ],
        )
    }

    #[test]
    fn seeding_assigns_ids_first() {
        let docs = store().documents();
        assert!(docs.iter().all(|d| d.get_object_id(ID).is_ok()));
        assert_eq!(docs[0].keys().next().map(String::as_str), Some(ID));
    }

    #[tokio::test]
    async fn find_sorts_then_pages_then_projects() {
        let store = store();
        let query = FindQuery::all()
            .sort(SortSpec::ascending("price"))
            .page(Page::new(1, 5))
            .project(Projection::include(["title"]).without_id());

        let docs = store.find(&query).await.unwrap();
        assert_eq!(docs, vec![doc! { "title": "C" }, doc! { "title": "A" }]);
    }

    #[tokio::test]
    async fn closed_store_refuses_requests() {
        let store = store();
        let other = store.clone();
        store.close().await.unwrap();

        assert!(other.is_closed());
        assert!(matches!(other.ping().await, Err(ShelfError::Connection(_))));
        assert!(matches!(
            other.find(&FindQuery::all()).await,
            Err(ShelfError::Connection(_))
        ));
        assert_eq!(store.close_count(), 1);
    }

    #[tokio::test]
    async fn explain_reports_collection_scan_without_index() {
        let store = store();
        let stats = store
            .explain_find(&Filter::all().eq("title", "B"))
            .await
            .unwrap();
        let stage = stats.get_document("executionStages").unwrap();
        assert_eq!(stage.get_str("stage").unwrap(), "COLLSCAN");
        assert_eq!(stats.get_i64("totalDocsExamined").unwrap(), 3);
        assert_eq!(stats.get_i64("nReturned").unwrap(), 1);
    }

    #[tokio::test]
    async fn explain_uses_index_on_leading_field() {
        let store = store();
        store
            .create_index(&IndexSpec::single("title", crate::query::Direction::Ascending))
            .await
            .unwrap();
        let stats = store
            .explain_find(&Filter::all().eq("title", "B"))
            .await
            .unwrap();
        let stages = stats.get_document("executionStages").unwrap();
        assert_eq!(stages.get_str("stage").unwrap(), "FETCH");
        assert_eq!(
            stages.get_document("inputStage").unwrap().get_str("indexName").unwrap(),
            "title_1"
        );
        assert_eq!(stats.get_i64("totalDocsExamined").unwrap(), 1);
    }
}
