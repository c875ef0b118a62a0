//! The scripted catalog run: a fixed sequence of queries, mutations,
//! aggregations, index declarations and one explain, issued strictly in
//! order. The first failing step aborts the rest.

use bson::Document;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{AggregationEngine, GroupSummary};
use crate::error::ShelfResult;
use crate::explain::{ExplainReport, ExplainReporter};
use crate::index::IndexManager;
use crate::model::{Book, PRICE, TITLE};
use crate::mutation::{MutationExecutor, Patch, UpdateOutcome};
use crate::query::{Direction, Filter, QueryExecutor};
use crate::store::DocumentStore;

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPlan {
    pub genre: String,
    pub published_after: i32,
    pub author: String,
    pub reprice_title: String,
    pub new_price: f64,
    pub delete_title: String,
    pub in_stock_after: i32,
    pub page_number: u64,
    pub per_page: u64,
    pub top_authors: u64,
    pub explain_title: String,
}

impl Default for ReportPlan {
    fn default() -> Self {
        Self {
            genre: "Science Fiction".to_string(),
            published_after: 2015,
            author: "Isaac Asimov".to_string(),
            reprice_title: "Dune".to_string(),
            new_price: 22.99,
            delete_title: "Old Man's War".to_string(),
            in_stock_after: 2010,
            page_number: 2,
            per_page: 5,
            top_authors: 1,
            explain_title: "Dune".to_string(),
        }
    }
}

/// Everything a run produced, step by step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogReport {
    pub by_genre: Vec<Book>,
    pub published_after: Vec<Book>,
    pub by_author: Vec<Book>,
    pub repriced: UpdateOutcome,
    pub deleted: u64,
    pub in_stock_recent: Vec<Book>,
    pub listing: Vec<Document>,
    pub cheapest_first: Vec<Book>,
    pub dearest_first: Vec<Book>,
    pub page: Vec<Book>,
    pub average_price_by_genre: Vec<GroupSummary>,
    pub top_authors: Vec<GroupSummary>,
    pub books_by_decade: Vec<GroupSummary>,
    pub indexes: Vec<String>,
    pub explain: ExplainReport,
}

impl CatalogReport {
    pub async fn run<S: DocumentStore + ?Sized>(store: &S, plan: &ReportPlan) -> ShelfResult<Self> {
        let queries = QueryExecutor::new(store);
        let mutations = MutationExecutor::new(store);
        let aggregations = AggregationEngine::new(store);
        let indexes = IndexManager::new(store);
        let explainer = ExplainReporter::new(store);

        info!(namespace = %store.namespace(), "catalog report started");

        let by_genre = queries.by_genre(&plan.genre).await?;
        info!(genre = %plan.genre, count = by_genre.len(), "books in genre");

        let published_after = queries.published_after(plan.published_after).await?;
        info!(year = plan.published_after, count = published_after.len(), "books published after");

        let by_author = queries.by_author(&plan.author).await?;
        info!(author = %plan.author, count = by_author.len(), "books by author");

        let patch = Patch::new().set(PRICE, plan.new_price);
        let repriced = mutations.update_by_title(&plan.reprice_title, &patch).await?;
        info!(
            title = %plan.reprice_title,
            matched = repriced.matched,
            modified = repriced.modified,
            "price updated"
        );

        let deleted = mutations.delete_by_title(&plan.delete_title).await?;
        info!(title = %plan.delete_title, deleted, "book deleted");

        let in_stock_recent = queries.in_stock_published_after(plan.in_stock_after).await?;
        info!(
            year = plan.in_stock_after,
            count = in_stock_recent.len(),
            "in-stock books published after"
        );

        let listing = queries.listing().await?;
        info!(count = listing.len(), "listing");

        let cheapest_first = queries.sorted_by_price(Direction::Ascending).await?;
        let dearest_first = queries.sorted_by_price(Direction::Descending).await?;
        info!(count = cheapest_first.len(), "sorted by price");

        let page = queries.page(plan.page_number, plan.per_page).await?;
        info!(page = plan.page_number, per_page = plan.per_page, count = page.len(), "page");

        let average_price_by_genre = aggregations.average_price_by_genre().await?;
        info!(groups = average_price_by_genre.len(), "average price by genre");

        let top_authors = aggregations.top_authors(plan.top_authors).await?;
        info!(k = plan.top_authors, groups = top_authors.len(), "top authors");

        let books_by_decade = aggregations.books_by_decade().await?;
        info!(groups = books_by_decade.len(), "books by decade");

        let index_names = indexes.declare_catalog_indexes().await?;
        info!(indexes = ?index_names, "indexes declared");

        let explain = explainer
            .explain_point_lookup(&Filter::all().eq(TITLE, plan.explain_title.as_str()))
            .await?;
        info!(title = %plan.explain_title, stats = %explain, "explain");
        debug!(stats = %explain.stats(), "explain executionStats");

        Ok(Self {
            by_genre,
            published_after,
            by_author,
            repriced,
            deleted,
            in_stock_recent,
            listing,
            cheapest_first,
            dearest_first,
            page,
            average_price_by_genre,
            top_authors,
            books_by_decade,
            indexes: index_names,
            explain,
        })
    }
}
