//! Read-only catalog queries: filter, project, sort, paginate.
//!
//! Every call goes to the store. Results are materialized and never cached,
//! so running the same query twice runs it twice.

mod filter;
mod page;
mod projection;
mod sort;

pub use filter::{Condition, Filter, Predicate, RangeOp};
pub use page::Page;
pub use projection::Projection;
pub use sort::{Direction, SortSpec};

pub(crate) use filter::validate_field_name;

use bson::Document;

use crate::error::ShelfResult;
use crate::model::{AUTHOR, Book, GENRE, IN_STOCK, PRICE, PUBLISHED_YEAR, TITLE};
use crate::store::DocumentStore;

/// A complete find request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindQuery {
    pub filter: Filter,
    pub projection: Option<Projection>,
    pub sort: Option<SortSpec>,
    pub page: Option<Page>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    pub fn validate(&self) -> ShelfResult<()> {
        self.filter.validate()?;
        if let Some(projection) = &self.projection {
            projection.validate()?;
        }
        if let Some(sort) = &self.sort {
            sort.validate()?;
        }
        if let Some(page) = &self.page {
            page.validate()?;
        }
        Ok(())
    }
}

pub struct QueryExecutor<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> QueryExecutor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn find(&self, query: &FindQuery) -> ShelfResult<Vec<Document>> {
        query.validate()?;
        tracing::debug!(
            namespace = %self.store.namespace(),
            filter = %query.filter,
            "find"
        );
        let docs = self.store.find(query).await?;
        tracing::debug!(returned = docs.len(), "find complete");
        Ok(docs)
    }

    /// Run `query` and decode every result into a [`Book`].
    pub async fn find_books(&self, query: &FindQuery) -> ShelfResult<Vec<Book>> {
        let docs = self.find(query).await?;
        Book::decode_all(&docs)
    }

    pub async fn find_one_book(&self, filter: &Filter) -> ShelfResult<Option<Book>> {
        let query = FindQuery::new(filter.clone()).page(Page::new(0, 1));
        Ok(self.find_books(&query).await?.into_iter().next())
    }

    pub async fn by_title(&self, title: &str) -> ShelfResult<Option<Book>> {
        self.find_one_book(&Filter::all().eq(TITLE, title)).await
    }

    pub async fn by_genre(&self, genre: &str) -> ShelfResult<Vec<Book>> {
        self.find_books(&FindQuery::new(Filter::all().eq(GENRE, genre))).await
    }

    pub async fn by_author(&self, author: &str) -> ShelfResult<Vec<Book>> {
        self.find_books(&FindQuery::new(Filter::all().eq(AUTHOR, author))).await
    }

    pub async fn published_after(&self, year: i32) -> ShelfResult<Vec<Book>> {
        self.find_books(&FindQuery::new(Filter::all().gt(PUBLISHED_YEAR, year))).await
    }

    pub async fn in_stock_published_after(&self, year: i32) -> ShelfResult<Vec<Book>> {
        let filter = Filter::all().eq(IN_STOCK, true).gt(PUBLISHED_YEAR, year);
        self.find_books(&FindQuery::new(filter)).await
    }

    /// Title, author and price of every book, identifier excluded.
    pub async fn listing(&self) -> ShelfResult<Vec<Document>> {
        let projection = Projection::include([TITLE, AUTHOR, PRICE]).without_id();
        self.find(&FindQuery::all().project(projection)).await
    }

    pub async fn sorted_by_price(&self, direction: Direction) -> ShelfResult<Vec<Book>> {
        self.find_books(&FindQuery::all().sort(SortSpec::new(PRICE, direction))).await
    }

    /// One page of the collection in natural order.
    pub async fn page(&self, number: u64, per_page: u64) -> ShelfResult<Vec<Book>> {
        let page = Page::number(number, per_page)?;
        self.find_books(&FindQuery::all().page(page)).await
    }
}
