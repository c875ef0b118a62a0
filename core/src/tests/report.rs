use pretty_assertions::assert_eq;

use super::fixtures::{COLLECTION, DATABASE, assert_close, catalog, store, titles};
use crate::aggregate::AVG_PRICE;
use crate::error::ShelfError;
use crate::report::{CatalogReport, ReportPlan};
use crate::session::run_scoped;
use crate::store::MemoryStore;

#[tokio::test]
async fn default_plan_over_fixture() {
    let store = store();
    let report = CatalogReport::run(&store, &ReportPlan::default()).await.unwrap();

    assert_eq!(report.by_genre.len(), 5);
    assert_eq!(
        titles(&report.published_after),
        vec!["Project Hail Mary", "Piranesi", "The Silent Patient"]
    );
    assert_eq!(titles(&report.by_author), vec!["Foundation", "I, Robot"]);
    assert_eq!((report.repriced.matched, report.repriced.modified), (1, 1));
    assert_eq!(report.deleted, 1);
    assert_eq!(
        titles(&report.in_stock_recent),
        vec!["Project Hail Mary", "Piranesi", "The Fifth Season", "Gone Girl"]
    );

    let remaining = catalog().len() - 1;
    assert_eq!(report.listing.len(), remaining);
    assert_eq!(report.cheapest_first.len(), remaining);
    assert_eq!(report.dearest_first.first().map(|b| b.title.as_str()), Some("Dune"));
    assert_eq!(report.page.len(), 5);

    let sci_fi = report
        .average_price_by_genre
        .iter()
        .find(|g| g.key_str() == Some("Science Fiction"))
        .and_then(|g| g.metric_f64(AVG_PRICE))
        .unwrap();
    assert_close(sci_fi, (22.99 + 8.50 + 7.25 + 18.75) / 4.0);

    assert_eq!(report.top_authors[0].key_str(), Some("Isaac Asimov"));
    assert_eq!(report.books_by_decade.len(), 7);
    assert_eq!(report.indexes, vec!["title_1", "author_1_published_year_1"]);
    assert_eq!(report.explain.index_name(), Some("title_1"));
    assert_eq!(report.explain.returned(), Some(1));
    assert!(report.explain.stats().contains_key("executionStages"));
}

#[tokio::test]
async fn scoped_report_closes_the_store() {
    let store = store();
    let report = run_scoped(store.clone(), |s| async move {
        CatalogReport::run(&s, &ReportPlan::default()).await
    })
    .await
    .unwrap();

    assert_eq!(report.deleted, 1);
    assert!(store.is_closed());
    assert_eq!(store.close_count(), 1);
}

#[tokio::test]
async fn failing_step_aborts_and_still_closes() {
    let store = store();
    let plan = ReportPlan {
        per_page: 0,
        ..ReportPlan::default()
    };

    let result = run_scoped(store.clone(), |s| async move {
        CatalogReport::run(&s, &plan).await
    })
    .await;

    assert!(matches!(result, Err(ShelfError::InvalidInput(_))));
    assert_eq!(store.close_count(), 1);
    // Steps before the page still ran.
    assert_eq!(store.documents().len(), catalog().len() - 1);
}

#[tokio::test]
async fn unreachable_store_runs_nothing() {
    let store = MemoryStore::unreachable(DATABASE, COLLECTION);
    let result = run_scoped(store.clone(), |s| async move {
        CatalogReport::run(&s, &ReportPlan::default()).await
    })
    .await;

    match result {
        Err(e) => assert_eq!(e.kind(), "connection_error"),
        Ok(_) => panic!("report ran against an unreachable store"),
    }
    assert_eq!(store.close_count(), 1);
}
