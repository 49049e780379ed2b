//! Submission discovery tests

mod helpers;

use anyhow::Result;
use helpers::{builtin, init_tracing, test_pool, FakeAggregate};
use mis_ingest::store;
use mis_ingest::sync::{ListSummary, ListSyncer};
use mis_ingest::tracking::{SubmissionStatus, TrackingStore};
use mis_ingest::SyncError;

fn three_pages() -> FakeAggregate {
    FakeAggregate::new()
        .page(None, &["uuid:1", "uuid:2"], Some("c1"))
        .page(Some("c1"), &["uuid:3", "uuid:4"], Some("c2"))
        .page(Some("c2"), &["uuid:5"], Some("c3"))
        .page(Some("c3"), &[], Some("c3"))
}

#[tokio::test]
async fn test_discovery_follows_cursor_until_empty_page() -> Result<()> {
    init_tracing();
    let pool = test_pool().await;
    let schema = builtin("member");
    store::bootstrap(&pool, &schema).await?;
    let tracking = TrackingStore::for_entity(pool.clone(), &schema);
    let api = three_pages();

    let summary = ListSyncer::new(&api, &tracking, &schema, 2).run().await?;

    assert_eq!(
        summary,
        ListSummary {
            pages: 3,
            ids_seen: 5,
            ids_inserted: 5,
        }
    );
    assert_eq!(
        api.list_calls(),
        vec![None, Some("c1".to_string()), Some("c2".to_string()), Some("c3".to_string())]
    );
    assert_eq!(tracking.select_pending().await?.len(), 5);

    Ok(())
}

#[tokio::test]
async fn test_discovery_is_idempotent() -> Result<()> {
    let pool = test_pool().await;
    let schema = builtin("net");
    store::bootstrap(&pool, &schema).await?;
    let tracking = TrackingStore::for_entity(pool.clone(), &schema);
    let api = three_pages();

    ListSyncer::new(&api, &tracking, &schema, 2).run().await?;
    tracking.mark_success(&pool, "uuid:2").await?;
    tracking.mark_failed(&pool, "uuid:4").await?;

    let second = ListSyncer::new(&api, &tracking, &schema, 2).run().await?;

    assert_eq!(second.ids_seen, 5);
    assert_eq!(second.ids_inserted, 0);
    assert_eq!(tracking.counts().await?.total(), 5);
    assert_eq!(tracking.status("uuid:2").await?, Some(SubmissionStatus::Success));
    assert_eq!(tracking.status("uuid:4").await?, Some(SubmissionStatus::Failed));

    Ok(())
}

#[tokio::test]
async fn test_empty_first_page_is_not_an_error() -> Result<()> {
    let pool = test_pool().await;
    let schema = builtin("child");
    store::bootstrap(&pool, &schema).await?;
    let tracking = TrackingStore::for_entity(pool, &schema);
    let api = FakeAggregate::new().page(None, &[], None);

    let summary = ListSyncer::new(&api, &tracking, &schema, 100).run().await?;

    assert_eq!(summary, ListSummary::default());
    assert!(tracking.select_pending().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_missing_cursor_ends_discovery() -> Result<()> {
    let pool = test_pool().await;
    let schema = builtin("visit");
    store::bootstrap(&pool, &schema).await?;
    let tracking = TrackingStore::for_entity(pool, &schema);
    let api = FakeAggregate::new().page(None, &["v1", "v2"], None);

    let summary = ListSyncer::new(&api, &tracking, &schema, 100).run().await?;

    assert_eq!(summary.pages, 1);
    assert_eq!(api.list_calls().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_repeated_cursor_stops_discovery() -> Result<()> {
    let pool = test_pool().await;
    let schema = builtin("visit");
    store::bootstrap(&pool, &schema).await?;
    let tracking = TrackingStore::for_entity(pool, &schema);
    let api = FakeAggregate::new()
        .page(None, &["v1"], Some("same"))
        .page(Some("same"), &["v2"], Some("same"));

    let summary = ListSyncer::new(&api, &tracking, &schema, 1).run().await?;

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.ids_inserted, 2);

    Ok(())
}

#[tokio::test]
async fn test_page_error_aborts_but_keeps_committed_pages() -> Result<()> {
    let pool = test_pool().await;
    let schema = builtin("household");
    store::bootstrap(&pool, &schema).await?;
    let tracking = TrackingStore::for_entity(pool, &schema);
    // No page is scripted for "c1", so the second request fails
    let api = FakeAggregate::new().page(None, &["h1", "h2"], Some("c1"));

    let result = ListSyncer::new(&api, &tracking, &schema, 2).run().await;

    assert!(matches!(result, Err(SyncError::Transport(_))));
    assert_eq!(tracking.select_pending().await?, vec!["h1".to_string(), "h2".to_string()]);

    Ok(())
}
