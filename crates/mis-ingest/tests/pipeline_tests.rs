//! End-to-end entity pipeline tests with a scripted server

mod helpers;

use anyhow::Result;
use helpers::{envelope, init_tracing, test_pool, FakeAggregate};
use mis_ingest::aggregate::AggregateApi;
use mis_ingest::schema::SchemaCatalog;
use mis_ingest::sync::{run_all, EntityPipeline};
use mis_ingest::tracking::TrackingStore;
use mis_ingest::writer::NullPolicy;
use mis_ingest::SyncError;
use std::sync::Arc;

fn census_server() -> FakeAggregate {
    let doc = |id: &str, row: &str, selected: i64, random: f64| {
        envelope(
            "census",
            id,
            Some(row),
            &format!(
                "<headName>Head {id}</headName><selected>{selected}</selected><random>{random}</random>"
            ),
        )
    };

    FakeAggregate::new()
        .page(None, &["uuid:I1", "uuid:I2"], Some("next"))
        .page(Some("next"), &["uuid:I3", "uuid:I4"], None)
        .document("uuid:I1", doc("uuid:I1", "R1", 0, 0.0))
        .document("uuid:I2", doc("uuid:I2", "R1", 1, 0.0))
        .document("uuid:I3", doc("uuid:I3", "R1", 1, 5.0))
        .document("uuid:I4", "<submission/>")
}

#[tokio::test]
async fn test_census_pipeline_end_to_end() -> Result<()> {
    init_tracing();
    let pool = test_pool().await;
    let catalog = SchemaCatalog::builtin();
    let census = catalog.require("census")?;

    let pipeline = EntityPipeline::new(pool.clone(), Arc::new(census_server()), 2);
    let report = pipeline.run(census).await?;

    assert_eq!(report.entity, "census");
    assert_eq!(report.list.ids_seen, 4);
    assert_eq!(report.content.selected, 4);
    assert_eq!(report.content.succeeded, 3);
    assert_eq!(report.content.failed, 1);
    assert_eq!(report.deduplicated, Some(2));

    let keys = sqlx::query_scalar::<_, String>("SELECT instanceID FROM census")
        .fetch_all(&pool)
        .await?;
    assert_eq!(keys, vec!["uuid:I3".to_string()]);

    let counts = TrackingStore::for_entity(pool.clone(), census).counts().await?;
    assert_eq!((counts.success, counts.failed), (3, 1));

    Ok(())
}

#[tokio::test]
async fn test_non_dedup_entity_reports_none() -> Result<()> {
    let pool = test_pool().await;
    let catalog = SchemaCatalog::builtin();
    let child = catalog.require("child")?;
    let api = FakeAggregate::new()
        .page(None, &["k1"], None)
        .document("k1", envelope("child", "uuid:k1", Some("r"), "<mother_id>M-1</mother_id>"));

    let report = EntityPipeline::new(pool, Arc::new(api), 10)
        .with_null_policy(NullPolicy::Overwrite)
        .run(child)
        .await?;

    assert_eq!(report.deduplicated, None);
    assert_eq!(report.content.succeeded, 1);

    Ok(())
}

#[tokio::test]
async fn test_run_all_visits_entities_in_order() -> Result<()> {
    let pool = test_pool().await;
    let catalog = SchemaCatalog::builtin();
    let api: Arc<dyn AggregateApi> = Arc::new(FakeAggregate::new().page(None, &[], None));
    let seen = std::sync::Mutex::new(Vec::new());

    let reports = run_all(&pool, &catalog, 50, NullPolicy::default(), |schema| {
        seen.lock().unwrap().push(schema.name.clone());
        api.clone()
    })
    .await?;

    let expected = vec!["census", "household", "member", "net", "child", "visit"];
    assert_eq!(*seen.lock().unwrap(), expected);
    assert_eq!(
        reports.iter().map(|r| r.entity.as_str()).collect::<Vec<_>>(),
        expected
    );

    Ok(())
}

#[tokio::test]
async fn test_run_all_stops_at_discovery_failure() -> Result<()> {
    let pool = test_pool().await;
    let catalog = SchemaCatalog::builtin();
    let working: Arc<dyn AggregateApi> = Arc::new(FakeAggregate::new().page(None, &[], None));
    // No pages scripted: every list request is a transport error
    let broken: Arc<dyn AggregateApi> = Arc::new(FakeAggregate::new());
    let seen = std::sync::Mutex::new(Vec::new());

    let result = run_all(&pool, &catalog, 50, NullPolicy::default(), |schema| {
        seen.lock().unwrap().push(schema.name.clone());
        if schema.name == "household" {
            broken.clone()
        } else {
            working.clone()
        }
    })
    .await;

    assert!(matches!(result, Err(SyncError::Transport(_))));
    assert_eq!(*seen.lock().unwrap(), vec!["census", "household"]);

    Ok(())
}
