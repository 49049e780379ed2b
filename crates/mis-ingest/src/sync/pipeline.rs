//! Entity task runner

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::AnyPool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use super::{ContentSummary, ContentSyncer, Deduplicator, ListSummary, ListSyncer};
use crate::aggregate::AggregateApi;
use crate::error::Result;
use crate::schema::{EntitySchema, SchemaCatalog};
use crate::store;
use crate::tracking::TrackingStore;
use crate::writer::NullPolicy;

#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    pub entity: String,
    pub started_at: DateTime<Utc>,
    pub list: ListSummary,
    pub content: ContentSummary,
    /// Deleted duplicates, `None` when the entity is not deduplicated
    pub deduplicated: Option<u64>,
    pub duration_ms: u128,
}

/// Discovery, content sync and dedup for one entity
pub struct EntityPipeline {
    pool: AnyPool,
    api: Arc<dyn AggregateApi>,
    page_size: u32,
    null_policy: NullPolicy,
}

impl EntityPipeline {
    pub fn new(pool: AnyPool, api: Arc<dyn AggregateApi>, page_size: u32) -> Self {
        Self {
            pool,
            api,
            page_size,
            null_policy: NullPolicy::default(),
        }
    }

    pub fn with_null_policy(mut self, policy: NullPolicy) -> Self {
        self.null_policy = policy;
        self
    }

    pub fn tracking(&self, schema: &EntitySchema) -> TrackingStore {
        TrackingStore::for_entity(self.pool.clone(), schema)
    }

    pub async fn discover(&self, schema: &EntitySchema) -> Result<ListSummary> {
        let tracking = self.tracking(schema);
        ListSyncer::new(self.api.as_ref(), &tracking, schema, self.page_size)
            .run()
            .await
    }

    pub async fn sync_content(&self, schema: &EntitySchema) -> Result<ContentSummary> {
        ContentSyncer::new(self.api.as_ref(), &self.pool, schema, self.null_policy)
            .run()
            .await
    }

    /// `Ok(None)` for entities without dedup rules
    pub async fn deduplicate(&self, schema: &EntitySchema) -> Result<Option<u64>> {
        match Deduplicator::for_entity(&self.pool, schema) {
            Some(dedup) => Ok(Some(dedup.run().await?)),
            None => Ok(None),
        }
    }

    pub async fn run(&self, schema: &EntitySchema) -> Result<EntityReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        info!(entity = %schema.name, form_id = %schema.form_id, "Starting entity sync");

        store::bootstrap(&self.pool, schema).await?;
        let list = self.discover(schema).await?;
        let content = self.sync_content(schema).await?;
        let deduplicated = self.deduplicate(schema).await?;

        Ok(EntityReport {
            entity: schema.name.clone(),
            started_at,
            list,
            content,
            deduplicated,
            duration_ms: started.elapsed().as_millis(),
        })
    }
}

/// Run every entity in catalog order, stopping at the first run-level error
///
/// `api_for` supplies each entity's server client, so authentication can
/// differ per entity.
pub async fn run_all<F>(
    pool: &AnyPool,
    catalog: &SchemaCatalog,
    page_size: u32,
    null_policy: NullPolicy,
    api_for: F,
) -> Result<Vec<EntityReport>>
where
    F: Fn(&EntitySchema) -> Arc<dyn AggregateApi>,
{
    let mut reports = Vec::with_capacity(catalog.len());

    for schema in catalog.iter() {
        let pipeline = EntityPipeline::new(pool.clone(), api_for(schema), page_size)
            .with_null_policy(null_policy);

        match pipeline.run(schema).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(
                    entity = %schema.name,
                    error = %e,
                    "Entity sync failed, skipping remaining entities"
                );
                return Err(e);
            },
        }
    }

    Ok(reports)
}
