//! Per-submission fetch, extract, upsert and status loop

use serde::Serialize;
use sqlx::AnyPool;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::aggregate::AggregateApi;
use crate::error::{FailureKind, Result};
use crate::extract::RecordExtractor;
use crate::schema::EntitySchema;
use crate::tracking::TrackingStore;
use crate::writer::{NullPolicy, UpsertWriter};

/// Result of one submission's processing unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Succeeded,
    Failed { kind: FailureKind, detail: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentSummary {
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
}

impl ContentSummary {
    fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Succeeded => self.succeeded += 1,
            RecordOutcome::Failed { kind, .. } => {
                self.failed += 1;
                *self.failures_by_kind.entry(*kind).or_insert(0) += 1;
            },
        }
    }
}

/// Processes every pending or failed submission of one entity
///
/// Each id is its own unit: the content write and the `success` mark commit
/// together, and any failure rolls the unit back before `failed` is
/// committed separately. Only selecting the working set can fail the run.
pub struct ContentSyncer<'a> {
    api: &'a dyn AggregateApi,
    pool: &'a AnyPool,
    schema: &'a EntitySchema,
    tracking: TrackingStore,
    writer: UpsertWriter,
}

impl<'a> ContentSyncer<'a> {
    pub fn new(
        api: &'a dyn AggregateApi,
        pool: &'a AnyPool,
        schema: &'a EntitySchema,
        policy: NullPolicy,
    ) -> Self {
        Self {
            api,
            pool,
            schema,
            tracking: TrackingStore::for_entity(pool.clone(), schema),
            writer: UpsertWriter::for_entity(schema, policy),
        }
    }

    pub async fn run(&self) -> Result<ContentSummary> {
        let ids = self.tracking.select_pending().await?;
        let mut summary = ContentSummary {
            selected: ids.len(),
            ..Default::default()
        };

        if ids.is_empty() {
            info!(entity = %self.schema.name, "No pending submissions");
            return Ok(summary);
        }

        info!(entity = %self.schema.name, count = ids.len(), "Processing submissions");

        for id in &ids {
            let outcome = self.process(id).await;
            summary.record(&outcome);
        }

        info!(
            entity = %self.schema.name,
            selected = summary.selected,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Content sync complete"
        );

        Ok(summary)
    }

    /// Run one id's unit and record its status; never returns an error
    pub async fn process(&self, id: &str) -> RecordOutcome {
        match self.attempt(id).await {
            Ok(()) => {
                debug!(entity = %self.schema.name, submission_id = %id, "Submission stored");
                RecordOutcome::Succeeded
            },
            Err(e) => {
                let kind = e.kind();
                warn!(
                    entity = %self.schema.name,
                    submission_id = %id,
                    kind = %kind,
                    error = %e,
                    "Submission failed"
                );
                if let Err(mark_err) = self.tracking.mark_failed(self.pool, id).await {
                    error!(
                        entity = %self.schema.name,
                        submission_id = %id,
                        error = %mark_err,
                        "Could not record failed status"
                    );
                }
                RecordOutcome::Failed {
                    kind,
                    detail: e.to_string(),
                }
            },
        }
    }

    async fn attempt(&self, id: &str) -> Result<()> {
        let raw = self.api.download_submission(&self.schema.form_id, id).await?;
        let record = RecordExtractor::new(self.schema).extract(&raw)?;

        let mut tx = self.pool.begin().await?;
        self.writer.write(&mut *tx, &record).await?;
        self.tracking.mark_success(&mut *tx, id).await?;
        tx.commit().await?;

        Ok(())
    }
}
