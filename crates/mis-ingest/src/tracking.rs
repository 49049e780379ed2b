//! Per-entity submission tracking tables
//!
//! One row per remote submission id. `status` is NULL while pending, then
//! `success` or `failed` after a processing attempt. Rows are never deleted,
//! and `success` is never downgraded by this store.
//!
//! Status values are written as SQL literals and read back through a text
//! cast, so the column may be TEXT or a database enum type.

use serde::Serialize;
use sqlx::any::Any;
use sqlx::AnyPool;

use crate::error::Result;
use crate::schema::EntitySchema;

const STATUS_SUCCESS: &str = "success";
const STATUS_FAILED: &str = "failed";

/// Processing state of one tracked submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Success,
    Failed,
}

impl SubmissionStatus {
    /// Stored column value; pending is NULL
    pub fn as_db(&self) -> Option<&'static str> {
        match self {
            SubmissionStatus::Pending => None,
            SubmissionStatus::Success => Some(STATUS_SUCCESS),
            SubmissionStatus::Failed => Some(STATUS_FAILED),
        }
    }

    pub fn from_db(value: Option<&str>) -> Option<Self> {
        match value {
            None => Some(SubmissionStatus::Pending),
            Some(STATUS_SUCCESS) => Some(SubmissionStatus::Success),
            Some(STATUS_FAILED) => Some(SubmissionStatus::Failed),
            Some(_) => None,
        }
    }
}

/// Row counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub success: i64,
    pub failed: i64,
    /// Rows with a status value this store does not write
    pub other: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.success + self.failed + self.other
    }
}

#[derive(Debug, Clone)]
pub struct TrackingStore {
    pool: AnyPool,
    table: String,
}

impl TrackingStore {
    /// `table` must already be a validated identifier
    pub fn new(pool: AnyPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    pub fn for_entity(pool: AnyPool, schema: &EntitySchema) -> Self {
        Self::new(pool, schema.tracking_table.clone())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Insert ids as pending in one transaction, leaving known ids untouched
    ///
    /// Returns how many ids were new.
    pub async fn seed(&self, ids: &[String]) -> Result<u64> {
        let sql = format!(
            "INSERT INTO {} (id, status) VALUES ($1, NULL) ON CONFLICT (id) DO NOTHING",
            self.table
        );

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for id in ids {
            let result = sqlx::query(&sql).bind(id.as_str()).execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        Ok(inserted)
    }

    /// Ids awaiting processing (pending or failed), ordered by id
    pub async fn select_pending(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(&select_pending_sql(&self.table))
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Mark an id processed; runs on the caller's executor so it can share
    /// the content write's transaction
    pub async fn mark_success<'e, E>(&self, executor: E, id: &str) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Any>,
    {
        sqlx::query(&mark_success_sql(&self.table))
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Mark an id failed unless it already succeeded
    pub async fn mark_failed<'e, E>(&self, executor: E, id: &str) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Any>,
    {
        sqlx::query(&mark_failed_sql(&self.table))
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Status of one id, `None` when it is not tracked
    pub async fn status(&self, id: &str) -> Result<Option<SubmissionStatus>> {
        let sql = format!(
            "SELECT CAST(status AS TEXT) FROM {} WHERE id = $1",
            self.table
        );
        let row = sqlx::query_scalar::<_, Option<String>>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|status| SubmissionStatus::from_db(status.as_deref())))
    }

    pub async fn counts(&self) -> Result<StatusCounts> {
        let sql = format!(
            "SELECT CAST(status AS TEXT), COUNT(*) FROM {} GROUP BY status",
            self.table
        );
        let rows = sqlx::query_as::<_, (Option<String>, i64)>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match SubmissionStatus::from_db(status.as_deref()) {
                Some(SubmissionStatus::Pending) => counts.pending += count,
                Some(SubmissionStatus::Success) => counts.success += count,
                Some(SubmissionStatus::Failed) => counts.failed += count,
                None => counts.other += count,
            }
        }
        Ok(counts)
    }
}

fn select_pending_sql(table: &str) -> String {
    format!(
        "SELECT id FROM {} WHERE status IS NULL OR status = '{}' ORDER BY id",
        table, STATUS_FAILED
    )
}

// The id is the only bound parameter
fn mark_success_sql(table: &str) -> String {
    format!(
        "UPDATE {} SET status = '{}' WHERE id = $1",
        table, STATUS_SUCCESS
    )
}

fn mark_failed_sql(table: &str) -> String {
    format!(
        "UPDATE {} SET status = '{}' WHERE id = $1 AND (status IS NULL OR status <> '{}')",
        table, STATUS_FAILED, STATUS_SUCCESS
    )
}
