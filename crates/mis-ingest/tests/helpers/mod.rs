//! Test helpers for mis-ingest integration tests
//!
//! - In-memory SQLite pool behind the `Any` driver
//! - A scripted [`AggregateApi`] that serves canned pages and documents
//! - Submission envelope builders

#![allow(dead_code)]

use async_trait::async_trait;
use mis_ingest::aggregate::{AggregateApi, RawDocument, SubmissionPage};
use mis_ingest::schema::{EntitySchema, SchemaCatalog};
use mis_ingest::{Result, SyncError};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::collections::HashMap;
use std::sync::Mutex;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mis_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Single-connection in-memory database
///
/// The connection is never recycled, so the database lives as long as the
/// pool. Never hold a transaction while using the pool directly.
pub async fn test_pool() -> AnyPool {
    sqlx::any::install_default_drivers();

    AnyPoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite database")
}

pub fn builtin(name: &str) -> EntitySchema {
    SchemaCatalog::builtin()
        .get(name)
        .cloned()
        .expect("unknown builtin entity")
}

/// Envelope as served by `downloadSubmission`
pub fn envelope(block_id: &str, instance_id: &str, row_id: Option<&str>, fields: &str) -> String {
    let row = row_id
        .map(|r| format!("<orx:rowID>{}</orx:rowID>", r))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<submission xmlns="http://opendatakit.org/submissions" xmlns:orx="http://openrosa.org/xforms">
  <data>
    <data id="{block_id}" instanceID="{instance_id}" submissionDate="2025-03-01T08:00:00.000Z">
      <orx:meta>
        <orx:instanceID>{instance_id}</orx:instanceID>
        {row}
      </orx:meta>
      {fields}
    </data>
  </data>
</submission>"#
    )
}

/// Body of a `submissionList` page
pub fn id_chunk(ids: &[&str], cursor: Option<&str>) -> String {
    let ids: String = ids.iter().map(|id| format!("<id>{}</id>", id)).collect();
    let cursor = cursor
        .map(|c| format!("<resumptionCursor>{}</resumptionCursor>", c))
        .unwrap_or_default();
    format!(
        r#"<idChunk xmlns="http://opendatakit.org/submissions"><idList>{}</idList>{}</idChunk>"#,
        ids, cursor
    )
}

/// Scripted Aggregate server
///
/// Pages are keyed by the cursor they answer (`None` for the first page).
/// Unknown cursors and unknown submission ids are transport errors.
#[derive(Default)]
pub struct FakeAggregate {
    pages: Mutex<HashMap<Option<String>, SubmissionPage>>,
    documents: Mutex<HashMap<String, String>>,
    list_calls: Mutex<Vec<Option<String>>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, cursor: Option<&str>, ids: &[&str], next: Option<&str>) -> Self {
        self.pages.lock().unwrap().insert(
            cursor.map(str::to_string),
            SubmissionPage {
                ids: ids.iter().map(|id| id.to_string()).collect(),
                cursor: next.map(str::to_string),
            },
        );
        self
    }

    pub fn document(self, id: &str, body: impl Into<String>) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert(id.to_string(), body.into());
        self
    }

    pub fn set_document(&self, id: &str, body: impl Into<String>) {
        self.documents
            .lock()
            .unwrap()
            .insert(id.to_string(), body.into());
    }

    pub fn list_calls(&self) -> Vec<Option<String>> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl AggregateApi for FakeAggregate {
    async fn list_submissions(
        &self,
        _form_id: &str,
        _page_size: u32,
        cursor: Option<&str>,
    ) -> Result<SubmissionPage> {
        let key = cursor.map(str::to_string);
        self.list_calls.lock().unwrap().push(key.clone());
        self.pages
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| SyncError::transport(format!("no page for cursor {:?}", key)))
    }

    async fn download_submission(&self, _form_id: &str, submission_id: &str) -> Result<RawDocument> {
        self.downloads.lock().unwrap().push(submission_id.to_string());
        let body = self
            .documents
            .lock()
            .unwrap()
            .get(submission_id)
            .cloned()
            .ok_or_else(|| SyncError::transport(format!("GET {} returned 503", submission_id)))?;
        Ok(RawDocument {
            submission_id: submission_id.to_string(),
            body,
        })
    }
}
