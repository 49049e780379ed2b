//! Aggregate server access
//!
//! [`AggregateApi`] is the seam between the sync engine and the remote
//! server: discovery pages of submission ids and per-id document downloads.
//! [`AggregateClient`] implements it over HTTP.

mod client;
pub mod digest;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Result, SyncError};

pub use client::AggregateClient;

/// One page of the submission list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubmissionPage {
    pub ids: Vec<String>,
    /// Opaque cursor for the next page, `None` when the server sent none
    pub cursor: Option<String>,
}

impl SubmissionPage {
    /// Parse an `idChunk` response body
    pub fn from_xml(body: &str) -> Result<Self> {
        let chunk: IdChunk = quick_xml::de::from_str(body)
            .map_err(|e| SyncError::malformed(format!("invalid submission list: {}", e)))?;

        let ids = chunk
            .id_list
            .ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        let cursor = chunk
            .resumption_cursor
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(Self { ids, cursor })
    }
}

#[derive(Debug, Deserialize)]
struct IdChunk {
    #[serde(rename = "idList", default)]
    id_list: IdList,
    #[serde(rename = "resumptionCursor", default)]
    resumption_cursor: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct IdList {
    #[serde(rename = "id", default)]
    ids: Vec<String>,
}

/// Downloaded submission envelope, held only for one processing attempt
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub submission_id: String,
    pub body: String,
}

#[async_trait]
pub trait AggregateApi: Send + Sync {
    /// Fetch one page of submission ids, starting at `cursor`
    async fn list_submissions(
        &self,
        form_id: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<SubmissionPage>;

    /// Download the envelope document of one submission
    async fn download_submission(&self, form_id: &str, submission_id: &str)
        -> Result<RawDocument>;
}
