//! Submission id discovery

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::AggregateApi;
use crate::error::Result;
use crate::schema::EntitySchema;
use crate::tracking::TrackingStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListSummary {
    pub pages: u32,
    pub ids_seen: u64,
    pub ids_inserted: u64,
}

/// Pages through the submission list and seeds the tracking table
///
/// Each page is committed before the next is requested. Any error aborts the
/// whole discovery; ids from earlier pages stay seeded.
pub struct ListSyncer<'a> {
    api: &'a dyn AggregateApi,
    tracking: &'a TrackingStore,
    schema: &'a EntitySchema,
    page_size: u32,
}

impl<'a> ListSyncer<'a> {
    pub fn new(
        api: &'a dyn AggregateApi,
        tracking: &'a TrackingStore,
        schema: &'a EntitySchema,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            tracking,
            schema,
            page_size,
        }
    }

    pub async fn run(&self) -> Result<ListSummary> {
        let mut summary = ListSummary::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .api
                .list_submissions(&self.schema.form_id, self.page_size, cursor.as_deref())
                .await?;

            if page.ids.is_empty() {
                break;
            }

            let inserted = self.tracking.seed(&page.ids).await?;
            summary.pages += 1;
            summary.ids_seen += page.ids.len() as u64;
            summary.ids_inserted += inserted;

            debug!(
                entity = %self.schema.name,
                page = summary.pages,
                ids = page.ids.len(),
                inserted,
                "Seeded submission page"
            );

            match page.cursor {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    warn!(entity = %self.schema.name, "Server repeated resumption cursor, stopping");
                    break;
                },
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            entity = %self.schema.name,
            table = %self.tracking.table(),
            pages = summary.pages,
            ids_seen = summary.ids_seen,
            ids_inserted = summary.ids_inserted,
            "Discovery complete"
        );

        Ok(summary)
    }
}
