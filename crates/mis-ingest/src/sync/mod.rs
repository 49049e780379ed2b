//! Synchronization engine
//!
//! Per entity, in order:
//!
//! 1. [`ListSyncer`] discovers remote submission ids and seeds the tracking table
//! 2. [`ContentSyncer`] downloads, extracts and upserts every pending or failed id
//! 3. [`Deduplicator`] collapses duplicate logical rows, for entities that declare it
//!
//! [`EntityPipeline`] chains the three; [`run_all`] walks a whole catalog.

mod content;
mod dedup;
mod discovery;
mod pipeline;

pub use content::{ContentSummary, ContentSyncer, RecordOutcome};
pub use dedup::Deduplicator;
pub use discovery::{ListSummary, ListSyncer};
pub use pipeline::{run_all, EntityPipeline, EntityReport};
