//! MIS Ingest Library
//!
//! Incremental synchronization of ODK Aggregate survey submissions into a
//! relational store.
//!
//! # Entities
//!
//! - **census**: household listing, deduplicated by device row id
//! - **household**, **member**: interview forms
//! - **net**, **child**, **visit**: follow-up forms referencing household ids
//!
//! Each entity is described by an [`schema::EntitySchema`]; the same engine
//! ([`sync`]) handles all of them.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mis_ingest::aggregate::AggregateClient;
//! use mis_ingest::config::SyncConfig;
//! use mis_ingest::schema::SchemaCatalog;
//! use mis_ingest::{store, sync::EntityPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::from_env()?;
//!     let pool = store::connect(&config.database).await?;
//!     let client = AggregateClient::new(&config.aggregate)?;
//!
//!     let catalog = SchemaCatalog::builtin();
//!     let census = catalog.require("census")?;
//!     let api = Arc::new(client.with_auth(config.aggregate.auth_for("census")));
//!
//!     let report = EntityPipeline::new(pool, api, config.aggregate.num_entries)
//!         .run(census)
//!         .await?;
//!     println!("{} succeeded", report.content.succeeded);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod aggregate;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod record;
pub mod schema;
pub mod store;
pub mod sync;
pub mod tracking;
pub mod writer;

pub use error::{FailureKind, Result, SyncError};
pub use record::{ExtractedRecord, FieldValue};
