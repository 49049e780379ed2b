//! MIS Ingest - survey submission sync tool

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mis_common::logging::{init_logging, LogConfig, LogLevel};
use mis_ingest::aggregate::{AggregateApi, AggregateClient};
use mis_ingest::config::{DatabaseConfig, SyncConfig};
use mis_ingest::schema::{EntitySchema, SchemaCatalog};
use mis_ingest::sync::{self, ContentSummary, Deduplicator, EntityPipeline, EntityReport};
use mis_ingest::tracking::TrackingStore;
use mis_ingest::writer::NullPolicy;
use mis_ingest::store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mis-ingest")]
#[command(author, version, about = "Sync MIS survey submissions from ODK Aggregate")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML entity catalog replacing the built-in schemas
    #[arg(long, global = true, env = "MIS_SCHEMA_FILE")]
    schema_file: Option<PathBuf>,

    /// Write absent fields as NULL instead of keeping stored values
    #[arg(long, global = true)]
    overwrite_nulls: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover, download and store submissions, then deduplicate
    Sync {
        /// Only this entity; all entities in order when omitted
        #[arg(short, long)]
        entity: Option<String>,
    },

    /// Discover submission ids into the tracking table
    List {
        #[arg(short, long)]
        entity: String,
    },

    /// Process pending and failed submissions
    Content {
        #[arg(short, long)]
        entity: String,
    },

    /// Remove duplicate logical rows
    Dedup {
        #[arg(short, long)]
        entity: String,
    },

    /// Show tracking counts per entity
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Create tracking and destination tables
    InitDb,

    /// Print the active entity catalog as TOML
    Schema,
}

fn load_catalog(cli: &Cli) -> Result<SchemaCatalog> {
    let catalog = match &cli.schema_file {
        Some(path) => SchemaCatalog::from_file(path)?,
        None => SchemaCatalog::builtin(),
    };
    Ok(catalog)
}

fn null_policy(cli: &Cli) -> NullPolicy {
    if cli.overwrite_nulls {
        NullPolicy::Overwrite
    } else {
        NullPolicy::PreserveExisting
    }
}

fn print_content(entity: &str, summary: &ContentSummary) {
    println!(
        "{:<10} selected {:>6}  succeeded {:>6}  failed {:>6}",
        entity, summary.selected, summary.succeeded, summary.failed
    );
    for (kind, count) in &summary.failures_by_kind {
        println!("{:<10}   {} failures: {}", "", kind, count);
    }
}

fn print_report(report: &EntityReport) {
    println!(
        "{:<10} discovered {:>6} ids ({} new, {} pages)",
        report.entity, report.list.ids_seen, report.list.ids_inserted, report.list.pages
    );
    print_content(&report.entity, &report.content);
    if let Some(deleted) = report.deduplicated {
        println!("{:<10} removed {} duplicates", report.entity, deleted);
    }
}

/// Database-only commands skip the Aggregate settings but not the pool checks
async fn connect_database() -> Result<sqlx::AnyPool> {
    let config = DatabaseConfig::from_env();
    config.validate()?;
    Ok(store::connect(&config).await?)
}

struct SyncContext {
    config: SyncConfig,
    pool: sqlx::AnyPool,
    client: AggregateClient,
}

impl SyncContext {
    async fn connect() -> Result<Self> {
        let config = SyncConfig::from_env()?;
        let pool = store::connect(&config.database).await?;
        let client = AggregateClient::new(&config.aggregate)?;
        Ok(Self {
            config,
            pool,
            client,
        })
    }

    fn api_for(&self, schema: &EntitySchema) -> Arc<dyn AggregateApi> {
        let auth = self.config.aggregate.auth_for(&schema.name);
        Arc::new(self.client.with_auth(auth))
    }

    fn pipeline(&self, schema: &EntitySchema, policy: NullPolicy) -> EntityPipeline {
        EntityPipeline::new(
            self.pool.clone(),
            self.api_for(schema),
            self.config.aggregate.num_entries,
        )
        .with_null_policy(policy)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("mis-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _guard = init_logging(&log_config)?;

    let catalog = load_catalog(&cli)?;
    let policy = null_policy(&cli);

    match &cli.command {
        Command::Sync { entity } => {
            let ctx = SyncContext::connect().await?;
            match entity {
                Some(name) => {
                    let schema = catalog.require(name)?;
                    let report = ctx.pipeline(schema, policy).run(schema).await?;
                    print_report(&report);
                },
                None => {
                    let reports = sync::run_all(
                        &ctx.pool,
                        &catalog,
                        ctx.config.aggregate.num_entries,
                        policy,
                        |schema| ctx.api_for(schema),
                    )
                    .await?;
                    for report in &reports {
                        print_report(report);
                    }
                },
            }
        },
        Command::List { entity } => {
            let ctx = SyncContext::connect().await?;
            let schema = catalog.require(entity)?;
            store::bootstrap(&ctx.pool, schema).await?;
            let summary = ctx.pipeline(schema, policy).discover(schema).await?;
            println!(
                "{:<10} discovered {:>6} ids ({} new, {} pages)",
                schema.name, summary.ids_seen, summary.ids_inserted, summary.pages
            );
        },
        Command::Content { entity } => {
            let ctx = SyncContext::connect().await?;
            let schema = catalog.require(entity)?;
            store::bootstrap(&ctx.pool, schema).await?;
            let summary = ctx.pipeline(schema, policy).sync_content(schema).await?;
            print_content(&schema.name, &summary);
        },
        Command::Dedup { entity } => {
            let schema = catalog.require(entity)?;
            let pool = connect_database().await?;
            let Some(dedup) = Deduplicator::for_entity(&pool, schema) else {
                bail!("entity '{}' has no dedup rules", schema.name);
            };
            let deleted = dedup.run().await?;
            println!("{:<10} removed {} duplicates", schema.name, deleted);
        },
        Command::Status { json } => {
            let pool = connect_database().await?;
            let mut rows = Vec::new();
            for schema in catalog.iter() {
                let counts = TrackingStore::for_entity(pool.clone(), schema).counts().await?;
                rows.push((schema.name.clone(), counts));
            }

            if *json {
                let map: serde_json::Map<String, serde_json::Value> = rows
                    .into_iter()
                    .map(|(name, counts)| Ok((name, serde_json::to_value(counts)?)))
                    .collect::<std::result::Result<_, serde_json::Error>>()?;
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                println!(
                    "{:<10} {:>8} {:>8} {:>8} {:>8}",
                    "entity", "pending", "success", "failed", "total"
                );
                for (name, counts) in rows {
                    println!(
                        "{:<10} {:>8} {:>8} {:>8} {:>8}",
                        name,
                        counts.pending,
                        counts.success,
                        counts.failed,
                        counts.total()
                    );
                }
            }
        },
        Command::InitDb => {
            let pool = connect_database().await?;
            for schema in catalog.iter() {
                store::bootstrap(&pool, schema).await?;
            }
            info!(entities = catalog.len(), "Database initialized");
        },
        Command::Schema => {
            print!("{}", catalog.to_toml_string()?);
        },
    }

    Ok(())
}
