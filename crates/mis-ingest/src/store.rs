//! Database connection and table bootstrap

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::schema::EntitySchema;

/// Connect to Postgres (or SQLite for local runs) through the `Any` driver
pub async fn connect(config: &DatabaseConfig) -> Result<AnyPool> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &AnyPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

pub fn tracking_table_ddl(schema: &EntitySchema) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, status TEXT)",
        schema.tracking_table
    )
}

pub fn destination_table_ddl(schema: &EntitySchema) -> String {
    let columns: Vec<String> = schema
        .destination_columns()
        .into_iter()
        .enumerate()
        .map(|(i, (name, sql_type))| {
            if i == 0 {
                format!("{} {} PRIMARY KEY", name, sql_type)
            } else {
                format!("{} {}", name, sql_type)
            }
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        schema.destination_table,
        columns.join(", ")
    )
}

/// Create the entity's tracking and destination tables if missing
///
/// Existing tables are left as they are; column drift is not reconciled.
pub async fn bootstrap(pool: &AnyPool, schema: &EntitySchema) -> Result<()> {
    schema.validate()?;

    sqlx::query(&tracking_table_ddl(schema)).execute(pool).await?;
    sqlx::query(&destination_table_ddl(schema)).execute(pool).await?;

    tracing::debug!(
        entity = %schema.name,
        tracking_table = %schema.tracking_table,
        destination_table = %schema.destination_table,
        "Tables ready"
    );

    Ok(())
}
