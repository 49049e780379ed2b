//! Duplicate logical row removal

use sqlx::AnyPool;
use tracing::info;

use crate::error::Result;
use crate::schema::{DedupRules, EntitySchema};

/// Keeps one row per row id, deleting the rest in a single statement
///
/// Ranking within a group, best first: `selected` > 0, then `random` > 0,
/// then the smallest key. Rows without a row id are never touched.
pub struct Deduplicator<'a> {
    pool: &'a AnyPool,
    schema: &'a EntitySchema,
    rules: &'a DedupRules,
}

impl<'a> Deduplicator<'a> {
    /// `None` when the entity declares no dedup rules
    pub fn for_entity(pool: &'a AnyPool, schema: &'a EntitySchema) -> Option<Self> {
        schema.dedup.as_ref().map(|rules| Self {
            pool,
            schema,
            rules,
        })
    }

    pub fn statement(&self) -> String {
        let key = &self.schema.key_column;
        let table = &self.schema.destination_table;
        format!(
            "WITH ranked AS (\
                SELECT {key}, ROW_NUMBER() OVER (\
                    PARTITION BY {row_id} \
                    ORDER BY CASE WHEN COALESCE({selected}, 0) > 0 THEN 1 ELSE 0 END DESC, \
                             CASE WHEN COALESCE({random}, 0) > 0 THEN 1 ELSE 0 END DESC, \
                             {key} ASC\
                ) AS rn \
                FROM {table} WHERE {row_id} IS NOT NULL\
            ) \
            DELETE FROM {table} WHERE {key} IN (SELECT {key} FROM ranked WHERE rn > 1)",
            key = key,
            table = table,
            row_id = self.schema.row_id_column,
            selected = self.rules.selected_column,
            random = self.rules.random_column,
        )
    }

    /// Returns the number of deleted rows
    pub async fn run(&self) -> Result<u64> {
        let result = sqlx::query(&self.statement()).execute(self.pool).await?;
        let deleted = result.rows_affected();

        info!(
            entity = %self.schema.name,
            table = %self.schema.destination_table,
            deleted,
            "Deduplication complete"
        );

        Ok(deleted)
    }
}
