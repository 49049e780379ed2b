//! Idempotent upserts of extracted records

use serde::{Deserialize, Serialize};
use sqlx::any::{Any, AnyArguments};
use sqlx::query::Query;

use crate::error::{Result, SyncError};
use crate::record::{ExtractedRecord, FieldValue};
use crate::schema::EntitySchema;

/// What an upsert does with columns the record has no value for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Leave absent columns out of the statement; stored values survive
    #[default]
    PreserveExisting,
    /// Write absent columns as NULL, replacing stored values
    Overwrite,
}

/// Generated statement and the values bound to its placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertStatement<'r> {
    pub sql: String,
    pub values: Vec<&'r FieldValue>,
}

#[derive(Debug, Clone)]
pub struct UpsertWriter {
    table: String,
    policy: NullPolicy,
}

impl UpsertWriter {
    pub fn new(table: impl Into<String>, policy: NullPolicy) -> Self {
        Self {
            table: table.into(),
            policy,
        }
    }

    pub fn for_entity(schema: &EntitySchema, policy: NullPolicy) -> Self {
        Self::new(schema.destination_table.clone(), policy)
    }

    pub fn policy(&self) -> NullPolicy {
        self.policy
    }

    /// Build `INSERT .. ON CONFLICT (key) DO UPDATE` for one record
    ///
    /// NULL columns are written as literals, so every bound value is typed.
    pub fn statement<'r>(&self, record: &'r ExtractedRecord) -> UpsertStatement<'r> {
        let key = record.key_column();
        let mut columns = vec![key.to_string()];
        let mut placeholders = vec!["$1".to_string()];
        let mut values: Vec<&'r FieldValue> = Vec::new();
        let mut updates = Vec::new();

        for (column, value) in record.columns() {
            if column.eq_ignore_ascii_case(key) {
                continue;
            }
            if value.is_null() {
                if self.policy == NullPolicy::PreserveExisting {
                    continue;
                }
                placeholders.push("NULL".to_string());
            } else {
                values.push(value);
                placeholders.push(format!("${}", values.len() + 1));
            }
            columns.push(column.to_string());
            updates.push(format!("{} = EXCLUDED.{}", column, column));
        }

        let conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        UpsertStatement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
                self.table,
                columns.join(", "),
                placeholders.join(", "),
                key,
                conflict
            ),
            values,
        }
    }

    /// Write one record on the given executor
    ///
    /// Statement failures come back as [`SyncError::Write`].
    pub async fn write<'e, E>(&self, executor: E, record: &ExtractedRecord) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Any>,
    {
        let statement = self.statement(record);

        let mut query = sqlx::query(&statement.sql).bind(record.instance_id());
        for value in &statement.values {
            query = bind_value(query, value);
        }

        query.execute(executor).await.map_err(|e| {
            SyncError::write(format!(
                "upsert into {} failed for {}: {}",
                self.table,
                record.instance_id(),
                e
            ))
        })?;

        Ok(())
    }
}

fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &'q FieldValue,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        FieldValue::Text(text) => query.bind(text.as_str()),
        FieldValue::Integer(v) => query.bind(*v),
        FieldValue::Float(v) => query.bind(*v),
        FieldValue::Null => query.bind(None::<String>),
    }
}
