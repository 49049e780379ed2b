//! Declarative entity schemas
//!
//! Each survey entity (census, household, ...) is described by an
//! [`EntitySchema`]: which remote form it comes from, how to find its data
//! block inside a downloaded submission, which leaf elements become which
//! destination columns, and where it is tracked and stored. The sync engine
//! is written once against this description.
//!
//! Schemas can be loaded from TOML:
//!
//! ```toml
//! [[entity]]
//! name = "net"
//! form_id = "net"
//! block_tag = "net"
//! tracking_table = "netids"
//! destination_table = "net"
//! block_match = "first_block_fallback"
//!
//! [[entity.fields]]
//! tag = "household_id"
//! ```

mod catalog;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::record::FieldValue;

pub use catalog::builtin_entities;

/// Table and column names are interpolated into SQL text, never bound
const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// How the entity's data block is located in a submission envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockMatch {
    /// Only a block whose `id` equals the entity's block tag is accepted
    #[default]
    Strict,
    /// Fall back to the first data block when no id matches
    FirstBlockFallback,
}

/// Where a field's element lives relative to the data block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Direct child of the data block
    #[default]
    Data,
    /// Child of the block's OpenRosa `meta` element
    Meta,
}

/// Destination columns of a geolocation composite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeopointColumns {
    #[serde(default = "default_latitude")]
    pub latitude: String,
    #[serde(default = "default_longitude")]
    pub longitude: String,
    #[serde(default = "default_altitude")]
    pub altitude: String,
    #[serde(default = "default_accuracy")]
    pub accuracy: String,
}

fn default_latitude() -> String {
    "latitude".to_string()
}

fn default_longitude() -> String {
    "longitude".to_string()
}

fn default_altitude() -> String {
    "altitude".to_string()
}

fn default_accuracy() -> String {
    "accuracy".to_string()
}

impl Default for GeopointColumns {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
            altitude: default_altitude(),
            accuracy: default_accuracy(),
        }
    }
}

impl GeopointColumns {
    pub fn as_array(&self) -> [&str; 4] {
        [
            self.latitude.as_str(),
            self.longitude.as_str(),
            self.altitude.as_str(),
            self.accuracy.as_str(),
        ]
    }
}

/// Value type of a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Float,
    /// "lat lon [alt [acc]]" decomposed into four float columns
    Geopoint(GeopointColumns),
}

impl FieldKind {
    /// SQL column type used when bootstrapping destination tables
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Text => "TEXT",
            FieldKind::Integer => "BIGINT",
            FieldKind::Float | FieldKind::Geopoint(_) => "DOUBLE PRECISION",
        }
    }

    /// Convert a configured default to this kind's value type
    pub fn coerce_default(&self, value: &FieldValue) -> FieldValue {
        match (self, value) {
            (FieldKind::Integer, FieldValue::Float(v)) => FieldValue::Integer(*v as i64),
            (FieldKind::Float, FieldValue::Integer(v)) => FieldValue::Float(*v as f64),
            (FieldKind::Text, FieldValue::Integer(v)) => FieldValue::Text(v.to_string()),
            (FieldKind::Text, FieldValue::Float(v)) => FieldValue::Text(v.to_string()),
            _ => value.clone(),
        }
    }
}

/// One declared field of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Source element local name
    pub tag: String,
    /// Destination column; defaults to the tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default)]
    pub source: FieldSource,
    #[serde(default)]
    pub kind: FieldKind,
    /// Used when the element is absent or empty, never when it fails to parse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,
}

impl FieldSpec {
    fn new(tag: &str, kind: FieldKind) -> Self {
        Self {
            tag: tag.to_string(),
            column: None,
            source: FieldSource::Data,
            kind,
            default: None,
        }
    }

    pub fn text(tag: &str) -> Self {
        Self::new(tag, FieldKind::Text)
    }

    pub fn integer(tag: &str) -> Self {
        Self::new(tag, FieldKind::Integer)
    }

    pub fn float(tag: &str) -> Self {
        Self::new(tag, FieldKind::Float)
    }

    pub fn geopoint(tag: &str) -> Self {
        Self::new(tag, FieldKind::Geopoint(GeopointColumns::default()))
    }

    pub fn into_column(mut self, column: &str) -> Self {
        self.column = Some(column.to_string());
        self
    }

    pub fn from_meta(mut self) -> Self {
        self.source = FieldSource::Meta;
        self
    }

    pub fn or_default(mut self, value: FieldValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Destination columns this field writes, with their SQL types
    pub fn destination_columns(&self) -> Vec<(&str, &'static str)> {
        match &self.kind {
            FieldKind::Geopoint(cols) => cols
                .as_array()
                .into_iter()
                .map(|c| (c, self.kind.sql_type()))
                .collect(),
            kind => vec![(self.column.as_deref().unwrap_or(self.tag.as_str()), kind.sql_type())],
        }
    }
}

/// Columns used to rank duplicate logical rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRules {
    pub selected_column: String,
    pub random_column: String,
}

fn default_key_column() -> String {
    "instanceid".to_string()
}

fn default_row_id_column() -> String {
    "rowid".to_string()
}

/// Complete description of one survey entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    /// Form identifier on the aggregation server
    pub form_id: String,
    /// `id` attribute of the entity's data block
    pub block_tag: String,
    pub tracking_table: String,
    pub destination_table: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_row_id_column")]
    pub row_id_column: String,
    #[serde(default)]
    pub block_match: BlockMatch,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup: Option<DedupRules>,
}

impl EntitySchema {
    /// Every destination column with its SQL type, key and row id first
    pub fn destination_columns(&self) -> Vec<(&str, &'static str)> {
        let mut columns = vec![
            (self.key_column.as_str(), "TEXT"),
            (self.row_id_column.as_str(), "TEXT"),
        ];
        for field in &self.fields {
            columns.extend(field.destination_columns());
        }
        columns
    }

    /// Check identifiers and column uniqueness
    pub fn validate(&self) -> Result<()> {
        let pattern = Regex::new(IDENTIFIER_PATTERN)
            .map_err(|e| SyncError::schema(format!("identifier pattern: {}", e)))?;

        if self.name.trim().is_empty() {
            return Err(SyncError::schema("entity name cannot be empty"));
        }
        if self.form_id.trim().is_empty() {
            return Err(SyncError::schema(format!("{}: form_id cannot be empty", self.name)));
        }
        if self.block_tag.trim().is_empty() {
            return Err(SyncError::schema(format!("{}: block_tag cannot be empty", self.name)));
        }

        for table in [&self.tracking_table, &self.destination_table] {
            if !pattern.is_match(table) {
                return Err(SyncError::schema(format!(
                    "{}: invalid table name '{}'",
                    self.name, table
                )));
            }
        }
        if self.tracking_table.eq_ignore_ascii_case(&self.destination_table) {
            return Err(SyncError::schema(format!(
                "{}: tracking and destination tables must differ",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for (column, _) in self.destination_columns() {
            if !pattern.is_match(column) {
                return Err(SyncError::schema(format!(
                    "{}: invalid column name '{}'",
                    self.name, column
                )));
            }
            // Unquoted identifiers are case-insensitive in SQL
            if !seen.insert(column.to_ascii_lowercase()) {
                return Err(SyncError::schema(format!(
                    "{}: column '{}' is declared more than once",
                    self.name, column
                )));
            }
        }

        if let Some(rules) = &self.dedup {
            for column in [&rules.selected_column, &rules.random_column] {
                if !seen.contains(&column.to_ascii_lowercase()) {
                    return Err(SyncError::schema(format!(
                        "{}: dedup column '{}' is not a destination column",
                        self.name, column
                    )));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct CatalogFile {
    #[serde(rename = "entity", default)]
    entities: Vec<EntitySchema>,
}

/// Ordered set of entity schemas
///
/// Order is execution order: entities later in the list may reference ids of
/// earlier ones.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    entities: Vec<EntitySchema>,
}

impl SchemaCatalog {
    pub fn new(entities: Vec<EntitySchema>) -> Result<Self> {
        let catalog = Self { entities };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The six survey entities in dependency order
    pub fn builtin() -> Self {
        Self {
            entities: builtin_entities(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| SyncError::schema(format!("invalid schema file: {}", e)))?;
        Self::new(file.entities)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::schema(format!("cannot read schema file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(&CatalogFile {
            entities: self.entities.clone(),
        })
        .map_err(|e| SyncError::schema(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.entities.is_empty() {
            return Err(SyncError::schema("catalog declares no entities"));
        }
        let mut names = HashSet::new();
        for entity in &self.entities {
            entity.validate()?;
            if !names.insert(entity.name.as_str()) {
                return Err(SyncError::schema(format!(
                    "entity '{}' is declared more than once",
                    entity.name
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Look up an entity, failing with the list of known names
    pub fn require(&self, name: &str) -> Result<&EntitySchema> {
        self.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.entities.iter().map(|e| e.name.as_str()).collect();
            SyncError::config(format!(
                "unknown entity '{}' (known: {})",
                name,
                known.join(", ")
            ))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
