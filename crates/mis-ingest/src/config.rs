//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{Result, SyncError};

// ============================================================================
// Aggregate Configuration Constants
// ============================================================================

/// Default request timeout in seconds for discovery and download calls.
pub const DEFAULT_AGG_TIMEOUT_SECS: u64 = 90;

/// Default number of submission ids requested per discovery page.
pub const DEFAULT_NUM_ENTRIES: u32 = 100;

/// Default user agent sent to the aggregation server.
pub const DEFAULT_USER_AGENT: &str = "MIS-Ingest/0.1";

/// Prefix of per-entity authentication overrides, e.g. `AGG_AUTH_SCHEME_CENSUS`.
pub const AUTH_SCHEME_OVERRIDE_PREFIX: &str = "AGG_AUTH_SCHEME_";

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/mis";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// HTTP authentication scheme used against the aggregation server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    Basic,
    #[default]
    Digest,
}

impl FromStr for AuthScheme {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(AuthScheme::Basic),
            "digest" => Ok(AuthScheme::Digest),
            other => Err(SyncError::config(format!(
                "unknown auth scheme '{}' (expected basic or digest)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthScheme::Basic => f.write_str("basic"),
            AuthScheme::Digest => f.write_str("digest"),
        }
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub aggregate: AggregateConfig,
    pub database: DatabaseConfig,
}

/// Aggregation server configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub auth_scheme: AuthScheme,
    /// Keyed by lowercase entity name
    pub auth_overrides: HashMap<String, AuthScheme>,
    pub timeout_secs: u64,
    pub num_entries: u32,
    pub user_agent: String,
}

impl std::fmt::Debug for AggregateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_scheme", &self.auth_scheme)
            .field("auth_overrides", &self.auth_overrides)
            .field("timeout_secs", &self.timeout_secs)
            .field("num_entries", &self.num_entries)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl AggregateConfig {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            auth_scheme: AuthScheme::default(),
            auth_overrides: HashMap::new(),
            timeout_secs: DEFAULT_AGG_TIMEOUT_SECS,
            num_entries: DEFAULT_NUM_ENTRIES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Authentication scheme for one entity, falling back to the default
    pub fn auth_for(&self, entity: &str) -> AuthScheme {
        self.auth_overrides
            .get(&entity.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.auth_scheme)
    }

    fn from_env() -> Result<Self> {
        let base_url = std::env::var("AGGREGATE_URL")
            .map_err(|_| SyncError::config("AGGREGATE_URL is not set"))?;
        let username = std::env::var("AGG_USERNAME")
            .map_err(|_| SyncError::config("AGG_USERNAME is not set"))?;
        let password = std::env::var("AGG_PASSWORD").unwrap_or_default();

        let mut config = Self::new(base_url, username, password);

        if let Ok(scheme) = std::env::var("AGG_AUTH_SCHEME") {
            config.auth_scheme = scheme.parse()?;
        }
        config.auth_overrides = auth_overrides_from(std::env::vars())?;
        config.timeout_secs = env_parse("AGG_TIMEOUT_SECS", DEFAULT_AGG_TIMEOUT_SECS);
        config.num_entries = env_parse("NUM_ENTRIES", DEFAULT_NUM_ENTRIES);
        if let Ok(agent) = std::env::var("AGG_USER_AGENT") {
            config.user_agent = agent;
        }

        Ok(config)
    }
}

/// Collect `AGG_AUTH_SCHEME_<ENTITY>` overrides from environment pairs
fn auth_overrides_from(
    vars: impl Iterator<Item = (String, String)>,
) -> Result<HashMap<String, AuthScheme>> {
    let mut overrides = HashMap::new();
    for (key, value) in vars {
        if let Some(entity) = key.strip_prefix(AUTH_SCHEME_OVERRIDE_PREFIX) {
            if entity.is_empty() {
                continue;
            }
            overrides.insert(entity.to_ascii_lowercase(), value.parse()?);
        }
    }
    Ok(overrides)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
        }
    }

    /// Read `DATABASE_*` variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
            min_connections: env_parse("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
            connect_timeout_secs: env_parse(
                "DATABASE_CONNECT_TIMEOUT",
                DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            ),
            idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(SyncError::config("Database URL cannot be empty"));
        }

        // Validate connection pool settings
        if self.max_connections == 0 {
            return Err(SyncError::config(
                "Database max_connections must be greater than 0",
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(SyncError::config(
                "Database min_connections cannot exceed max_connections",
            ));
        }

        Ok(())
    }
}

impl SyncConfig {
    /// Load configuration from environment and defaults
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = SyncConfig {
            aggregate: AggregateConfig::from_env()?,
            database: DatabaseConfig::from_env(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let agg = &self.aggregate;

        if agg.base_url.is_empty() {
            return Err(SyncError::config("Aggregate base URL cannot be empty"));
        }
        if !(agg.base_url.starts_with("http://") || agg.base_url.starts_with("https://")) {
            return Err(SyncError::config(format!(
                "Aggregate base URL must start with http:// or https://, got '{}'",
                agg.base_url
            )));
        }
        if agg.username.is_empty() {
            return Err(SyncError::config("Aggregate username cannot be empty"));
        }
        if agg.num_entries == 0 {
            return Err(SyncError::config("Page size must be greater than 0"));
        }
        if agg.timeout_secs == 0 {
            return Err(SyncError::config("Request timeout must be greater than 0"));
        }

        self.database.validate()
    }
}
