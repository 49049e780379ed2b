//! Error types for survey synchronization

use serde::Serialize;
use thiserror::Error;

/// Result type for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised while discovering, fetching, extracting or storing submissions
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network failure, timeout or non-success HTTP status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Expected structural element missing or unparsable
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// Constraint or type failure while upserting a record
    #[error("Write error: {0}")]
    Write(String),

    /// Tracking-table or connection failure outside a record write
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Entity schema is unusable
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDocument(msg.into())
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify an error raised inside a per-submission unit
    ///
    /// Database errors met mid-unit (beginning or committing the record's
    /// transaction) count as write failures.
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Transport(_) => FailureKind::Transport,
            SyncError::MalformedDocument(_) | SyncError::Schema(_) => {
                FailureKind::MalformedDocument
            },
            SyncError::Write(_) | SyncError::Database(_) | SyncError::Config(_) => {
                FailureKind::Write
            },
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Transport(format!("request timed out: {}", err))
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<quick_xml::Error> for SyncError {
    fn from(err: quick_xml::Error) -> Self {
        SyncError::MalformedDocument(err.to_string())
    }
}

impl From<quick_xml::DeError> for SyncError {
    fn from(err: quick_xml::DeError) -> Self {
        SyncError::MalformedDocument(err.to_string())
    }
}

/// Per-record failure classes reported in run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    MalformedDocument,
    Write,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::MalformedDocument => "malformed_document",
            FailureKind::Write => "write",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
