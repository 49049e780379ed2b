//! Error types shared by the MIS workspace crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared ambient layer (logging, value parsing)
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value for {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("Logging error: {0}")]
    Logging(String),
}

impl CommonError {
    /// Create an invalid value error
    pub fn invalid_value(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
        }
    }

    /// Create a logging error
    pub fn logging(msg: impl Into<String>) -> Self {
        Self::Logging(msg.into())
    }
}
