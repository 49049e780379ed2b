//! MIS Common Library
//!
//! Ambient concerns shared by the MIS survey synchronization crates.
//!
//! - **Error Handling**: [`CommonError`] and its result alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//!
//! # Example
//!
//! ```no_run
//! use mis_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> mis_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("logging ready");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
