//! sitecheck Common Library
//!
//! Configuration, errors and logging shared by the launcher, the suite
//! runner and the content server.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{HarnessConfig, RunMode};
pub use error::{Error, Result};

/// sitecheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env var carrying the launcher's own executable to child processes
pub const BIN_ENV: &str = "SITECHECK_BIN";
