//! Error types for sitecheck configuration

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the sitecheck common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading or validating harness configuration
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
}
