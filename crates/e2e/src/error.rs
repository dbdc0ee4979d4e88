//! Error types for E2E runs

use std::path::PathBuf;

use thiserror::Error;

use crate::lifecycle::RunState;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Cannot read test root {}: {source}", root.display())]
    Discovery {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No test suites found for: \"{filter}\"")]
    SelectionEmpty { filter: String },

    #[error("Failed to start {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server did not become ready at {url} after {attempts} attempts")]
    ReadinessTimeout { url: String, attempts: u32 },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Timed out after {ms} ms: {case}")]
    CaseTimeout { case: String, ms: u64 },

    #[error("Invalid run state transition: {from} -> {to}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("Configuration error: {0}")]
    Config(#[from] sitecheck_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
