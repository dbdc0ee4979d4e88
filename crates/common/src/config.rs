//! Harness configuration
//!
//! The global test-configuration artifact (`sitecheck.toml`). Every field has a
//! default so an absent file, or a file that only sets a couple of keys, is a
//! valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Env var carrying the path of the configuration file to child processes
pub const CONFIG_ENV: &str = "SITECHECK_CONFIG";

/// Env var toggling headed mode (`"true"` enables it)
pub const HEADED_ENV: &str = "HEADED";

/// Env var carrying the slow-motion delay in milliseconds
pub const SLOW_MO_ENV: &str = "SLOW_MO";

/// Default configuration file name, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "sitecheck.toml";

/// Slow-motion delay used for headed runs that do not set one explicitly
pub const DEFAULT_HEADED_SLOW_MO_MS: u64 = 50;

/// Top-level harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Suite discovery
    pub suites: SuitesConfig,

    /// Content server
    pub server: ServerConfig,

    /// Browser session
    pub browser: BrowserConfig,

    /// Test-execution command built by the launcher
    pub runner: RunnerConfig,

    /// Per-case execution
    pub harness: CaseConfig,
}

/// Where suites live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SuitesConfig {
    /// Directory whose immediate subdirectories are suites
    pub root: PathBuf,
}

impl Default for SuitesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("tests"),
        }
    }
}

/// Content server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host used to build the base URL
    pub host: String,

    /// Fixed port the server binds to
    pub port: u16,

    /// Directory served by the content server
    pub root: PathBuf,

    /// Command override; `{port}` and `{root}` are substituted.
    /// Empty means the built-in `sitecheck serve`.
    pub command: Vec<String>,

    /// Time between SIGTERM and SIGKILL on shutdown
    pub shutdown_grace_ms: u64,

    /// Readiness polling
    pub readiness: ReadinessConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            root: PathBuf::from("."),
            command: Vec::new(),
            shutdown_grace_ms: 500,
            readiness: ReadinessConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Base URL dependents navigate to
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Readiness polling budget
///
/// The first probe is sent as soon as the server is spawned and the interval
/// only separates probes. A server that never answers is given up on after
/// `(max_attempts - 1) * interval_ms` of waiting plus the probes themselves:
/// 29 s with the defaults, each probe bounded by `request_timeout_ms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Maximum number of probes
    pub max_attempts: u32,

    /// Fixed delay between probes; none before the first
    pub interval_ms: u64,

    /// Per-probe request timeout
    pub request_timeout_ms: u64,

    /// Path probed on the server
    pub path: String,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval_ms: 1000,
            request_timeout_ms: 2000,
            path: "/".to_string(),
        }
    }
}

/// Browser engine to launch
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

impl std::fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewport applied to every browsing context
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Browser session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrowserConfig {
    /// Engine to launch
    pub engine: BrowserEngine,

    /// Viewport for every context
    pub viewport: ViewportConfig,

    /// Run headed even without `HEADED=true`
    pub headed: bool,

    /// Slow-motion delay; `SLOW_MO` takes precedence
    pub slow_mo_ms: Option<u64>,
}

/// Shape of the test-execution invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Executable name
    pub program: String,

    /// Fixed sub-command and arguments placed before the include list
    pub args: Vec<String>,

    /// Flag preceding each suite's target name; empty passes suite paths
    /// instead. Characters cargo rejects in target names become `_`.
    pub include_flag: String,

    /// Arguments appended after the include list
    pub trailing_args: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            args: vec!["test".to_string()],
            include_flag: "--test".to_string(),
            trailing_args: vec!["--".to_string(), "--test-threads=1".to_string()],
        }
    }
}

/// Per-case execution settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaseConfig {
    /// Per-case timeout, setup hook included
    pub case_timeout_ms: u64,
}

impl Default for CaseConfig {
    fn default() -> Self {
        Self {
            case_timeout_ms: 60_000,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file named by `SITECHECK_CONFIG`, or `sitecheck.toml`
    pub fn load_from_env() -> Result<Self> {
        Self::load(&config_path_from_env())
    }

    /// Reject values the harness cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.readiness.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "server.readiness.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(Error::InvalidConfig(
                "server.port must be a fixed, non-zero port".to_string(),
            ));
        }
        if self.runner.program.trim().is_empty() {
            return Err(Error::InvalidConfig("runner.program is empty".to_string()));
        }
        if self.browser.viewport.width == 0 || self.browser.viewport.height == 0 {
            return Err(Error::InvalidConfig(
                "browser.viewport dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve headed mode and slow-motion from this config and the process env
    pub fn run_mode(&self) -> Result<RunMode> {
        RunMode::resolve(
            self.browser.headed,
            self.browser.slow_mo_ms,
            std::env::var(HEADED_ENV).ok().as_deref(),
            std::env::var(SLOW_MO_ENV).ok().as_deref(),
        )
    }
}

/// Path of the configuration file for this process
pub fn config_path_from_env() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Headed/headless mode plus slow-motion delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunMode {
    pub headed: bool,
    pub slow_mo_ms: u64,
}

impl RunMode {
    /// Combine a requested mode with the raw `HEADED` / `SLOW_MO` values.
    ///
    /// Headed when requested or when `HEADED` is exactly `"true"`. The delay
    /// is `SLOW_MO` when present, then the configured value, then 50 ms for
    /// headed runs and 0 otherwise.
    pub fn resolve(
        headed_requested: bool,
        configured_slow_mo: Option<u64>,
        headed_var: Option<&str>,
        slow_mo_var: Option<&str>,
    ) -> Result<Self> {
        let headed = headed_requested || headed_var == Some("true");

        let explicit = match slow_mo_var.map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|e| Error::InvalidEnv {
                var: SLOW_MO_ENV,
                value: raw.to_string(),
                reason: e.to_string(),
            })?),
            None => configured_slow_mo,
        };

        let slow_mo_ms = explicit.unwrap_or(if headed { DEFAULT_HEADED_SLOW_MO_MS } else { 0 });

        Ok(Self { headed, slow_mo_ms })
    }

    pub fn headless(&self) -> bool {
        !self.headed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = HarnessConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.base_url(), "http://localhost:3000");
        assert_eq!(config.server.readiness.max_attempts, 30);
        assert_eq!(config.server.readiness.interval_ms, 1000);
        assert_eq!(config.browser.viewport, ViewportConfig { width: 1280, height: 720 });
        assert_eq!(config.harness.case_timeout_ms, 60_000);
        assert_eq!(config.runner.program, "cargo");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitecheck.toml");
        std::fs::write(
            &path,
            r#"
[suites]
root = "e2e"

[server]
port = 4100

[server.readiness]
max_attempts = 5

[browser]
engine = "firefox"
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.suites.root, PathBuf::from("e2e"));
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.readiness.max_attempts, 5);
        assert_eq!(config.server.readiness.interval_ms, 1000);
        assert_eq!(config.browser.engine, BrowserEngine::Firefox);
        assert_eq!(config.runner, RunnerConfig::default());
    }

    #[test]
    fn example_file_documents_the_defaults() {
        let example = include_str!("../../../sitecheck.example.toml");
        let config: HarnessConfig = toml::from_str(example).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitecheck.toml");
        std::fs::write(&path, "[server.readiness]\nmax_attempts = 0\n").unwrap();

        let err = HarnessConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        let err = HarnessConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn headed_without_delay_defaults_to_fifty_ms() {
        let mode = RunMode::resolve(false, None, Some("true"), None).unwrap();
        assert_eq!(mode, RunMode { headed: true, slow_mo_ms: 50 });
        assert!(!mode.headless());
    }

    #[test]
    fn unset_env_is_headless_without_delay() {
        let mode = RunMode::resolve(false, None, None, None).unwrap();
        assert_eq!(mode, RunMode { headed: false, slow_mo_ms: 0 });
        assert!(mode.headless());
    }

    #[test]
    fn only_literal_true_enables_headed() {
        for raw in ["1", "TRUE", "yes", ""] {
            let mode = RunMode::resolve(false, None, Some(raw), None).unwrap();
            assert!(!mode.headed, "HEADED={raw:?} must not enable headed mode");
        }
    }

    #[test]
    fn explicit_slow_mo_wins() {
        let mode = RunMode::resolve(true, Some(10), None, Some("250")).unwrap();
        assert_eq!(mode.slow_mo_ms, 250);

        let mode = RunMode::resolve(true, Some(10), None, None).unwrap();
        assert_eq!(mode.slow_mo_ms, 10);

        let mode = RunMode::resolve(false, None, None, Some("75")).unwrap();
        assert_eq!(mode, RunMode { headed: false, slow_mo_ms: 75 });
    }

    #[test]
    fn non_numeric_slow_mo_is_an_error() {
        let err = RunMode::resolve(true, None, None, Some("fast")).unwrap_err();
        assert!(matches!(err, Error::InvalidEnv { var: SLOW_MO_ENV, .. }));
    }
}
