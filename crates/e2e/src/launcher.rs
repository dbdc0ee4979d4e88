//! Process launcher
//!
//! Turns a filter plus run-mode flags into one invocation of the test-execution
//! command, spawns it with the console inherited, and mirrors its exit code.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use sitecheck_common::config::{RunMode, RunnerConfig, CONFIG_ENV, HEADED_ENV, SLOW_MO_ENV};
use sitecheck_common::BIN_ENV;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::suites::{self, SuiteDescriptor};

/// Exit code used when the child has no code of its own (killed by a signal)
pub const SIGNALED_EXIT_CODE: i32 = 1;

/// Per-invocation launch settings
#[derive(Debug, Clone, Default)]
pub struct LaunchConfig {
    /// Substring matched against suite names; empty selects every suite
    pub filter: String,

    /// Resolved headed mode and slow-motion delay
    pub mode: RunMode,

    /// Configuration file forwarded to the child
    pub config_path: PathBuf,

    /// Executable the child uses to start the content server
    pub self_exe: Option<PathBuf>,

    /// Extra variables forwarded verbatim
    pub env: BTreeMap<String, String>,
}

impl LaunchConfig {
    pub fn new(filter: impl Into<String>, mode: RunMode, config_path: impl Into<PathBuf>) -> Self {
        Self {
            filter: filter.into(),
            mode,
            config_path: config_path.into(),
            self_exe: std::env::current_exe().ok(),
            env: BTreeMap::new(),
        }
    }
}

/// Suites chosen for a launch
#[derive(Debug, Clone)]
pub struct Selection {
    pub filter: String,
    pub suites: Vec<SuiteDescriptor>,
}

/// Select the suites for `filter` under `root`.
///
/// An unreadable root counts as no suites. No match yields
/// [`E2eError::SelectionEmpty`]; callers show [`suites::discover_all`] as a hint.
pub fn select(root: &Path, filter: &str) -> E2eResult<Selection> {
    let suites = match suites::discover(root, filter) {
        Ok(suites) => suites,
        Err(e) => {
            warn!("{}", e);
            Vec::new()
        }
    };

    if suites.is_empty() {
        return Err(E2eError::SelectionEmpty {
            filter: filter.to_string(),
        });
    }

    Ok(Selection {
        filter: filter.to_string(),
        suites,
    })
}

/// A fully built command: program, arguments and the env it adds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    /// Build the command for `suites` from the `[runner]` shape
    pub fn build(runner: &RunnerConfig, launch: &LaunchConfig, suites: &[SuiteDescriptor]) -> Self {
        let mut args = runner.args.clone();
        for suite in suites {
            if runner.include_flag.is_empty() {
                args.push(suite.path.display().to_string());
            } else {
                args.push(runner.include_flag.clone());
                args.push(suite.target_name());
            }
        }
        args.extend(runner.trailing_args.iter().cloned());

        let mut env = launch.env.clone();
        env.insert(
            CONFIG_ENV.to_string(),
            launch.config_path.display().to_string(),
        );
        if let Some(exe) = &launch.self_exe {
            env.insert(BIN_ENV.to_string(), exe.display().to_string());
        }
        if launch.mode.headed {
            env.insert(HEADED_ENV.to_string(), "true".to_string());
            env.insert(SLOW_MO_ENV.to_string(), launch.mode.slow_mo_ms.to_string());
        }

        Self {
            program: runner.program.clone(),
            args,
            env,
        }
    }

    /// The command as it would be typed, for the console
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawn with inherited stdio and wait for the child's exit code.
    ///
    /// Ctrl-C does not abandon the child; it receives the signal through the
    /// shared process group and the launcher keeps waiting for it to finish
    /// its own teardown.
    pub async fn run(&self) -> E2eResult<i32> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        debug!("Spawning: {}", self.command_line());
        let mut child = command.spawn().map_err(|source| E2eError::Launch {
            program: self.program.clone(),
            source,
        })?;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted, waiting for test run to shut down");
                }
            }
        };

        Ok(exit_code(status))
    }
}

/// The child's exit code, or [`SIGNALED_EXIT_CODE`] when it has none
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SIGNALED_EXIT_CODE)
}
