//! `sitecheck run` - select suites and run them

use std::path::Path;

use clap::Args;
use sitecheck_common::config::{HEADED_ENV, SLOW_MO_ENV};
use sitecheck_common::{HarnessConfig, RunMode};
use sitecheck_e2e::harness::INTERRUPTED_EXIT_CODE;
use sitecheck_e2e::launcher::{self, Invocation, LaunchConfig};
use sitecheck_e2e::{suites, E2eError};

use crate::output;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Substring of the suite directory names to run (empty runs all)
    pub filter: Option<String>,

    /// Show the browser window, slowed down
    #[arg(long)]
    pub headed: bool,
}

/// Run the selected suites and return the exit code to use
pub async fn execute(args: RunArgs, config_path: &Path) -> anyhow::Result<i32> {
    let config = HarnessConfig::load(config_path)?;
    let mode = RunMode::resolve(
        args.headed || config.browser.headed,
        config.browser.slow_mo_ms,
        std::env::var(HEADED_ENV).ok().as_deref(),
        std::env::var(SLOW_MO_ENV).ok().as_deref(),
    )?;
    let filter = args.filter.unwrap_or_default();

    output::print_header("🧪 E2E Test Runner");
    if filter.is_empty() {
        println!("🔍 Running all suites");
    } else {
        println!("🔍 Searching for: \"{}\"", filter);
    }

    let selection = match launcher::select(&config.suites.root, &filter) {
        Ok(selection) => selection,
        Err(E2eError::SelectionEmpty { filter }) => {
            output::print_error(&format!("No test suites found for: \"{}\"", filter));
            println!("💡 Available suites:");
            for suite in suites::discover_all(&config.suites.root) {
                output::print_item(&suite.to_string());
            }
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };

    println!("🎯 Suites matching \"{}\":", selection.filter);
    for suite in &selection.suites {
        output::print_item(&suite.to_string());
    }
    println!();

    if mode.headed {
        println!("🖥️  Mode: HEADED (slow-mo {} ms)", mode.slow_mo_ms);
    } else {
        println!("⚡ Mode: HEADLESS");
    }

    let config_abs = config_path
        .canonicalize()
        .unwrap_or_else(|_| config_path.to_path_buf());
    let launch = LaunchConfig::new(filter, mode, config_abs);
    let invocation = Invocation::build(&config.runner, &launch, &selection.suites);

    println!("📋 Command: {}", invocation.command_line());
    println!();

    match invocation.run().await {
        Ok(0) => {
            output::print_success("Tests passed");
            Ok(0)
        }
        Ok(INTERRUPTED_EXIT_CODE) => {
            output::print_warning("Test run interrupted");
            Ok(INTERRUPTED_EXIT_CODE)
        }
        Ok(code) => {
            output::print_error(&format!("Tests failed (exit code: {})", code));
            Ok(code)
        }
        Err(e) => {
            output::print_error(&format!("Failed to run tests: {}", e));
            Ok(1)
        }
    }
}
