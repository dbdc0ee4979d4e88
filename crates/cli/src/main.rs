//! sitecheck CLI - Main Entry Point
//!
//! Selects browser end-to-end suites by name, runs them headless or headed,
//! and serves the pages they test.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sitecheck_cli::commands::{list, run, serve};
use sitecheck_common::config::{CONFIG_ENV, DEFAULT_CONFIG_FILE};

/// sitecheck - browser end-to-end harness
#[derive(Parser)]
#[command(name = "sitecheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = CONFIG_ENV, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the suites whose name contains FILTER
    Run(run::RunArgs),

    /// List every suite
    List,

    /// Serve a directory over HTTP
    Serve(serve::ServeArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    sitecheck_common::logging::init(cli.verbose);

    let code = match cli.command {
        Commands::Run(args) => run::execute(args, &cli.config).await?,
        Commands::List => list::execute(&cli.config)?,
        Commands::Serve(args) => {
            serve::execute(args).await?;
            0
        }
        Commands::Version => {
            println!("sitecheck v{}", sitecheck_common::VERSION);
            0
        }
    };

    std::process::exit(code)
}
