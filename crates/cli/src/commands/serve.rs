//! `sitecheck serve` - static content server for the pages under test

use std::path::{Path, PathBuf};

use axum::Router;
use clap::Args;
use sitecheck_e2e::harness;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Directory to serve
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Port to listen on
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Host to bind
    #[arg(long, default_value = "localhost")]
    pub host: String,
}

/// Static files from `dir`; directories answer with their `index.html`
pub fn router(dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(dir).append_index_html_on_directories(true))
        .layer(TraceLayer::new_for_http())
}

pub async fn execute(args: ServeArgs) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.dir.is_dir(),
        "{} is not a directory",
        args.dir.display()
    );

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    info!(
        "Serving {} on http://{}:{}",
        args.dir.display(),
        args.host,
        args.port
    );

    axum::serve(listener, router(&args.dir))
        .with_graceful_shutdown(harness::shutdown_signal())
        .await?;

    info!("Content server stopped");
    Ok(())
}
