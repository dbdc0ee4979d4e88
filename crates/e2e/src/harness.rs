//! Suite runner
//!
//! A suite binary registers its cases on a [`Suite`] and hands it a driver.
//! The runner owns the whole run: it starts the content server, launches one
//! browser once the server is ready, runs every case sequentially in its own
//! context, and tears everything down on every path.
//!
//! ```ignore
//! use sitecheck_e2e::harness::{self, Suite};
//!
//! fn main() -> std::process::ExitCode {
//!     harness::main(
//!         Suite::new("searchbar").case("shows results", |s| {
//!             Box::pin(async move {
//!                 s.page().fill("#search", "rust").await?;
//!                 Ok(())
//!             })
//!         }),
//!     )
//! }
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use sitecheck_common::config::{HarnessConfig, RunMode};
use tracing::{error, info, warn};

use crate::browser::{BrowserOptions, BrowserSession, Driver, PageHandle};
use crate::context::RunContext;
use crate::error::{E2eError, E2eResult};
use crate::lifecycle::{Lifecycle, RunState};
use crate::server::ServerHandle;

/// Exit code for a run stopped by Ctrl-C or SIGTERM
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// libtest flags whose value may follow as a separate argument
const VALUE_FLAGS: &[&str] = &[
    "--test-threads",
    "--skip",
    "--color",
    "--format",
    "--logfile",
    "--shuffle-seed",
    "-Z",
];

/// Future returned by a case body or setup hook
pub type CaseFuture<'a> = BoxFuture<'a, anyhow::Result<()>>;

type CaseFn<D> = Box<dyn for<'a> Fn(&'a Scenario<'a, D>) -> CaseFuture<'a> + Send + Sync>;

/// What a case body sees: its own page plus the run context
pub struct Scenario<'a, D: Driver> {
    name: &'a str,
    run: &'a RunContext<D>,
    handle: &'a PageHandle<D>,
}

impl<'a, D: Driver> Scenario<'a, D> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn page(&self) -> &'a D::Page {
        self.handle.page()
    }

    pub fn context(&self) -> &'a D::Context {
        self.handle.context()
    }

    pub fn handle(&self) -> &'a PageHandle<D> {
        self.handle
    }

    pub fn run(&self) -> &'a RunContext<D> {
        self.run
    }

    pub fn base_url(&self) -> &'a str {
        self.run.base_url()
    }

    /// `path` resolved against the base URL
    pub fn url(&self, path: &str) -> String {
        self.run.url(path)
    }

    /// Navigate this case's page and wait for network idle
    pub async fn goto(&self, path: &str) -> E2eResult<()> {
        self.run.browser().navigate(self.handle, &self.url(path)).await
    }
}

struct Case<D: Driver> {
    name: String,
    body: CaseFn<D>,
}

/// Result of one case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseOutcome {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Context the case ran in, if one was opened
    pub context_id: Option<u64>,
}

impl CaseOutcome {
    fn failed(name: &str, duration_ms: u64, error: String, context_id: Option<u64>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            duration_ms,
            error: Some(error),
            context_id,
        }
    }
}

/// Result of a whole suite run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub suite: String,
    pub cases: Vec<CaseOutcome>,
    /// Why the run never reached its cases
    pub setup_error: Option<String>,
    pub interrupted: bool,
    pub duration_ms: u64,
    /// Console and page errors forwarded during the run
    pub diagnostics: usize,
    pub final_state: RunState,
}

impl RunReport {
    fn new(suite: &str) -> Self {
        Self {
            suite: suite.to_string(),
            cases: Vec::new(),
            setup_error: None,
            interrupted: false,
            duration_ms: 0,
            diagnostics: 0,
            final_state: RunState::Idle,
        }
    }

    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }

    pub fn success(&self) -> bool {
        self.setup_error.is_none() && !self.interrupted && self.failed() == 0
    }

    /// 0 when setup succeeded and every case passed, 130 when interrupted,
    /// 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            INTERRUPTED_EXIT_CODE
        } else if self.success() {
            0
        } else {
            1
        }
    }

    pub fn log_summary(&self) {
        info!("");
        if let Some(err) = &self.setup_error {
            error!("❌ {}: setup failed: {}", self.suite, err);
        }
        if self.interrupted {
            warn!("⚠️  {}: interrupted", self.suite);
        }
        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            self.passed(),
            self.failed(),
            self.duration_ms
        );
    }
}

/// A named, ordered list of cases plus an optional setup hook
pub struct Suite<D: Driver> {
    name: String,
    cases: Vec<Case<D>>,
    before_each: Option<CaseFn<D>>,
    filter: Option<String>,
}

impl<D: Driver> Suite<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
            before_each: None,
            filter: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a case; cases run in registration order
    pub fn case<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a Scenario<'a, D>) -> CaseFuture<'a> + Send + Sync + 'static,
    {
        self.cases.push(Case {
            name: name.into(),
            body: Box::new(body),
        });
        self
    }

    /// Replace the default setup hook (navigate to the base URL and wait for
    /// network idle). Runs inside the case's timeout.
    pub fn before_each<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a Scenario<'a, D>) -> CaseFuture<'a> + Send + Sync + 'static,
    {
        self.before_each = Some(Box::new(hook));
        self
    }

    /// Only run cases whose name contains `filter`
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter.filter(|f| !f.is_empty());
        self
    }

    pub fn case_names(&self) -> Vec<&str> {
        self.selected().map(|c| c.name.as_str()).collect()
    }

    fn selected(&self) -> impl Iterator<Item = &Case<D>> {
        self.cases.iter().filter(move |c| match &self.filter {
            Some(filter) => c.name.contains(filter.as_str()),
            None => true,
        })
    }

    /// Run the suite, stopping early on Ctrl-C or SIGTERM
    pub async fn run(&self, driver: Arc<D>, config: &HarnessConfig, mode: RunMode) -> RunReport {
        self.run_until(driver, config, mode, shutdown_signal()).await
    }

    /// Run the suite, stopping early when `shutdown` completes
    pub async fn run_until<S>(
        &self,
        driver: Arc<D>,
        config: &HarnessConfig,
        mode: RunMode,
        shutdown: S,
    ) -> RunReport
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let started = Instant::now();
        let mut report = RunReport::new(&self.name);
        let mut lifecycle = Lifecycle::new();
        let mut server: Option<ServerHandle> = None;

        info!("🧪 Suite: {}", self.name);

        let setup = tokio::select! {
            result = self.setup(driver, config, mode, &mut lifecycle, &mut server) => Some(result),
            _ = &mut shutdown => None,
        };

        let mut run = match setup {
            Some(Ok(run)) => Some(run),
            Some(Err(e)) => {
                error!("❌ {}", e);
                report.setup_error = Some(e.to_string());
                None
            }
            None => {
                report.interrupted = true;
                None
            }
        };

        if let Some(ctx) = run.as_ref() {
            let timeout = Duration::from_millis(config.harness.case_timeout_ms);
            info!("Running {} case(s)...", self.case_names().len());

            for case in self.selected() {
                if let Err(e) = lifecycle.transition(RunState::ContextOpen) {
                    error!("❌ {}", e);
                    break;
                }

                let case_started = Instant::now();
                let outcome = match ctx.new_page().await {
                    Ok(handle) => {
                        let context_id = handle.id();
                        let result = tokio::select! {
                            result = self.execute(case, ctx, &handle, timeout) => Some(result),
                            _ = &mut shutdown => None,
                        };
                        ctx.close_page(handle).await;

                        let duration_ms = case_started.elapsed().as_millis() as u64;
                        match result {
                            Some(Ok(())) => CaseOutcome {
                                name: case.name.clone(),
                                passed: true,
                                duration_ms,
                                error: None,
                                context_id: Some(context_id),
                            },
                            Some(Err(message)) => {
                                CaseOutcome::failed(&case.name, duration_ms, message, Some(context_id))
                            }
                            None => {
                                report.interrupted = true;
                                CaseOutcome::failed(
                                    &case.name,
                                    duration_ms,
                                    "interrupted".to_string(),
                                    Some(context_id),
                                )
                            }
                        }
                    }
                    Err(e) => CaseOutcome::failed(
                        &case.name,
                        case_started.elapsed().as_millis() as u64,
                        e.to_string(),
                        None,
                    ),
                };

                if outcome.passed {
                    info!("✓ {} ({} ms)", outcome.name, outcome.duration_ms);
                } else {
                    error!(
                        "✗ {} - {}",
                        outcome.name,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }
                report.cases.push(outcome);

                if let Err(e) = lifecycle.transition(RunState::ContextClosed) {
                    error!("❌ {}", e);
                    break;
                }
                if report.interrupted {
                    break;
                }
            }

            report.diagnostics = ctx.browser().diagnostics().len();
        }

        self.teardown(&mut lifecycle, run.take(), server.take()).await;

        report.final_state = lifecycle.state();
        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }

    async fn setup(
        &self,
        driver: Arc<D>,
        config: &HarnessConfig,
        mode: RunMode,
        lifecycle: &mut Lifecycle,
        server_slot: &mut Option<ServerHandle>,
    ) -> E2eResult<RunContext<D>> {
        lifecycle.transition(RunState::ServerStarting)?;

        let base_url = match ServerHandle::start(&config.server).await {
            Ok(handle) => {
                let url = handle.base_url().to_string();
                *server_slot = Some(handle);
                lifecycle.transition(RunState::ServerReady)?;
                url
            }
            Err(e) => {
                lifecycle.transition(RunState::ServerFailed)?;
                return Err(e);
            }
        };

        lifecycle.transition(RunState::BrowserLaunching)?;
        let browser = BrowserSession::launch(driver, BrowserOptions::new(&config.browser, mode)).await?;
        lifecycle.transition(RunState::Ready)?;

        Ok(RunContext::new(base_url, browser))
    }

    /// Setup hook plus body, under the case timeout, with panics caught
    async fn execute(
        &self,
        case: &Case<D>,
        run: &RunContext<D>,
        handle: &PageHandle<D>,
        timeout: Duration,
    ) -> Result<(), String> {
        let scenario = Scenario {
            name: &case.name,
            run,
            handle,
        };

        let body = async {
            let setup = match &self.before_each {
                Some(hook) => hook(&scenario).await,
                None => scenario.goto("").await.map_err(anyhow::Error::from),
            };
            match setup {
                Ok(()) => (case.body)(&scenario).await,
                Err(e) => Err(e),
            }
        };

        match tokio::time::timeout(timeout, AssertUnwindSafe(body).catch_unwind()).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
            Ok(Err(panic)) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
            Err(_) => Err(E2eError::CaseTimeout {
                case: case.name.clone(),
                ms: timeout.as_millis() as u64,
            }
            .to_string()),
        }
    }

    /// Close the browser, then stop the server. Runs exactly once.
    async fn teardown(
        &self,
        lifecycle: &mut Lifecycle,
        run: Option<RunContext<D>>,
        server: Option<ServerHandle>,
    ) {
        if !lifecycle.begin_teardown() {
            return;
        }

        if let Some(run) = run {
            let mut browser = run.into_browser();
            browser.close().await;
        }
        if let Some(mut server) = server {
            server.stop().await;
        }

        if let Err(e) = lifecycle.transition(RunState::Terminated) {
            warn!("{}", e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
///
/// The SIGTERM handler is installed when this is called, not when the future
/// is first polled. Must be called inside a tokio runtime.
pub fn shutdown_signal() -> impl Future<Output = ()> + Send {
    #[cfg(unix)]
    let terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());

    async move {
        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                // No handler available; never resolve from this branch
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match terminate {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!("Cannot listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }
}

/// Case-name filter from a suite binary's arguments: the first positional
/// argument. Flags are ignored, along with the value of libtest flags that
/// take one (`--test-threads 1`).
pub fn filter_from_args<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            args.next();
        } else if !arg.starts_with('-') {
            return Some(arg);
        }
    }
    None
}

/// Entry point body for a `harness = false` suite binary
///
/// Initialises logging, loads configuration from `SITECHECK_CONFIG`, resolves
/// the run mode from `HEADED` / `SLOW_MO`, creates the driver, runs the suite,
/// logs the summary and returns the exit code.
pub fn run_main<D, F, Fut>(suite: Suite<D>, make_driver: F) -> i32
where
    D: Driver,
    F: FnOnce() -> Fut,
    Fut: Future<Output = E2eResult<D>>,
{
    sitecheck_common::logging::init(false);

    let prepared = HarnessConfig::load_from_env()
        .and_then(|config| config.run_mode().map(|mode| (config, mode)));
    let (config, mode) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("❌ {}", e);
            return 1;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("❌ Failed to create runtime: {}", e);
            return 1;
        }
    };

    let suite = suite.with_filter(filter_from_args(std::env::args()));

    runtime.block_on(async {
        let driver = match make_driver().await {
            Ok(driver) => Arc::new(driver),
            Err(e) => {
                error!("❌ {}", e);
                return 1;
            }
        };
        let report = suite.run(driver, &config, mode).await;
        report.log_summary();
        report.exit_code()
    })
}

/// [`run_main`] with the Playwright driver, as a process exit code
#[cfg(feature = "playwright")]
pub fn main(suite: Suite<crate::browser::playwright::PlaywrightDriver>) -> std::process::ExitCode {
    let code = run_main(suite, crate::browser::playwright::PlaywrightDriver::new);
    std::process::ExitCode::from(u8::try_from(code).unwrap_or(1))
}
