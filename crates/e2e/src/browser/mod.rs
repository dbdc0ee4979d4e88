//! Browser session management
//!
//! One browser per run, one isolated context and page per test case. The
//! automation backend sits behind [`Driver`]; the Playwright backend is in
//! [`playwright`] (feature `playwright`).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sitecheck_common::config::{BrowserConfig, BrowserEngine, RunMode, ViewportConfig};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

#[cfg(feature = "playwright")]
pub mod playwright;

/// How the browser is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserOptions {
    pub engine: BrowserEngine,
    pub headless: bool,
    pub slow_mo_ms: u64,
    pub viewport: ViewportConfig,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::default(),
            headless: true,
            slow_mo_ms: 0,
            viewport: ViewportConfig::default(),
        }
    }
}

impl BrowserOptions {
    pub fn new(config: &BrowserConfig, mode: RunMode) -> Self {
        Self {
            engine: config.engine,
            headless: mode.headless(),
            slow_mo_ms: mode.slow_mo_ms,
            viewport: config.viewport,
        }
    }
}

/// A diagnostic event raised by a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A console message with severity "error"
    Console(String),
    /// An uncaught exception in the page
    PageError(String),
}

impl Diagnostic {
    /// Map a console message to a diagnostic; only errors are kept
    pub fn from_console(kind: &str, text: impl Into<String>) -> Option<Self> {
        (kind == "error").then(|| Diagnostic::Console(text.into()))
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Diagnostic::Console(_) => "❌ Browser Error:",
            Diagnostic::PageError(_) => "❌ Page Error:",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Diagnostic::Console(m) | Diagnostic::PageError(m) => m,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.prefix(), self.message())
    }
}

/// Forwards page diagnostics to the run log and keeps a copy
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    seen: Arc<Mutex<Vec<Diagnostic>>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        self.seen.lock().push(diagnostic);
    }

    /// Everything emitted so far
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.seen.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

/// Browser automation backend
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Browser: Send + Sync;
    type Context: Send + Sync;
    type Page: Send + Sync;

    /// Start the browser process
    async fn launch(&self, options: &BrowserOptions) -> E2eResult<Self::Browser>;

    /// Create a browsing context with its own cookies and storage
    async fn new_context(
        &self,
        browser: &Self::Browser,
        viewport: ViewportConfig,
    ) -> E2eResult<Self::Context>;

    async fn new_page(&self, context: &Self::Context) -> E2eResult<Self::Page>;

    /// Route console errors and uncaught page errors of `page` into `sink`
    async fn watch_diagnostics(&self, page: &Self::Page, sink: DiagnosticSink) -> E2eResult<()>;

    /// Navigate and wait until the network is idle
    async fn navigate(&self, page: &Self::Page, url: &str) -> E2eResult<()>;

    /// Close a context and every page in it
    async fn close_context(&self, context: Self::Context) -> E2eResult<()>;

    async fn close_browser(&self, browser: Self::Browser) -> E2eResult<()>;
}

/// An isolated context plus its page, owned by exactly one test case
pub struct PageHandle<D: Driver> {
    id: u64,
    context: D::Context,
    page: D::Page,
}

impl<D: Driver> PageHandle<D> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn page(&self) -> &D::Page {
        &self.page
    }

    pub fn context(&self) -> &D::Context {
        &self.context
    }
}

impl<D: Driver> fmt::Debug for PageHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageHandle").field("id", &self.id).finish()
    }
}

/// The run's single browser instance
pub struct BrowserSession<D: Driver> {
    driver: Arc<D>,
    browser: Option<D::Browser>,
    options: BrowserOptions,
    diagnostics: DiagnosticSink,
    next_page: AtomicU64,
}

impl<D: Driver> BrowserSession<D> {
    /// Launch the browser
    pub async fn launch(driver: Arc<D>, options: BrowserOptions) -> E2eResult<Self> {
        info!(
            "Launching {} ({}, slow-mo {} ms)",
            options.engine,
            if options.headless { "headless" } else { "headed" },
            options.slow_mo_ms
        );
        let browser = driver.launch(&options).await?;

        Ok(Self {
            driver,
            browser: Some(browser),
            options,
            diagnostics: DiagnosticSink::new(),
            next_page: AtomicU64::new(1),
        })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The live browser, until [`close`](Self::close) runs
    pub fn browser(&self) -> Option<&D::Browser> {
        self.browser.as_ref()
    }

    pub fn options(&self) -> &BrowserOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }

    pub fn is_open(&self) -> bool {
        self.browser.is_some()
    }

    /// Fresh isolated context with the configured viewport, one page in it,
    /// and diagnostics wired to the run log
    pub async fn new_page(&self) -> E2eResult<PageHandle<D>> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| E2eError::Browser("browser is closed".to_string()))?;

        let context = self.driver.new_context(browser, self.options.viewport).await?;

        let page = match self.driver.new_page(&context).await {
            Ok(page) => page,
            Err(e) => {
                self.discard_context(context).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .driver
            .watch_diagnostics(&page, self.diagnostics.clone())
            .await
        {
            self.discard_context(context).await;
            return Err(e);
        }

        let id = self.next_page.fetch_add(1, Ordering::Relaxed);
        debug!("Opened context {}", id);
        Ok(PageHandle { id, context, page })
    }

    pub async fn navigate(&self, handle: &PageHandle<D>, url: &str) -> E2eResult<()> {
        debug!("Navigating context {} to {}", handle.id, url);
        self.driver.navigate(&handle.page, url).await
    }

    /// Close only this handle's context. Errors are logged, never returned.
    pub async fn close_page(&self, handle: PageHandle<D>) {
        let PageHandle { id, context, page } = handle;
        drop(page);
        match self.driver.close_context(context).await {
            Ok(()) => debug!("Closed context {}", id),
            Err(e) => warn!("Failed to close context {}: {}", id, e),
        }
    }

    /// Close the browser. Safe to call more than once; errors are logged.
    pub async fn close(&mut self) {
        if let Some(browser) = self.browser.take() {
            info!("Closing browser");
            if let Err(e) = self.driver.close_browser(browser).await {
                warn!("Failed to close browser: {}", e);
            }
        }
    }

    async fn discard_context(&self, context: D::Context) {
        if let Err(e) = self.driver.close_context(context).await {
            warn!("Failed to close context: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_console_errors_become_diagnostics() {
        assert_eq!(
            Diagnostic::from_console("error", "boom"),
            Some(Diagnostic::Console("boom".to_string()))
        );
        assert_eq!(Diagnostic::from_console("warning", "meh"), None);
        assert_eq!(Diagnostic::from_console("log", "hi"), None);
    }

    #[test]
    fn diagnostics_carry_distinct_prefixes() {
        let console = Diagnostic::Console("Uncaught fetch".to_string());
        let page = Diagnostic::PageError("ReferenceError: x is not defined".to_string());

        assert_eq!(console.to_string(), "❌ Browser Error: Uncaught fetch");
        assert_eq!(
            page.to_string(),
            "❌ Page Error: ReferenceError: x is not defined"
        );
    }

    #[test]
    fn sink_clones_share_storage() {
        let sink = DiagnosticSink::new();
        let forwarded = sink.clone();
        forwarded.emit(Diagnostic::PageError("oops".to_string()));

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.snapshot(), vec![Diagnostic::PageError("oops".to_string())]);
    }

    #[test]
    fn options_follow_the_run_mode() {
        let config = BrowserConfig::default();
        let headed = BrowserOptions::new(
            &config,
            RunMode {
                headed: true,
                slow_mo_ms: 50,
            },
        );
        assert!(!headed.headless);
        assert_eq!(headed.slow_mo_ms, 50);
        assert_eq!(headed.viewport, ViewportConfig { width: 1280, height: 720 });

        let headless = BrowserOptions::new(&config, RunMode::default());
        assert!(headless.headless);
        assert_eq!(headless.slow_mo_ms, 0);
        assert_eq!(headless, BrowserOptions::default());
    }
}
