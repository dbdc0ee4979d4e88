//! Playwright backend for [`Driver`]

use std::ops::Deref;

use async_trait::async_trait;
use parking_lot::Mutex;
use playwright_rs::{
    Browser, BrowserContext, BrowserContextOptions, ConsoleSubscription, GotoOptions,
    LaunchOptions, Page, Playwright, Viewport, WaitUntil,
};
use sitecheck_common::config::{BrowserEngine, ViewportConfig};
use tracing::debug;

use super::{BrowserOptions, Diagnostic, DiagnosticSink, Driver};
use crate::error::{E2eError, E2eResult};

/// Console prefix used by the injected hook to report uncaught page errors
const PAGE_ERROR_MARKER: &str = "[pageerror] ";

/// Re-reports uncaught exceptions and unhandled rejections through
/// `console.error` so they reach the console subscription
const PAGE_ERROR_HOOK: &str = r#"(() => {
  if (window.__sitecheckPageErrors) return;
  window.__sitecheckPageErrors = true;
  window.addEventListener('error', (e) => {
    const detail = e.error && e.error.stack ? e.error.stack : e.message;
    console.error('[pageerror] ' + detail);
  });
  window.addEventListener('unhandledrejection', (e) => {
    console.error('[pageerror] ' + String(e.reason));
  });
})()"#;

fn browser_err(e: impl std::fmt::Display) -> E2eError {
    E2eError::Browser(e.to_string())
}

/// Drives a real browser through Playwright
pub struct PlaywrightDriver {
    playwright: Playwright,
}

impl PlaywrightDriver {
    /// Start the Playwright driver server
    pub async fn new() -> E2eResult<Self> {
        let playwright = Playwright::launch().await.map_err(|e| {
            E2eError::Browser(format!(
                "Failed to initialize Playwright (are browsers installed?): {}",
                e
            ))
        })?;
        Ok(Self { playwright })
    }
}

/// A Playwright page plus its console subscription
pub struct PlaywrightPage {
    page: Page,
    console: Mutex<Option<ConsoleSubscription>>,
}

impl PlaywrightPage {
    pub fn page(&self) -> &Page {
        &self.page
    }
}

impl Deref for PlaywrightPage {
    type Target = Page;

    fn deref(&self) -> &Page {
        &self.page
    }
}

#[async_trait]
impl Driver for PlaywrightDriver {
    type Browser = Browser;
    type Context = BrowserContext;
    type Page = PlaywrightPage;

    async fn launch(&self, options: &BrowserOptions) -> E2eResult<Browser> {
        let browser_type = match options.engine {
            BrowserEngine::Chromium => self.playwright.chromium(),
            BrowserEngine::Firefox => self.playwright.firefox(),
            BrowserEngine::Webkit => self.playwright.webkit(),
        };

        let launch = LaunchOptions::default()
            .headless(options.headless)
            .slow_mo(options.slow_mo_ms as f64);

        browser_type
            .launch_with_options(launch)
            .await
            .map_err(|e| E2eError::Browser(format!("Failed to launch {}: {}", options.engine, e)))
    }

    async fn new_context(
        &self,
        browser: &Browser,
        viewport: ViewportConfig,
    ) -> E2eResult<BrowserContext> {
        let options = BrowserContextOptions::builder()
            .viewport(Viewport {
                width: viewport.width,
                height: viewport.height,
            })
            .build();

        browser
            .new_context_with_options(options)
            .await
            .map_err(browser_err)
    }

    async fn new_page(&self, context: &BrowserContext) -> E2eResult<PlaywrightPage> {
        let page = context.new_page().await.map_err(browser_err)?;
        Ok(PlaywrightPage {
            page,
            console: Mutex::new(None),
        })
    }

    async fn watch_diagnostics(&self, page: &PlaywrightPage, sink: DiagnosticSink) -> E2eResult<()> {
        let subscription = page.page.on_console(move |msg| {
            let text = msg.text();
            if let Some(detail) = text.strip_prefix(PAGE_ERROR_MARKER) {
                sink.emit(Diagnostic::PageError(detail.to_string()));
            } else if let Some(diagnostic) = Diagnostic::from_console(&msg.kind().to_string(), text) {
                sink.emit(diagnostic);
            }
        });
        *page.console.lock() = Some(subscription);
        Ok(())
    }

    async fn navigate(&self, page: &PlaywrightPage, url: &str) -> E2eResult<()> {
        let options = GotoOptions::new().wait_until(WaitUntil::NetworkIdle);
        page.page
            .goto(url, Some(options))
            .await
            .map_err(|e| E2eError::Browser(format!("Failed to navigate to {}: {}", url, e)))?;

        // Listeners do not survive navigation; reinstall on the new document
        if let Err(e) = page.page.evaluate::<(), ()>(PAGE_ERROR_HOOK, None).await {
            debug!("Could not install page error hook: {}", e);
        }
        Ok(())
    }

    async fn close_context(&self, context: BrowserContext) -> E2eResult<()> {
        context.close().await.map_err(browser_err)
    }

    async fn close_browser(&self, browser: Browser) -> E2eResult<()> {
        browser.close().await.map_err(browser_err)
    }
}
