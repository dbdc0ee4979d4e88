//! Run-wide state shared with every test case

use crate::browser::{BrowserSession, Driver, PageHandle};
use crate::error::E2eResult;

/// Base URL plus the run's browser, built once after the server is ready
pub struct RunContext<D: Driver> {
    base_url: String,
    browser: BrowserSession<D>,
}

impl<D: Driver> RunContext<D> {
    pub fn new(base_url: impl Into<String>, browser: BrowserSession<D>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            browser,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `path` resolved against the base URL
    pub fn url(&self, path: &str) -> String {
        if path.is_empty() {
            return self.base_url.clone();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn browser(&self) -> &BrowserSession<D> {
        &self.browser
    }

    /// A fresh isolated context/page pair
    pub async fn new_page(&self) -> E2eResult<PageHandle<D>> {
        self.browser.new_page().await
    }

    pub async fn close_page(&self, handle: PageHandle<D>) {
        self.browser.close_page(handle).await
    }

    /// Give the browser back for teardown
    pub fn into_browser(self) -> BrowserSession<D> {
        self.browser
    }
}
