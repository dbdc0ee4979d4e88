//! Shared fixtures: an in-memory browser driver and a local HTTP endpoint

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use sitecheck_common::config::{HarnessConfig, ViewportConfig};
use sitecheck_e2e::{BrowserOptions, Diagnostic, DiagnosticSink, Driver, E2eError, E2eResult};

/// Everything the fake driver was asked to do, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Launch(BrowserOptions),
    NewContext(u64, ViewportConfig),
    NewPage(u64),
    Navigate(u64, String),
    CloseContext(u64),
    CloseBrowser,
}

pub struct FakeBrowser;

pub struct FakeContext {
    pub id: u64,
}

pub struct FakePage {
    pub context: u64,
    sink: Mutex<Option<DiagnosticSink>>,
}

impl FakePage {
    /// Simulate `console.error(text)` in the page
    pub fn console_error(&self, text: &str) {
        if let Some(sink) = self.sink.lock().as_ref() {
            if let Some(diagnostic) = Diagnostic::from_console("error", text) {
                sink.emit(diagnostic);
            }
        }
    }

    /// Simulate an uncaught exception in the page
    pub fn throw(&self, message: &str) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.emit(Diagnostic::PageError(message.to_string()));
        }
    }
}

#[derive(Default)]
pub struct FakeDriver {
    events: Mutex<Vec<Event>>,
    next_context: AtomicU64,
    launches: AtomicUsize,
    fail_launch: bool,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A driver whose browser never starts
    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            fail_launch: true,
            ..Default::default()
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

#[async_trait]
impl Driver for FakeDriver {
    type Browser = FakeBrowser;
    type Context = FakeContext;
    type Page = FakePage;

    async fn launch(&self, options: &BrowserOptions) -> E2eResult<FakeBrowser> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.record(Event::Launch(*options));
        if self.fail_launch {
            return Err(E2eError::Browser("Executable doesn't exist".to_string()));
        }
        Ok(FakeBrowser)
    }

    async fn new_context(
        &self,
        _browser: &FakeBrowser,
        viewport: ViewportConfig,
    ) -> E2eResult<FakeContext> {
        let id = self.next_context.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(Event::NewContext(id, viewport));
        Ok(FakeContext { id })
    }

    async fn new_page(&self, context: &FakeContext) -> E2eResult<FakePage> {
        self.record(Event::NewPage(context.id));
        Ok(FakePage {
            context: context.id,
            sink: Mutex::new(None),
        })
    }

    async fn watch_diagnostics(&self, page: &FakePage, sink: DiagnosticSink) -> E2eResult<()> {
        *page.sink.lock() = Some(sink);
        Ok(())
    }

    async fn navigate(&self, page: &FakePage, url: &str) -> E2eResult<()> {
        self.record(Event::Navigate(page.context, url.to_string()));
        Ok(())
    }

    async fn close_context(&self, context: FakeContext) -> E2eResult<()> {
        self.record(Event::CloseContext(context.id));
        Ok(())
    }

    async fn close_browser(&self, _browser: FakeBrowser) -> E2eResult<()> {
        self.record(Event::CloseBrowser);
        Ok(())
    }
}

/// HTTP endpoint on an ephemeral port that answers 503 for the first
/// `failures` requests and 200 afterwards. Returns the port and a hit counter.
pub async fn flaky_endpoint(failures: usize) -> (u16, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let app = Router::new().route(
        "/",
        get(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < failures {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::OK
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (port, hits)
}

/// A port nothing is listening on
pub fn closed_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Config whose "server" is a placeholder process and whose readiness target
/// is `port`, with fast polling
pub fn harness_config(port: u16, server_command: &[&str]) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = port;
    config.server.command = server_command.iter().map(|s| s.to_string()).collect();
    config.server.shutdown_grace_ms = 200;
    config.server.readiness.max_attempts = 5;
    config.server.readiness.interval_ms = 20;
    config.server.readiness.request_timeout_ms = 500;
    config
}

/// Server command that records its pid in `pidfile` and then idles
pub fn pid_recording_server(pidfile: &Path) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("echo $$ > '{}'; exec sleep 30", pidfile.display()),
    ]
}

/// Wait for a pid file to be written and parse it
pub async fn read_pid(pidfile: &Path) -> i32 {
    for _ in 0..100 {
        if let Ok(raw) = std::fs::read_to_string(pidfile) {
            if let Ok(pid) = raw.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("pid file {} never written", pidfile.display());
}

/// True once `pid` no longer runs, polling for up to two seconds. A zombie
/// waiting to be reaped by someone else counts as gone.
#[cfg(unix)]
pub async fn process_gone(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    for _ in 0..100 {
        if kill(Pid::from_raw(pid), None) == Err(Errno::ESRCH) || is_zombie(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// State field of /proc/<pid>/stat is "Z"; always false without procfs
fn is_zombie(pid: i32) -> bool {
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}
