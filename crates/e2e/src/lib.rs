//! sitecheck E2E harness
//!
//! Orchestration for browser end-to-end suites:
//! - Selects suite directories by substring filter
//! - Launches the test-execution command and mirrors its exit code
//! - Spawns the content server and polls it until ready
//! - Launches one browser per run and an isolated context per case
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  sitecheck run <filter>                                     │
//! │    ├── suites::discover(root, filter) -> [SuiteDescriptor]  │
//! │    └── launcher::Invocation::run() -> exit code             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  suite binary (harness::Suite)                              │
//! │    ├── ServerHandle::start (spawn + wait_until_ready)       │
//! │    ├── BrowserSession::launch -> RunContext                 │
//! │    ├── per case: new_page -> before_each -> body -> close   │
//! │    └── teardown: close browser, stop server                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod context;
pub mod error;
pub mod harness;
pub mod launcher;
pub mod lifecycle;
pub mod retry;
pub mod server;
pub mod suites;

pub use browser::{BrowserOptions, BrowserSession, Diagnostic, DiagnosticSink, Driver, PageHandle};
pub use context::RunContext;
pub use error::{E2eError, E2eResult};
pub use harness::{CaseOutcome, RunReport, Scenario, Suite};
pub use launcher::{Invocation, LaunchConfig};
pub use lifecycle::{Lifecycle, RunState};
pub use server::ServerHandle;
pub use suites::SuiteDescriptor;
