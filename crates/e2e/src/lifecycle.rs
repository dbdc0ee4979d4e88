//! Run lifecycle state machine
//!
//! ```text
//! Idle -> ServerStarting -> ServerReady -> BrowserLaunching -> Ready
//!                       \-> ServerFailed                  \-> (Teardown)
//! Ready -> ContextOpen -> ContextClosed -> ContextOpen -> ...
//! any -> Teardown -> Terminated
//! ```

use std::fmt;

use tracing::debug;

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ServerStarting,
    ServerReady,
    ServerFailed,
    BrowserLaunching,
    Ready,
    ContextOpen,
    ContextClosed,
    Teardown,
    Terminated,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::ServerStarting => "server-starting",
            RunState::ServerReady => "server-ready",
            RunState::ServerFailed => "server-failed",
            RunState::BrowserLaunching => "browser-launching",
            RunState::Ready => "ready",
            RunState::ContextOpen => "context-open",
            RunState::ContextClosed => "context-closed",
            RunState::Teardown => "teardown",
            RunState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

impl RunState {
    /// Whether `self -> next` is a legal step
    pub fn can_transition(self, next: RunState) -> bool {
        use RunState::*;

        match (self, next) {
            (Terminated, _) => false,
            (Teardown, Terminated) => true,
            (Teardown, _) => false,
            (_, Teardown) => true,
            (Idle, ServerStarting) => true,
            (ServerStarting, ServerReady | ServerFailed) => true,
            (ServerReady, BrowserLaunching) => true,
            (BrowserLaunching, Ready) => true,
            (Ready | ContextClosed, ContextOpen) => true,
            (ContextOpen, ContextClosed) => true,
            _ => false,
        }
    }
}

/// Tracks the current [`RunState`] and rejects illegal transitions
#[derive(Debug)]
pub struct Lifecycle {
    state: RunState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn transition(&mut self, next: RunState) -> E2eResult<()> {
        if !self.state.can_transition(next) {
            return Err(E2eError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("Run state: {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Enter teardown; false if teardown already started
    pub fn begin_teardown(&mut self) -> bool {
        self.transition(RunState::Teardown).is_ok()
    }
}
