//! Bounded polling

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// How many times to probe and how long to wait between probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

impl From<&sitecheck_common::config::ReadinessConfig> for RetryPolicy {
    fn from(config: &sitecheck_common::config::ReadinessConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.interval_ms))
    }
}

/// Outcome of [`poll_until`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// The probe succeeded on this (1-based) attempt
    Ready { attempt: u32 },
    /// Every attempt failed
    Exhausted { attempts: u32 },
}

impl Poll {
    pub fn is_ready(&self) -> bool {
        matches!(self, Poll::Ready { .. })
    }
}

/// Run `probe` until it returns true or the attempt budget is spent.
///
/// The first probe runs immediately. The interval is slept only between
/// attempts, so an exhausted policy takes `(max_attempts - 1) * interval`
/// plus probe time.
pub async fn poll_until<F, Fut>(policy: RetryPolicy, mut probe: F) -> Poll
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=policy.max_attempts {
        if probe(attempt).await {
            return Poll::Ready { attempt };
        }
        debug!("Attempt {}/{} failed", attempt, policy.max_attempts);
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Poll::Exhausted {
        attempts: policy.max_attempts,
    }
}
