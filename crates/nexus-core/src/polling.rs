//! Provisioning status polling
//!
//! `PollState` is a pure state machine (`Pending → Checking → Ready | Delayed | Error`);
//! `wait_for_ready` drives it against a `StatusSource` on `tokio::time`, so tests run it
//! with paused time instead of real timers.
//!
//! Timing out yields `Delayed`, never an error: provisioning may still finish in the background.

use async_trait::async_trait;
use std::time::Duration;

use crate::models::StatusReport;
use crate::AppError;

/// Anything that can answer "is this tenant ready?" with one cheap read.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check_status(&self, subdomain: &str) -> Result<StatusReport, AppError>;
}

/// Fixed-interval polling bounded by an absolute timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Checking {
        attempt: u32,
        last_message: Option<String>,
    },
    Ready(StatusReport),
    Delayed {
        attempts: u32,
        last_message: Option<String>,
    },
    Error(String),
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Ready(_) | PollState::Delayed { .. } | PollState::Error(_)
        )
    }

    fn attempt(&self) -> u32 {
        match self {
            PollState::Checking { attempt, .. } => *attempt,
            _ => 0,
        }
    }

    pub fn start(self) -> PollState {
        match self {
            PollState::Pending => PollState::Checking {
                attempt: 1,
                last_message: None,
            },
            other => other,
        }
    }

    /// Apply a status report observed `elapsed` after polling started.
    pub fn on_report(self, report: StatusReport, elapsed: Duration, policy: &PollPolicy) -> PollState {
        if self.is_terminal() {
            return self;
        }
        let attempt = self.attempt();
        if report.ready {
            return PollState::Ready(report);
        }
        if report.status.is_some_and(|s| s.is_closed()) {
            return PollState::Error(report.message);
        }
        Self::next_or_delayed(attempt, Some(report.message), elapsed, policy)
    }

    /// A failed check is transient: keep polling until the timeout.
    pub fn on_check_failed(self, error: &AppError, elapsed: Duration, policy: &PollPolicy) -> PollState {
        if self.is_terminal() {
            return self;
        }
        let attempt = self.attempt();
        Self::next_or_delayed(attempt, Some(error.to_string()), elapsed, policy)
    }

    fn next_or_delayed(
        attempt: u32,
        last_message: Option<String>,
        elapsed: Duration,
        policy: &PollPolicy,
    ) -> PollState {
        if elapsed >= policy.timeout {
            PollState::Delayed {
                attempts: attempt,
                last_message,
            }
        } else {
            PollState::Checking {
                attempt: attempt + 1,
                last_message,
            }
        }
    }
}

/// Poll `source` until the tenant is ready, closed, or the policy's timeout elapses.
///
/// `observe` sees every intermediate state (for progress output). Returns the terminal state.
pub async fn wait_for_ready<S, F>(
    source: &S,
    subdomain: &str,
    policy: PollPolicy,
    mut observe: F,
) -> PollState
where
    S: StatusSource + ?Sized,
    F: FnMut(&PollState),
{
    let started = tokio::time::Instant::now();
    let mut state = PollState::Pending.start();
    observe(&state);

    loop {
        state = match source.check_status(subdomain).await {
            Ok(report) => state.on_report(report, started.elapsed(), &policy),
            Err(e) => {
                tracing::debug!(subdomain = %subdomain, error = %e, "Status check failed, will retry");
                state.on_check_failed(&e, started.elapsed(), &policy)
            }
        };
        observe(&state);

        if state.is_terminal() {
            return state;
        }
        tokio::time::sleep(policy.interval).await;
    }
}
