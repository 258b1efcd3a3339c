//! Content acquisition through interchangeable fetch strategies tried in order.
//!
//! A source owns one `FetchStrategyChain`. The chain walks its strategies
//! until one returns a non-empty payload that the source's parser accepts,
//! and otherwise reports every attempt in a `SourceUnavailable`.

pub mod chain;
pub mod strategy;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::content::ContentError;

/// Failure of a single strategy attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {status}")]
    Status { status: u16 },

    #[error("upstream returned an empty payload")]
    EmptyPayload,

    #[error("relay envelope rejected: {0}")]
    Relay(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Content(#[from] ContentError),
}

/// One failed attempt, kept for diagnostics.
#[derive(Debug)]
pub struct StrategyFailure {
    pub strategy: String,
    pub error: FetchError,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Every strategy was tried and failed.
    Exhausted,
    /// The pipeline deadline passed with a fetch still in flight.
    TimedOut(Duration),
}

/// No usable content could be acquired.
#[derive(Debug, Error)]
#[error("{}", describe(.reason, .failures))]
pub struct SourceUnavailable {
    pub reason: UnavailableReason,
    pub failures: Vec<StrategyFailure>,
}

impl SourceUnavailable {
    pub fn exhausted(failures: Vec<StrategyFailure>) -> Self {
        Self {
            reason: UnavailableReason::Exhausted,
            failures,
        }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self {
            reason: UnavailableReason::TimedOut(after),
            failures: Vec::new(),
        }
    }

    /// Folds several unavailable sources into one report.
    pub fn combine(reports: Vec<SourceUnavailable>) -> Self {
        let reason = reports
            .iter()
            .map(|r| r.reason)
            .find(|r| matches!(r, UnavailableReason::TimedOut(_)))
            .unwrap_or(UnavailableReason::Exhausted);
        let failures = reports.into_iter().flat_map(|r| r.failures).collect();
        Self { reason, failures }
    }
}

fn describe(reason: &UnavailableReason, failures: &[StrategyFailure]) -> String {
    match reason {
        UnavailableReason::TimedOut(after) => {
            format!("content sources did not respond within {after:?}")
        }
        UnavailableReason::Exhausted if failures.is_empty() => {
            "content source unavailable: no fetch strategies configured".to_string()
        }
        UnavailableReason::Exhausted => {
            let detail: Vec<String> = failures.iter().map(ToString::to_string).collect();
            format!(
                "content source unavailable after {} failed attempt(s): {}",
                failures.len(),
                detail.join("; ")
            )
        }
    }
}
