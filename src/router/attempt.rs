//! Per-attempt bookkeeping for ordered fallback

use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::BackendError;

/// Outcome of one backend attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetriableFailure,
    FatalFailure,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::RetriableFailure => "retriable-failure",
            AttemptOutcome::FatalFailure => "fatal-failure",
        }
    }
}

/// Transient record of one backend attempt.
///
/// Exists only to emit one structured log line per attempted backend; it is
/// never persisted and carries no state beyond what that line needs.
#[derive(Debug)]
pub struct CallAttempt {
    operation: &'static str,
    backend: String,
    timeout: Duration,
    started: Instant,
}

impl CallAttempt {
    pub fn begin(operation: &'static str, backend: &str, timeout: Duration) -> Self {
        Self {
            operation,
            backend: backend.to_string(),
            timeout,
            started: Instant::now(),
        }
    }

    pub fn success(self) {
        info!(
            operation = self.operation,
            backend = %self.backend,
            timeout_ms = self.timeout.as_millis() as u64,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            outcome = AttemptOutcome::Success.as_str(),
            "Backend attempt succeeded"
        );
    }

    pub fn retriable(self, err: &BackendError) {
        warn!(
            operation = self.operation,
            backend = %self.backend,
            timeout_ms = self.timeout.as_millis() as u64,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            outcome = AttemptOutcome::RetriableFailure.as_str(),
            kind = err.kind_str(),
            error = %err,
            "Backend attempt failed, escalating"
        );
    }

    pub fn fatal(self, err: &BackendError) {
        error!(
            operation = self.operation,
            backend = %self.backend,
            timeout_ms = self.timeout.as_millis() as u64,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            outcome = AttemptOutcome::FatalFailure.as_str(),
            kind = err.kind_str(),
            error = %err,
            "Backend attempt failed fatally"
        );
    }
}
