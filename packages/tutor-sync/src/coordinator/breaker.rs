use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::remote::RemoteError;

const PERMISSION_CODES: &[&str] = &[
    "permission-denied",
    "unauthenticated",
    "PERMISSION_DENIED",
    "UNAUTHENTICATED",
    "401",
    "403",
];

/// A failed remote attempt, classified.
#[derive(Debug, Clone, Error)]
pub enum RemoteFailure {
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote permission denied: {0}")]
    Permission(RemoteError),

    #[error("remote call failed: {0}")]
    Transient(RemoteError),
}

impl RemoteFailure {
    pub fn classify(err: RemoteError) -> Self {
        if is_permission_error(&err) {
            RemoteFailure::Permission(err)
        } else {
            RemoteFailure::Transient(err)
        }
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, RemoteFailure::Permission(_))
    }
}

pub fn is_permission_error(err: &RemoteError) -> bool {
    PERMISSION_CODES.contains(&err.code.as_str())
        || err
            .message
            .to_ascii_lowercase()
            .contains("insufficient permissions")
}

/// Snapshot of the remote path's health for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatus {
    pub breaker_open: bool,
    pub open_reason: Option<String>,
    pub opened_at_ms: Option<i64>,
    pub transient_failures: u64,
    pub last_transient_error: Option<String>,
    pub last_transient_at_ms: Option<i64>,
}

#[derive(Debug, Default)]
struct BreakerInner {
    open: AtomicBool,
    status: Mutex<RemoteStatus>,
}

/// Session-wide switch that disables remote access after a permission
/// failure. It only ever goes from closed to open; a new process starts closed.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Opens the breaker. Returns `true` only for the call that opened it.
    pub fn trip(&self, reason: &str, at_ms: i64) -> bool {
        if self
            .inner
            .open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let mut status = self.inner.status.lock();
        status.breaker_open = true;
        status.open_reason = Some(reason.to_string());
        status.opened_at_ms = Some(at_ms);
        true
    }

    pub fn record_transient(&self, failure: &RemoteFailure, at_ms: i64) {
        let mut status = self.inner.status.lock();
        status.transient_failures = status.transient_failures.saturating_add(1);
        status.last_transient_error = Some(failure.to_string());
        status.last_transient_at_ms = Some(at_ms);
    }

    pub fn status(&self) -> RemoteStatus {
        let mut status = self.inner.status.lock().clone();
        status.breaker_open = self.is_open();
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_permission_codes_and_messages() {
        assert!(RemoteFailure::classify(RemoteError::permission_denied("x")).is_permission());
        assert!(RemoteFailure::classify(RemoteError::new("PERMISSION_DENIED", "x")).is_permission());
        assert!(RemoteFailure::classify(RemoteError::new(
            "unknown",
            "Missing or insufficient permissions."
        ))
        .is_permission());
        assert!(!RemoteFailure::classify(RemoteError::unavailable("offline")).is_permission());
        assert!(!RemoteFailure::classify(RemoteError::new("deadline-exceeded", "slow")).is_permission());
    }

    #[test]
    fn trip_reports_first_opener_only() {
        let breaker = CircuitBreaker::new();
        assert!(!breaker.is_open());

        assert!(breaker.trip("rules", 10));
        assert!(!breaker.trip("rules again", 20));
        assert!(breaker.is_open());

        let status = breaker.status();
        assert_eq!(status.open_reason.as_deref(), Some("rules"));
        assert_eq!(status.opened_at_ms, Some(10));
    }

    #[test]
    fn transient_failures_do_not_open() {
        let breaker = CircuitBreaker::new();
        let failure = RemoteFailure::Timeout(Duration::from_millis(2000));
        breaker.record_transient(&failure, 5);
        breaker.record_transient(&failure, 6);

        let status = breaker.status();
        assert!(!status.breaker_open);
        assert_eq!(status.transient_failures, 2);
        assert_eq!(status.last_transient_at_ms, Some(6));
    }

    #[test]
    fn clones_share_state() {
        let breaker = CircuitBreaker::new();
        let clone = breaker.clone();
        clone.trip("denied", 1);
        assert!(breaker.is_open());
    }
}
