//! Per-attempt error type and exponential backoff policy.
//!
//! A fetch attempt ends in exactly one typed error so the attempt loop can
//! decide what to do without exceptions crossing the retry boundary. Every
//! kind here is retryable: corrupt data is as retryable as a dropped
//! connection, and both always delete the offending file first.

use crate::checksum::Algorithm;
use std::time::Duration;
use thiserror::Error;

/// Error from a single fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// curl-level transport failure (timeout, DNS, connection reset, ...).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// HTTP response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Local filesystem failure while writing or renaming the artifact.
    #[error("storage: {0}")]
    Io(#[from] std::io::Error),
    /// Digest mismatch after a fully completed transfer.
    #[error("{algorithm} checksum mismatch: expected {expected}, got {actual}")]
    Integrity {
        algorithm: Algorithm,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Bounded retry with exponential backoff between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per task, including the first.
    pub attempts: u32,
    /// Backoff time unit; the delay after attempt `k` is `base_delay * 2^k`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff to sleep after a failed attempt. `attempt` is 1-based, so the
    /// series is `2^1, 2^2, ...` time units. Growth is effectively unbounded
    /// (attempt counts are small); the shift is only clamped against overflow.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}
