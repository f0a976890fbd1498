//! Bounded retry with exponential backoff around a single outbound HTTP call.
//!
//! The layer knows nothing about what is being fetched; callers hand it a
//! closure performing one attempt and get back either a successful reply or a
//! classified [`GeoQueryError`]. Pagination, caching and provider logic all
//! sit above it.

use crate::config_manager::NetworkConfig;
use crate::error::{GeoQueryError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// HTTP statuses worth retrying.
pub const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// A fully-read HTTP reply. The body is consumed before the reply is built,
/// so the underlying connection is back in the pool by the time we see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure class (no HTTP status was received).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connect,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportFailure {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Connect,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Other,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, FailureKind::Timeout | FailureKind::Connect)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_network_config(config: &NetworkConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            jitter: config.retry_jitter,
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = 2u32.saturating_pow(retry.saturating_sub(1).min(16));
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        if self.jitter && !delay.is_zero() {
            let quarter = (delay.as_millis() as u64 / 4).max(1);
            delay + Duration::from_millis(fastrand::u64(0..=quarter))
        } else {
            delay
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Verdict {
    Retry(String),
    Reject(GeoQueryError),
}

fn classify(outcome: std::result::Result<HttpReply, TransportFailure>) -> std::result::Result<HttpReply, Verdict> {
    match outcome {
        Ok(reply) if reply.is_success() => Ok(reply),
        Ok(reply) if RETRYABLE_STATUSES.contains(&reply.status) => {
            Err(Verdict::Retry(format!("HTTP {}", reply.status)))
        }
        Ok(reply) => Err(Verdict::Reject(GeoQueryError::Query(format!(
            "HTTP {}: {}",
            reply.status,
            truncate(&reply.body, 200)
        )))),
        Err(failure) if failure.is_retryable() => Err(Verdict::Retry(failure.message)),
        Err(failure) => Err(Verdict::Reject(GeoQueryError::Connection(failure.message))),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Wraps one outbound call with the configured retry policy.
#[derive(Debug, Clone, Default)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt` until it succeeds, fails permanently, or retries run out.
    ///
    /// `attempt` receives the 0-based attempt index.
    pub async fn execute<F, Fut>(&self, operation: &str, mut attempt: F) -> Result<HttpReply>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<HttpReply, TransportFailure>>,
    {
        let mut last_failure = String::new();

        for n in 0..=self.policy.max_retries {
            if n > 0 {
                let delay = self.policy.delay_for(n);
                debug!(operation, retry = n, delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::time::sleep(delay).await;
            }

            let started = Instant::now();
            let outcome = attempt(n).await;
            let latency_ms = started.elapsed().as_millis() as u64;
            let status = outcome.as_ref().ok().map(|r| r.status);

            match classify(outcome) {
                Ok(reply) => {
                    debug!(operation, attempt = n + 1, status = reply.status, latency_ms, "Request succeeded");
                    return Ok(reply);
                }
                Err(Verdict::Reject(err)) => {
                    warn!(operation, attempt = n + 1, ?status, latency_ms, error = %err, "Request failed permanently");
                    return Err(err);
                }
                Err(Verdict::Retry(reason)) => {
                    warn!(
                        operation,
                        attempt = n + 1,
                        max_attempts = self.policy.max_retries + 1,
                        ?status,
                        latency_ms,
                        reason = %reason,
                        "Request failed, retrying"
                    );
                    last_failure = reason;
                }
            }
        }

        Err(GeoQueryError::Connection(format!(
            "{} failed after {} attempts: {}",
            operation,
            self.policy.max_retries + 1,
            last_failure
        )))
    }
}
