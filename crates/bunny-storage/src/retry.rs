//! Bounded automatic retry for transient overload.
//!
//! [`RetryingTransport`] re-sends the same request while the [`RetryPolicy`]'s
//! condition accepts the outcome and the attempt budget lasts. The default condition
//! accepts exactly one thing: a `429 Too Many Requests` response. Transport errors
//! are returned on the first occurrence.

use crate::config::DEFAULT_MAX_ATTEMPTS;
use crate::transport::{Request, Response, Transport};
use crate::StorageError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Decides whether an attempt's outcome should be retried.
pub type RetryCondition = Arc<dyn Fn(Result<&Response, &StorageError>) -> bool + Send + Sync>;

/// Default condition: a 429 response and nothing else.
pub fn too_many_requests(outcome: Result<&Response, &StorageError>) -> bool {
    matches!(outcome, Ok(resp) if resp.status == 429)
}

/// Capped exponential wait between attempts: `initial * 2^(attempt - 1)`, at most `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Retry immediately.
    pub const fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(2),
        }
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    condition: RetryCondition,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; zero is treated as one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::default(),
            condition: Arc::new(too_many_requests),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(Result<&Response, &StorageError>) -> bool + Send + Sync + 'static,
    {
        self.condition = Arc::new(condition);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn should_retry(&self, outcome: Result<&Response, &StorageError>) -> bool {
        (self.condition)(outcome)
    }

    /// Wait before the attempt following `attempt`. A numeric `Retry-After` wins, capped at `max`.
    pub fn delay(&self, attempt: u32, response: Option<&Response>) -> Duration {
        let retry_after = response
            .and_then(|r| r.header("Retry-After"))
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        match retry_after {
            Some(wait) => wait.min(self.backoff.max),
            None => self.backoff.delay(attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Wraps a [`Transport`] with a [`RetryPolicy`].
///
/// When the budget runs out the last outcome is returned unchanged, so a run of
/// 429s surfaces as a 429 response for the caller to classify.
#[derive(Debug)]
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for RetryingTransport<T> {
    fn execute(&self, request: &Request<'_>) -> Result<Response, StorageError> {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;
        loop {
            let outcome = self.inner.execute(request);
            match &outcome {
                Ok(resp) => debug!(
                    verb = %request.verb,
                    path = %request.path,
                    attempt,
                    status = resp.status,
                    "request completed"
                ),
                Err(e) => error!(
                    verb = %request.verb,
                    path = %request.path,
                    attempt,
                    error = %e,
                    "request failed"
                ),
            }

            if !self.policy.should_retry(outcome.as_ref()) {
                return outcome;
            }
            if attempt >= max_attempts {
                warn!(
                    verb = %request.verb,
                    path = %request.path,
                    attempts = attempt,
                    "retry budget exhausted"
                );
                return outcome;
            }

            let wait = self.policy.delay(attempt, outcome.as_ref().ok());
            warn!(
                verb = %request.verb,
                path = %request.path,
                attempt,
                wait_ms = wait.as_millis() as u64,
                "transient overload, retrying"
            );
            if let Ok(resp) = outcome {
                resp.discard();
            }
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
            attempt += 1;
        }
    }
}
