//! Retry policy for rate-limited upstream calls
//!
//! Only HTTP 429 is retried. Every other failure ends the call on the first
//! attempt. Backoff sleeps are raced against the request context, so a
//! cancelled caller never waits out a delay.

use super::error::{ProviderError, ProviderResult};
use crate::config::ValidationError;
use crate::context::RequestContext;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (milliseconds)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between attempts (milliseconds)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Base for exponential backoff (e.g., 2.0 for doubling)
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    /// Jitter factor (0.0 to 1.0) to randomize delays
    #[serde(default)]
    pub jitter_factor: f64,

    /// Whether to prefer the upstream `Retry-After` header over backoff
    #[serde(default)]
    pub respect_retry_after: bool,
}

fn default_max_attempts() -> u32 { 3 }
fn default_initial_delay() -> u64 { 500 }
fn default_max_delay() -> u64 { 30_000 }
fn default_exponential_base() -> f64 { 2.0 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            exponential_base: default_exponential_base(),
            jitter_factor: 0.0,
            respect_retry_after: false,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and default backoff
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Set the initial backoff delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Calculate the delay after the `retry`-th failed attempt (0-based)
    pub fn calculate_delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        if self.respect_retry_after {
            if let Some(retry_after) = retry_after {
                return retry_after.min(Duration::from_millis(self.max_delay_ms));
            }
        }

        let base_delay = self.initial_delay_ms as f64 * self.exponential_base.powi(retry as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        // Policies built in code skip validate(); keep the jitter range finite.
        let jitter_factor = if self.jitter_factor.is_finite() {
            self.jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let delay_with_jitter = if jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter_range = capped_delay * jitter_factor;
            let jitter = rng.gen_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(delay_with_jitter as u64)
    }

    /// Validate retry policy
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_attempts", path),
                "Must be at least 1",
            ));
        }

        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ValidationError::out_of_range(
                format!("{}.max_delay_ms", path),
                "Must be >= initial_delay_ms",
            ));
        }

        if self.exponential_base < 1.0 {
            return Err(ValidationError::out_of_range(
                format!("{}.exponential_base", path),
                "Must be >= 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ValidationError::out_of_range(
                format!("{}.jitter_factor", path),
                "Must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}

/// Marker for "upstream asked us to slow down"
///
/// This is the only outcome the retry loop acts on.
#[derive(Debug, Clone)]
pub(crate) struct RateLimitSignal {
    /// Response body of the 429, kept for the final error
    pub body: String,

    /// Parsed `Retry-After` header
    pub retry_after: Option<Duration>,
}

/// Outcome of a single failed attempt
#[derive(Debug)]
pub(crate) enum AttemptError {
    RateLimited(RateLimitSignal),
    Fatal(ProviderError),
}

impl From<ProviderError> for AttemptError {
    fn from(err: ProviderError) -> Self {
        AttemptError::Fatal(err)
    }
}

/// Executor for rate-limit retries
pub(crate) struct RetryExecutor<'a> {
    policy: &'a RetryPolicy,
}

impl<'a> RetryExecutor<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `operation` until it succeeds, fails fatally, or the budget runs out
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<F, Fut, T>(&self, ctx: &RequestContext, mut operation: F) -> ProviderResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if let Some(err) = ctx.err() {
                return Err(err.into());
            }

            let signal = match operation(attempt).await {
                Ok(result) => return Ok(result),
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::RateLimited(signal)) => signal,
            };

            if attempt >= max_attempts {
                warn!("Rate limit persisted after {} attempts, giving up", attempt);
                return Err(ProviderError::RateLimitExhausted {
                    attempts: attempt,
                    body: signal.body,
                });
            }

            let delay = self.policy.calculate_delay(attempt - 1, signal.retry_after);
            debug!(
                "Rate limited on attempt {}/{}, backing off for {:?}",
                attempt, max_attempts, delay
            );
            ctx.sleep(delay).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn rate_limited() -> AttemptError {
        AttemptError::RateLimited(RateLimitSignal {
            body: "slow down".to_string(),
            retry_after: None,
        })
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts).with_initial_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 500);
        assert_eq!(policy.exponential_base, 2.0);
        assert_eq!(policy.jitter_factor, 0.0);
    }

    #[test]
    fn test_default_backoff_doubles_from_500ms() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..3)
            .map(|retry| policy.calculate_delay(retry, None).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000]);

        assert_eq!(
            policy.calculate_delay(20, None),
            Duration::from_millis(policy.max_delay_ms)
        );
    }

    #[test]
    fn test_out_of_range_jitter_does_not_panic() {
        for jitter_factor in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, 7.5] {
            let policy = RetryPolicy {
                jitter_factor,
                ..RetryPolicy::default()
            };
            let delay = policy.calculate_delay(1, None);
            assert!(delay <= Duration::from_millis(2000), "{:?}", delay);
        }
    }

    #[test]
    fn test_retry_after_respected_when_enabled() {
        let policy = RetryPolicy {
            respect_retry_after: true,
            ..Default::default()
        };
        let delay = policy.calculate_delay(0, Some(Duration::from_secs(5)));
        assert_eq!(delay, Duration::from_secs(5));

        let ignored = RetryPolicy::default().calculate_delay(0, Some(Duration::from_secs(5)));
        assert_eq!(ignored, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_succeeds_after_rate_limit() {
        let policy = fast_policy(3);
        let calls = Arc::new(AtomicU32::new(0));

        let result = RetryExecutor::new(&policy)
            .execute(&RequestContext::new(), |attempt| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if attempt == 1 {
                        Err(rate_limited())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausts_attempt_budget() {
        let policy = fast_policy(3);
        let calls = Arc::new(AtomicU32::new(0));

        let result: ProviderResult<()> = RetryExecutor::new(&policy)
            .execute(&RequestContext::new(), |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                }
            })
            .await;

        match result {
            Err(ProviderError::RateLimitExhausted { attempts, body }) => {
                assert_eq!(attempts, 3);
                assert_eq!(body, "slow down");
            }
            other => panic!("Expected RateLimitExhausted, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let policy = fast_policy(5);
        let calls = Arc::new(AtomicU32::new(0));

        let result: ProviderResult<()> = RetryExecutor::new(&policy)
            .execute(&RequestContext::new(), |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AttemptError::Fatal(ProviderError::Upstream {
                        status: 500,
                        body: "boom".to_string(),
                    }))
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Upstream { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let policy = RetryPolicy::new(3).with_initial_delay(Duration::from_secs(60));
        let ctx = RequestContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let started = tokio::time::Instant::now();
        let result: ProviderResult<()> = RetryExecutor::new(&policy)
            .execute(&ctx, |_| async { Err(rate_limited()) })
            .await;

        assert!(matches!(
            result,
            Err(ProviderError::Context(ContextError::Cancelled))
        ));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
