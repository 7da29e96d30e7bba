//! Retry with exponential backoff, and the guarded call wrapper that
//! composes rate limiting, a per-call timeout and retries around any
//! backend invocation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parley_core::{BackendKind, Message, RuntimeOptions};
use rand::Rng;

use crate::error::{BackendError, Result};
use crate::limiter::RateLimiterSet;
use crate::provider::{BackendProvider, GenerationParams, TextStream};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; transient errors only.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn from_options(options: &RuntimeOptions) -> Self {
        Self {
            max_retries: options.max_retries,
            base_delay: Duration::from_millis(options.base_delay_ms),
            max_delay: Duration::from_millis(options.max_delay_ms),
            jitter: options.retry_jitter,
        }
    }

    /// Backoff before retry number `attempt` (0-based): base * 2^attempt,
    /// capped, plus up to one base delay of jitter when enabled.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if self.jitter {
            let extra = rand::thread_rng().gen_range(0..=self.base_delay.as_millis() as u64);
            exp + Duration::from_millis(extra)
        } else {
            exp
        }
    }

    /// Run `op` with retries. Permanent errors propagate untouched after a
    /// single attempt; transient errors are retried up to `max_retries`
    /// times, then the last one is re-raised annotated with the attempt
    /// count.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    log::warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}...",
                        attempt + 1,
                        self.max_retries + 1,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    log::error!("All {} attempts failed", attempt + 1);
                    return Err(BackendError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Wraps every backend invocation with the rate limiter for its kind, a
/// bounded timeout (timeouts are transient), and the retry policy.
pub struct GuardedCaller {
    policy: RetryPolicy,
    limiters: Arc<RateLimiterSet>,
    timeout: Duration,
}

impl GuardedCaller {
    pub fn new(policy: RetryPolicy, limiters: Arc<RateLimiterSet>, timeout: Duration) -> Self {
        Self {
            policy,
            limiters,
            timeout,
        }
    }

    pub fn from_options(options: &RuntimeOptions) -> Self {
        Self::new(
            RetryPolicy::from_options(options),
            Arc::new(RateLimiterSet::new(
                options.calls_per_minute,
                Duration::from_secs(60),
            )),
            Duration::from_secs(options.request_timeout_secs),
        )
    }

    /// Complete-text call under the full guard stack.
    pub async fn generate(
        &self,
        kind: BackendKind,
        backend: &dyn BackendProvider,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<String> {
        let timeout = self.timeout;
        self.policy
            .run(|| {
                let limiter = self.limiters.get(kind);
                async move {
                    limiter.acquire().await;
                    match tokio::time::timeout(timeout, backend.generate(messages, params)).await {
                        Ok(result) => result,
                        Err(_) => Err(BackendError::Timeout {
                            seconds: timeout.as_secs(),
                        }),
                    }
                }
            })
            .await
    }

    /// Open a fragment stream under the same guard stack. Retries apply to
    /// establishing the stream; once fragments flow, per-unit faults are
    /// the consumer's concern.
    pub async fn open_stream(
        &self,
        kind: BackendKind,
        backend: &dyn BackendProvider,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<TextStream> {
        let timeout = self.timeout;
        self.policy
            .run(|| {
                let limiter = self.limiters.get(kind);
                async move {
                    limiter.acquire().await;
                    match tokio::time::timeout(timeout, backend.generate_stream(messages, params))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(BackendError::Timeout {
                            seconds: timeout.as_secs(),
                        }),
                    }
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            jitter: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_exhausts_exactly_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = quick_policy();

        let result: Result<()> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(BackendError::Server {
                        status: 503,
                        message: "down".into(),
                    })
                }
            })
            .await;

        // 1 initial attempt + 3 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result.unwrap_err() {
            BackendError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*source, BackendError::Server { status: 503, .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_failure_makes_exactly_one_attempt() {
        let calls = AtomicU32::new(0);
        let policy = quick_policy();

        let result: Result<()> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BackendError::Auth("bad key".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), BackendError::Auth(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = quick_policy();

        let result = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(BackendError::Timeout { seconds: 60 })
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: false,
        };
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(5));
        assert_eq!(policy.backoff(8), Duration::from_secs(5));
    }
}
