use std::future::Future;
use std::time::Duration;

use rand::{thread_rng, Rng};
use tracing::{debug, warn};

use super::capability::CapabilityError;

/// Per-call timeout plus bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(20),
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, CapabilityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(res) => res,
                Err(_) => Err(CapabilityError::Timeout(self.call_timeout)),
            };
            let err = match outcome {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            if !err.is_transient() || attempt >= max_attempts {
                debug!(call = label, attempt, error = %err, "giving up");
                return Err(err);
            }
            let delay = self.delay_for(attempt);
            let jitter_ms = match delay.as_millis() as u64 / 2 {
                0 => 0,
                half => thread_rng().gen_range(0..=half),
            };
            warn!(
                call = label,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient capability failure; backing off"
            );
            tokio::time::sleep(delay + Duration::from_millis(jitter_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            call_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            call_timeout: Duration::from_secs(1),
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.delay_for(5), Duration::from_millis(1000));
        assert_eq!(p.delay_for(40), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let res = fast(3)
            .run("t", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(CapabilityError::Transport("reset".into()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(res.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let res: Result<(), _> = fast(4)
            .run("t", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CapabilityError::Status { status: 503, body: "busy".into() })
            })
            .await;
        assert!(matches!(res, Err(CapabilityError::Status { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn malformed_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let res: Result<(), _> = fast(5)
            .run("t", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CapabilityError::Malformed("prose instead of json".into()))
            })
            .await;
        assert!(matches!(res, Err(CapabilityError::Malformed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let policy = RetryPolicy {
            call_timeout: Duration::from_millis(10),
            ..fast(2)
        };
        let res: Result<(), _> = policy
            .run("t", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(CapabilityError::Timeout(_))));
    }
}
