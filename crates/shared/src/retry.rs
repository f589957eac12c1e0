//! Retry helper with exponential backoff.

use crate::{ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::Duration;

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first try).
    pub max_attempts: u32,
    /// Base delay for backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Pipeline default: 3 attempts with 1s / 2s / 4s delays.
    #[must_use]
    pub const fn pipeline_default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
        }
    }
}

/// Retry a fallible async operation with exponential backoff.
///
/// Only errors classified `Retriable` are retried; anything else is
/// returned to the caller on the first occurrence.
pub async fn retry_async<T, F, Fut>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        ctx.ensure_not_cancelled(operation)?;

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.class.is_retriable() || attempt >= policy.max_attempts {
                    return Err(error);
                }

                tracing::warn!(
                    operation,
                    attempt,
                    error = %error,
                    "retrying after retriable failure"
                );
                let delay = backoff_delay(policy, attempt);
                sleep_with_cancellation(ctx, delay, operation).await?;
            },
        }
    }
}

fn backoff_delay(policy: RetryPolicy, attempt: u32) -> Duration {
    let pow = attempt.saturating_sub(1).min(30);
    let delay = policy
        .base_delay_ms
        .saturating_mul(1u64 << pow)
        .min(policy.max_delay_ms);
    Duration::from_millis(delay)
}

async fn sleep_with_cancellation(
    ctx: &RequestContext,
    delay: Duration,
    operation: &'static str,
) -> Result<()> {
    tokio::select! {
        () = ctx.cancelled() => Err(ErrorEnvelope::cancelled("operation cancelled")
            .with_metadata("operation", operation)),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorClass, ErrorCode};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 4,
        }
    }

    #[tokio::test]
    async fn retries_until_success() -> Result<()> {
        let ctx = RequestContext::new_request();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = Arc::clone(&calls);

        let value = retry_async(&ctx, fast_policy(), "test", || {
            let calls = Arc::clone(&calls_op);
            async move {
                let attempt = calls.fetch_add(1, Ordering::Relaxed) + 1;
                if attempt < 3 {
                    Err(ErrorEnvelope::unexpected(
                        ErrorCode::timeout(),
                        "timeout",
                        ErrorClass::Retriable,
                    ))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await?;

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        Ok(())
    }

    #[tokio::test]
    async fn non_retriable_fails_immediately() {
        let ctx = RequestContext::new_request();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = Arc::clone(&calls);

        let result: Result<()> = retry_async(&ctx, fast_policy(), "test", || {
            let calls = Arc::clone(&calls_op);
            async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Err(ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 3_000,
        };
        assert_eq!(backoff_delay(policy, 1), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(policy, 2), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(policy, 3), Duration::from_millis(3_000));
    }
}
