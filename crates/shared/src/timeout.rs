//! Timeout helper with cancellation awareness.

use crate::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::Duration;

/// Apply a timeout to a future, honoring request cancellation.
pub async fn timeout_with_context<T, F>(
    ctx: &RequestContext,
    timeout: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    ctx.ensure_not_cancelled(operation)?;

    tokio::select! {
        () = ctx.cancelled() => Err(ErrorEnvelope::cancelled("operation cancelled")
            .with_metadata("operation", operation)),
        res = tokio::time::timeout(timeout, fut) => {
            res.unwrap_or_else(|_| {
                Err(ErrorEnvelope::unexpected(
                    ErrorCode::timeout(),
                    format!("operation timed out: {operation}"),
                    ErrorClass::Retriable,
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_triggers() {
        let ctx = RequestContext::new_request();
        let fut = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ErrorEnvelope>(())
        };

        let result = timeout_with_context(&ctx, Duration::from_millis(10), "test", fut).await;
        assert!(matches!(result, Err(error) if error.code == ErrorCode::timeout()));
    }

    #[tokio::test]
    async fn completed_future_wins() {
        let ctx = RequestContext::new_request();
        let result =
            timeout_with_context(&ctx, Duration::from_millis(100), "test", async { Ok(7) }).await;
        assert!(matches!(result, Ok(7)));
    }
}
