//! Request-scoped context, cancellation, and the embedding limiter.
//!
//! Cancellation is best-effort: work that has not started is skipped, and
//! in-flight work observes the token at its next suspension point.

use crate::{ErrorCode, ErrorEnvelope, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Notify, Semaphore, SemaphorePermit};

/// A correlation identifier used for logging and telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Create a new request id, best-effort unique within this process.
    #[must_use]
    pub fn new_request_id() -> Self {
        let n = REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(Arc::from(format!("req_{n}")))
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A clonable cancellation token that can be awaited.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token and wake all current and future waiters.
    pub fn cancel(&self) {
        let was_cancelled = self.inner.cancelled.swap(true, Ordering::SeqCst);
        if !was_cancelled {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Request-scoped context passed across boundaries.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a new request context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            cancellation: CancellationToken::new(),
        }
    }

    /// Convenience constructor with an auto-generated `req_*` id.
    #[must_use]
    pub fn new_request() -> Self {
        Self::new(CorrelationId::new_request_id())
    }

    /// Create a context with an explicit cancellation token.
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Return the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Return a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns true if the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await cancellation.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Return a cancellation error when cancelled, tagged with the operation.
    pub fn ensure_not_cancelled(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", operation));
        }
        Ok(())
    }
}

/// Process-wide cap on concurrent outbound embedding calls.
///
/// Exactly one limiter exists per process; every embedding adapter holds a
/// clone of the same `Arc<EmbeddingLimiter>`. A permit is held for the full
/// duration of the HTTP round-trip and is released on every exit path,
/// including failure, via the RAII guard.
#[derive(Debug)]
pub struct EmbeddingLimiter {
    semaphore: Semaphore,
    permits: usize,
}

/// RAII guard for one embedding slot.
pub struct EmbeddingPermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl EmbeddingLimiter {
    /// Default number of concurrent outbound embedding calls.
    pub const DEFAULT_PERMITS: usize = 5;

    /// Create a limiter with the given number of permits.
    pub fn new(permits: usize) -> Result<Self> {
        if permits == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "embedding concurrency must be a positive number",
            ));
        }
        Ok(Self {
            semaphore: Semaphore::new(permits),
            permits,
        })
    }

    /// Create a limiter with the default permit count.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            semaphore: Semaphore::new(Self::DEFAULT_PERMITS),
            permits: Self::DEFAULT_PERMITS,
        }
    }

    /// Return the configured permit count.
    #[must_use]
    pub const fn permits(&self) -> usize {
        self.permits
    }

    /// Return the number of currently available slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a slot, suspending until one frees; races cancellation.
    pub async fn acquire(&self, ctx: &RequestContext) -> Result<EmbeddingPermit<'_>> {
        ctx.ensure_not_cancelled("embedding_limiter.acquire")?;

        let permit = tokio::select! {
            () = ctx.cancelled() => {
                return Err(ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", "embedding_limiter.acquire"));
            }
            acquired = self.semaphore.acquire() => acquired,
        };

        // The semaphore is never closed while the limiter is alive.
        permit.map(|permit| EmbeddingPermit { _permit: permit }).map_err(|_| {
            ErrorEnvelope::invariant(ErrorCode::internal(), "embedding limiter closed")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancellation_token_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        handle.await.expect("join failed");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn limiter_caps_concurrent_holders() -> Result<()> {
        let limiter = Arc::new(EmbeddingLimiter::new(2)?);
        let ctx = RequestContext::new_request();

        let first = limiter.acquire(&ctx).await?;
        let second = limiter.acquire(&ctx).await?;
        assert_eq!(limiter.available(), 0);

        let blocked = {
            let limiter = Arc::clone(&limiter);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire(&ctx).await?;
                Ok::<_, ErrorEnvelope>(())
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished(), "third acquire should be blocked");

        drop(first);
        blocked.await.expect("join failed")?;
        drop(second);
        assert_eq!(limiter.available(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn limiter_acquire_observes_cancellation() -> Result<()> {
        let limiter = EmbeddingLimiter::new(1)?;
        let ctx = RequestContext::new_request();
        let _held = limiter.acquire(&ctx).await?;

        ctx.cancel();
        let result = limiter.acquire(&ctx).await;
        assert!(matches!(result, Err(error) if error.is_cancelled()));
        Ok(())
    }

    #[test]
    fn limiter_rejects_zero_permits() {
        assert!(EmbeddingLimiter::new(0).is_err());
    }
}
