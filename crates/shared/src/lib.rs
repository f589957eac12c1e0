//! # codeatlas-shared
//!
//! Foundational types shared by every other crate in the workspace:
//!
//! - `Result` and the structured error envelope
//! - Request-scoped context with cancellation
//! - The process-wide embedding concurrency limiter
//! - Retry/backoff and timeout helpers
//! - The binary Merkle tree used by snapshotting
//!
//! This crate depends only on external crates.

pub mod concurrency;
pub mod errors;
pub mod merkle;
pub mod result;
pub mod retry;
pub mod timeout;

pub use concurrency::{
    CancellationToken, CorrelationId, EmbeddingLimiter, EmbeddingPermit, RequestContext,
};
pub use errors::{
    COLLECTION_LIMIT_MARKER, ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata,
    is_collection_limit,
};
pub use merkle::{MerkleTree, compute_merkle_root};
pub use result::Result;
pub use retry::{RetryPolicy, retry_async};
pub use timeout::timeout_with_context;

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
