//! Embedding provider adapters.
//!
//! Every variant implements the same contract; the process-wide
//! `EmbeddingLimiter` is shared state outside the variants, acquired around
//! each outbound call.

mod azure;
mod gemini;
mod local;
mod openai;
mod preprocess;

pub use azure::{AzureOpenAiEmbedding, AzureOpenAiEmbeddingConfig};
pub use gemini::{GeminiEmbedding, GeminiEmbeddingConfig};
pub use local::{LocalEmbedding, LocalEmbeddingConfig};
pub use openai::{OpenAiEmbedding, OpenAiEmbeddingConfig};
pub use preprocess::{CHARS_PER_TOKEN, DEFAULT_MAX_TOKENS, preprocess_text};

use codeatlas_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

pub(crate) fn cancelled_error(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
}

pub(crate) fn map_transport_error(provider: &'static str, error: &reqwest::Error) -> ErrorEnvelope {
    if error.is_timeout() {
        return ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "request_timeout"),
            format!("{provider} request timed out"),
            ErrorClass::Retriable,
        )
        .with_metadata("provider", provider);
    }
    if error.is_connect() {
        return ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "connection_failed"),
            format!("{provider} connection failed: {error}"),
            ErrorClass::Retriable,
        )
        .with_metadata("provider", provider);
    }
    ErrorEnvelope::unexpected(
        ErrorCode::new("embedding", "request_failed"),
        format!("{provider} request failed: {error}"),
        ErrorClass::NonRetriable,
    )
    .with_metadata("provider", provider)
}

/// Map an HTTP status to an envelope; authentication errors keep the
/// backend message unchanged.
pub(crate) fn map_http_status(
    provider: &'static str,
    status: reqwest::StatusCode,
    message: String,
) -> ErrorEnvelope {
    let envelope = match status.as_u16() {
        401 | 403 => ErrorEnvelope::expected(ErrorCode::permission_denied(), message),
        400 | 404 | 422 => ErrorEnvelope::expected(ErrorCode::invalid_input(), message),
        408 => ErrorEnvelope::unexpected(ErrorCode::timeout(), message, ErrorClass::Retriable),
        429 => ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "rate_limited"),
            message,
            ErrorClass::Retriable,
        ),
        _ if status.is_server_error() => ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "provider_unavailable"),
            message,
            ErrorClass::Retriable,
        ),
        _ => ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "http_error"),
            message,
            ErrorClass::NonRetriable,
        ),
    };
    envelope
        .with_metadata("provider", provider)
        .with_metadata("status", status.as_u16().to_string())
}

/// Fail the batch when the provider returned the wrong number of vectors.
pub(crate) fn verify_count(
    provider: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), ErrorEnvelope> {
    if expected == actual {
        return Ok(());
    }
    Err(ErrorEnvelope::unexpected(
        ErrorCode::new("embedding", "count_mismatch"),
        format!("embedding count mismatch (expected {expected}, got {actual})"),
        ErrorClass::NonRetriable,
    )
    .with_metadata("provider", provider))
}
