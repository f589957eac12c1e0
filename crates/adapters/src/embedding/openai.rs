//! OpenAI-compatible embedding adapter.

use super::preprocess::{DEFAULT_MAX_TOKENS, preprocess_batch};
use super::{cancelled_error, map_http_status, map_transport_error, verify_count};
use codeatlas_domain::EmbeddingProviderId;
use codeatlas_ports::{BoxFuture, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector};
use codeatlas_shared::{
    EmbeddingLimiter, ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result,
};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const PROBE_TEXT: &str = "dimension probe";

/// OpenAI-compatible adapter configuration.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    /// API key used for bearer authentication.
    pub api_key: Box<str>,
    /// Embedding model name (defaults to `text-embedding-3-small`).
    pub model: Option<Box<str>>,
    /// Base URL override for compatible servers.
    pub base_url: Option<Box<str>>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Token budget used by input truncation.
    pub max_tokens: Option<usize>,
}

/// Embedding client for OpenAI-compatible HTTPS endpoints.
pub struct OpenAiEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    limiter: Arc<EmbeddingLimiter>,
    endpoint: Box<str>,
    model: Box<str>,
    max_tokens: usize,
}

impl OpenAiEmbedding {
    /// Create an adapter from configuration plus the shared limiter.
    pub fn new(config: &OpenAiEmbeddingConfig, limiter: Arc<EmbeddingLimiter>) -> Result<Self> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "api key must be set",
            ));
        }
        if config.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "timeout must be greater than zero",
            ));
        }
        let model: Box<str> = config
            .model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(DEFAULT_MODEL)
            .into();
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_owned();

        let mut headers = HeaderMap::new();
        let mut auth_header = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "api key contains invalid header characters",
            )
        })?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "client_init_failed"),
                    format!("failed to build OpenAI client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;

        let provider = EmbeddingProviderInfo {
            id: EmbeddingProviderId::parse(PROVIDER).map_err(ErrorEnvelope::from)?,
            name: "OpenAI".into(),
            model: model.clone(),
        };

        Ok(Self {
            provider,
            client,
            limiter,
            endpoint: format!("{base_url}/embeddings").into_boxed_str(),
            model,
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    /// Dimension of a known model name, when no probe is needed.
    #[must_use]
    pub fn known_dimension(model: &str) -> Option<u32> {
        match model {
            "text-embedding-3-small" | "text-embedding-ada-002" => Some(1_536),
            "text-embedding-3-large" => Some(3_072),
            _ => None,
        }
    }

    async fn embed_many(
        &self,
        ctx: &RequestContext,
        texts: Vec<Box<str>>,
        operation: &'static str,
    ) -> Result<Vec<EmbeddingVector>> {
        ctx.ensure_not_cancelled(operation)?;
        let expected = texts.len();
        if expected == 0 {
            return Ok(Vec::new());
        }

        let request = OpenAiEmbeddingRequest {
            model: self.model.clone(),
            input: preprocess_batch(&texts, self.max_tokens),
            encoding_format: "float",
        };

        let _permit = self.limiter.acquire(ctx).await?;
        let response = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error(operation)),
            result = self.client.post(self.endpoint.as_ref()).json(&request).send() => {
                result.map_err(|error| map_transport_error(PROVIDER, &error))?
            }
        };

        let status = response.status();
        let payload = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error(operation)),
            result = response.bytes() => result.map_err(|error| map_transport_error(PROVIDER, &error))?,
        };

        if !status.is_success() {
            return Err(map_error_payload(status, &payload));
        }

        let decoded: OpenAiEmbeddingResponse = serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("embedding", "invalid_response"),
                format!("failed to decode OpenAI response: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;

        verify_count(PROVIDER, expected, decoded.data.len())?;
        collect_by_index(decoded, expected)
    }
}

impl EmbeddingPort for OpenAiEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn detect_dimension(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u32>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if let Some(dimension) = Self::known_dimension(&self.model) {
                return Ok(dimension);
            }
            let vectors = self
                .embed_many(&ctx, vec![PROBE_TEXT.into()], "openai.detect_dimension")
                .await?;
            vectors.first().map(EmbeddingVector::dimension).ok_or_else(|| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    "missing embedding in probe response",
                    ErrorClass::NonRetriable,
                )
            })
        })
    }

    fn embed(
        &self,
        ctx: &RequestContext,
        text: Box<str>,
    ) -> BoxFuture<'_, Result<EmbeddingVector>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let mut vectors = self.embed_many(&ctx, vec![text], "openai.embed").await?;
            vectors.pop().ok_or_else(|| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    "missing embedding in response",
                    ErrorClass::NonRetriable,
                )
            })
        })
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        texts: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
        let ctx = ctx.clone();
        Box::pin(async move { self.embed_many(&ctx, texts, "openai.embed_batch").await })
    }
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest {
    model: Box<str>,
    input: Vec<Box<str>>,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

fn map_error_payload(status: StatusCode, payload: &[u8]) -> ErrorEnvelope {
    let message = serde_json::from_slice::<OpenAiErrorResponse>(payload)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(payload).into_owned());
    map_http_status(PROVIDER, status, message)
}

fn collect_by_index(
    response: OpenAiEmbeddingResponse,
    expected: usize,
) -> Result<Vec<EmbeddingVector>> {
    let mut slots: Vec<Option<EmbeddingVector>> = (0..expected).map(|_| None).collect();
    for datum in response.data {
        let slot = slots.get_mut(datum.index).ok_or_else(|| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                "embedding response index out of range",
                ErrorClass::NonRetriable,
            )
        })?;
        *slot = Some(EmbeddingVector::from_vec(datum.embedding));
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.ok_or_else(|| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    "embedding response missing index",
                    ErrorClass::NonRetriable,
                )
            })
        })
        .collect()
}
