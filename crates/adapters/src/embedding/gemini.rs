//! Gemini embedding adapter.

use super::preprocess::{DEFAULT_MAX_TOKENS, preprocess_batch};
use super::{cancelled_error, map_http_status, map_transport_error, verify_count};
use codeatlas_domain::EmbeddingProviderId;
use codeatlas_ports::{BoxFuture, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector};
use codeatlas_shared::{
    EmbeddingLimiter, ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-embedding-001";
const PROBE_TEXT: &str = "dimension probe";

/// Gemini adapter configuration.
#[derive(Debug, Clone)]
pub struct GeminiEmbeddingConfig {
    /// API key sent in the `x-goog-api-key` header.
    pub api_key: Box<str>,
    /// Embedding model name (defaults to `gemini-embedding-001`).
    pub model: Option<Box<str>>,
    /// Base URL override.
    pub base_url: Option<Box<str>>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Optional output dimension override.
    pub dimension: Option<u32>,
    /// Token budget used by input truncation.
    pub max_tokens: Option<usize>,
}

/// Embedding client for the Gemini batch embedding API.
pub struct GeminiEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    limiter: Arc<EmbeddingLimiter>,
    endpoint: Box<str>,
    model_path: Box<str>,
    dimension: Option<u32>,
    max_tokens: usize,
}

impl GeminiEmbedding {
    /// Create an adapter from configuration plus the shared limiter.
    pub fn new(config: &GeminiEmbeddingConfig, limiter: Arc<EmbeddingLimiter>) -> Result<Self> {
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
        let mut key_header = HeaderValue::from_str(api_key).map_err(|_| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "api key contains invalid header characters",
            )
        })?;
        key_header.set_sensitive(true);
        headers.insert(HeaderName::from_static("x-goog-api-key"), key_header);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "client_init_failed"),
                    format!("failed to build Gemini client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;

        let provider = EmbeddingProviderInfo {
            id: EmbeddingProviderId::parse(PROVIDER).map_err(ErrorEnvelope::from)?,
            name: "Gemini".into(),
            model: model.clone(),
        };

        Ok(Self {
            provider,
            client,
            limiter,
            endpoint: format!("{base_url}/models/{model}:batchEmbedContents").into_boxed_str(),
            model_path: format!("models/{model}").into_boxed_str(),
            dimension: config.dimension,
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
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

        let request = GeminiBatchRequest {
            requests: preprocess_batch(&texts, self.max_tokens)
                .into_iter()
                .map(|text| GeminiEmbedRequest {
                    model: self.model_path.clone(),
                    content: GeminiContent {
                        parts: vec![GeminiPart { text }],
                    },
                    output_dimensionality: self.dimension,
                })
                .collect(),
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
            let message = serde_json::from_slice::<GeminiErrorResponse>(&payload)
                .map(|parsed| parsed.error.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&payload).into_owned());
            return Err(map_http_status(PROVIDER, status, message));
        }

        let decoded: GeminiBatchResponse = serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("embedding", "invalid_response"),
                format!("failed to decode Gemini response: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;

        verify_count(PROVIDER, expected, decoded.embeddings.len())?;
        Ok(decoded
            .embeddings
            .into_iter()
            .map(|embedding| EmbeddingVector::from_vec(embedding.values))
            .collect())
    }
}

impl EmbeddingPort for GeminiEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn detect_dimension(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u32>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if let Some(dimension) = self.dimension {
                return Ok(dimension);
            }
            let vectors = self
                .embed_many(&ctx, vec![PROBE_TEXT.into()], "gemini.detect_dimension")
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
            let mut vectors = self.embed_many(&ctx, vec![text], "gemini.embed").await?;
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
        Box::pin(async move { self.embed_many(&ctx, texts, "gemini.embed_batch").await })
    }
}

#[derive(Debug, Serialize)]
struct GeminiBatchRequest {
    requests: Vec<GeminiEmbedRequest>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbedRequest {
    model: Box<str>,
    content: GeminiContent,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<u32>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: Box<str>,
}

#[derive(Debug, Deserialize)]
struct GeminiBatchResponse {
    embeddings: Vec<GeminiEmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> GeminiEmbeddingConfig {
        GeminiEmbeddingConfig {
            api_key: "gemini-key".into(),
            model: None,
            base_url: Some(base_url.into()),
            timeout_ms: 2_000,
            dimension: None,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn embed_batch_decodes_values() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!(
                "/models/{DEFAULT_MODEL}:batchEmbedContents"
            )))
            .and(header("x-goog-api-key", "gemini-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [
                    { "values": [0.1, 0.2] },
                    { "values": [0.3, 0.4] }
                ]
            })))
            .mount(&server)
            .await;

        let adapter =
            GeminiEmbedding::new(&config(&server.uri()), Arc::new(EmbeddingLimiter::with_defaults()))?;
        let ctx = RequestContext::new_request();
        let vectors = adapter
            .embed_batch(&ctx, vec!["a".into(), "b".into()])
            .await?;
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1].as_slice(), &[0.3, 0.4]);
        Ok(())
    }

    #[tokio::test]
    async fn count_mismatch_fails_the_batch() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!(
                "/models/{DEFAULT_MODEL}:batchEmbedContents"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [{ "values": [0.1] }]
            })))
            .mount(&server)
            .await;

        let adapter =
            GeminiEmbedding::new(&config(&server.uri()), Arc::new(EmbeddingLimiter::with_defaults()))?;
        let ctx = RequestContext::new_request();
        let result = adapter.embed_batch(&ctx, vec!["a".into(), "b".into()]).await;
        assert!(
            matches!(result, Err(error) if error.code == ErrorCode::new("embedding", "count_mismatch"))
        );
        Ok(())
    }
}
