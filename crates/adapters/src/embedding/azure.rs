//! Azure OpenAI deployment embedding adapter.

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

const PROVIDER: &str = "azure_openai";
const DEFAULT_API_VERSION: &str = "2024-02-01";
const PROBE_TEXT: &str = "dimension probe";

/// Azure OpenAI adapter configuration.
#[derive(Debug, Clone)]
pub struct AzureOpenAiEmbeddingConfig {
    /// Resource endpoint, e.g. `https://<resource>.openai.azure.com`.
    pub endpoint: Box<str>,
    /// Deployment name hosting the embedding model.
    pub deployment: Box<str>,
    /// API key sent in the `api-key` header.
    pub api_key: Box<str>,
    /// API version query parameter.
    pub api_version: Option<Box<str>>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Known output dimension, when the deployment's model is fixed.
    pub dimension: Option<u32>,
    /// Token budget used by input truncation.
    pub max_tokens: Option<usize>,
}

/// Embedding client for Azure OpenAI deployments.
pub struct AzureOpenAiEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    limiter: Arc<EmbeddingLimiter>,
    endpoint: Box<str>,
    dimension: Option<u32>,
    max_tokens: usize,
}

impl AzureOpenAiEmbedding {
    /// Create an adapter from configuration plus the shared limiter.
    pub fn new(
        config: &AzureOpenAiEmbeddingConfig,
        limiter: Arc<EmbeddingLimiter>,
    ) -> Result<Self> {
        let endpoint = config.endpoint.trim().trim_end_matches('/');
        let deployment = config.deployment.trim();
        let api_key = config.api_key.trim();
        if endpoint.is_empty() || deployment.is_empty() || api_key.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "Azure endpoint, deployment, and api key must be set",
            ));
        }
        if config.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "timeout must be greater than zero",
            ));
        }
        let api_version = config
            .api_version
            .as_deref()
            .map(str::trim)
            .filter(|version| !version.is_empty())
            .unwrap_or(DEFAULT_API_VERSION);

        let mut headers = HeaderMap::new();
        let mut key_header = HeaderValue::from_str(api_key).map_err(|_| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "api key contains invalid header characters",
            )
        })?;
        key_header.set_sensitive(true);
        headers.insert(HeaderName::from_static("api-key"), key_header);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "client_init_failed"),
                    format!("failed to build Azure OpenAI client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;

        let provider = EmbeddingProviderInfo {
            id: EmbeddingProviderId::parse(PROVIDER).map_err(ErrorEnvelope::from)?,
            name: "Azure OpenAI".into(),
            model: deployment.into(),
        };
        let endpoint = format!(
            "{endpoint}/openai/deployments/{deployment}/embeddings?api-version={api_version}"
        )
        .into_boxed_str();

        Ok(Self {
            provider,
            client,
            limiter,
            endpoint,
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

        let request = AzureEmbeddingRequest {
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
            let message = serde_json::from_slice::<AzureErrorResponse>(&payload)
                .map(|parsed| parsed.error.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&payload).into_owned());
            return Err(map_http_status(PROVIDER, status, message));
        }

        let decoded: AzureEmbeddingResponse = serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("embedding", "invalid_response"),
                format!("failed to decode Azure OpenAI response: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;

        verify_count(PROVIDER, expected, decoded.data.len())?;
        Ok(decoded
            .data
            .into_iter()
            .map(|datum| EmbeddingVector::from_vec(datum.embedding))
            .collect())
    }
}

impl EmbeddingPort for AzureOpenAiEmbedding {
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
                .embed_many(&ctx, vec![PROBE_TEXT.into()], "azure.detect_dimension")
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
            let mut vectors = self.embed_many(&ctx, vec![text], "azure.embed").await?;
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
        Box::pin(async move { self.embed_many(&ctx, texts, "azure.embed_batch").await })
    }
}

#[derive(Debug, Serialize)]
struct AzureEmbeddingRequest {
    input: Vec<Box<str>>,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingResponse {
    data: Vec<AzureEmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct AzureErrorResponse {
    error: AzureErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AzureErrorDetail {
    message: String,
}
