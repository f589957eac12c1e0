//! Local embedding server adapter with a base64 float32 wire format.
//!
//! The server answers `POST {endpoint}/get_embeddings` with a base64 text
//! body whose decoded bytes are `n x dim x 4` little-endian IEEE-754
//! float32 values, `n` being the number of inputs sent.

use super::preprocess::{DEFAULT_MAX_TOKENS, preprocess_batch};
use super::{cancelled_error, map_http_status, map_transport_error};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use codeatlas_domain::EmbeddingProviderId;
use codeatlas_ports::{BoxFuture, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector};
use codeatlas_shared::{
    EmbeddingLimiter, ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: &str = "local";
const PROBE_TEXT: &str = "dimension probe";

/// Local embedding adapter configuration.
#[derive(Debug, Clone)]
pub struct LocalEmbeddingConfig {
    /// Server base endpoint, e.g. `https://127.0.0.1:8300`.
    pub endpoint: Box<str>,
    /// Model label reported by `provider()`.
    pub model: Option<Box<str>>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Known output dimension, when fixed by deployment.
    pub dimension: Option<u32>,
    /// Token budget used by input truncation.
    pub max_tokens: Option<usize>,
}

/// Embedding client for a local HTTPS embedding server.
pub struct LocalEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    limiter: Arc<EmbeddingLimiter>,
    endpoint: Box<str>,
    dimension: Option<u32>,
    max_tokens: usize,
}

impl LocalEmbedding {
    /// Create an adapter from configuration plus the shared limiter.
    pub fn new(config: &LocalEmbeddingConfig, limiter: Arc<EmbeddingLimiter>) -> Result<Self> {
        let endpoint = config.endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "local embedding endpoint must be set",
            ));
        }
        if config.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "timeout must be greater than zero",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "client_init_failed"),
                    format!("failed to build local embedding client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;

        let model: Box<str> = config
            .model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or("local-code-embed")
            .into();
        let provider = EmbeddingProviderInfo {
            id: EmbeddingProviderId::parse(PROVIDER).map_err(ErrorEnvelope::from)?,
            name: "Local".into(),
            model,
        };

        Ok(Self {
            provider,
            client,
            limiter,
            endpoint: format!("{endpoint}/get_embeddings").into_boxed_str(),
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

        let request: Vec<LocalEmbeddingItem> = preprocess_batch(&texts, self.max_tokens)
            .into_iter()
            .map(|code| LocalEmbeddingItem { code })
            .collect();

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
            result = response.text() => result.map_err(|error| map_transport_error(PROVIDER, &error))?,
        };

        if !status.is_success() {
            return Err(map_http_status(PROVIDER, status, payload));
        }

        decode_base64_vectors(&payload, expected)
    }
}

impl EmbeddingPort for LocalEmbedding {
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
                .embed_many(&ctx, vec![PROBE_TEXT.into()], "local.detect_dimension")
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
            let mut vectors = self.embed_many(&ctx, vec![text], "local.embed").await?;
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
        Box::pin(async move { self.embed_many(&ctx, texts, "local.embed_batch").await })
    }
}

#[derive(Debug, Serialize)]
struct LocalEmbeddingItem {
    code: Box<str>,
}

/// Decode the packed response body: every `dimension * 4` bytes become one
/// vector, and the vector count must equal the input count.
fn decode_base64_vectors(payload: &str, expected: usize) -> Result<Vec<EmbeddingVector>> {
    let bytes = BASE64.decode(payload.trim()).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "invalid_response"),
            format!("local embedding response is not base64: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;

    let bytes_per_batch = expected.saturating_mul(4);
    if bytes_per_batch == 0 || bytes.len() % bytes_per_batch != 0 {
        return Err(count_mismatch(expected, bytes.len()));
    }
    let dimension = bytes.len() / bytes_per_batch;
    if dimension == 0 {
        return Err(count_mismatch(expected, bytes.len()));
    }

    let bytes_per_vector = dimension * 4;
    let mut vectors = Vec::with_capacity(expected);
    for chunk in bytes.chunks(bytes_per_vector) {
        let mut vector = Vec::with_capacity(dimension);
        for quad in chunk.chunks(4) {
            let raw: [u8; 4] = quad.try_into().map_err(|_| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "invalid_response"),
                    "local embedding response is not 4-byte aligned",
                    ErrorClass::NonRetriable,
                )
            })?;
            vector.push(f32::from_le_bytes(raw));
        }
        vectors.push(EmbeddingVector::from_vec(vector));
    }

    if vectors.len() != expected {
        return Err(count_mismatch(expected, bytes.len()));
    }
    Ok(vectors)
}

fn count_mismatch(expected: usize, byte_len: usize) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("embedding", "count_mismatch"),
        format!(
            "local embedding payload of {byte_len} bytes does not decode into {expected} vectors"
        ),
        ErrorClass::NonRetriable,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn encode_vectors(vectors: &[Vec<f32>]) -> String {
        let mut bytes = Vec::new();
        for vector in vectors {
            for value in vector {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        BASE64.encode(bytes)
    }

    #[test]
    fn codec_round_trips_little_endian_float32() -> Result<()> {
        let input = vec![vec![0.25f32, -1.5, 3.0], vec![9.75, 0.0, -0.125]];
        let payload = encode_vectors(&input);
        let decoded = decode_base64_vectors(&payload, 2)?;

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].as_slice(), input[0].as_slice());
        assert_eq!(decoded[1].as_slice(), input[1].as_slice());
        Ok(())
    }

    #[test]
    fn misaligned_payload_fails_the_batch() {
        let payload = BASE64.encode([0u8; 10]);
        let result = decode_base64_vectors(&payload, 2);
        assert!(
            matches!(result, Err(error) if error.code == ErrorCode::new("embedding", "count_mismatch"))
        );
    }

    #[tokio::test]
    async fn embed_batch_sends_code_items_and_decodes() -> Result<()> {
        let server = MockServer::start().await;
        let body = encode_vectors(&[vec![1.0f32, 2.0], vec![3.0, 4.0]]);
        Mock::given(method("POST"))
            .and(path("/get_embeddings"))
            .and(body_json(serde_json::json!([
                { "code": "fn a() {}" },
                { "code": "fn b() {}" }
            ])))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let adapter = LocalEmbedding::new(
            &LocalEmbeddingConfig {
                endpoint: server.uri().into(),
                model: None,
                timeout_ms: 2_000,
                dimension: None,
                max_tokens: None,
            },
            Arc::new(EmbeddingLimiter::with_defaults()),
        )?;
        let ctx = RequestContext::new_request();
        let vectors = adapter
            .embed_batch(&ctx, vec!["fn a() {}".into(), "fn b() {}".into()])
            .await?;

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].as_slice(), &[1.0, 2.0]);
        assert_eq!(vectors[1].as_slice(), &[3.0, 4.0]);
        Ok(())
    }

    #[tokio::test]
    async fn detect_dimension_probes_the_server() -> Result<()> {
        let server = MockServer::start().await;
        let body = encode_vectors(&[vec![0.0f32; 768]]);
        Mock::given(method("POST"))
            .and(path("/get_embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let adapter = LocalEmbedding::new(
            &LocalEmbeddingConfig {
                endpoint: server.uri().into(),
                model: None,
                timeout_ms: 2_000,
                dimension: None,
                max_tokens: None,
            },
            Arc::new(EmbeddingLimiter::with_defaults()),
        )?;
        let ctx = RequestContext::new_request();
        assert_eq!(adapter.detect_dimension(&ctx).await?, 768);
        Ok(())
    }
}
