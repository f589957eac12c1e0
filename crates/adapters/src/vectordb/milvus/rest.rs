//! Milvus REST adapter.

use crate::vectordb::milvus::error::{
    MilvusErrorContext, collection_not_found, map_rest_error, map_rest_transport_error,
};
use crate::vectordb::milvus::schema::{OUTPUT_FIELDS, build_index_params, build_schema};
use codeatlas_domain::{Chunk, CollectionName, VectorDbProviderId};
use codeatlas_ports::{
    BoxFuture, VectorDbPort, VectorDbProviderInfo, VectorDbRow, VectorDocument,
    VectorSearchOptions, VectorSearchResult,
};
use codeatlas_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TOP_K: u32 = 10;
const API_PREFIX: &str = "/v2/vectordb";

/// Milvus REST adapter configuration.
#[derive(Debug, Clone)]
pub struct MilvusRestConfig {
    /// Base URL for the Milvus REST service.
    pub address: Box<str>,
    /// Optional bearer token for authentication.
    pub token: Option<Box<str>>,
    /// Optional username for token-pair authentication.
    pub username: Option<Box<str>>,
    /// Optional password for token-pair authentication.
    pub password: Option<Box<str>>,
    /// Optional database name.
    pub database: Option<Box<str>>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl MilvusRestConfig {
    /// Validates configuration invariants for the REST adapter.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "Milvus REST address is required",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "Milvus timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Milvus REST vector DB adapter.
#[derive(Clone)]
pub struct MilvusRestVectorDb {
    provider: VectorDbProviderInfo,
    client: reqwest::Client,
    base_url: Box<str>,
    database: Option<Box<str>>,
}

#[derive(Debug, Deserialize)]
struct MilvusRestResponse<T> {
    code: i64,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct HasCollectionData {
    has: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LoadStateData {
    #[serde(rename = "loadState")]
    load_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MilvusSearchRow {
    id: Option<String>,
    content: Option<String>,
    #[serde(rename = "relativePath")]
    relative_path: Option<String>,
    #[serde(rename = "startLine")]
    start_line: Option<i64>,
    #[serde(rename = "endLine")]
    end_line: Option<i64>,
    #[serde(rename = "fileExtension")]
    file_extension: Option<String>,
    metadata: Option<String>,
    distance: Option<f32>,
}

impl MilvusRestVectorDb {
    /// Creates a Milvus REST adapter instance from configuration.
    pub fn new(config: MilvusRestConfig) -> Result<Self> {
        config.validate()?;

        let mut base_url = config.address.trim().trim_end_matches('/').to_owned();
        if !base_url.ends_with(API_PREFIX) {
            base_url.push_str(API_PREFIX);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(auth) = build_auth_value(&config) {
            let mut value = HeaderValue::from_str(&auth).map_err(|_| {
                ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "Milvus auth credentials contain invalid header characters",
                )
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("vector", "vdb_client_init_failed"),
                    format!("failed to build Milvus REST client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;

        let provider = VectorDbProviderInfo {
            id: VectorDbProviderId::parse("milvus_rest").map_err(ErrorEnvelope::from)?,
            name: "Milvus REST".into(),
        };

        Ok(Self {
            provider,
            client,
            base_url: base_url.into_boxed_str(),
            database: config.database,
        })
    }

    fn context(
        operation: &'static str,
        collection: Option<&CollectionName>,
        endpoint: Option<&str>,
    ) -> MilvusErrorContext {
        MilvusErrorContext {
            operation,
            collection_name: collection.map(|name| name.as_str().to_owned()),
            endpoint: endpoint.map(ToOwned::to_owned),
        }
    }

    async fn make_request<T: for<'de> Deserialize<'de>>(
        &self,
        ctx: &RequestContext,
        endpoint: &str,
        mut body: Value,
        operation: &'static str,
        collection: Option<&CollectionName>,
    ) -> Result<MilvusRestResponse<T>> {
        ctx.ensure_not_cancelled(operation)?;

        if let (Some(database), Some(object)) = (self.database.as_deref(), body.as_object_mut()) {
            object.insert("dbName".to_owned(), json!(database));
        }

        let url = format!("{}{}", self.base_url, endpoint);
        let error_ctx = Self::context(operation, collection, Some(endpoint));

        let response = tokio::select! {
            () = ctx.cancelled() => {
                return Err(ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", operation));
            }
            result = self.client.post(&url).json(&body).send() => {
                result.map_err(|error| map_rest_transport_error(&error, &error_ctx))?
            }
        };

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|error| map_rest_transport_error(&error, &error_ctx))?;

        if !status.is_success() {
            let message = String::from_utf8_lossy(&payload).to_string();
            return Err(map_rest_error(
                format!("HTTP {}: {message}", status.as_u16()),
                Some(status.as_u16()),
                &error_ctx,
            ));
        }

        let decoded: MilvusRestResponse<T> = serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("vector", "vdb_invalid_response"),
                format!("invalid Milvus REST response: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;

        if decoded.code != 0 && decoded.code != 200 {
            let message = decoded
                .message
                .unwrap_or_else(|| "Milvus REST error".to_owned());
            return Err(map_rest_error(message, None, &error_ctx));
        }

        Ok(decoded)
    }

    fn chunk_to_row(chunk: &Chunk) -> Result<Value> {
        chunk.ensure_content_fits()?;
        let vector = chunk.vector.as_ref().ok_or_else(|| {
            ErrorEnvelope::invariant(
                ErrorCode::new("vector", "vdb_missing_vector"),
                format!("chunk {} reached insert without a vector", chunk.id),
            )
        })?;

        Ok(json!({
            "id": chunk.id.as_str(),
            "vector": vector.as_ref(),
            "content": chunk.content.as_ref(),
            "relativePath": chunk.relative_path.as_ref(),
            "startLine": i64::from(chunk.span.start_line()),
            "endLine": i64::from(chunk.span.end_line()),
            "fileExtension": chunk.file_extension.as_ref(),
            "metadata": chunk.metadata.to_json_string()?,
        }))
    }

    fn row_to_document(row: MilvusSearchRow) -> VectorDocument {
        VectorDocument {
            id: row.id.unwrap_or_default().into_boxed_str(),
            content: row.content.unwrap_or_default().into_boxed_str(),
            relative_path: row.relative_path.unwrap_or_default().into_boxed_str(),
            start_line: row.start_line.unwrap_or(0),
            end_line: row.end_line.unwrap_or(0),
            file_extension: row.file_extension.unwrap_or_default().into_boxed_str(),
            metadata: row.metadata.unwrap_or_default().into_boxed_str(),
        }
    }
}

impl VectorDbPort for MilvusRestVectorDb {
    fn provider(&self) -> &VectorDbProviderInfo {
        &self.provider
    }

    fn create_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        dimension: u32,
        description: Option<Box<str>>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            let exists = VectorDbPort::has_collection(&db, &ctx, collection_name.clone()).await?;
            if exists {
                return Ok(());
            }

            let mut body = json!({
                "collectionName": collection_name.as_str(),
                "schema": build_schema(dimension),
            });
            if let (Some(description), Some(object)) = (description, body.as_object_mut()) {
                object.insert("description".to_owned(), json!(description.as_ref()));
            }

            let _response: MilvusRestResponse<Value> = db
                .make_request(
                    &ctx,
                    "/collections/create",
                    body,
                    "milvus_rest.create_collection",
                    Some(&collection_name),
                )
                .await?;
            Ok(())
        })
    }

    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            let body = json!({ "collectionName": collection_name.as_str() });
            let _response: MilvusRestResponse<Value> = db
                .make_request(
                    &ctx,
                    "/collections/drop",
                    body,
                    "milvus_rest.drop_collection",
                    Some(&collection_name),
                )
                .await?;
            Ok(())
        })
    }

    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<bool>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            let body = json!({ "collectionName": collection_name.as_str() });
            let response: MilvusRestResponse<HasCollectionData> = db
                .make_request(
                    &ctx,
                    "/collections/has",
                    body,
                    "milvus_rest.has_collection",
                    Some(&collection_name),
                )
                .await?;
            Ok(response.data.and_then(|data| data.has).unwrap_or(false))
        })
    }

    fn list_collections(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<CollectionName>>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            let response: MilvusRestResponse<Vec<String>> = db
                .make_request(
                    &ctx,
                    "/collections/list",
                    json!({}),
                    "milvus_rest.list_collections",
                    None,
                )
                .await?;
            let names = response.data.unwrap_or_default();
            names
                .into_iter()
                .map(|name| CollectionName::parse(name).map_err(ErrorEnvelope::from))
                .collect()
        })
    }

    fn create_index(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            let body = json!({
                "collectionName": collection_name.as_str(),
                "indexParams": build_index_params(),
            });
            let _response: MilvusRestResponse<Value> = db
                .make_request(
                    &ctx,
                    "/indexes/create",
                    body,
                    "milvus_rest.create_index",
                    Some(&collection_name),
                )
                .await?;
            Ok(())
        })
    }

    fn load_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            let body = json!({ "collectionName": collection_name.as_str() });
            let response: MilvusRestResponse<LoadStateData> = db
                .make_request(
                    &ctx,
                    "/collections/get_load_state",
                    body,
                    "milvus_rest.get_load_state",
                    Some(&collection_name),
                )
                .await?;
            let loaded = response
                .data
                .and_then(|data| data.load_state)
                .is_some_and(|state| state == "LoadStateLoaded");
            if loaded {
                return Ok(());
            }

            let body = json!({ "collectionName": collection_name.as_str() });
            let _response: MilvusRestResponse<Value> = db
                .make_request(
                    &ctx,
                    "/collections/load",
                    body,
                    "milvus_rest.load_collection",
                    Some(&collection_name),
                )
                .await?;
            Ok(())
        })
    }

    fn insert(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        chunks: Vec<Chunk>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            if chunks.is_empty() {
                return Ok(());
            }
            let rows = chunks
                .iter()
                .map(Self::chunk_to_row)
                .collect::<Result<Vec<Value>>>()?;

            // Upsert keyed by the primary id keeps re-inserts idempotent.
            let body = json!({
                "collectionName": collection_name.as_str(),
                "data": rows,
            });
            let _response: MilvusRestResponse<Value> = db
                .make_request(
                    &ctx,
                    "/entities/upsert",
                    body,
                    "milvus_rest.insert",
                    Some(&collection_name),
                )
                .await?;
            Ok(())
        })
    }

    fn delete(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        ids: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }
            let joined = ids
                .iter()
                .map(|id| format!("\"{}\"", id.replace('"', "\\\"")))
                .collect::<Vec<_>>()
                .join(", ");
            let filter = format!("id in [{joined}]");
            VectorDbPort::delete_by_filter(&db, &ctx, collection_name, filter.into_boxed_str())
                .await
        })
    }

    fn delete_by_filter(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        filter: Box<str>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            let body = json!({
                "collectionName": collection_name.as_str(),
                "filter": filter.as_ref(),
            });
            let _response: MilvusRestResponse<Value> = db
                .make_request(
                    &ctx,
                    "/entities/delete",
                    body,
                    "milvus_rest.delete_by_filter",
                    Some(&collection_name),
                )
                .await?;
            Ok(())
        })
    }

    fn search(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        query_vector: Arc<[f32]>,
        options: VectorSearchOptions,
    ) -> BoxFuture<'_, Result<Vec<VectorSearchResult>>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            let exists = VectorDbPort::has_collection(&db, &ctx, collection_name.clone()).await?;
            if !exists {
                return Err(collection_not_found(collection_name.as_str()));
            }

            let top_k = options.top_k.unwrap_or(DEFAULT_TOP_K);
            let mut body = json!({
                "collectionName": collection_name.as_str(),
                "data": [query_vector.as_ref()],
                "annsField": "vector",
                "limit": top_k,
                "outputFields": OUTPUT_FIELDS,
            });
            if let (Some(filter), Some(object)) = (options.filter_expr.as_deref(), body.as_object_mut())
            {
                object.insert("filter".to_owned(), json!(filter));
            }

            let response: MilvusRestResponse<Vec<MilvusSearchRow>> = db
                .make_request(
                    &ctx,
                    "/entities/search",
                    body,
                    "milvus_rest.search",
                    Some(&collection_name),
                )
                .await?;

            let mut results: Vec<VectorSearchResult> = response
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|row| {
                    let score = normalize_score(row.distance.unwrap_or(1.0));
                    VectorSearchResult {
                        document: Self::row_to_document(row),
                        score,
                    }
                })
                .filter(|result| {
                    options
                        .threshold
                        .is_none_or(|threshold| result.score >= threshold)
                })
                .collect();

            results.sort_by(|left, right| {
                right
                    .score
                    .partial_cmp(&left.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(results)
        })
    }

    fn query(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        filter: Box<str>,
        output_fields: Vec<Box<str>>,
        limit: Option<u32>,
    ) -> BoxFuture<'_, Result<Vec<VectorDbRow>>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            let mut body = json!({
                "collectionName": collection_name.as_str(),
                "filter": filter.as_ref(),
                "outputFields": output_fields.iter().map(AsRef::as_ref).collect::<Vec<&str>>(),
            });
            if let (Some(limit), Some(object)) = (limit, body.as_object_mut()) {
                object.insert("limit".to_owned(), json!(limit));
            }

            let response: MilvusRestResponse<Vec<VectorDbRow>> = db
                .make_request(
                    &ctx,
                    "/entities/query",
                    body,
                    "milvus_rest.query",
                    Some(&collection_name),
                )
                .await?;
            Ok(response.data.unwrap_or_default())
        })
    }
}

fn build_auth_value(config: &MilvusRestConfig) -> Option<String> {
    if let Some(token) = config.token.as_deref().map(str::trim).filter(|token| !token.is_empty()) {
        return Some(format!("Bearer {token}"));
    }
    let username = config.username.as_deref().map(str::trim).unwrap_or("");
    let password = config.password.as_deref().map(str::trim).unwrap_or("");
    if username.is_empty() {
        return None;
    }
    Some(format!("Bearer {username}:{password}"))
}

/// Convert a cosine distance to a similarity score in `[0, 1]`.
fn normalize_score(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeatlas_domain::{ChunkMetadata, Language, LineSpan, derive_chunk_id};
    use codeatlas_shared::{COLLECTION_LIMIT_MARKER, is_collection_limit};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(address: &str) -> Result<MilvusRestVectorDb> {
        MilvusRestVectorDb::new(MilvusRestConfig {
            address: address.into(),
            token: Some("root:Milvus".into()),
            username: None,
            password: None,
            database: None,
            timeout_ms: 2_000,
        })
    }

    fn collection() -> CollectionName {
        CollectionName::parse("code_chunks_abc12345").expect("collection name")
    }

    fn sample_chunk() -> Chunk {
        let span = LineSpan::new(1, 2).expect("span");
        let content = "def f():\n    return 1\n";
        Chunk {
            id: derive_chunk_id("a.py", span, content).expect("chunk id"),
            content: content.into(),
            relative_path: "a.py".into(),
            span,
            file_extension: ".py".into(),
            metadata: ChunkMetadata::new("/repo", Language::Python),
            vector: Some(Arc::from(vec![0.1f32, 0.2, 0.3])),
        }
    }

    async fn mount_has(server: &MockServer, has: bool) {
        Mock::given(method("POST"))
            .and(path("/v2/vectordb/collections/has"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": { "has": has }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn create_collection_is_idempotent_when_present() -> Result<()> {
        let server = MockServer::start().await;
        mount_has(&server, true).await;

        let db = adapter(&server.uri())?;
        let ctx = RequestContext::new_request();
        db.create_collection(&ctx, collection(), 3, None).await?;
        // No /collections/create mock mounted; reaching it would 404.
        Ok(())
    }

    #[tokio::test]
    async fn quota_rejection_is_collection_limit_verbatim() -> Result<()> {
        let server = MockServer::start().await;
        mount_has(&server, false).await;
        let backend_message =
            format!("create collection failed: {COLLECTION_LIMIT_MARKER} (=100)");
        Mock::given(method("POST"))
            .and(path("/v2/vectordb/collections/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 1100,
                "message": backend_message,
            })))
            .mount(&server)
            .await;

        let db = adapter(&server.uri())?;
        let ctx = RequestContext::new_request();
        let error = db
            .create_collection(&ctx, collection(), 3, None)
            .await
            .expect_err("expected quota failure");

        assert!(is_collection_limit(&error));
        assert_eq!(error.message, backend_message);
        assert!(!error.class.is_retriable());
        Ok(())
    }

    #[tokio::test]
    async fn insert_upserts_rows_with_fixed_fields() -> Result<()> {
        let server = MockServer::start().await;
        let chunk = sample_chunk();
        Mock::given(method("POST"))
            .and(path("/v2/vectordb/entities/upsert"))
            .and(body_partial_json(serde_json::json!({
                "collectionName": "code_chunks_abc12345",
                "data": [{
                    "id": chunk.id.as_str(),
                    "relativePath": "a.py",
                    "startLine": 1,
                    "endLine": 2,
                    "fileExtension": ".py"
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let db = adapter(&server.uri())?;
        let ctx = RequestContext::new_request();
        db.insert(&ctx, collection(), vec![chunk]).await?;
        Ok(())
    }

    #[tokio::test]
    async fn insert_without_vector_is_an_invariant_error() -> Result<()> {
        let server = MockServer::start().await;
        let mut chunk = sample_chunk();
        chunk.vector = None;

        let db = adapter(&server.uri())?;
        let ctx = RequestContext::new_request();
        let result = db.insert(&ctx, collection(), vec![chunk]).await;
        assert!(
            matches!(result, Err(error) if error.code == ErrorCode::new("vector", "vdb_missing_vector"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn search_normalizes_filters_and_sorts() -> Result<()> {
        let server = MockServer::start().await;
        mount_has(&server, true).await;
        Mock::given(method("POST"))
            .and(path("/v2/vectordb/entities/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": [
                    { "id": "chunk_b", "content": "b", "relativePath": "b.py",
                      "startLine": 1, "endLine": 2, "fileExtension": ".py",
                      "metadata": "{}", "distance": 0.4 },
                    { "id": "chunk_a", "content": "a", "relativePath": "a.py",
                      "startLine": 1, "endLine": 2, "fileExtension": ".py",
                      "metadata": "{}", "distance": 0.1 },
                    { "id": "chunk_c", "content": "c", "relativePath": "c.py",
                      "startLine": 1, "endLine": 2, "fileExtension": ".py",
                      "metadata": "{}", "distance": 0.8 }
                ]
            })))
            .mount(&server)
            .await;

        let db = adapter(&server.uri())?;
        let ctx = RequestContext::new_request();
        let results = db
            .search(
                &ctx,
                collection(),
                Arc::from(vec![0.1f32, 0.2, 0.3]),
                VectorSearchOptions {
                    top_k: Some(10),
                    threshold: Some(0.5),
                    filter_expr: None,
                },
            )
            .await?;

        let scores: Vec<f32> = results.iter().map(|result| result.score).collect();
        assert_eq!(scores.len(), 2);
        assert!((scores[0] - 0.9).abs() < 1e-6);
        assert!((scores[1] - 0.6).abs() < 1e-6);
        assert_eq!(results[0].document.id.as_ref(), "chunk_a");
        assert_eq!(results[1].document.id.as_ref(), "chunk_b");
        Ok(())
    }

    #[tokio::test]
    async fn search_on_missing_collection_is_distinguishable() -> Result<()> {
        let server = MockServer::start().await;
        mount_has(&server, false).await;

        let db = adapter(&server.uri())?;
        let ctx = RequestContext::new_request();
        let result = db
            .search(
                &ctx,
                collection(),
                Arc::from(vec![0.1f32]),
                VectorSearchOptions::default(),
            )
            .await;
        assert!(
            matches!(result, Err(error) if error.code == ErrorCode::new("vector", "vdb_collection_not_found"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn delete_by_filter_sends_the_canonical_expression() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/vectordb/entities/delete"))
            .and(body_partial_json(serde_json::json!({
                "collectionName": "code_chunks_abc12345",
                "filter": "relativePath == \"a.py\""
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let db = adapter(&server.uri())?;
        let ctx = RequestContext::new_request();
        db.delete_by_filter(
            &ctx,
            collection(),
            codeatlas_ports::relative_path_filter("a.py"),
        )
        .await?;
        Ok(())
    }

    #[test]
    fn score_normalization_clamps() {
        assert_eq!(normalize_score(0.1), 0.9);
        assert_eq!(normalize_score(1.5), 0.0);
        assert_eq!(normalize_score(-0.5), 1.0);
    }
}
