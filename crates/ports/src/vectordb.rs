//! Vector DB boundary contract.

use crate::BoxFuture;
use codeatlas_domain::{Chunk, CollectionName, VectorDbProviderId};
use codeatlas_shared::{RequestContext, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Provider descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorDbProviderInfo {
    /// Stable provider identifier.
    pub id: VectorDbProviderId,
    /// Human-readable provider name.
    pub name: Box<str>,
}

/// A document returned by search or query (vector omitted).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDocument {
    /// Stable document identifier (the chunk id).
    pub id: Box<str>,
    /// Content payload.
    pub content: Box<str>,
    /// Path from the codebase root.
    pub relative_path: Box<str>,
    /// Starting line (1-based).
    pub start_line: i64,
    /// Ending line (1-based).
    pub end_line: i64,
    /// File extension including the leading dot.
    pub file_extension: Box<str>,
    /// JSON-encoded metadata column.
    pub metadata: Box<str>,
}

/// Options for dense vector search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorSearchOptions {
    /// Maximum number of results to return.
    pub top_k: Option<u32>,
    /// Minimum normalized score; lower-scoring hits are dropped.
    pub threshold: Option<f32>,
    /// Optional provider-specific filter expression.
    pub filter_expr: Option<Box<str>>,
}

/// Dense vector search result with a normalized score.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchResult {
    /// Result document (without embeddings).
    pub document: VectorDocument,
    /// Similarity score in `[0, 1]`, descending across results.
    pub score: f32,
}

/// A row returned from an administrative query.
pub type VectorDbRow = BTreeMap<Box<str>, Value>;

/// Boundary contract for vector storage and retrieval.
pub trait VectorDbPort: Send + Sync {
    /// Provider info for this implementation.
    fn provider(&self) -> &VectorDbProviderInfo;

    /// Create a collection with the fixed chunk schema.
    ///
    /// Idempotent over an existing identical schema. A backend quota
    /// rejection surfaces as the distinguished collection-limit error,
    /// carrying the backend message verbatim.
    fn create_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        dimension: u32,
        description: Option<Box<str>>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Drop a collection (best-effort; absent collections are fine).
    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>>;

    /// Return true when the collection exists.
    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<bool>>;

    /// List available collections.
    fn list_collections(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<CollectionName>>>;

    /// Create the cosine index on the `vector` field.
    fn create_index(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>>;

    /// Load the collection so it becomes queryable.
    fn load_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>>;

    /// Insert chunks with upsert semantics keyed by the primary `id`.
    ///
    /// Every chunk must carry a vector by this point.
    fn insert(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        chunks: Vec<Chunk>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Delete documents by id.
    fn delete(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        ids: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Delete documents matching a filter expression; the canonical filter
    /// for a file delete is `relativePath == "<path>"`.
    fn delete_by_filter(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        filter: Box<str>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Perform a dense vector search ordered by descending score.
    fn search(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        query_vector: Arc<[f32]>,
        options: VectorSearchOptions,
    ) -> BoxFuture<'_, Result<Vec<VectorSearchResult>>>;

    /// Query rows by filter for administrative introspection.
    fn query(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        filter: Box<str>,
        output_fields: Vec<Box<str>>,
        limit: Option<u32>,
    ) -> BoxFuture<'_, Result<Vec<VectorDbRow>>>;
}

/// Build the canonical delete filter for one relative path.
#[must_use]
pub fn relative_path_filter(relative_path: &str) -> Box<str> {
    // Escape embedded quotes so the expression stays well-formed.
    let escaped = relative_path.replace('"', "\\\"");
    format!("relativePath == \"{escaped}\"").into_boxed_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_filter_shape() {
        assert_eq!(
            relative_path_filter("src/a.rs").as_ref(),
            "relativePath == \"src/a.rs\""
        );
        assert_eq!(
            relative_path_filter("we\"ird.rs").as_ref(),
            "relativePath == \"we\\\"ird.rs\""
        );
    }
}
