//! Embedding boundary contract.

use crate::BoxFuture;
use codeatlas_domain::EmbeddingProviderId;
use codeatlas_shared::{RequestContext, Result};
use std::sync::Arc;

/// An embedding vector payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    vector: Arc<[f32]>,
}

impl EmbeddingVector {
    /// Build an embedding vector from a shared slice.
    #[must_use]
    pub const fn new(vector: Arc<[f32]>) -> Self {
        Self { vector }
    }

    /// Build an embedding vector from an owned vector.
    #[must_use]
    pub fn from_vec(vector: Vec<f32>) -> Self {
        Self::new(Arc::from(vector))
    }

    /// Borrow the vector as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.vector
    }

    /// Return the embedding dimension.
    #[must_use]
    pub fn dimension(&self) -> u32 {
        u32::try_from(self.vector.len()).unwrap_or(u32::MAX)
    }

    /// Consume and return the shared vector buffer.
    #[must_use]
    pub fn into_vector(self) -> Arc<[f32]> {
        self.vector
    }
}

/// Provider descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingProviderInfo {
    /// Stable provider identifier.
    pub id: EmbeddingProviderId,
    /// Human-readable provider name.
    pub name: Box<str>,
    /// Provider-model name in use.
    pub model: Box<str>,
}

/// Boundary contract for embedding generation.
///
/// Implementations are selected by configuration; the shared embedding
/// limiter lives outside the variants, so every implementation behaves
/// identically with respect to the process-wide concurrency cap.
pub trait EmbeddingPort: Send + Sync {
    /// Provider info for this implementation.
    fn provider(&self) -> &EmbeddingProviderInfo;

    /// Detect the embedding vector dimension, probing the backend when the
    /// model is not a known one.
    fn detect_dimension(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u32>>;

    /// Embed a single text.
    fn embed(&self, ctx: &RequestContext, text: Box<str>)
    -> BoxFuture<'_, Result<EmbeddingVector>>;

    /// Embed multiple texts in a batch; the output length equals the input
    /// length or the whole batch fails.
    fn embed_batch(
        &self,
        ctx: &RequestContext,
        texts: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>>;
}
