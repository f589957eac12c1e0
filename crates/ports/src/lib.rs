//! # codeatlas-ports
//!
//! Boundary traits between the indexing engine and its external
//! collaborators (embedding providers, vector database, filesystem).
//! Depends only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
///
/// Boundary work is I/O-bound, so the allocation per call is noise; batch
/// APIs cover the hot paths.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod content;
pub mod embedding;
pub mod ignore;
pub mod scanner;
pub mod splitter;
pub mod sync;
pub mod vectordb;

pub use content::*;
pub use embedding::*;
pub use ignore::*;
pub use scanner::*;
pub use splitter::*;
pub use sync::*;
pub use vectordb::*;

// Re-export the domain types used in port signatures so adapter crates can
// implement ports without depending on `codeatlas-domain` directly.
pub use codeatlas_domain::{
    Chunk, ChunkMetadata, CollectionName, EmbeddingProviderId, Language, LineSpan,
    VectorDbProviderId,
};
