//! # codeatlas-domain
//!
//! Domain entities, primitives, and value objects for the indexing engine.
//! Depends only on `codeatlas-shared`; no infrastructure, no I/O.

pub mod chunk;
pub mod metadata;
pub mod primitives;
pub mod search;
pub mod spans;
pub mod states;

pub use chunk::{Chunk, MAX_CONTENT_BYTES, file_extension_of};
pub use metadata::ChunkMetadata;
pub use primitives::{
    CHUNK_ID_CONTENT_PREFIX_CHARS, ChunkId, CollectionName, EmbeddingProviderId, PrimitiveError,
    VectorDbProviderId, derive_chunk_id, derive_collection_name,
};
pub use search::{SearchOptions, SearchResult};
pub use spans::{Language, LineSpan};
pub use states::IndexingState;

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
