//! # codeatlas-config
//!
//! Typed configuration for the indexing engine plus a pure environment
//! reader. Nothing here performs I/O beyond the one-time capture of process
//! environment variables.

pub mod env;
pub mod schema;

pub use env::EnvReader;
pub use schema::{
    DEFAULT_CHUNK_CEILING, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
    DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_EMBEDDING_CONCURRENCY, DEFAULT_EXTENSIONS,
    DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_IGNORE_PATTERNS, DEFAULT_MAX_FILE_SIZE_BYTES,
    DEFAULT_QUEUE_PROCESS_INTERVAL_MS, EmbeddingProviderKind, IndexerConfig, SplitterKind,
    merge_extensions, merge_ignore_patterns,
};
