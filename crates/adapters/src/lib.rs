//! # codeatlas-adapters
//!
//! Concrete implementations of the engine's boundary contracts: ignore
//! matching, directory scanning, chunk splitting, embedding providers, the
//! Milvus REST vector DB client, Merkle snapshot persistence, the content
//! cipher, and the file watcher.

pub mod embedding;
pub mod encryption;
pub mod file_sync;
pub mod ignore;
pub mod scanner;
pub mod splitter;
pub mod vectordb;
pub mod watcher;

pub use embedding::{
    AzureOpenAiEmbedding, GeminiEmbedding, LocalEmbedding, OpenAiEmbedding, preprocess_text,
};
pub use encryption::ContentCipher;
pub use file_sync::MerkleFileSync;
pub use ignore::GlobIgnoreMatcher;
pub use scanner::FsScanner;
pub use splitter::{AstSplitter, SizeSplitter};
pub use vectordb::milvus::MilvusRestVectorDb;
pub use watcher::{FileWatcher, WatcherOptions, WatcherStatus};
