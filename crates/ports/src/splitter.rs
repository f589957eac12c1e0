//! Splitter / chunking boundary contract.

use crate::BoxFuture;
use codeatlas_domain::{Language, LineSpan};
use codeatlas_shared::{RequestContext, Result};

/// A code chunk produced by a splitter, before id derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChunk {
    /// Chunk content.
    pub content: Box<str>,
    /// Line span (1-indexed, inclusive).
    pub span: LineSpan,
    /// Language the content was parsed as.
    pub language: Language,
}

/// Options for splitting.
#[derive(Debug, Clone, Default)]
pub struct SplitOptions {
    /// Optional file path hint (used for language disambiguation).
    pub file_path: Option<Box<str>>,
}

/// Boundary contract for chunking content for indexing.
///
/// Contract: every chunk has `start <= end` (1-based); chunks of a file
/// concatenate, up to overlap removal, to the original text; empty files
/// produce zero chunks.
pub trait SplitterPort: Send + Sync {
    /// Split code into chunks using the provided language hint.
    fn split(
        &self,
        ctx: &RequestContext,
        code: Box<str>,
        language: Language,
        options: SplitOptions,
    ) -> BoxFuture<'_, Result<Vec<CodeChunk>>>;
}
