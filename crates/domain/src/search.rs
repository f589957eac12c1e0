//! Search request and result value types.

use crate::spans::{Language, LineSpan};
use serde::{Deserialize, Serialize};

/// Options for a semantic search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of results to return.
    pub top_k: u32,
    /// Minimum similarity score; results below it are filtered out.
    pub threshold: Option<f32>,
    /// Restrict results to these file extensions (with leading dot).
    pub extension_filter: Option<Vec<Box<str>>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            threshold: None,
            extension_filter: None,
        }
    }
}

/// One semantic search hit, ordered by descending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Chunk identifier.
    pub id: Box<str>,
    /// Chunk content (decrypted when encryption is enabled).
    pub content: Box<str>,
    /// Path from the codebase root.
    pub relative_path: Box<str>,
    /// Line range of the hit.
    pub span: LineSpan,
    /// File extension including the leading dot.
    pub file_extension: Box<str>,
    /// Detected language.
    pub language: Language,
    /// Normalized similarity score in `[0, 1]`.
    pub score: f32,
}
