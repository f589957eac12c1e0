//! The chunk value type: the unit of indexing.

use crate::metadata::ChunkMetadata;
use crate::primitives::ChunkId;
use crate::spans::LineSpan;
use codeatlas_shared::{ErrorCode, ErrorEnvelope, Result};
use std::sync::Arc;

/// Per-backend cap on the stored content column, in bytes.
pub const MAX_CONTENT_BYTES: usize = 65_535;

/// A contiguous line range of source code treated as one embedding unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic chunk identifier.
    pub id: ChunkId,
    /// Raw or encrypted chunk text.
    pub content: Box<str>,
    /// Path from the codebase root, forward-slash normalized.
    pub relative_path: Box<str>,
    /// Line range covered by the content.
    pub span: LineSpan,
    /// File extension including the leading dot, lowercased.
    pub file_extension: Box<str>,
    /// Opaque metadata serialized to JSON on insert.
    pub metadata: ChunkMetadata,
    /// Embedding vector, attached after the embedding stage.
    pub vector: Option<Arc<[f32]>>,
}

impl Chunk {
    /// Validate the content cap; called before handing chunks to the DB.
    pub fn ensure_content_fits(&self) -> Result<()> {
        if self.content.len() > MAX_CONTENT_BYTES {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("domain", "chunk_content_too_large"),
                format!(
                    "chunk content is {} bytes, cap is {MAX_CONTENT_BYTES}",
                    self.content.len()
                ),
            )
            .with_metadata("relative_path", self.relative_path.to_string())
            .with_metadata("span", self.span.to_string()));
        }
        Ok(())
    }
}

/// Extract the lowercased extension (with leading dot) from a relative path.
#[must_use]
pub fn file_extension_of(relative_path: &str) -> Box<str> {
    let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!(".{}", ext.to_ascii_lowercase()).into_boxed_str()
        },
        _ => Box::from(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::Language;

    fn sample_chunk(content: &str) -> Chunk {
        let span = LineSpan::new(1, 1).unwrap();
        Chunk {
            id: crate::primitives::derive_chunk_id("src/a.rs", span, content).unwrap(),
            content: content.into(),
            relative_path: "src/a.rs".into(),
            span,
            file_extension: ".rs".into(),
            metadata: ChunkMetadata::new("/repo", Language::Rust),
            vector: None,
        }
    }

    #[test]
    fn content_cap_is_enforced() {
        assert!(sample_chunk("fn a() {}").ensure_content_fits().is_ok());
        let oversized = "x".repeat(MAX_CONTENT_BYTES + 1);
        assert!(sample_chunk(&oversized).ensure_content_fits().is_err());
    }

    #[test]
    fn extension_extraction_handles_edge_cases() {
        assert_eq!(file_extension_of("src/a.rs").as_ref(), ".rs");
        assert_eq!(file_extension_of("a/b/X.MIN.JS").as_ref(), ".js");
        assert_eq!(file_extension_of("Makefile").as_ref(), "");
        assert_eq!(file_extension_of(".gitignore").as_ref(), "");
    }
}
