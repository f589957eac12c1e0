//! Chunk metadata carried as an opaque JSON column.

use crate::spans::Language;
use codeatlas_shared::{ErrorCode, ErrorEnvelope, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata attached to every indexed chunk.
///
/// Serialized to a JSON string for the fixed `metadata` field of the vector
/// DB schema; at minimum it carries the codebase path and language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    /// Absolute codebase root the chunk was indexed from.
    pub codebase_path: Box<str>,
    /// Detected source language.
    pub language: Language,
    /// Additional provider- or caller-specific entries.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    /// Build metadata with the required fields only.
    pub fn new(codebase_path: impl Into<Box<str>>, language: Language) -> Self {
        Self {
            codebase_path: codebase_path.into(),
            language,
            extra: BTreeMap::new(),
        }
    }

    /// Serialize to the JSON string stored in the vector DB.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|error| {
            ErrorEnvelope::invariant(
                ErrorCode::new("domain", "metadata_encode_failed"),
                format!("failed to encode chunk metadata: {error}"),
            )
        })
    }

    /// Parse metadata back from its stored JSON string.
    pub fn from_json_str(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("domain", "metadata_decode_failed"),
                format!("failed to decode chunk metadata: {error}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trips_through_json() -> Result<()> {
        let mut metadata = ChunkMetadata::new("/repo", Language::Rust);
        metadata
            .extra
            .insert("model".to_owned(), serde_json::json!("text-embedding-3-small"));

        let encoded = metadata.to_json_string()?;
        let decoded = ChunkMetadata::from_json_str(&encoded)?;
        assert_eq!(decoded, metadata);
        Ok(())
    }

    #[test]
    fn metadata_json_uses_camel_case_keys() -> Result<()> {
        let metadata = ChunkMetadata::new("/repo", Language::Python);
        let encoded = metadata.to_json_string()?;
        assert!(encoded.contains("\"codebasePath\""));
        assert!(encoded.contains("\"language\":\"python\""));
        Ok(())
    }
}
