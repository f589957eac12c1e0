//! Environment reader as a pure function over a captured snapshot.

use crate::schema::{EmbeddingProviderKind, IndexerConfig, SplitterKind};
use codeatlas_shared::Result;
use std::collections::BTreeMap;

/// Reads configuration overrides from a captured environment map.
///
/// The snapshot is taken once; the reader never consults the live process
/// environment after construction, so reads are deterministic.
#[derive(Debug, Clone, Default)]
pub struct EnvReader {
    values: BTreeMap<String, String>,
}

impl EnvReader {
    /// Build a reader over an explicit map (used by tests).
    #[must_use]
    pub const fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Capture the current process environment.
    #[must_use]
    pub fn from_process_env() -> Self {
        Self {
            values: std::env::vars().collect(),
        }
    }

    /// Return a trimmed, non-empty value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// OpenAI-compatible API key.
    #[must_use]
    pub fn openai_api_key(&self) -> Option<&str> {
        self.get("OPENAI_API_KEY")
    }

    /// OpenAI-compatible base URL override.
    #[must_use]
    pub fn openai_base_url(&self) -> Option<&str> {
        self.get("OPENAI_BASE_URL")
    }

    /// Azure OpenAI endpoint (`https://<resource>.openai.azure.com`).
    #[must_use]
    pub fn azure_endpoint(&self) -> Option<&str> {
        self.get("AZURE_OPENAI_ENDPOINT")
    }

    /// Azure OpenAI deployment name.
    #[must_use]
    pub fn azure_deployment(&self) -> Option<&str> {
        self.get("AZURE_OPENAI_DEPLOYMENT")
    }

    /// Azure OpenAI API key.
    #[must_use]
    pub fn azure_api_key(&self) -> Option<&str> {
        self.get("AZURE_OPENAI_API_KEY")
    }

    /// Azure OpenAI API version.
    #[must_use]
    pub fn azure_api_version(&self) -> Option<&str> {
        self.get("AZURE_OPENAI_API_VERSION")
    }

    /// Local embedding server endpoint.
    #[must_use]
    pub fn local_embedding_endpoint(&self) -> Option<&str> {
        self.get("LOCAL_EMBEDDING_ENDPOINT")
    }

    /// Gemini API key.
    #[must_use]
    pub fn gemini_api_key(&self) -> Option<&str> {
        self.get("GEMINI_API_KEY")
    }

    /// Vector DB address.
    #[must_use]
    pub fn milvus_address(&self) -> Option<&str> {
        self.get("MILVUS_ADDRESS")
    }

    /// Vector DB bearer token.
    #[must_use]
    pub fn milvus_token(&self) -> Option<&str> {
        self.get("MILVUS_TOKEN")
    }

    /// Content encryption key material.
    #[must_use]
    pub fn encryption_key(&self) -> Option<&str> {
        self.get("CONTEXT_ENCRYPTION_KEY")
    }

    /// Apply environment overrides on top of a base configuration.
    pub fn apply_overrides(&self, mut config: IndexerConfig) -> Result<IndexerConfig> {
        if let Some(provider) = self.get("EMBEDDING_PROVIDER") {
            config.embedding_provider = EmbeddingProviderKind::parse(provider)?;
        }
        if let Some(model) = self.get("EMBEDDING_MODEL") {
            config.embedding_model = model.into();
        }
        if let Some(splitter) = self.get("SPLITTER") {
            config.splitter = SplitterKind::parse(splitter)?;
        }
        if let Some(batch) = self.get("EMBEDDING_BATCH_SIZE") {
            if let Ok(value) = batch.parse::<usize>() {
                config.embedding_batch_size = value;
            }
        }
        if let Some(concurrency) = self.get("EMBEDDING_CONCURRENCY") {
            if let Ok(value) = concurrency.parse::<usize>() {
                config.embedding_concurrency = value;
            }
        }
        if self.encryption_key().is_some() && self.get("ENABLE_ENCRYPTION").is_some() {
            config.enable_encryption = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(entries: &[(&str, &str)]) -> EnvReader {
        EnvReader::new(
            entries
                .iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
                .collect(),
        )
    }

    #[test]
    fn blank_values_read_as_absent() {
        let env = reader(&[("OPENAI_API_KEY", "  ")]);
        assert_eq!(env.openai_api_key(), None);
    }

    #[test]
    fn overrides_apply_and_validate() -> Result<()> {
        let env = reader(&[
            ("EMBEDDING_PROVIDER", "local"),
            ("EMBEDDING_MODEL", "example-embed"),
            ("EMBEDDING_BATCH_SIZE", "16"),
        ]);
        let config = env.apply_overrides(IndexerConfig::default())?;
        assert_eq!(config.embedding_provider, EmbeddingProviderKind::Local);
        assert_eq!(config.embedding_model.as_ref(), "example-embed");
        assert_eq!(config.embedding_batch_size, 16);
        Ok(())
    }

    #[test]
    fn encryption_requires_key_and_flag() -> Result<()> {
        let flag_only = reader(&[("ENABLE_ENCRYPTION", "true")]);
        let config = flag_only.apply_overrides(IndexerConfig::default())?;
        assert!(!config.enable_encryption);

        let both = reader(&[
            ("ENABLE_ENCRYPTION", "true"),
            ("CONTEXT_ENCRYPTION_KEY", "secret"),
        ]);
        let config = both.apply_overrides(IndexerConfig::default())?;
        assert!(config.enable_encryption);
        Ok(())
    }
}
