//! Configuration schema with validated defaults.

use codeatlas_shared::{ErrorCode, ErrorEnvelope, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default size-splitter window in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 2_500;
/// Default carryover between adjacent windows in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 300;
/// Default number of chunks per embedding batch.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;
/// Default cap on concurrent outbound embedding calls.
pub const DEFAULT_EMBEDDING_CONCURRENCY: usize = 5;
/// Default hard stop on chunks inserted in one indexing call.
pub const DEFAULT_CHUNK_CEILING: usize = 450_000;
/// Default watcher drain cadence in milliseconds.
pub const DEFAULT_QUEUE_PROCESS_INTERVAL_MS: u64 = 3_000;
/// Files larger than this are skipped with a warning.
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 1_048_576;
/// Default per-call HTTP deadline in milliseconds.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 60_000;

/// Extensions indexed when the caller provides no allowlist.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".rs", ".go", ".java", ".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx", ".py", ".pyi", ".c",
    ".h", ".cc", ".cpp", ".cxx", ".hpp", ".hh", ".rb", ".php", ".swift", ".kt", ".scala", ".sh",
    ".md", ".toml", ".yaml", ".yml", ".json",
];

/// Ignore rules merged ahead of user-provided patterns.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git/",
    ".hg/",
    ".svn/",
    "node_modules/",
    "bower_components/",
    "vendor/",
    "dist/",
    "build/",
    "out/",
    "target/",
    ".next/",
    ".nuxt/",
    ".cache/",
    ".venv/",
    "venv/",
    "__pycache__/",
    ".idea/",
    ".vscode/",
    "coverage/",
    "*.min.js",
    "*.min.css",
    "*.map",
    "*.lock",
    "*.log",
    "*.tmp",
];

/// Embedding provider variants the engine can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// OpenAI-compatible HTTPS endpoint.
    OpenAi,
    /// Azure OpenAI deployment.
    AzureOpenAi,
    /// Local HTTPS endpoint returning base64-packed float32 vectors.
    Local,
    /// Gemini embedding API.
    Gemini,
}

impl EmbeddingProviderKind {
    /// Canonical lowercase name used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Local => "local",
            Self::Gemini => "gemini",
        }
    }

    /// Parse a configuration value into a provider kind.
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure_openai" | "azure-openai" | "azure" => Ok(Self::AzureOpenAi),
            "local" => Ok(Self::Local),
            "gemini" => Ok(Self::Gemini),
            other => Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                format!("unknown embedding provider: {other}"),
            )),
        }
    }
}

impl fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Splitter variant selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitterKind {
    /// Syntax-aware splitter backed by tree-sitter grammars.
    Ast,
    /// Size-based sliding-window splitter.
    Langchain,
}

impl SplitterKind {
    /// Canonical lowercase name used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ast => "ast",
            Self::Langchain => "langchain",
        }
    }

    /// Parse a configuration value into a splitter kind.
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "ast" => Ok(Self::Ast),
            "langchain" => Ok(Self::Langchain),
            other => Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                format!("invalid splitter: {other} (expected ast or langchain)"),
            )),
        }
    }
}

impl fmt::Display for SplitterKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Engine configuration, deserializable from JSON and overridable from the
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexerConfig {
    /// Selects the embedding client variant.
    pub embedding_provider: EmbeddingProviderKind,
    /// Provider-model name; fixes the vector dimension.
    pub embedding_model: Box<str>,
    /// Size-splitter window in characters.
    pub chunk_size: usize,
    /// Carryover between adjacent windows in characters.
    pub chunk_overlap: usize,
    /// Extension allowlist; `None` uses `DEFAULT_EXTENSIONS`.
    pub supported_extensions: Option<Vec<Box<str>>>,
    /// User ignore globs, merged with `DEFAULT_IGNORE_PATTERNS`.
    pub ignore_patterns: Vec<Box<str>>,
    /// Splitter variant.
    pub splitter: SplitterKind,
    /// Cap on concurrent outbound embedding calls.
    pub embedding_concurrency: usize,
    /// Chunks per embedding batch.
    pub embedding_batch_size: usize,
    /// Hard stop on chunks inserted in one indexing call.
    pub chunk_ceiling: usize,
    /// Watcher drain cadence in milliseconds.
    pub queue_process_interval_ms: u64,
    /// Skip files larger than this many bytes.
    pub max_file_size_bytes: u64,
    /// Per-call HTTP deadline in milliseconds.
    pub http_timeout_ms: u64,
    /// Encrypt chunk content before insert.
    pub enable_encryption: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            embedding_provider: EmbeddingProviderKind::OpenAi,
            embedding_model: "text-embedding-3-small".into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            supported_extensions: None,
            ignore_patterns: Vec::new(),
            splitter: SplitterKind::Ast,
            embedding_concurrency: DEFAULT_EMBEDDING_CONCURRENCY,
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            chunk_ceiling: DEFAULT_CHUNK_CEILING,
            queue_process_interval_ms: DEFAULT_QUEUE_PROCESS_INTERVAL_MS,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            enable_encryption: false,
        }
    }
}

impl IndexerConfig {
    /// Validate cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(invalid("chunkSize must be greater than zero"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(invalid("chunkOverlap must be smaller than chunkSize"));
        }
        if self.embedding_concurrency == 0 {
            return Err(invalid("embeddingConcurrency must be greater than zero"));
        }
        if self.embedding_batch_size == 0 {
            return Err(invalid("embeddingBatchSize must be greater than zero"));
        }
        if self.chunk_ceiling == 0 {
            return Err(invalid("chunkCeiling must be greater than zero"));
        }
        if self.queue_process_interval_ms == 0 {
            return Err(invalid("queueProcessInterval must be greater than zero"));
        }
        Ok(())
    }

    /// Effective extension allowlist, lowercased with leading dots.
    #[must_use]
    pub fn effective_extensions(&self) -> Vec<Box<str>> {
        merge_extensions(self.supported_extensions.as_deref())
    }

    /// Effective ignore patterns: defaults first, then user patterns,
    /// deduplicated preserving first occurrence.
    #[must_use]
    pub fn effective_ignore_patterns(&self) -> Vec<Box<str>> {
        merge_ignore_patterns(&self.ignore_patterns)
    }
}

/// Normalize an extension list: lowercased, leading dot enforced.
#[must_use]
pub fn merge_extensions(extensions: Option<&[Box<str>]>) -> Vec<Box<str>> {
    let source: Vec<Box<str>> = match extensions {
        Some(values) if !values.is_empty() => values.to_vec(),
        _ => DEFAULT_EXTENSIONS.iter().map(|ext| Box::from(*ext)).collect(),
    };

    let mut merged = Vec::with_capacity(source.len());
    for ext in source {
        let trimmed = ext.trim().to_ascii_lowercase();
        if trimmed.is_empty() {
            continue;
        }
        let normalized: Box<str> = if trimmed.starts_with('.') {
            trimmed.into_boxed_str()
        } else {
            format!(".{trimmed}").into_boxed_str()
        };
        if !merged.contains(&normalized) {
            merged.push(normalized);
        }
    }
    merged
}

/// Merge default and user ignore patterns, deduplicated preserving the
/// first occurrence.
#[must_use]
pub fn merge_ignore_patterns(user_patterns: &[Box<str>]) -> Vec<Box<str>> {
    let mut merged: Vec<Box<str>> = Vec::new();
    for pattern in DEFAULT_IGNORE_PATTERNS
        .iter()
        .map(|pattern| Box::from(*pattern))
        .chain(user_patterns.iter().cloned())
    {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            continue;
        }
        let candidate: Box<str> = trimmed.into();
        if !merged.contains(&candidate) {
            merged.push(candidate);
        }
    }
    merged
}

fn invalid(message: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(ErrorCode::invalid_input(), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(IndexerConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let config = IndexerConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..IndexerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn extension_merge_normalizes_and_dedups() {
        let user: Vec<Box<str>> = vec!["RS".into(), ".rs".into(), " .Go ".into()];
        let merged = merge_extensions(Some(&user));
        assert_eq!(merged, vec![Box::from(".rs"), Box::from(".go")]);
    }

    #[test]
    fn ignore_merge_keeps_first_occurrence() {
        let user: Vec<Box<str>> = vec!["node_modules/".into(), "*.gen.rs".into()];
        let merged = merge_ignore_patterns(&user);

        let node_modules: Vec<_> = merged
            .iter()
            .filter(|pattern| pattern.as_ref() == "node_modules/")
            .collect();
        assert_eq!(node_modules.len(), 1);
        assert!(merged.iter().any(|pattern| pattern.as_ref() == "*.gen.rs"));
    }

    #[test]
    fn provider_and_splitter_parse() -> Result<()> {
        assert_eq!(
            EmbeddingProviderKind::parse("Azure")?,
            EmbeddingProviderKind::AzureOpenAi
        );
        assert_eq!(SplitterKind::parse("LANGCHAIN")?, SplitterKind::Langchain);
        assert!(SplitterKind::parse("treesitter").is_err());
        Ok(())
    }

    #[test]
    fn config_deserializes_camel_case() -> Result<()> {
        let payload = r#"{
            "embeddingProvider": "local",
            "embeddingModel": "example-embed",
            "chunkSize": 1000,
            "chunkOverlap": 100,
            "splitter": "langchain",
            "enableEncryption": true
        }"#;
        let config: IndexerConfig = serde_json::from_str(payload).map_err(|error| {
            ErrorEnvelope::expected(ErrorCode::invalid_input(), error.to_string())
        })?;
        assert_eq!(config.embedding_provider, EmbeddingProviderKind::Local);
        assert_eq!(config.chunk_size, 1000);
        assert!(config.enable_encryption);
        assert_eq!(config.chunk_ceiling, DEFAULT_CHUNK_CEILING);
        Ok(())
    }
}
