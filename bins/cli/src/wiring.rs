//! Adapter construction from configuration and environment.

use codeatlas_adapters::{
    AstSplitter, AzureOpenAiEmbedding, ContentCipher, FsScanner, GeminiEmbedding,
    GlobIgnoreMatcher, LocalEmbedding, MerkleFileSync, MilvusRestVectorDb, OpenAiEmbedding,
    SizeSplitter,
};
use codeatlas_adapters::embedding::{
    AzureOpenAiEmbeddingConfig, GeminiEmbeddingConfig, LocalEmbeddingConfig, OpenAiEmbeddingConfig,
};
use codeatlas_adapters::vectordb::milvus::MilvusRestConfig;
use codeatlas_app::{EngineDeps, IndexRegistry};
use codeatlas_config::{EmbeddingProviderKind, EnvReader, IndexerConfig, SplitterKind};
use codeatlas_ports::{ContentCipherPort, EmbeddingPort, SplitterPort};
use codeatlas_shared::{EmbeddingLimiter, ErrorCode, ErrorEnvelope, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_MILVUS_ADDRESS: &str = "http://localhost:19530";

/// Fully wired engine plus the configuration it was built from.
pub struct Engine {
    /// Use-case dependencies.
    pub deps: EngineDeps,
    /// Effective configuration.
    pub config: IndexerConfig,
}

/// Resolve a codebase root to an absolute path.
pub fn resolve_root(path: Option<PathBuf>) -> Result<PathBuf> {
    let raw = match path {
        Some(path) => path,
        None => std::env::current_dir().map_err(ErrorEnvelope::from)?,
    };
    std::path::absolute(&raw).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!("cannot resolve codebase root {}: {error}", raw.display()),
        )
    })
}

/// Build the engine for a codebase root from env-derived configuration.
pub fn build_engine(
    codebase_root: &Path,
    splitter_override: Option<&str>,
    extra_ignore_patterns: &[String],
) -> Result<Engine> {
    let env = EnvReader::from_process_env();
    let mut config = env.apply_overrides(IndexerConfig::default())?;
    if let Some(splitter) = splitter_override {
        config.splitter = SplitterKind::parse(splitter)?;
    }
    config
        .ignore_patterns
        .extend(extra_ignore_patterns.iter().map(|pattern| Box::from(pattern.as_str())));

    let limiter = Arc::new(EmbeddingLimiter::new(config.embedding_concurrency)?);
    let embedding = build_embedding(&config, &env, &limiter)?;
    let vectordb = Arc::new(MilvusRestVectorDb::new(MilvusRestConfig {
        address: env
            .milvus_address()
            .unwrap_or(DEFAULT_MILVUS_ADDRESS)
            .into(),
        token: env.milvus_token().map(Into::into),
        username: None,
        password: None,
        database: None,
        timeout_ms: config.http_timeout_ms,
    })?);

    let ignore = Arc::new(GlobIgnoreMatcher::new());
    let scanner = Arc::new(FsScanner::new(ignore));
    let splitter: Arc<dyn SplitterPort> = match config.splitter {
        SplitterKind::Ast => Arc::new(AstSplitter::new(config.chunk_size, config.chunk_overlap)?),
        SplitterKind::Langchain => {
            Arc::new(SizeSplitter::new(config.chunk_size, config.chunk_overlap)?)
        },
    };

    let file_sync = Arc::new(MerkleFileSync::new(
        codebase_root.to_path_buf(),
        snapshot_state_dir(&env),
        scanner.clone(),
    ));

    let cipher: Option<Arc<dyn ContentCipherPort>> = if config.enable_encryption {
        let key = env.encryption_key().ok_or_else(|| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "encryption is enabled but CONTEXT_ENCRYPTION_KEY is not set",
            )
        })?;
        Some(Arc::new(ContentCipher::new(key)?))
    } else {
        None
    };

    Ok(Engine {
        deps: EngineDeps {
            scanner,
            splitter,
            embedding,
            vectordb,
            file_sync,
            cipher,
            registry: Arc::new(IndexRegistry::new()),
        },
        config,
    })
}

fn build_embedding(
    config: &IndexerConfig,
    env: &EnvReader,
    limiter: &Arc<EmbeddingLimiter>,
) -> Result<Arc<dyn EmbeddingPort>> {
    let embedding: Arc<dyn EmbeddingPort> = match config.embedding_provider {
        EmbeddingProviderKind::OpenAi => Arc::new(OpenAiEmbedding::new(
            &OpenAiEmbeddingConfig {
                api_key: required(env.openai_api_key(), "OPENAI_API_KEY")?,
                model: Some(config.embedding_model.clone()),
                base_url: env.openai_base_url().map(Into::into),
                timeout_ms: config.http_timeout_ms,
                max_tokens: None,
            },
            Arc::clone(limiter),
        )?),
        EmbeddingProviderKind::AzureOpenAi => Arc::new(AzureOpenAiEmbedding::new(
            &AzureOpenAiEmbeddingConfig {
                endpoint: required(env.azure_endpoint(), "AZURE_OPENAI_ENDPOINT")?,
                deployment: required(env.azure_deployment(), "AZURE_OPENAI_DEPLOYMENT")?,
                api_key: required(env.azure_api_key(), "AZURE_OPENAI_API_KEY")?,
                api_version: env.azure_api_version().map(Into::into),
                timeout_ms: config.http_timeout_ms,
                dimension: None,
                max_tokens: None,
            },
            Arc::clone(limiter),
        )?),
        EmbeddingProviderKind::Local => Arc::new(LocalEmbedding::new(
            &LocalEmbeddingConfig {
                endpoint: required(env.local_embedding_endpoint(), "LOCAL_EMBEDDING_ENDPOINT")?,
                model: Some(config.embedding_model.clone()),
                timeout_ms: config.http_timeout_ms,
                dimension: None,
                max_tokens: None,
            },
            Arc::clone(limiter),
        )?),
        EmbeddingProviderKind::Gemini => Arc::new(GeminiEmbedding::new(
            &GeminiEmbeddingConfig {
                api_key: required(env.gemini_api_key(), "GEMINI_API_KEY")?,
                model: Some(config.embedding_model.clone()),
                base_url: None,
                timeout_ms: config.http_timeout_ms,
                dimension: None,
                max_tokens: None,
            },
            Arc::clone(limiter),
        )?),
    };
    Ok(embedding)
}

fn required(value: Option<&str>, variable: &str) -> Result<Box<str>> {
    value.map(Into::into).ok_or_else(|| {
        ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!("{variable} must be set for the configured embedding provider"),
        )
    })
}

/// Per-user state directory holding codebase snapshots.
fn snapshot_state_dir(env: &EnvReader) -> PathBuf {
    if let Some(dir) = env.get("CODEATLAS_STATE_DIR") {
        return PathBuf::from(dir).join("snapshots");
    }
    let home = env.get("HOME").or_else(|| env.get("USERPROFILE"));
    match home {
        Some(home) => PathBuf::from(home).join(".codeatlas").join("snapshots"),
        None => PathBuf::from(".codeatlas").join("snapshots"),
    }
}
