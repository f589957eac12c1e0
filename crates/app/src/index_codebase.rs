//! Index a codebase: scan, split, embed in bounded batches, insert.

use crate::state::IndexRegistry;
use codeatlas_domain::{
    Chunk, ChunkMetadata, CollectionName, Language, derive_chunk_id, derive_collection_name,
    file_extension_of,
};
use codeatlas_ports::{
    ContentCipherPort, EmbeddingPort, FileScanPort, FileSyncPort, ScanRequest, SnapshotInitOptions,
    SplitOptions, SplitterPort, VectorDbPort,
};
use codeatlas_shared::{
    ErrorCode, ErrorEnvelope, RequestContext, Result, RetryPolicy, retry_async,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-file progress callback: `(relative_path, file_index, total_files)`.
pub type ProgressCallback = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

/// Everything the use-cases need to reach the outside world.
#[derive(Clone)]
pub struct EngineDeps {
    /// Directory scanner.
    pub scanner: Arc<dyn FileScanPort>,
    /// Chunk splitter.
    pub splitter: Arc<dyn SplitterPort>,
    /// Embedding provider.
    pub embedding: Arc<dyn EmbeddingPort>,
    /// Vector database.
    pub vectordb: Arc<dyn VectorDbPort>,
    /// Merkle snapshot store.
    pub file_sync: Arc<dyn FileSyncPort>,
    /// Optional content cipher applied before insert.
    pub cipher: Option<Arc<dyn ContentCipherPort>>,
    /// Process-wide indexing registry.
    pub registry: Arc<IndexRegistry>,
}

/// Input for a full indexing run.
#[derive(Clone)]
pub struct IndexCodebaseInput {
    /// Absolute codebase root.
    pub codebase_root: PathBuf,
    /// Drop an existing collection and rebuild.
    pub force: bool,
    /// Extension allowlist; `None` uses the configured defaults.
    pub extensions: Option<Vec<Box<str>>>,
    /// Ignore patterns, already merged with defaults.
    pub ignore_patterns: Vec<Box<str>>,
    /// Chunks per embedding batch.
    pub embedding_batch_size: usize,
    /// Embedding batches allowed in flight at once.
    pub max_in_flight_batches: usize,
    /// Hard stop on chunks inserted by this run.
    pub chunk_ceiling: usize,
    /// Skip files larger than this many bytes.
    pub max_file_size_bytes: u64,
    /// Optional per-file progress callback.
    pub on_progress: Option<ProgressCallback>,
}

/// Terminal status of an indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// Every candidate file was processed.
    Completed,
    /// The chunk ceiling stopped the run cleanly.
    LimitReached,
    /// The root was already indexed and `force` was not set; nothing ran.
    SkippedExisting,
}

/// Statistics reported by an indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCodebaseOutput {
    /// Files fully processed.
    pub indexed_files: usize,
    /// Chunks inserted.
    pub total_chunks: usize,
    /// Terminal status.
    pub status: IndexStatus,
}

/// Index a codebase from scratch.
pub async fn index_codebase(
    ctx: &RequestContext,
    deps: &EngineDeps,
    input: IndexCodebaseInput,
) -> Result<IndexCodebaseOutput> {
    ctx.ensure_not_cancelled("index_codebase")?;
    if !input.codebase_root.is_absolute() {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!(
                "codebase root must be an absolute path: {}",
                input.codebase_root.display()
            ),
        ));
    }

    let previous_state = deps.registry.state_of(&input.codebase_root);
    deps.registry.begin_indexing(&input.codebase_root)?;

    match run_index(ctx, deps, &input).await {
        Ok(output) => {
            if output.status == IndexStatus::SkippedExisting {
                deps.registry.restore(&input.codebase_root, previous_state)?;
            } else {
                deps.registry.mark_indexed(&input.codebase_root)?;
            }
            Ok(output)
        },
        Err(error) => {
            // The partially built collection stays in place; the state rolls
            // back so a retry performs a full rescan.
            if let Err(rollback) = deps.registry.mark_idle(&input.codebase_root) {
                tracing::warn!(error = %rollback, "failed to roll back indexing state");
            }
            Err(error)
        },
    }
}

async fn run_index(
    ctx: &RequestContext,
    deps: &EngineDeps,
    input: &IndexCodebaseInput,
) -> Result<IndexCodebaseOutput> {
    let collection = derive_collection_name(&input.codebase_root).map_err(ErrorEnvelope::from)?;

    let exists = deps
        .vectordb
        .has_collection(ctx, collection.clone())
        .await?;
    if exists && !input.force {
        tracing::info!(
            collection = %collection,
            "collection already exists, skipping (re-run with force to rebuild)"
        );
        return Ok(IndexCodebaseOutput {
            indexed_files: 0,
            total_chunks: 0,
            status: IndexStatus::SkippedExisting,
        });
    }
    if exists {
        deps.vectordb.drop_collection(ctx, collection.clone()).await?;
    }

    let dimension = deps.embedding.detect_dimension(ctx).await?;
    // A collection-limit rejection surfaces from here verbatim.
    deps.vectordb
        .create_collection(ctx, collection.clone(), dimension, None)
        .await?;
    deps.vectordb.create_index(ctx, collection.clone()).await?;
    deps.vectordb.load_collection(ctx, collection.clone()).await?;

    let files = deps
        .scanner
        .scan(
            ctx,
            ScanRequest {
                codebase_root: input.codebase_root.clone(),
                extensions: input.extensions.clone(),
                ignore_patterns: input.ignore_patterns.clone(),
                max_file_size_bytes: input.max_file_size_bytes,
            },
        )
        .await?;
    let total_files = files.len();
    tracing::debug!(files = total_files, collection = %collection, "scan complete");

    let mut batcher = ChunkBatcher::new(
        ctx,
        deps,
        collection,
        input.embedding_batch_size,
        input.max_in_flight_batches,
        input.chunk_ceiling,
    )?;

    let mut indexed_files = 0usize;
    let mut status = IndexStatus::Completed;
    for (file_index, file) in files.iter().enumerate() {
        ctx.ensure_not_cancelled("index_codebase.file_loop")?;
        if batcher.limit_reached() {
            status = IndexStatus::LimitReached;
            break;
        }

        let chunks =
            split_file(ctx, deps, &input.codebase_root, &file.relative_path).await?;
        for chunk in chunks {
            if !batcher.push(chunk).await? {
                status = IndexStatus::LimitReached;
                break;
            }
        }
        if status == IndexStatus::LimitReached {
            break;
        }

        indexed_files += 1;
        if let Some(on_progress) = input.on_progress.as_ref() {
            on_progress(&file.relative_path, file_index + 1, total_files);
        }
    }

    let total_chunks = batcher.finish().await?;
    persist_snapshot(ctx, deps, input).await?;

    Ok(IndexCodebaseOutput {
        indexed_files,
        total_chunks,
        status,
    })
}

/// Split one file into domain chunks (no vectors yet).
pub(crate) async fn split_file(
    ctx: &RequestContext,
    deps: &EngineDeps,
    codebase_root: &Path,
    relative_path: &str,
) -> Result<Vec<Chunk>> {
    let text = match deps
        .scanner
        .read_file_text(ctx, codebase_root.to_path_buf(), relative_path.into())
        .await
    {
        Ok(text) => text,
        Err(error) if error.code == ErrorCode::not_found() => {
            // The file vanished between scan and read.
            tracing::warn!(path = relative_path, "file disappeared before chunking");
            return Ok(Vec::new());
        },
        Err(error) => return Err(error),
    };
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let extension = file_extension_of(relative_path);
    let language = Language::from_extension(&extension);
    let code_chunks = deps
        .splitter
        .split(
            ctx,
            text,
            language,
            SplitOptions {
                file_path: Some(relative_path.into()),
            },
        )
        .await?;

    let codebase_path: Box<str> = codebase_root.to_string_lossy().into_owned().into_boxed_str();
    let mut chunks = Vec::with_capacity(code_chunks.len());
    for code_chunk in code_chunks {
        if code_chunk.content.len() > codeatlas_domain::MAX_CONTENT_BYTES {
            tracing::warn!(
                path = relative_path,
                span = %code_chunk.span,
                bytes = code_chunk.content.len(),
                "skipping chunk over the content cap"
            );
            continue;
        }
        let id = derive_chunk_id(relative_path, code_chunk.span, &code_chunk.content)
            .map_err(ErrorEnvelope::from)?;
        chunks.push(Chunk {
            id,
            content: code_chunk.content,
            relative_path: relative_path.into(),
            span: code_chunk.span,
            file_extension: extension.clone(),
            metadata: ChunkMetadata::new(codebase_path.clone(), code_chunk.language),
            vector: None,
        });
    }
    Ok(chunks)
}

/// Persist the Merkle snapshot built from the freshly hashed files.
pub(crate) async fn persist_snapshot(
    ctx: &RequestContext,
    deps: &EngineDeps,
    input: &IndexCodebaseInput,
) -> Result<()> {
    deps.file_sync
        .load(
            ctx,
            SnapshotInitOptions {
                codebase_root: input.codebase_root.clone(),
                ignore_patterns: input.ignore_patterns.clone(),
                extensions: input.extensions.clone(),
                max_file_size_bytes: input.max_file_size_bytes,
            },
        )
        .await?;
    deps.file_sync.rescan(ctx).await?;
    deps.file_sync.persist(ctx).await
}

type EmbedTask = tokio::task::JoinHandle<Result<Vec<Chunk>>>;

/// Assembles chunks into embedding batches, keeps a bounded number of
/// batches in flight, and serializes inserts per collection.
pub(crate) struct ChunkBatcher<'a> {
    ctx: &'a RequestContext,
    deps: &'a EngineDeps,
    collection: CollectionName,
    batch_size: usize,
    max_in_flight: usize,
    ceiling: usize,
    pending: Vec<Chunk>,
    in_flight: VecDeque<EmbedTask>,
    total_chunks: usize,
    limit_reached: bool,
}

impl<'a> ChunkBatcher<'a> {
    pub(crate) fn new(
        ctx: &'a RequestContext,
        deps: &'a EngineDeps,
        collection: CollectionName,
        batch_size: usize,
        max_in_flight: usize,
        ceiling: usize,
    ) -> Result<Self> {
        if batch_size == 0 || max_in_flight == 0 || ceiling == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "batch size, in-flight cap, and chunk ceiling must be positive",
            ));
        }
        Ok(Self {
            ctx,
            deps,
            collection,
            batch_size,
            max_in_flight,
            ceiling,
            pending: Vec::with_capacity(batch_size),
            in_flight: VecDeque::new(),
            total_chunks: 0,
            limit_reached: false,
        })
    }

    /// True once the ceiling stopped intake.
    pub(crate) const fn limit_reached(&self) -> bool {
        self.limit_reached
    }

    /// Queue one chunk; returns false when the ceiling was hit and the
    /// caller should stop feeding.
    pub(crate) async fn push(&mut self, chunk: Chunk) -> Result<bool> {
        if self.total_chunks >= self.ceiling {
            self.limit_reached = true;
            return Ok(false);
        }

        self.pending.push(chunk);
        self.total_chunks += 1;
        if self.pending.len() >= self.batch_size {
            self.flush_pending().await?;
        }
        Ok(true)
    }

    /// Flush the tail batch and drain every in-flight task; returns the
    /// number of chunks inserted.
    pub(crate) async fn finish(mut self) -> Result<usize> {
        if !self.pending.is_empty() {
            self.spawn_batch();
        }
        while !self.in_flight.is_empty() {
            self.drain_one().await?;
        }
        Ok(self.total_chunks)
    }

    async fn flush_pending(&mut self) -> Result<()> {
        self.spawn_batch();
        while self.in_flight.len() >= self.max_in_flight {
            self.drain_one().await?;
        }
        Ok(())
    }

    fn spawn_batch(&mut self) {
        let batch = std::mem::take(&mut self.pending);
        if batch.is_empty() {
            return;
        }
        let embedding = Arc::clone(&self.deps.embedding);
        let ctx = self.ctx.clone();
        self.in_flight.push_back(tokio::spawn(async move {
            embed_batch_with_retry(&ctx, embedding.as_ref(), batch).await
        }));
    }

    /// Await the oldest embedding batch and insert it. Inserts run on this
    /// task only, so they are serialized per collection.
    async fn drain_one(&mut self) -> Result<()> {
        let Some(task) = self.in_flight.pop_front() else {
            return Ok(());
        };
        let mut chunks = task.await.map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                format!("embedding task failed: {error}"),
                codeatlas_shared::ErrorClass::NonRetriable,
            )
        })??;

        if let Some(cipher) = self.deps.cipher.as_ref() {
            for chunk in &mut chunks {
                chunk.content = cipher.encrypt(&chunk.content)?.into_boxed_str();
            }
        }

        let vectordb = Arc::clone(&self.deps.vectordb);
        let collection = self.collection.clone();
        let ctx = self.ctx;
        retry_async(ctx, RetryPolicy::pipeline_default(), "vectordb.insert", || {
            let vectordb = Arc::clone(&vectordb);
            let collection = collection.clone();
            let chunks = chunks.clone();
            async move { vectordb.insert(ctx, collection, chunks).await }
        })
        .await
    }
}

async fn embed_batch_with_retry(
    ctx: &RequestContext,
    embedding: &dyn EmbeddingPort,
    mut chunks: Vec<Chunk>,
) -> Result<Vec<Chunk>> {
    let texts: Vec<Box<str>> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
    let vectors = retry_async(
        ctx,
        RetryPolicy::pipeline_default(),
        "embedding.embed_batch",
        || {
            let texts = texts.clone();
            async move { embedding.embed_batch(ctx, texts).await }
        },
    )
    .await?;

    if vectors.len() != chunks.len() {
        return Err(ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "count_mismatch"),
            format!(
                "embedding batch returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            ),
            codeatlas_shared::ErrorClass::NonRetriable,
        ));
    }

    for (chunk, vector) in chunks.iter_mut().zip(vectors) {
        chunk.vector = Some(vector.into_vector());
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        CountingEmbedding, SpyVectorDb, TestFileSync, default_input, engine_deps, write_file,
    };
    use codeatlas_shared::EmbeddingLimiter;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fresh_index_small_corpus() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(repo.path(), "a.py", "def f():\n    return 1\n").await;
        write_file(repo.path(), "b.py", "").await;

        let vectordb = Arc::new(SpyVectorDb::new());
        let embedding = Arc::new(CountingEmbedding::new(3));
        let file_sync = Arc::new(TestFileSync::default());
        let deps = engine_deps(
            embedding.clone(),
            vectordb.clone(),
            file_sync.clone(),
            None,
        );

        let mut input = default_input(repo.path());
        input.embedding_batch_size = 4;

        let ctx = RequestContext::new_request();
        let output = index_codebase(&ctx, &deps, input).await?;

        assert_eq!(output.status, IndexStatus::Completed);
        assert_eq!(output.indexed_files, 2);
        assert_eq!(output.total_chunks, 1);

        let inserted = vectordb.inserted();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].relative_path.as_ref(), "a.py");
        assert_eq!(inserted[0].span.start_line(), 1);
        assert_eq!(inserted[0].span.end_line(), 2);
        assert!(inserted[0].vector.is_some());
        assert!(file_sync.persist_count() >= 1);
        Ok(())
    }

    #[tokio::test]
    async fn chunk_ceiling_reports_limit_reached() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        for index in 0..6 {
            write_file(
                repo.path(),
                &format!("f{index}.py"),
                &format!("def f{index}():\n    return {index}\n"),
            )
            .await;
        }

        let vectordb = Arc::new(SpyVectorDb::new());
        let deps = engine_deps(
            Arc::new(CountingEmbedding::new(3)),
            vectordb.clone(),
            Arc::new(TestFileSync::default()),
            None,
        );

        let mut input = default_input(repo.path());
        input.chunk_ceiling = 2;
        input.embedding_batch_size = 1;

        let ctx = RequestContext::new_request();
        let output = index_codebase(&ctx, &deps, input).await?;

        assert_eq!(output.status, IndexStatus::LimitReached);
        assert_eq!(output.total_chunks, 2);
        assert!(vectordb.inserted().len() <= 3, "ceiling plus one batch");
        Ok(())
    }

    #[tokio::test]
    async fn second_index_without_force_is_a_noop() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(repo.path(), "a.py", "x = 1\n").await;

        let vectordb = Arc::new(SpyVectorDb::new());
        let embedding = Arc::new(CountingEmbedding::new(3));
        let deps = engine_deps(
            embedding.clone(),
            vectordb.clone(),
            Arc::new(TestFileSync::default()),
            None,
        );

        let ctx = RequestContext::new_request();
        index_codebase(&ctx, &deps, default_input(repo.path())).await?;
        let calls_after_first = embedding.batch_calls();

        let output = index_codebase(&ctx, &deps, default_input(repo.path())).await?;
        assert_eq!(output.status, IndexStatus::SkippedExisting);
        assert_eq!(embedding.batch_calls(), calls_after_first);

        // Force drops and rebuilds.
        let mut forced = default_input(repo.path());
        forced.force = true;
        let output = index_codebase(&ctx, &deps, forced).await?;
        assert_eq!(output.status, IndexStatus::Completed);
        assert_eq!(vectordb.drop_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn collection_limit_aborts_without_snapshot() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(repo.path(), "a.py", "x = 1\n").await;

        let vectordb = Arc::new(SpyVectorDb::new());
        let backend_message = format!(
            "create failed: {} (=100)",
            codeatlas_shared::COLLECTION_LIMIT_MARKER
        );
        vectordb.fail_create_with(ErrorEnvelope::collection_limit(backend_message.clone()));
        let file_sync = Arc::new(TestFileSync::default());
        let deps = engine_deps(
            Arc::new(CountingEmbedding::new(3)),
            vectordb,
            file_sync.clone(),
            None,
        );

        let ctx = RequestContext::new_request();
        let error = index_codebase(&ctx, &deps, default_input(repo.path()))
            .await
            .expect_err("expected quota failure");

        assert!(codeatlas_shared::is_collection_limit(&error));
        assert_eq!(error.message, backend_message);
        assert_eq!(
            deps.registry.state_of(repo.path()),
            codeatlas_domain::IndexingState::Idle
        );
        assert_eq!(file_sync.persist_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_index_calls_are_rejected() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(repo.path(), "a.py", "x = 1\n").await;

        let deps = engine_deps(
            Arc::new(CountingEmbedding::new(3)),
            Arc::new(SpyVectorDb::new()),
            Arc::new(TestFileSync::default()),
            None,
        );
        deps.registry.begin_indexing(repo.path())?;

        let ctx = RequestContext::new_request();
        let result = index_codebase(&ctx, &deps, default_input(repo.path())).await;
        assert!(
            matches!(result, Err(error) if error.code == ErrorCode::already_indexing())
        );
        Ok(())
    }

    #[tokio::test]
    async fn embedding_concurrency_cap_is_respected() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        for index in 0..12 {
            write_file(repo.path(), &format!("f{index}.py"), "x = 1\n").await;
        }

        let limiter = Arc::new(EmbeddingLimiter::new(2)?);
        let embedding = Arc::new(CountingEmbedding::with_limiter(3, limiter));
        let deps = engine_deps(
            embedding.clone(),
            Arc::new(SpyVectorDb::new()),
            Arc::new(TestFileSync::default()),
            None,
        );

        let mut input = default_input(repo.path());
        input.embedding_batch_size = 1;
        input.max_in_flight_batches = 8;

        let ctx = RequestContext::new_request();
        index_codebase(&ctx, &deps, input).await?;

        assert!(
            embedding.max_observed_concurrency() <= 2,
            "no more than the permitted embedding calls may run at once"
        );
        Ok(())
    }

    #[tokio::test]
    async fn relative_root_is_invalid_input() {
        let deps = engine_deps(
            Arc::new(CountingEmbedding::new(3)),
            Arc::new(SpyVectorDb::new()),
            Arc::new(TestFileSync::default()),
            None,
        );
        let ctx = RequestContext::new_request();
        let mut input = default_input(Path::new("/tmp"));
        input.codebase_root = PathBuf::from("relative/path");

        let result = index_codebase(&ctx, &deps, input).await;
        assert!(matches!(result, Err(error) if error.code == ErrorCode::invalid_input()));
    }
}
