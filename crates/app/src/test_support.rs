//! In-memory port doubles shared by the use-case tests.

use crate::index_codebase::{EngineDeps, IndexCodebaseInput};
use crate::state::IndexRegistry;
use codeatlas_adapters::{AstSplitter, FsScanner, GlobIgnoreMatcher};
use codeatlas_domain::{Chunk, CollectionName, EmbeddingProviderId, VectorDbProviderId};
use codeatlas_ports::{
    BoxFuture, ContentCipherPort, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector,
    FileChangeSet, FileSyncPort, SnapshotInitOptions, VectorDbPort, VectorDbProviderInfo,
    VectorDbRow, VectorDocument, VectorSearchOptions, VectorSearchResult,
};
use codeatlas_shared::{EmbeddingLimiter, ErrorEnvelope, RequestContext, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) async fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.expect("create dirs");
    }
    tokio::fs::write(path, content).await.expect("write file");
}

pub(crate) fn engine_deps(
    embedding: Arc<dyn EmbeddingPort>,
    vectordb: Arc<dyn VectorDbPort>,
    file_sync: Arc<dyn FileSyncPort>,
    cipher: Option<Arc<dyn ContentCipherPort>>,
) -> EngineDeps {
    let scanner = Arc::new(FsScanner::new(Arc::new(GlobIgnoreMatcher::new())));
    EngineDeps {
        scanner,
        splitter: Arc::new(AstSplitter::new(2_500, 300).expect("splitter config")),
        embedding,
        vectordb,
        file_sync,
        cipher,
        registry: Arc::new(IndexRegistry::new()),
    }
}

pub(crate) fn default_input(root: &Path) -> IndexCodebaseInput {
    IndexCodebaseInput {
        codebase_root: root.to_path_buf(),
        force: false,
        extensions: Some(vec![".py".into(), ".rs".into()]),
        ignore_patterns: vec![".git/".into()],
        embedding_batch_size: 4,
        max_in_flight_batches: 2,
        chunk_ceiling: 1_000,
        max_file_size_bytes: 1_048_576,
        on_progress: None,
    }
}

/// Embedding double that counts calls and observes peak concurrency
/// through the shared limiter, like the real adapters do.
pub(crate) struct CountingEmbedding {
    provider: EmbeddingProviderInfo,
    dimension: usize,
    limiter: Arc<EmbeddingLimiter>,
    batch_calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl CountingEmbedding {
    pub(crate) fn new(dimension: usize) -> Self {
        Self::with_limiter(dimension, Arc::new(EmbeddingLimiter::with_defaults()))
    }

    pub(crate) fn with_limiter(dimension: usize, limiter: Arc<EmbeddingLimiter>) -> Self {
        Self {
            provider: EmbeddingProviderInfo {
                id: EmbeddingProviderId::parse("openai").expect("provider id"),
                name: "counting".into(),
                model: "test-embed".into(),
            },
            dimension,
            limiter,
            batch_calls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_observed_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn embed_vectors(&self, ctx: &RequestContext, count: usize) -> Result<Vec<EmbeddingVector>> {
        let _permit = self.limiter.acquire(ctx).await?;
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        Ok((0..count)
            .map(|_| EmbeddingVector::from_vec(vec![0.1; self.dimension]))
            .collect())
    }
}

impl EmbeddingPort for CountingEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn detect_dimension(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<u32>> {
        let dimension = self.dimension as u32;
        Box::pin(async move { Ok(dimension) })
    }

    fn embed(&self, ctx: &RequestContext, _text: Box<str>) -> BoxFuture<'_, Result<EmbeddingVector>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let mut vectors = self.embed_vectors(&ctx, 1).await?;
            vectors.pop().ok_or_else(|| {
                ErrorEnvelope::invariant(
                    codeatlas_shared::ErrorCode::internal(),
                    "missing test vector",
                )
            })
        })
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        texts: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            self.embed_vectors(&ctx, texts.len()).await
        })
    }
}

/// Vector DB double recording inserts and deletes per collection.
pub(crate) struct SpyVectorDb {
    provider: VectorDbProviderInfo,
    state: Mutex<SpyState>,
}

#[derive(Default)]
struct SpyState {
    exists: bool,
    inserted: Vec<Chunk>,
    delete_filters: Vec<Box<str>>,
    drop_count: usize,
    fail_create: Option<ErrorEnvelope>,
    search_results: Vec<VectorSearchResult>,
}

impl SpyVectorDb {
    pub(crate) fn new() -> Self {
        Self {
            provider: VectorDbProviderInfo {
                id: VectorDbProviderId::parse("spy").expect("provider id"),
                name: "spy".into(),
            },
            state: Mutex::new(SpyState::default()),
        }
    }

    pub(crate) fn inserted(&self) -> Vec<Chunk> {
        self.state.lock().expect("spy lock").inserted.clone()
    }

    pub(crate) fn delete_filters(&self) -> Vec<Box<str>> {
        self.state.lock().expect("spy lock").delete_filters.clone()
    }

    pub(crate) fn drop_count(&self) -> usize {
        self.state.lock().expect("spy lock").drop_count
    }

    pub(crate) fn fail_create_with(&self, error: ErrorEnvelope) {
        self.state.lock().expect("spy lock").fail_create = Some(error);
    }

    pub(crate) fn set_search_results(&self, results: Vec<VectorSearchResult>) {
        self.state.lock().expect("spy lock").search_results = results;
    }

    /// Remove previously inserted chunks matching a relativePath filter,
    /// mirroring the backend's delete-by-filter semantics.
    fn apply_delete_filter(state: &mut SpyState, filter: &str) {
        if let Some(path) = filter
            .strip_prefix("relativePath == \"")
            .and_then(|rest| rest.strip_suffix('"'))
        {
            state
                .inserted
                .retain(|chunk| chunk.relative_path.as_ref() != path);
        }
    }
}

impl VectorDbPort for SpyVectorDb {
    fn provider(&self) -> &VectorDbProviderInfo {
        &self.provider
    }

    fn create_collection(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
        _dimension: u32,
        _description: Option<Box<str>>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().expect("spy lock");
            if let Some(error) = state.fail_create.clone() {
                return Err(error);
            }
            state.exists = true;
            Ok(())
        })
    }

    fn drop_collection(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().expect("spy lock");
            state.exists = false;
            state.inserted.clear();
            state.drop_count += 1;
            Ok(())
        })
    }

    fn has_collection(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.state.lock().expect("spy lock").exists) })
    }

    fn list_collections(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<CollectionName>>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn create_index(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn load_collection(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn insert(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
        chunks: Vec<Chunk>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().expect("spy lock");
            // Upsert semantics keyed by id.
            for chunk in chunks {
                state.inserted.retain(|existing| existing.id != chunk.id);
                state.inserted.push(chunk);
            }
            Ok(())
        })
    }

    fn delete(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
        ids: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().expect("spy lock");
            state
                .inserted
                .retain(|chunk| !ids.iter().any(|id| id.as_ref() == chunk.id.as_str()));
            Ok(())
        })
    }

    fn delete_by_filter(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
        filter: Box<str>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().expect("spy lock");
            Self::apply_delete_filter(&mut state, &filter);
            state.delete_filters.push(filter);
            Ok(())
        })
    }

    fn search(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
        _query_vector: Arc<[f32]>,
        options: VectorSearchOptions,
    ) -> BoxFuture<'_, Result<Vec<VectorSearchResult>>> {
        Box::pin(async move {
            let state = self.state.lock().expect("spy lock");
            let mut results: Vec<VectorSearchResult> = state
                .search_results
                .iter()
                .filter(|result| {
                    options
                        .threshold
                        .is_none_or(|threshold| result.score >= threshold)
                })
                .cloned()
                .collect();
            results.sort_by(|left, right| {
                right
                    .score
                    .partial_cmp(&left.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(results)
        })
    }

    fn query(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
        _filter: Box<str>,
        _output_fields: Vec<Box<str>>,
        _limit: Option<u32>,
    ) -> BoxFuture<'_, Result<Vec<VectorDbRow>>> {
        Box::pin(async move { Ok(Vec::new()) })
    }
}

/// Search document builder for spy results.
pub(crate) fn search_hit(id: &str, content: &str, relative_path: &str, score: f32) -> VectorSearchResult {
    VectorSearchResult {
        document: VectorDocument {
            id: id.into(),
            content: content.into(),
            relative_path: relative_path.into(),
            start_line: 1,
            end_line: 2,
            file_extension: ".py".into(),
            metadata: "{\"codebasePath\":\"/repo\",\"language\":\"python\"}".into(),
        },
        score,
    }
}

/// File-sync double that never touches disk.
#[derive(Default)]
pub(crate) struct TestFileSync {
    staged_root: Mutex<Option<Box<str>>>,
    file_hashes: Mutex<BTreeMap<Box<str>, Box<str>>>,
    persist_count: AtomicUsize,
}

impl TestFileSync {
    pub(crate) fn persist_count(&self) -> usize {
        self.persist_count.load(Ordering::SeqCst)
    }
}

impl FileSyncPort for TestFileSync {
    fn load(
        &self,
        _ctx: &RequestContext,
        _options: SnapshotInitOptions,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn rescan(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<FileChangeSet>> {
        Box::pin(async move {
            *self.staged_root.lock().expect("sync lock") = Some("cafebabe".into());
            Ok(FileChangeSet::default())
        })
    }

    fn update_paths(
        &self,
        _ctx: &RequestContext,
        relative_paths: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut hashes = self.file_hashes.lock().expect("sync lock");
            for path in relative_paths {
                hashes.insert(path, "updated".into());
            }
            Ok(())
        })
    }

    fn persist(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.persist_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn delete_snapshot(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.staged_root.lock().expect("sync lock") = None;
            self.file_hashes.lock().expect("sync lock").clear();
            Ok(())
        })
    }

    fn merkle_root(&self) -> BoxFuture<'_, Result<Option<Box<str>>>> {
        Box::pin(async move { Ok(self.staged_root.lock().expect("sync lock").clone()) })
    }
}
