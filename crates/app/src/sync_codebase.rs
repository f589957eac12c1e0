//! Incremental sync: diff the snapshot, apply chunk-level deltas.

use crate::index_codebase::{
    ChunkBatcher, EngineDeps, IndexCodebaseInput, index_codebase, split_file,
};
use codeatlas_ports::{SnapshotInitOptions, relative_path_filter};
use codeatlas_shared::{
    ErrorCode, ErrorEnvelope, RequestContext, Result, RetryPolicy, retry_async,
};
use codeatlas_domain::derive_collection_name;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Input for a sync run.
#[derive(Clone)]
pub struct SyncCodebaseInput {
    /// Absolute codebase root.
    pub codebase_root: PathBuf,
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
}

/// Statistics reported by a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncCodebaseOutput {
    /// Newly indexed files.
    pub added: usize,
    /// Files whose chunks were removed.
    pub removed: usize,
    /// Files re-indexed in place.
    pub modified: usize,
    /// Chunks inserted by this run.
    pub total_chunks: usize,
}

impl SyncCodebaseOutput {
    /// True when the run made no changes at all.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.modified == 0 && self.total_chunks == 0
    }
}

/// Bring the index up to date with the filesystem.
///
/// Running twice with no filesystem change is a no-op; running twice with
/// the same change converges because deletes are by-filter and inserts are
/// upserts. When no snapshot exists the run falls through to full indexing.
pub async fn sync_codebase(
    ctx: &RequestContext,
    deps: &EngineDeps,
    input: SyncCodebaseInput,
) -> Result<SyncCodebaseOutput> {
    ctx.ensure_not_cancelled("sync_codebase")?;
    if !input.codebase_root.is_absolute() {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!(
                "codebase root must be an absolute path: {}",
                input.codebase_root.display()
            ),
        ));
    }

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

    if deps.file_sync.merkle_root().await?.is_none() {
        // No previous snapshot: fall through to a full rebuild.
        tracing::info!(
            root = %input.codebase_root.display(),
            "no snapshot found, running a full index"
        );
        let output = index_codebase(ctx, deps, full_index_input(&input)).await?;
        return Ok(SyncCodebaseOutput {
            added: output.indexed_files,
            removed: 0,
            modified: 0,
            total_chunks: output.total_chunks,
        });
    }

    deps.registry.begin_indexing(&input.codebase_root)?;

    match run_sync(ctx, deps, &input).await {
        Ok(output) => {
            deps.registry.mark_indexed(&input.codebase_root)?;
            Ok(output)
        },
        Err(error) => {
            if let Err(rollback) = deps.registry.mark_idle(&input.codebase_root) {
                tracing::warn!(error = %rollback, "failed to roll back sync state");
            }
            Err(error)
        },
    }
}

async fn run_sync(
    ctx: &RequestContext,
    deps: &EngineDeps,
    input: &SyncCodebaseInput,
) -> Result<SyncCodebaseOutput> {
    let changes = deps.file_sync.rescan(ctx).await?;
    if changes.is_empty() {
        tracing::debug!(root = %input.codebase_root.display(), "sync found no changes");
        return Ok(SyncCodebaseOutput::default());
    }

    let collection = derive_collection_name(&input.codebase_root).map_err(ErrorEnvelope::from)?;
    tracing::info!(
        added = changes.added.len(),
        removed = changes.removed.len(),
        modified = changes.modified.len(),
        collection = %collection,
        "applying file delta"
    );

    // Stale chunks go first: removed files entirely, modified files before
    // their re-indexed replacements land.
    for path in changes.removed.iter().chain(changes.modified.iter()) {
        ctx.ensure_not_cancelled("sync_codebase.delete")?;
        let vectordb = Arc::clone(&deps.vectordb);
        let collection = collection.clone();
        let filter = relative_path_filter(path);
        retry_async(ctx, RetryPolicy::pipeline_default(), "vectordb.delete", || {
            let vectordb = Arc::clone(&vectordb);
            let collection = collection.clone();
            let filter = filter.clone();
            async move { vectordb.delete_by_filter(ctx, collection, filter).await }
        })
        .await?;
    }

    // Re-index added and modified files through the shared batcher.
    let mut to_index: Vec<Box<str>> = changes
        .added
        .iter()
        .chain(changes.modified.iter())
        .cloned()
        .collect();
    to_index.sort_unstable();

    let mut batcher = ChunkBatcher::new(
        ctx,
        deps,
        collection,
        input.embedding_batch_size,
        input.max_in_flight_batches,
        input.chunk_ceiling,
    )?;
    'files: for path in &to_index {
        ctx.ensure_not_cancelled("sync_codebase.file_loop")?;
        let chunks = split_file(ctx, deps, &input.codebase_root, path).await?;
        for chunk in chunks {
            if !batcher.push(chunk).await? {
                break 'files;
            }
        }
    }
    let total_chunks = batcher.finish().await?;

    deps.file_sync.persist(ctx).await?;

    Ok(SyncCodebaseOutput {
        added: changes.added.len(),
        removed: changes.removed.len(),
        modified: changes.modified.len(),
        total_chunks,
    })
}

fn full_index_input(input: &SyncCodebaseInput) -> IndexCodebaseInput {
    IndexCodebaseInput {
        codebase_root: input.codebase_root.clone(),
        force: true,
        extensions: input.extensions.clone(),
        ignore_patterns: input.ignore_patterns.clone(),
        embedding_batch_size: input.embedding_batch_size,
        max_in_flight_batches: input.max_in_flight_batches,
        chunk_ceiling: input.chunk_ceiling,
        max_file_size_bytes: input.max_file_size_bytes,
        on_progress: None,
    }
}
