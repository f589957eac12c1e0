//! Clear a codebase's index: collection, snapshot, and registry entry.

use crate::index_codebase::EngineDeps;
use codeatlas_domain::derive_collection_name;
use codeatlas_ports::SnapshotInitOptions;
use codeatlas_shared::{ErrorEnvelope, RequestContext, Result};
use std::path::PathBuf;

/// Input for a clear-index call.
#[derive(Debug, Clone)]
pub struct ClearIndexInput {
    /// Absolute codebase root.
    pub codebase_root: PathBuf,
}

/// Drop the collection, delete the snapshot, and forget the root.
///
/// Errors from the backend propagate untouched, so a collection-limit
/// message raised while clearing still reaches the caller verbatim.
pub async fn clear_index(
    ctx: &RequestContext,
    deps: &EngineDeps,
    input: ClearIndexInput,
) -> Result<()> {
    ctx.ensure_not_cancelled("clear_index")?;

    let collection = derive_collection_name(&input.codebase_root).map_err(ErrorEnvelope::from)?;
    let exists = deps
        .vectordb
        .has_collection(ctx, collection.clone())
        .await?;
    if exists {
        deps.vectordb.drop_collection(ctx, collection).await?;
    }

    deps.file_sync
        .load(
            ctx,
            SnapshotInitOptions {
                codebase_root: input.codebase_root.clone(),
                ignore_patterns: Vec::new(),
                extensions: None,
                max_file_size_bytes: u64::MAX,
            },
        )
        .await?;
    deps.file_sync.delete_snapshot(ctx).await?;
    deps.registry.forget(&input.codebase_root)?;

    tracing::info!(root = %input.codebase_root.display(), "index cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_codebase::index_codebase;
    use crate::test_support::{
        CountingEmbedding, SpyVectorDb, TestFileSync, default_input, engine_deps, write_file,
    };
    use codeatlas_domain::IndexingState;
    use codeatlas_shared::RequestContext;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn clear_after_index_resets_everything() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(repo.path(), "a.py", "x = 1\n").await;

        let vectordb = Arc::new(SpyVectorDb::new());
        let file_sync = Arc::new(TestFileSync::default());
        let deps = engine_deps(
            Arc::new(CountingEmbedding::new(3)),
            vectordb.clone(),
            file_sync,
            None,
        );

        let ctx = RequestContext::new_request();
        index_codebase(&ctx, &deps, default_input(repo.path())).await?;
        assert_eq!(deps.registry.state_of(repo.path()), IndexingState::Indexed);

        clear_index(
            &ctx,
            &deps,
            ClearIndexInput {
                codebase_root: repo.path().to_path_buf(),
            },
        )
        .await?;

        assert_eq!(vectordb.drop_count(), 1);
        assert_eq!(deps.registry.state_of(repo.path()), IndexingState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn clear_without_collection_is_a_noop() -> Result<()> {
        let deps = engine_deps(
            Arc::new(CountingEmbedding::new(3)),
            Arc::new(SpyVectorDb::new()),
            Arc::new(TestFileSync::default()),
            None,
        );
        let ctx = RequestContext::new_request();
        clear_index(
            &ctx,
            &deps,
            ClearIndexInput {
                codebase_root: PathBuf::from("/nonexistent"),
            },
        )
        .await?;
        Ok(())
    }
}
