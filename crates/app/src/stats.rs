//! Index statistics for administrative introspection.

use crate::index_codebase::EngineDeps;
use codeatlas_domain::{IndexingState, derive_collection_name};
use codeatlas_ports::SnapshotInitOptions;
use codeatlas_shared::{ErrorEnvelope, RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Snapshot of one codebase's indexing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Absolute codebase root.
    pub codebase_root: PathBuf,
    /// Registry state for the root.
    pub state: IndexingState,
    /// Derived collection name.
    pub collection_name: Box<str>,
    /// Whether the collection exists in the vector DB.
    pub collection_exists: bool,
    /// Merkle root of the persisted snapshot, when one exists.
    pub merkle_root: Option<Box<str>>,
}

/// Collect indexing stats for a codebase root.
pub async fn collect_stats(
    ctx: &RequestContext,
    deps: &EngineDeps,
    codebase_root: PathBuf,
) -> Result<IndexStats> {
    ctx.ensure_not_cancelled("collect_stats")?;

    let collection = derive_collection_name(&codebase_root).map_err(ErrorEnvelope::from)?;
    let collection_exists = deps
        .vectordb
        .has_collection(ctx, collection.clone())
        .await?;

    deps.file_sync
        .load(
            ctx,
            SnapshotInitOptions {
                codebase_root: codebase_root.clone(),
                ignore_patterns: Vec::new(),
                extensions: None,
                max_file_size_bytes: u64::MAX,
            },
        )
        .await?;
    let merkle_root = deps.file_sync.merkle_root().await?;

    Ok(IndexStats {
        state: deps.registry.state_of(&codebase_root),
        collection_name: collection.as_str().into(),
        collection_exists,
        merkle_root,
        codebase_root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingEmbedding, SpyVectorDb, TestFileSync, engine_deps};
    use std::sync::Arc;

    #[tokio::test]
    async fn stats_reflect_registry_and_collection() -> Result<()> {
        let deps = engine_deps(
            Arc::new(CountingEmbedding::new(3)),
            Arc::new(SpyVectorDb::new()),
            Arc::new(TestFileSync::default()),
            None,
        );

        let ctx = RequestContext::new_request();
        let stats = collect_stats(&ctx, &deps, PathBuf::from("/repo")).await?;

        assert_eq!(stats.state, IndexingState::Idle);
        assert!(!stats.collection_exists);
        assert!(stats.collection_name.starts_with("code_chunks_"));
        Ok(())
    }
}
