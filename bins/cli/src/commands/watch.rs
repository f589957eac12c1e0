//! Watch command handler: live index synchronization.

use crate::wiring::{build_engine, resolve_root};
use codeatlas_adapters::{FileWatcher, WatcherOptions};
use codeatlas_app::{SyncCodebaseInput, sync_codebase};
use codeatlas_shared::{ErrorEnvelope, RequestContext, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Run the watch command until interrupted.
pub async fn run(json: bool, path: Option<PathBuf>, interval_ms: Option<u64>) -> Result<()> {
    let root = resolve_root(path)?;
    let engine = build_engine(&root, None, &[])?;
    let config = engine.config.clone();

    // Bring the index up to date before watching.
    let ctx = RequestContext::new_request();
    let initial = sync_codebase(&ctx, &engine.deps, sync_input(&root, &config)).await?;
    if !json {
        println!(
            "Initial sync: +{} ~{} -{} ({} chunks)",
            initial.added, initial.modified, initial.removed, initial.total_chunks
        );
    }

    let deps = engine.deps.clone();
    let handler_root = root.clone();
    let handler_config = config.clone();
    let handler: codeatlas_adapters::watcher::DrainHandler = Arc::new(move |paths| {
        let deps = deps.clone();
        let input = sync_input(&handler_root, &handler_config);
        Box::pin(async move {
            let ctx = RequestContext::new_request();
            let output = sync_codebase(&ctx, &deps, input).await?;
            if !output.is_noop() {
                tracing::info!(
                    changed = paths.len(),
                    added = output.added,
                    modified = output.modified,
                    removed = output.removed,
                    chunks = output.total_chunks,
                    "drained watcher queue"
                );
            }
            Ok(())
        })
    });

    let ignore = Arc::new(codeatlas_adapters::GlobIgnoreMatcher::new());
    let mut watcher = FileWatcher::start(
        root.clone(),
        WatcherOptions {
            drain_interval: Duration::from_millis(
                interval_ms.unwrap_or(config.queue_process_interval_ms),
            ),
            stabilization: Duration::from_millis(100),
            ignore_patterns: config.effective_ignore_patterns(),
            extensions: Some(config.effective_extensions()),
        },
        ignore,
        handler,
    )?;

    if !json {
        println!("Watching {} (Ctrl-C to stop)", root.display());
    }
    tokio::signal::ctrl_c().await.map_err(ErrorEnvelope::from)?;

    watcher.stop().await;
    if !json {
        println!("Stopped.");
    }
    Ok(())
}

fn sync_input(root: &std::path::Path, config: &codeatlas_config::IndexerConfig) -> SyncCodebaseInput {
    SyncCodebaseInput {
        codebase_root: root.to_path_buf(),
        extensions: Some(config.effective_extensions()),
        ignore_patterns: config.effective_ignore_patterns(),
        embedding_batch_size: config.embedding_batch_size,
        max_in_flight_batches: config.embedding_concurrency,
        chunk_ceiling: config.chunk_ceiling,
        max_file_size_bytes: config.max_file_size_bytes,
    }
}
