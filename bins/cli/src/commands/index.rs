//! Index command handler.

use crate::wiring::{build_engine, resolve_root};
use codeatlas_app::{IndexCodebaseInput, IndexStatus, index_codebase};
use codeatlas_shared::{RequestContext, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Run the index command.
pub async fn run(
    json: bool,
    path: Option<PathBuf>,
    force: bool,
    splitter: Option<String>,
    ignore_patterns: Vec<String>,
) -> Result<()> {
    let root = resolve_root(path)?;
    let engine = build_engine(&root, splitter.as_deref(), &ignore_patterns)?;
    let config = &engine.config;

    let input = IndexCodebaseInput {
        codebase_root: root.clone(),
        force,
        extensions: Some(config.effective_extensions()),
        ignore_patterns: config.effective_ignore_patterns(),
        embedding_batch_size: config.embedding_batch_size,
        max_in_flight_batches: config.embedding_concurrency,
        chunk_ceiling: config.chunk_ceiling,
        max_file_size_bytes: config.max_file_size_bytes,
        on_progress: if json {
            None
        } else {
            Some(Arc::new(|path: &str, index: usize, total: usize| {
                eprintln!("[{index}/{total}] {path}");
            }))
        },
    };

    let ctx = RequestContext::new_request();
    let output = index_codebase(&ctx, &engine.deps, input).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    match output.status {
        IndexStatus::Completed => println!(
            "Indexed {} files ({} chunks) from {}",
            output.indexed_files,
            output.total_chunks,
            root.display()
        ),
        IndexStatus::LimitReached => println!(
            "Stopped at the chunk ceiling: {} files, {} chunks indexed",
            output.indexed_files, output.total_chunks
        ),
        IndexStatus::SkippedExisting => println!(
            "{} is already indexed; re-run with --force to rebuild",
            root.display()
        ),
    }
    Ok(())
}
