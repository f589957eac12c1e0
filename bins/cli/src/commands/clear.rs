//! Clear command handler.

use crate::wiring::{build_engine, resolve_root};
use codeatlas_app::{ClearIndexInput, clear_index};
use codeatlas_shared::{RequestContext, Result};
use std::path::PathBuf;

/// Run the clear command.
pub async fn run(json: bool, path: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(path)?;
    let engine = build_engine(&root, None, &[])?;

    let ctx = RequestContext::new_request();
    clear_index(
        &ctx,
        &engine.deps,
        ClearIndexInput {
            codebase_root: root.clone(),
        },
    )
    .await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "status": "cleared", "path": root.display().to_string() })
        );
    } else {
        println!("Cleared index for {}", root.display());
    }
    Ok(())
}
