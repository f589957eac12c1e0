//! Stats command handler.

use crate::wiring::{build_engine, resolve_root};
use codeatlas_app::collect_stats;
use codeatlas_shared::{RequestContext, Result};
use std::path::PathBuf;

/// Run the stats command.
pub async fn run(json: bool, path: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(path)?;
    let engine = build_engine(&root, None, &[])?;

    let ctx = RequestContext::new_request();
    let stats = collect_stats(&ctx, &engine.deps, root).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats).unwrap_or_default());
        return Ok(());
    }

    println!("codebase:   {}", stats.codebase_root.display());
    println!("state:      {}", stats.state);
    println!("collection: {}", stats.collection_name);
    println!(
        "backend:    {}",
        if stats.collection_exists {
            "collection present"
        } else {
            "collection absent"
        }
    );
    match stats.merkle_root.as_deref() {
        Some(root_hash) => println!("snapshot:   {root_hash}"),
        None => println!("snapshot:   none"),
    }
    Ok(())
}
