//! Search command handler.

use crate::wiring::{build_engine, resolve_root};
use codeatlas_app::{SearchInput, semantic_search};
use codeatlas_domain::SearchOptions;
use codeatlas_shared::{RequestContext, Result};
use std::path::PathBuf;

/// Run the search command.
pub async fn run(
    json: bool,
    query: String,
    path: Option<PathBuf>,
    limit: u32,
    threshold: Option<f32>,
    extensions: Vec<String>,
) -> Result<()> {
    let root = resolve_root(path)?;
    let engine = build_engine(&root, None, &[])?;

    let extension_filter = if extensions.is_empty() {
        None
    } else {
        Some(
            extensions
                .iter()
                .map(|extension| {
                    let trimmed = extension.trim().to_ascii_lowercase();
                    if trimmed.starts_with('.') {
                        trimmed.into_boxed_str()
                    } else {
                        format!(".{trimmed}").into_boxed_str()
                    }
                })
                .collect(),
        )
    };

    let ctx = RequestContext::new_request();
    let results = semantic_search(
        &ctx,
        &engine.deps,
        SearchInput {
            codebase_root: root,
            query: query.into_boxed_str(),
            options: SearchOptions {
                top_k: limit,
                threshold,
                extension_filter,
            },
        },
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results).unwrap_or_default());
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for result in results {
        println!(
            "{:.3}  {}:{}",
            result.score, result.relative_path, result.span
        );
        for line in result.content.lines().take(8) {
            println!("    {line}");
        }
        println!();
    }
    Ok(())
}
