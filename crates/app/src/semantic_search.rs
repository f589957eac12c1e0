//! Semantic search over an indexed codebase.

use crate::index_codebase::EngineDeps;
use codeatlas_domain::{
    ChunkMetadata, Language, LineSpan, SearchOptions, SearchResult, derive_collection_name,
    file_extension_of,
};
use codeatlas_ports::{VectorSearchOptions, VectorSearchResult};
use codeatlas_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::path::PathBuf;

/// Input for a search call.
#[derive(Debug, Clone)]
pub struct SearchInput {
    /// Absolute codebase root.
    pub codebase_root: PathBuf,
    /// Natural-language query.
    pub query: Box<str>,
    /// Result shaping options.
    pub options: SearchOptions,
}

/// Embed the query and run a nearest-neighbor search.
pub async fn semantic_search(
    ctx: &RequestContext,
    deps: &EngineDeps,
    input: SearchInput,
) -> Result<Vec<SearchResult>> {
    ctx.ensure_not_cancelled("semantic_search")?;
    if input.query.trim().is_empty() {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            "query must be non-empty",
        ));
    }

    let collection = derive_collection_name(&input.codebase_root).map_err(ErrorEnvelope::from)?;
    let query_vector = deps.embedding.embed(ctx, input.query).await?;

    let filter_expr = input
        .options
        .extension_filter
        .as_deref()
        .filter(|extensions| !extensions.is_empty())
        .map(extension_filter_expr);

    let hits = deps
        .vectordb
        .search(
            ctx,
            collection,
            query_vector.into_vector(),
            VectorSearchOptions {
                top_k: Some(input.options.top_k),
                threshold: input.options.threshold,
                filter_expr,
            },
        )
        .await?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        match to_search_result(deps, hit) {
            Ok(result) => results.push(result),
            Err(error) => {
                tracing::warn!(error = %error, "dropping malformed search hit");
            },
        }
    }
    Ok(results)
}

fn to_search_result(deps: &EngineDeps, hit: VectorSearchResult) -> Result<SearchResult> {
    let document = hit.document;

    let content: Box<str> = match deps.cipher.as_ref() {
        Some(cipher) => cipher.decrypt(&document.content)?.into_boxed_str(),
        None => document.content,
    };

    let start_line = u32::try_from(document.start_line.max(1)).unwrap_or(1);
    let end_line = u32::try_from(document.end_line.max(1)).unwrap_or(1);
    let span = LineSpan::new(start_line, end_line.max(start_line)).map_err(ErrorEnvelope::from)?;

    let language = ChunkMetadata::from_json_str(&document.metadata)
        .map(|metadata| metadata.language)
        .unwrap_or_else(|_| {
            Language::from_extension(&file_extension_of(&document.relative_path))
        });

    Ok(SearchResult {
        id: document.id,
        content,
        relative_path: document.relative_path,
        span,
        file_extension: document.file_extension,
        language,
        score: hit.score,
    })
}

fn extension_filter_expr(extensions: &[Box<str>]) -> Box<str> {
    let joined = extensions
        .iter()
        .map(|extension| format!("\"{}\"", extension.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(", ");
    format!("fileExtension in [{joined}]").into_boxed_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        CountingEmbedding, SpyVectorDb, TestFileSync, engine_deps, search_hit,
    };
    use codeatlas_adapters::ContentCipher;
    use codeatlas_ports::ContentCipherPort;
    use std::path::Path;
    use std::sync::Arc;

    fn search_input(root: &Path, query: &str, threshold: Option<f32>) -> SearchInput {
        SearchInput {
            codebase_root: root.to_path_buf(),
            query: query.into(),
            options: SearchOptions {
                top_k: 10,
                threshold,
                extension_filter: None,
            },
        }
    }

    #[tokio::test]
    async fn threshold_filters_and_orders_results() -> Result<()> {
        let vectordb = Arc::new(SpyVectorDb::new());
        vectordb.set_search_results(vec![
            search_hit("chunk_1", "a", "a.py", 0.9),
            search_hit("chunk_2", "b", "b.py", 0.6),
            search_hit("chunk_3", "c", "c.py", 0.2),
        ]);
        let deps = engine_deps(
            Arc::new(CountingEmbedding::new(3)),
            vectordb,
            Arc::new(TestFileSync::default()),
            None,
        );

        let ctx = RequestContext::new_request();
        let results = semantic_search(
            &ctx,
            &deps,
            search_input(Path::new("/repo"), "find the thing", Some(0.5)),
        )
        .await?;

        let scores: Vec<f32> = results.iter().map(|result| result.score).collect();
        assert_eq!(scores, vec![0.9, 0.6]);
        assert_eq!(results[0].language, Language::Python);
        Ok(())
    }

    #[tokio::test]
    async fn encrypted_content_is_decrypted() -> Result<()> {
        let cipher = Arc::new(ContentCipher::new("test secret")?);
        let stored = ContentCipherPort::encrypt(cipher.as_ref(), "def f():\n    return 1\n")?;

        let vectordb = Arc::new(SpyVectorDb::new());
        vectordb.set_search_results(vec![search_hit("chunk_1", &stored, "a.py", 0.8)]);
        let deps = engine_deps(
            Arc::new(CountingEmbedding::new(3)),
            vectordb,
            Arc::new(TestFileSync::default()),
            Some(cipher),
        );

        let ctx = RequestContext::new_request();
        let results =
            semantic_search(&ctx, &deps, search_input(Path::new("/repo"), "f", None)).await?;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content.as_ref(), "def f():\n    return 1\n");
        Ok(())
    }

    #[tokio::test]
    async fn empty_query_is_invalid_input() {
        let deps = engine_deps(
            Arc::new(CountingEmbedding::new(3)),
            Arc::new(SpyVectorDb::new()),
            Arc::new(TestFileSync::default()),
            None,
        );
        let ctx = RequestContext::new_request();
        let result =
            semantic_search(&ctx, &deps, search_input(Path::new("/repo"), "  ", None)).await;
        assert!(matches!(result, Err(error) if error.code == ErrorCode::invalid_input()));
    }

    #[test]
    fn extension_filter_expression_shape() {
        let expr = extension_filter_expr(&[Box::from(".ts"), Box::from(".rs")]);
        assert_eq!(expr.as_ref(), "fileExtension in [\".ts\", \".rs\"]");
    }
}
