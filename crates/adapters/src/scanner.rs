//! Filesystem scanner adapter.

use codeatlas_ports::{
    BoxFuture, FileScanPort, IgnoreMatchInput, IgnorePort, ScanRequest, ScannedFile,
};
use codeatlas_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scanner over the local filesystem.
///
/// Traversal is breadth-first with entries sorted per directory, and the
/// final file list is sorted by relative path, so scan order is
/// deterministic for a given tree.
#[derive(Clone)]
pub struct FsScanner {
    ignore: Arc<dyn IgnorePort>,
}

impl FsScanner {
    /// Build a scanner with the given ignore matcher.
    #[must_use]
    pub fn new(ignore: Arc<dyn IgnorePort>) -> Self {
        Self { ignore }
    }

    async fn scan_inner(&self, ctx: &RequestContext, request: ScanRequest) -> Result<Vec<ScannedFile>> {
        let root_metadata = tokio::fs::metadata(&request.codebase_root)
            .await
            .map_err(|error| {
                ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    format!(
                        "codebase root is not readable: {}: {error}",
                        request.codebase_root.display()
                    ),
                )
            })?;
        if !root_metadata.is_dir() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                format!(
                    "codebase root is not a directory: {}",
                    request.codebase_root.display()
                ),
            ));
        }

        let extensions = request.extensions.clone().unwrap_or_default();
        let mut files = Vec::new();
        let mut pending = VecDeque::new();
        pending.push_back(request.codebase_root.clone());

        while let Some(current) = pending.pop_front() {
            ctx.ensure_not_cancelled("scanner.scan")?;

            let mut entries = match tokio::fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(error) => {
                    // Unreadable directories are skipped, not fatal.
                    tracing::warn!(
                        dir = %current.display(),
                        %error,
                        "skipping unreadable directory"
                    );
                    continue;
                },
            };

            let mut collected = Vec::new();
            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => collected.push(entry),
                    Ok(None) => break,
                    Err(error) => {
                        tracing::warn!(
                            dir = %current.display(),
                            %error,
                            "skipping unreadable directory entry"
                        );
                        break;
                    },
                }
            }
            collected.sort_by_key(tokio::fs::DirEntry::file_name);

            for entry in collected {
                let path = entry.path();
                let Some(relative) = relative_path_for(&request.codebase_root, &path) else {
                    continue;
                };

                if self.ignore.is_ignored(&IgnoreMatchInput {
                    ignore_patterns: request.ignore_patterns.clone(),
                    relative_path: relative.clone().into_boxed_str(),
                }) {
                    continue;
                }

                let metadata = match entry.metadata().await {
                    Ok(metadata) => metadata,
                    Err(error) => {
                        tracing::warn!(path = %path.display(), %error, "skipping unreadable entry");
                        continue;
                    },
                };

                if metadata.is_dir() {
                    pending.push_back(path);
                    continue;
                }
                if !metadata.is_file() {
                    continue;
                }
                if !extension_allowed(&relative, &extensions) {
                    continue;
                }
                if metadata.len() > request.max_file_size_bytes {
                    tracing::warn!(
                        path = %relative,
                        size_bytes = metadata.len(),
                        cap_bytes = request.max_file_size_bytes,
                        "skipping oversized file"
                    );
                    continue;
                }

                files.push(ScannedFile {
                    relative_path: relative.into_boxed_str(),
                    size_bytes: metadata.len(),
                });
            }
        }

        files.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
        Ok(files)
    }
}

impl FileScanPort for FsScanner {
    fn scan(
        &self,
        ctx: &RequestContext,
        request: ScanRequest,
    ) -> BoxFuture<'_, Result<Vec<ScannedFile>>> {
        let ctx = ctx.clone();
        let scanner = self.clone();
        Box::pin(async move { scanner.scan_inner(&ctx, request).await })
    }

    fn read_file_text(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
        relative_path: Box<str>,
    ) -> BoxFuture<'_, Result<Box<str>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("scanner.read_file_text")?;
            let full_path = codebase_root.join(relative_path.replace('/', std::path::MAIN_SEPARATOR_STR));
            let bytes = tokio::fs::read(&full_path).await.map_err(ErrorEnvelope::from)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned().into_boxed_str())
        })
    }
}

/// Path relative to the root, forward-slash normalized; conversion from the
/// platform separator happens only here, at the filesystem boundary.
fn relative_path_for(root: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(root).ok()?;
    let raw = stripped.to_string_lossy();
    let normalized = raw.replace('\\', "/");
    let normalized = normalized.trim_start_matches("./").trim_start_matches('/');
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_owned())
    }
}

fn extension_allowed(relative_path: &str, extensions: &[Box<str>]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let extension = codeatlas_domain::file_extension_of(relative_path);
    if extension.is_empty() {
        return false;
    }
    extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::GlobIgnoreMatcher;
    use tempfile::TempDir;

    fn scan_request(root: &Path) -> ScanRequest {
        ScanRequest {
            codebase_root: root.to_path_buf(),
            extensions: Some(vec![".rs".into(), ".py".into()]),
            ignore_patterns: vec!["target/".into(), "*.min.js".into()],
            max_file_size_bytes: 1_048_576,
        }
    }

    async fn write_file(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.expect("create dirs");
        }
        tokio::fs::write(path, content).await.expect("write file");
    }

    #[tokio::test]
    async fn scan_filters_and_sorts() -> Result<()> {
        let dir = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(dir.path(), "src/b.rs", "fn b() {}").await;
        write_file(dir.path(), "src/a.rs", "fn a() {}").await;
        write_file(dir.path(), "src/notes.txt", "skip me").await;
        write_file(dir.path(), "target/gen.rs", "fn gen() {}").await;
        write_file(dir.path(), "lib.min.js", "x").await;

        let scanner = FsScanner::new(Arc::new(GlobIgnoreMatcher::new()));
        let ctx = RequestContext::new_request();
        let files = scanner.scan(&ctx, scan_request(dir.path())).await?;

        let paths: Vec<&str> = files.iter().map(|file| file.relative_path.as_ref()).collect();
        assert_eq!(paths, vec!["src/a.rs", "src/b.rs"]);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_files_are_skipped() -> Result<()> {
        let dir = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(dir.path(), "big.rs", &"x".repeat(64)).await;
        write_file(dir.path(), "small.rs", "fn s() {}").await;

        let scanner = FsScanner::new(Arc::new(GlobIgnoreMatcher::new()));
        let ctx = RequestContext::new_request();
        let mut request = scan_request(dir.path());
        request.max_file_size_bytes = 32;

        let files = scanner.scan(&ctx, request).await?;
        let paths: Vec<&str> = files.iter().map(|file| file.relative_path.as_ref()).collect();
        assert_eq!(paths, vec!["small.rs"]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_root_is_invalid_input() {
        let scanner = FsScanner::new(Arc::new(GlobIgnoreMatcher::new()));
        let ctx = RequestContext::new_request();
        let request = scan_request(Path::new("/definitely/not/here"));
        let result = scanner.scan(&ctx, request).await;
        assert!(matches!(result, Err(error) if error.code == ErrorCode::invalid_input()));
    }

    #[tokio::test]
    async fn read_file_text_round_trips() -> Result<()> {
        let dir = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(dir.path(), "src/a.rs", "fn a() {}\n").await;

        let scanner = FsScanner::new(Arc::new(GlobIgnoreMatcher::new()));
        let ctx = RequestContext::new_request();
        let text = scanner
            .read_file_text(&ctx, dir.path().to_path_buf(), "src/a.rs".into())
            .await?;
        assert_eq!(text.as_ref(), "fn a() {}\n");
        Ok(())
    }
}
