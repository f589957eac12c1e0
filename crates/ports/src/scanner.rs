//! File scanner boundary contract.

use crate::BoxFuture;
use codeatlas_shared::{RequestContext, Result};
use std::path::PathBuf;

/// Input to a scan pass.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Absolute codebase root.
    pub codebase_root: PathBuf,
    /// Allowed extensions with leading dot, lowercased; `None` = defaults.
    pub extensions: Option<Vec<Box<str>>>,
    /// Ignore patterns merged with defaults by the adapter.
    pub ignore_patterns: Vec<Box<str>>,
    /// Skip files larger than this many bytes.
    pub max_file_size_bytes: u64,
}

/// One scanned candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path relative to the codebase root, forward-slash normalized.
    pub relative_path: Box<str>,
    /// File size in bytes at scan time.
    pub size_bytes: u64,
}

/// Boundary contract for directory traversal and filtering.
///
/// Results are sorted lexicographically by relative path, which fixes the
/// pipeline's file order.
pub trait FileScanPort: Send + Sync {
    /// Walk the root and return candidate files.
    fn scan(&self, ctx: &RequestContext, request: ScanRequest)
    -> BoxFuture<'_, Result<Vec<ScannedFile>>>;

    /// Read one candidate file as UTF-8 text.
    fn read_file_text(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
        relative_path: Box<str>,
    ) -> BoxFuture<'_, Result<Box<str>>>;
}
