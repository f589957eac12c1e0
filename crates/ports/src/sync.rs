//! Snapshot / change detection boundary contract.

use crate::BoxFuture;
use codeatlas_shared::{RequestContext, Result};
use std::path::PathBuf;

/// Set of detected file changes, keyed by relative path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileChangeSet {
    /// Paths present now but not in the previous snapshot.
    pub added: Vec<Box<str>>,
    /// Paths present in the previous snapshot but gone now.
    pub removed: Vec<Box<str>>,
    /// Paths present in both whose hashes differ.
    pub modified: Vec<Box<str>>,
}

impl FileChangeSet {
    /// Returns true when no changes are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Total number of changed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// Options for snapshot initialization.
#[derive(Debug, Clone)]
pub struct SnapshotInitOptions {
    /// Absolute codebase root.
    pub codebase_root: PathBuf,
    /// Ignore patterns in effect at scan time.
    pub ignore_patterns: Vec<Box<str>>,
    /// Extension allowlist in effect at scan time.
    pub extensions: Option<Vec<Box<str>>>,
    /// Size cap applied by the scanner.
    pub max_file_size_bytes: u64,
}

/// Boundary contract for Merkle snapshot state.
///
/// `rescan` stages the new state in memory and returns the delta; nothing
/// touches disk until `persist`, so a failed delta application re-surfaces
/// the same diff on the next run.
pub trait FileSyncPort: Send + Sync {
    /// Load any persisted snapshot for the root into memory.
    ///
    /// A missing snapshot file is an empty previous state; a corrupt one is
    /// renamed aside with a `.bak` suffix and treated as missing.
    fn load(&self, ctx: &RequestContext, options: SnapshotInitOptions)
    -> BoxFuture<'_, Result<()>>;

    /// Rescan the filesystem, stage the new state, and return the delta
    /// against the previously loaded state.
    fn rescan(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<FileChangeSet>>;

    /// Recompute hashes for the given paths only and restage the root.
    fn update_paths(
        &self,
        ctx: &RequestContext,
        relative_paths: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Atomically persist the staged snapshot to disk.
    fn persist(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>>;

    /// Remove any persisted snapshot for the root.
    fn delete_snapshot(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>>;

    /// Current staged Merkle root (hex), if any state is loaded.
    fn merkle_root(&self) -> BoxFuture<'_, Result<Option<Box<str>>>>;
}
