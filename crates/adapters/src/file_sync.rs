//! Merkle snapshot store backed by the local filesystem.

use codeatlas_ports::{
    BoxFuture, FileChangeSet, FileScanPort, FileSyncPort, ScanRequest, SnapshotInitOptions,
};
use codeatlas_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, compute_merkle_root};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

const SNAPSHOT_FILE_EXT: &str = "json";

type FileHashMap = BTreeMap<Box<str>, Box<str>>;

/// Merkle snapshot store for one codebase root.
///
/// `rescan` stages new state in memory; only `persist` touches disk, via a
/// `.tmp` write and atomic rename.
#[derive(Clone)]
pub struct MerkleFileSync {
    codebase_root: PathBuf,
    state_dir: PathBuf,
    scanner: Arc<dyn FileScanPort>,
    state: Arc<RwLock<SyncState>>,
}

#[derive(Debug, Clone, Default)]
struct SyncState {
    ignore_patterns: Vec<Box<str>>,
    extensions: Option<Vec<Box<str>>>,
    max_file_size_bytes: u64,
    file_hashes: FileHashMap,
    merkle_root: Option<Box<str>>,
    created_at_ms: Option<u64>,
}

/// Persisted snapshot shape; one file per codebase under the state dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    root: Box<str>,
    created_at: u64,
    updated_at: u64,
    ignore_patterns: Vec<Box<str>>,
    file_hashes: BTreeMap<Box<str>, Box<str>>,
    merkle_root: Box<str>,
}

impl MerkleFileSync {
    /// Create a snapshot store scoped to a codebase root.
    #[must_use]
    pub fn new(codebase_root: PathBuf, state_dir: PathBuf, scanner: Arc<dyn FileScanPort>) -> Self {
        Self {
            codebase_root,
            state_dir,
            scanner,
            state: Arc::new(RwLock::new(SyncState::default())),
        }
    }

    /// Path of the persisted snapshot for this root.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        let normalized = normalize_root_path(&self.codebase_root);
        let digest = md5::compute(normalized.to_string_lossy().as_bytes());
        self.state_dir
            .join(format!("{digest:x}.{SNAPSHOT_FILE_EXT}"))
    }

    async fn load_inner(&self, ctx: &RequestContext, options: SnapshotInitOptions) -> Result<()> {
        ctx.ensure_not_cancelled("file_sync.load")?;
        ensure_root_matches(&self.codebase_root, &options.codebase_root)?;

        let snapshot = self.read_snapshot_file().await?;
        let mut state = self.state.write().await;
        state.ignore_patterns = options.ignore_patterns;
        state.extensions = options.extensions;
        state.max_file_size_bytes = options.max_file_size_bytes;

        match snapshot {
            Some(snapshot) => {
                // The root is a pure function of the hashes; recompute rather
                // than trusting the stored value.
                let root = compute_merkle_root(&snapshot.file_hashes);
                state.created_at_ms = Some(snapshot.created_at);
                state.file_hashes = snapshot.file_hashes;
                state.merkle_root = Some(root.into_boxed_str());
            },
            None => {
                state.created_at_ms = None;
                state.file_hashes = FileHashMap::new();
                state.merkle_root = None;
            },
        }
        Ok(())
    }

    async fn read_snapshot_file(&self) -> Result<Option<SnapshotFile>> {
        let path = self.snapshot_path();
        let payload = match tokio::fs::read(&path).await {
            Ok(payload) => payload,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(ErrorEnvelope::from(error)),
        };

        match serde_json::from_slice::<SnapshotFile>(&payload) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(error) => {
                // Quarantine the torn file and fall back to a full rescan.
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "malformed snapshot, renaming aside"
                );
                let backup = path.with_extension(format!("{SNAPSHOT_FILE_EXT}.bak"));
                if let Err(rename_error) = tokio::fs::rename(&path, &backup).await {
                    tracing::warn!(%rename_error, "failed to quarantine snapshot");
                }
                Ok(None)
            },
        }
    }

    async fn rescan_inner(&self, ctx: &RequestContext) -> Result<FileChangeSet> {
        ctx.ensure_not_cancelled("file_sync.rescan")?;

        let (ignore_patterns, extensions, max_file_size_bytes, previous_hashes, previous_root) = {
            let state = self.state.read().await;
            (
                state.ignore_patterns.clone(),
                state.extensions.clone(),
                state.max_file_size_bytes,
                state.file_hashes.clone(),
                state.merkle_root.clone(),
            )
        };

        let files = self
            .scanner
            .scan(
                ctx,
                ScanRequest {
                    codebase_root: self.codebase_root.clone(),
                    extensions,
                    ignore_patterns,
                    max_file_size_bytes,
                },
            )
            .await?;

        let mut new_hashes = FileHashMap::new();
        for file in files {
            ctx.ensure_not_cancelled("file_sync.hash")?;
            let hash = self.hash_file(&file.relative_path).await?;
            new_hashes.insert(file.relative_path, hash.into_boxed_str());
        }

        let new_root = compute_merkle_root(&new_hashes);
        let changes = if previous_root.as_deref() == Some(new_root.as_str()) {
            FileChangeSet::default()
        } else {
            diff_file_hashes(&previous_hashes, &new_hashes)
        };

        let mut state = self.state.write().await;
        state.file_hashes = new_hashes;
        state.merkle_root = Some(new_root.into_boxed_str());
        drop(state);

        Ok(changes)
    }

    async fn update_paths_inner(
        &self,
        ctx: &RequestContext,
        relative_paths: Vec<Box<str>>,
    ) -> Result<()> {
        ctx.ensure_not_cancelled("file_sync.update_paths")?;

        let mut updates: Vec<(Box<str>, Option<Box<str>>)> = Vec::with_capacity(relative_paths.len());
        for path in relative_paths {
            let full_path = self.full_path_for(&path);
            match tokio::fs::read(&full_path).await {
                Ok(bytes) => updates.push((path, Some(hash_bytes(&bytes).into_boxed_str()))),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    updates.push((path, None));
                },
                Err(error) => return Err(ErrorEnvelope::from(error)),
            }
        }

        let mut state = self.state.write().await;
        for (path, hash) in updates {
            match hash {
                Some(hash) => {
                    state.file_hashes.insert(path, hash);
                },
                None => {
                    state.file_hashes.remove(&path);
                },
            }
        }
        let root = compute_merkle_root(&state.file_hashes);
        state.merkle_root = Some(root.into_boxed_str());
        Ok(())
    }

    async fn persist_inner(&self, ctx: &RequestContext) -> Result<()> {
        ctx.ensure_not_cancelled("file_sync.persist")?;

        let snapshot = {
            let mut state = self.state.write().await;
            let now = unix_millis();
            let created_at = *state.created_at_ms.get_or_insert(now);
            SnapshotFile {
                root: normalize_root_path(&self.codebase_root)
                    .to_string_lossy()
                    .into_owned()
                    .into_boxed_str(),
                created_at,
                updated_at: now,
                ignore_patterns: state.ignore_patterns.clone(),
                file_hashes: state.file_hashes.clone(),
                merkle_root: state
                    .merkle_root
                    .clone()
                    .unwrap_or_else(|| compute_merkle_root(&state.file_hashes).into_boxed_str()),
            }
        };

        let path = self.snapshot_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ErrorEnvelope::from)?;
        }
        let payload = serde_json::to_vec_pretty(&snapshot).map_err(|error| {
            ErrorEnvelope::invariant(
                ErrorCode::new("sync", "snapshot_encode_failed"),
                format!("failed to encode snapshot: {error}"),
            )
        })?;

        // Append-and-replace: write to a sibling then atomically rename.
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, payload)
            .await
            .map_err(ErrorEnvelope::from)?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(ErrorEnvelope::from)?;
        Ok(())
    }

    async fn delete_snapshot_inner(&self, ctx: &RequestContext) -> Result<()> {
        ctx.ensure_not_cancelled("file_sync.delete_snapshot")?;
        let path = self.snapshot_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {},
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {},
            Err(error) => return Err(ErrorEnvelope::from(error)),
        }

        let mut state = self.state.write().await;
        *state = SyncState::default();
        Ok(())
    }

    async fn hash_file(&self, relative_path: &str) -> Result<String> {
        let bytes = tokio::fs::read(self.full_path_for(relative_path))
            .await
            .map_err(ErrorEnvelope::from)?;
        Ok(hash_bytes(&bytes))
    }

    fn full_path_for(&self, relative_path: &str) -> PathBuf {
        self.codebase_root
            .join(relative_path.replace('/', std::path::MAIN_SEPARATOR_STR))
    }
}

impl FileSyncPort for MerkleFileSync {
    fn load(
        &self,
        ctx: &RequestContext,
        options: SnapshotInitOptions,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let sync = self.clone();
        Box::pin(async move { sync.load_inner(&ctx, options).await })
    }

    fn rescan(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<FileChangeSet>> {
        let ctx = ctx.clone();
        let sync = self.clone();
        Box::pin(async move { sync.rescan_inner(&ctx).await })
    }

    fn update_paths(
        &self,
        ctx: &RequestContext,
        relative_paths: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let sync = self.clone();
        Box::pin(async move { sync.update_paths_inner(&ctx, relative_paths).await })
    }

    fn persist(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let sync = self.clone();
        Box::pin(async move { sync.persist_inner(&ctx).await })
    }

    fn delete_snapshot(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let sync = self.clone();
        Box::pin(async move { sync.delete_snapshot_inner(&ctx).await })
    }

    fn merkle_root(&self) -> BoxFuture<'_, Result<Option<Box<str>>>> {
        let sync = self.clone();
        Box::pin(async move {
            let state = sync.state.read().await;
            Ok(state.merkle_root.clone())
        })
    }
}

fn diff_file_hashes(old: &FileHashMap, new: &FileHashMap) -> FileChangeSet {
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut modified = Vec::new();

    for (path, hash) in new {
        match old.get(path) {
            None => added.push(path.clone()),
            Some(previous) => {
                if previous != hash {
                    modified.push(path.clone());
                }
            },
        }
    }
    for path in old.keys() {
        if !new.contains_key(path) {
            removed.push(path.clone());
        }
    }

    FileChangeSet {
        added,
        removed,
        modified,
    }
}

fn ensure_root_matches(expected: &Path, provided: &Path) -> Result<()> {
    let expected = normalize_root_path(expected);
    let provided = normalize_root_path(provided);
    if expected != provided {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            "codebase root mismatch",
        )
        .with_metadata("expected", expected.to_string_lossy().to_string())
        .with_metadata("provided", provided.to_string_lossy().to_string()));
    }
    Ok(())
}

fn normalize_root_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").unwrap();
    }
    out
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::GlobIgnoreMatcher;
    use crate::scanner::FsScanner;
    use tempfile::TempDir;

    fn new_sync(root: &Path, state_dir: &Path) -> MerkleFileSync {
        let scanner = Arc::new(FsScanner::new(Arc::new(GlobIgnoreMatcher::new())));
        MerkleFileSync::new(root.to_path_buf(), state_dir.to_path_buf(), scanner)
    }

    fn init_options(root: &Path) -> SnapshotInitOptions {
        SnapshotInitOptions {
            codebase_root: root.to_path_buf(),
            ignore_patterns: vec![".git/".into()],
            extensions: Some(vec![".py".into()]),
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
    async fn missing_snapshot_reports_everything_added() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        let state = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(repo.path(), "a.py", "def f():\n    return 1\n").await;
        write_file(repo.path(), "b.py", "").await;

        let sync = new_sync(repo.path(), state.path());
        let ctx = RequestContext::new_request();
        sync.load(&ctx, init_options(repo.path())).await?;
        let changes = sync.rescan(&ctx).await?;

        let mut added: Vec<&str> = changes.added.iter().map(AsRef::as_ref).collect();
        added.sort_unstable();
        assert_eq!(added, vec!["a.py", "b.py"]);
        assert!(changes.removed.is_empty());
        assert!(changes.modified.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn rescan_after_persist_is_a_noop() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        let state = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(repo.path(), "a.py", "def f():\n    return 1\n").await;

        let ctx = RequestContext::new_request();
        {
            let sync = new_sync(repo.path(), state.path());
            sync.load(&ctx, init_options(repo.path())).await?;
            let first = sync.rescan(&ctx).await?;
            assert_eq!(first.added.len(), 1);
            sync.persist(&ctx).await?;
        }

        // Fresh store, same snapshot file on disk.
        let sync = new_sync(repo.path(), state.path());
        sync.load(&ctx, init_options(repo.path())).await?;
        let second = sync.rescan(&ctx).await?;
        assert!(second.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn modified_and_removed_files_are_detected() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        let state = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(repo.path(), "a.py", "def f():\n    return 1\n").await;
        write_file(repo.path(), "b.py", "x = 1\n").await;

        let ctx = RequestContext::new_request();
        let sync = new_sync(repo.path(), state.path());
        sync.load(&ctx, init_options(repo.path())).await?;
        sync.rescan(&ctx).await?;
        let root_before = sync.merkle_root().await?;
        sync.persist(&ctx).await?;

        write_file(repo.path(), "a.py", "def f():\n    return 2\n").await;
        tokio::fs::remove_file(repo.path().join("b.py"))
            .await
            .map_err(ErrorEnvelope::from)?;

        let changes = sync.rescan(&ctx).await?;
        assert_eq!(changes.modified, vec![Box::from("a.py")]);
        assert_eq!(changes.removed, vec![Box::from("b.py")]);
        assert!(changes.added.is_empty());
        assert_ne!(sync.merkle_root().await?, root_before);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_quarantined() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        let state = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(repo.path(), "a.py", "x = 1\n").await;

        let sync = new_sync(repo.path(), state.path());
        let snapshot_path = sync.snapshot_path();
        tokio::fs::create_dir_all(state.path())
            .await
            .map_err(ErrorEnvelope::from)?;
        tokio::fs::write(&snapshot_path, b"{ not json")
            .await
            .map_err(ErrorEnvelope::from)?;

        let ctx = RequestContext::new_request();
        sync.load(&ctx, init_options(repo.path())).await?;
        let changes = sync.rescan(&ctx).await?;
        assert_eq!(changes.added.len(), 1);

        let backup = snapshot_path.with_extension("json.bak");
        assert!(tokio::fs::metadata(&backup).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_file_has_the_persisted_shape() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        let state = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(repo.path(), "a.py", "x = 1\n").await;

        let ctx = RequestContext::new_request();
        let sync = new_sync(repo.path(), state.path());
        sync.load(&ctx, init_options(repo.path())).await?;
        sync.rescan(&ctx).await?;
        sync.persist(&ctx).await?;

        let payload = tokio::fs::read(sync.snapshot_path())
            .await
            .map_err(ErrorEnvelope::from)?;
        let value: serde_json::Value = serde_json::from_slice(&payload)
            .map_err(|error| ErrorEnvelope::expected(ErrorCode::invalid_input(), error.to_string()))?;

        for key in ["root", "createdAt", "updatedAt", "ignorePatterns", "fileHashes", "merkleRoot"] {
            assert!(value.get(key).is_some(), "missing key: {key}");
        }
        assert!(value["fileHashes"].get("a.py").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn update_paths_rehashes_and_removes() -> Result<()> {
        let repo = TempDir::new().map_err(ErrorEnvelope::from)?;
        let state = TempDir::new().map_err(ErrorEnvelope::from)?;
        write_file(repo.path(), "a.py", "x = 1\n").await;
        write_file(repo.path(), "b.py", "y = 2\n").await;

        let ctx = RequestContext::new_request();
        let sync = new_sync(repo.path(), state.path());
        sync.load(&ctx, init_options(repo.path())).await?;
        sync.rescan(&ctx).await?;
        let root_before = sync.merkle_root().await?;

        write_file(repo.path(), "a.py", "x = 99\n").await;
        tokio::fs::remove_file(repo.path().join("b.py"))
            .await
            .map_err(ErrorEnvelope::from)?;
        sync.update_paths(&ctx, vec!["a.py".into(), "b.py".into()])
            .await?;

        assert_ne!(sync.merkle_root().await?, root_before);
        let follow_up = sync.rescan(&ctx).await?;
        assert!(follow_up.is_empty(), "update_paths should match a rescan");
        Ok(())
    }
}
