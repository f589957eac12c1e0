//! Process-wide indexing state registry.

use codeatlas_domain::IndexingState;
use codeatlas_shared::{ErrorCode, ErrorEnvelope, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Process-wide `codebase root -> IndexingState` mapping.
///
/// Exactly one state exists per root; one instance of this registry exists
/// per process, guarded by a single lock. Index and sync runs are mutually
/// exclusive per root through `begin_indexing`.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    states: Mutex<HashMap<PathBuf, IndexingState>>,
}

impl IndexRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a root for indexing; fails when a run already owns it.
    pub fn begin_indexing(&self, root: &Path) -> Result<()> {
        let key = normalize(root);
        let mut states = self.lock()?;
        let current = states.get(&key).copied().unwrap_or_default();
        if !current.can_transition(IndexingState::Indexing) {
            return Err(ErrorEnvelope::expected(
                ErrorCode::already_indexing(),
                format!("codebase is already being indexed: {}", key.display()),
            ));
        }
        states.insert(key, IndexingState::Indexing);
        Ok(())
    }

    /// Record a successful run (`indexing -> indexed`).
    pub fn mark_indexed(&self, root: &Path) -> Result<()> {
        self.transition(root, IndexingState::Indexed)
    }

    /// Roll back to idle after a failure or cancellation.
    pub fn mark_idle(&self, root: &Path) -> Result<()> {
        self.transition(root, IndexingState::Idle)
    }

    /// Restore a previously observed state without transition checks; used
    /// when a claimed run turns out to be a no-op.
    pub fn restore(&self, root: &Path, state: IndexingState) -> Result<()> {
        let key = normalize(root);
        let mut states = self.lock()?;
        states.insert(key, state);
        Ok(())
    }

    /// Current state for a root (`idle` when never seen).
    pub fn state_of(&self, root: &Path) -> IndexingState {
        let key = normalize(root);
        self.lock()
            .ok()
            .and_then(|states| states.get(&key).copied())
            .unwrap_or_default()
    }

    /// Forget a root entirely (used by clear-index).
    pub fn forget(&self, root: &Path) -> Result<()> {
        let key = normalize(root);
        let mut states = self.lock()?;
        states.remove(&key);
        Ok(())
    }

    /// Snapshot of all known roots and their states.
    pub fn snapshot(&self) -> Vec<(PathBuf, IndexingState)> {
        self.lock()
            .map(|states| {
                let mut entries: Vec<_> = states
                    .iter()
                    .map(|(root, state)| (root.clone(), *state))
                    .collect();
                entries.sort_by(|left, right| left.0.cmp(&right.0));
                entries
            })
            .unwrap_or_default()
    }

    fn transition(&self, root: &Path, next: IndexingState) -> Result<()> {
        let key = normalize(root);
        let mut states = self.lock()?;
        let current = states.get(&key).copied().unwrap_or_default();
        if !current.can_transition(next) {
            return Err(ErrorEnvelope::invariant(
                ErrorCode::internal(),
                format!("invalid indexing state transition: {current} -> {next}"),
            ));
        }
        states.insert(key, next);
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<PathBuf, IndexingState>>> {
        self.states.lock().map_err(|_| {
            ErrorEnvelope::invariant(ErrorCode::internal(), "index registry lock poisoned")
        })
    }
}

fn normalize(root: &Path) -> PathBuf {
    std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_is_exclusive_per_root() -> Result<()> {
        let registry = IndexRegistry::new();
        let root = Path::new("/repo");

        registry.begin_indexing(root)?;
        let second = registry.begin_indexing(root);
        assert!(
            matches!(second, Err(error) if error.code == ErrorCode::already_indexing())
        );

        // A different root is unaffected.
        registry.begin_indexing(Path::new("/other"))?;
        Ok(())
    }

    #[test]
    fn success_and_failure_transitions() -> Result<()> {
        let registry = IndexRegistry::new();
        let root = Path::new("/repo");

        registry.begin_indexing(root)?;
        registry.mark_indexed(root)?;
        assert_eq!(registry.state_of(root), IndexingState::Indexed);

        registry.begin_indexing(root)?;
        registry.mark_idle(root)?;
        assert_eq!(registry.state_of(root), IndexingState::Idle);
        Ok(())
    }

    #[test]
    fn unknown_roots_read_as_idle() {
        let registry = IndexRegistry::new();
        assert_eq!(registry.state_of(Path::new("/nowhere")), IndexingState::Idle);
    }
}
