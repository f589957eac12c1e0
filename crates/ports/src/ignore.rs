//! Ignore matcher boundary contract.

/// Input to ignore matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreMatchInput {
    /// Ignore patterns (gitignore-subset globs).
    pub ignore_patterns: Vec<Box<str>>,
    /// Candidate path relative to the codebase root, forward-slash
    /// normalized.
    pub relative_path: Box<str>,
}

/// Boundary contract for ignore matching.
pub trait IgnorePort: Send + Sync {
    /// Returns true when the path should be ignored.
    fn is_ignored(&self, input: &IgnoreMatchInput) -> bool;
}
