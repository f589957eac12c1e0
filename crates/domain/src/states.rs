//! Indexing state machine for a codebase root.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-wide indexing state for one codebase root.
///
/// Exactly one state exists per root. Legal transitions:
/// `Idle -> Indexing` on start, `Indexing -> Indexed` on success,
/// `Indexing -> Idle` on failure or cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexingState {
    /// No index operation in progress and no completed index recorded.
    #[default]
    Idle,
    /// An index or sync run currently owns the root.
    Indexing,
    /// The last index run completed successfully.
    Indexed,
}

impl IndexingState {
    /// Returns true when `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Indexed, Self::Indexing)
                | (Self::Indexing, Self::Indexed | Self::Idle)
        )
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Indexing => "indexing",
            Self::Indexed => "indexed",
        }
    }
}

impl fmt::Display for IndexingState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_contract() {
        assert!(IndexingState::Idle.can_transition(IndexingState::Indexing));
        assert!(IndexingState::Indexed.can_transition(IndexingState::Indexing));
        assert!(IndexingState::Indexing.can_transition(IndexingState::Indexed));
        assert!(IndexingState::Indexing.can_transition(IndexingState::Idle));

        assert!(!IndexingState::Idle.can_transition(IndexingState::Indexed));
        assert!(!IndexingState::Indexed.can_transition(IndexingState::Idle));
        assert!(!IndexingState::Indexing.can_transition(IndexingState::Indexing));
    }
}
