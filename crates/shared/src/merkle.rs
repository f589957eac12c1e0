//! Binary Merkle tree over per-file content hashes.
//!
//! Leaves are `sha256(path \0 file_hash)` in byte-wise path order; a level
//! with odd cardinality duplicates its last node; `parent = sha256(left ||
//! right)` over the child hex digests. Equal roots imply an identical file
//! state, which lets diffing short-circuit without comparing maps.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Binary Merkle tree with its computed root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MerkleTree {
    root: String,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a tree from `relative_path -> content_hash` entries.
    ///
    /// The map's byte-wise key order fixes the traversal, so two processes
    /// scanning the same file set produce the same root on any platform.
    #[must_use]
    pub fn from_file_hashes(file_hashes: &BTreeMap<Box<str>, Box<str>>) -> Self {
        let leaves: Vec<String> = file_hashes
            .iter()
            .map(|(path, hash)| {
                let mut hasher = Sha256::new();
                hasher.update(path.as_bytes());
                hasher.update(b"\0");
                hasher.update(hash.as_bytes());
                to_hex(&hasher.finalize())
            })
            .collect();

        let leaf_count = leaves.len();
        Self {
            root: reduce_to_root(leaves),
            leaf_count,
        }
    }

    /// Return the root hash as lowercase hex.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Return the number of leaves the tree was built from.
    #[must_use]
    pub const fn leaf_count(&self) -> usize {
        self.leaf_count
    }
}

/// Compute the Merkle root for a file-hash map in one call.
#[must_use]
pub fn compute_merkle_root(file_hashes: &BTreeMap<Box<str>, Box<str>>) -> String {
    MerkleTree::from_file_hashes(file_hashes).root.clone()
}

fn reduce_to_root(mut level: Vec<String>) -> String {
    if level.is_empty() {
        return hash_bytes(b"");
    }

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            // Duplicate the last node so every parent has two children.
            if let Some(last) = level.last().cloned() {
                level.push(last);
            }
        }

        level = level
            .chunks(2)
            .map(|pair| {
                let mut hasher = Sha256::new();
                for node in pair {
                    hasher.update(node.as_bytes());
                }
                to_hex(&hasher.finalize())
            })
            .collect();
    }

    level.pop().unwrap_or_else(|| hash_bytes(b""))
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

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(entries: &[(&str, &str)]) -> BTreeMap<Box<str>, Box<str>> {
        entries
            .iter()
            .map(|(path, hash)| ((*path).into(), (*hash).into()))
            .collect()
    }

    #[test]
    fn root_is_deterministic_across_insert_order() {
        let forward = hashes(&[("a.rs", "h1"), ("b.rs", "h2"), ("c.rs", "h3")]);
        let mut reversed = BTreeMap::new();
        for (path, hash) in forward.iter().rev() {
            reversed.insert(path.clone(), hash.clone());
        }

        assert_eq!(compute_merkle_root(&forward), compute_merkle_root(&reversed));
    }

    #[test]
    fn root_changes_when_a_hash_changes() {
        let before = hashes(&[("a.rs", "h1"), ("b.rs", "h2")]);
        let after = hashes(&[("a.rs", "h1"), ("b.rs", "h2-modified")]);

        assert_ne!(compute_merkle_root(&before), compute_merkle_root(&after));
    }

    #[test]
    fn odd_leaf_count_duplicates_last_node() {
        let three = hashes(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let tree = MerkleTree::from_file_hashes(&three);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.root().len(), 64);
    }

    #[test]
    fn empty_map_has_stable_root() {
        let empty = BTreeMap::new();
        let first = compute_merkle_root(&empty);
        let second = compute_merkle_root(&empty);
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn single_leaf_root_is_the_leaf() {
        let one = hashes(&[("a.rs", "h1")]);
        let tree = MerkleTree::from_file_hashes(&one);

        let mut hasher = Sha256::new();
        hasher.update(b"a.rs");
        hasher.update(b"\0");
        hasher.update(b"h1");
        let leaf = to_hex(&hasher.finalize());
        assert_eq!(tree.root(), leaf);
    }
}
