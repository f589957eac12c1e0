//! Content filter boundary contract.

use codeatlas_shared::Result;

/// Optional pass-through filter applied to chunk content before insert and
/// after retrieval.
pub trait ContentCipherPort: Send + Sync {
    /// Transform plaintext into the stored representation.
    fn encrypt(&self, plaintext: &str) -> Result<String>;

    /// Exact inverse of `encrypt`.
    fn decrypt(&self, payload: &str) -> Result<String>;
}
