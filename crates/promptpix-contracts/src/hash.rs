use sha2::{Digest, Sha256};

/// Hex SHA-256 of `input`. Cache keys are built on this, so the output format
/// must never change.
pub fn content_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
