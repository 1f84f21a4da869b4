use sha2::{Digest, Sha256};

/// Cache key of a source line.
pub fn hash_source(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}
