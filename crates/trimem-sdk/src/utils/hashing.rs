//! Episode text fingerprints.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of `text` with runs of whitespace collapsed and the
/// ends trimmed, so copies differing only in spacing share a fingerprint.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            hasher.update(b" ");
        }
        hasher.update(word.as_bytes());
    }
    hex::encode(hasher.finalize())
}
