//! Run-scoped duplicate detection.
//!
//! Exact-content matching over SHA-256 digests. The table lives for one
//! sorter run; cross-run duplicate detection is intentionally not provided.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// SHA-256 digest of a byte buffer as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// First sighting of a content hash within a run.
#[derive(Debug, Clone)]
pub struct SeenFile {
    pub file_id: String,
    pub name: String,
}

/// Content-hash table scoped to a single sorter run.
#[derive(Debug, Default)]
pub struct DedupTable {
    seen: HashMap<String, SeenFile>,
}

impl DedupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earlier file with the same digest, if any.
    pub fn seen(&self, digest: &str) -> Option<&SeenFile> {
        self.seen.get(digest)
    }

    /// Record the first file carrying a digest. Later records under the
    /// same digest are ignored; the first sighting stays the original.
    pub fn record(&mut self, digest: &str, file: SeenFile) {
        self.seen.entry(digest.to_string()).or_insert(file);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_digest() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_identical_content_same_digest() {
        assert_eq!(sha256_hex(b"manual"), sha256_hex(b"manual"));
        assert_ne!(sha256_hex(b"manual"), sha256_hex(b"Manual"));
    }

    #[test]
    fn test_first_sighting_wins() {
        let mut table = DedupTable::new();
        let digest = sha256_hex(b"content");

        assert!(table.seen(&digest).is_none());
        table.record(
            &digest,
            SeenFile {
                file_id: "a".to_string(),
                name: "a.pdf".to_string(),
            },
        );
        table.record(
            &digest,
            SeenFile {
                file_id: "b".to_string(),
                name: "b.pdf".to_string(),
            },
        );

        let original = table.seen(&digest).unwrap();
        assert_eq!(original.file_id, "a");
        assert_eq!(original.name, "a.pdf");
        assert_eq!(table.len(), 1);
    }
}
