//! File content fingerprints
//!
//! Hashes used as cache-key components and for staleness detection.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Hex SHA-256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash a file's current contents
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(content_hash(&bytes))
}

/// Build a file → hash table; unreadable files are logged and left out
///
/// Chunks of a file left out of the table are restored unchanged on load.
pub fn hash_files<I, P>(paths: I) -> HashMap<PathBuf, String>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut hashes = HashMap::new();
    for path in paths {
        let path = path.as_ref();
        match hash_file(path) {
            Ok(hash) => {
                hashes.insert(path.to_path_buf(), hash);
            }
            Err(e) => log::warn!("Cannot hash {}: {}", path.display(), e),
        }
    }
    hashes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_is_stable_hex() {
        let hash = content_hash(b"func a() {}");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, content_hash(b"func a() {}"));
        assert_ne!(hash, content_hash(b"func b() {}"));
    }

    #[test]
    fn test_hash_files_skips_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.swift");
        std::fs::write(&a, "struct A {}").unwrap();
        let missing = temp_dir.path().join("missing.swift");

        let hashes = hash_files([&a, &missing]);

        assert_eq!(hashes.len(), 1);
        assert_eq!(hashes[&a], content_hash(b"struct A {}"));
        assert_eq!(hash_file(&a).unwrap(), hashes[&a]);
    }
}
