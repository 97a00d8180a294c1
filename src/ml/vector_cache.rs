use crate::error::{ApiError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

/// Number of synopsis characters that feed the cache key digest.
const KEY_SYNOPSIS_PREFIX_CHARS: usize = 100;

/// Deterministic cache key for a book's embeddable text.
///
/// Two records sharing (title, author, synopsis prefix) share one cache
/// entry. That collapses re-imported duplicates onto a single vector, which
/// is intentional; it also means near-duplicate entries with different ids
/// are not differentiated. Callers that need per-id vectors use the book
/// store's mirror table instead.
pub fn cache_key(title: &str, author: &str, synopsis: &str) -> String {
    let prefix: String = synopsis.chars().take(KEY_SYNOPSIS_PREFIX_CHARS).collect();
    let digest = Sha256::digest(prefix.as_bytes());
    let short: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("{}|{}|{}", title, author, short)
}

/// Durable key -> embedding store with an in-memory mirror.
///
/// No eviction: the map grows with every distinct (title, author,
/// synopsis-prefix) combination seen. For the catalog sizes this serves
/// (hundreds to low thousands of books) that is an accepted trade-off.
pub struct VectorCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, Vec<f32>>>,
}

impl VectorCache {
    /// Open the cache at `path`, restoring any persisted entries. A missing
    /// or corrupt file is never fatal: the cache starts empty and the
    /// condition is logged.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match Self::read_entries(&path) {
            Ok(entries) => {
                info!(
                    "Loaded embeddings cache with {} entries from {}",
                    entries.len(),
                    path.display()
                );
                entries
            }
            Err(ApiError::NotFound(_)) => {
                info!(
                    "No embeddings cache at {}, starting empty",
                    path.display()
                );
                HashMap::new()
            }
            Err(e) => {
                warn!(
                    "Embeddings cache at {} unreadable ({}), starting empty",
                    path.display(),
                    e
                );
                HashMap::new()
            }
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    fn read_entries(path: &Path) -> Result<HashMap<String, Vec<f32>>> {
        if !path.exists() {
            return Err(ApiError::NotFound(format!(
                "cache file {}",
                path.display()
            )));
        }
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::CacheCorrupt(e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.entries
            .read()
            .ok()
            .and_then(|map| map.get(key).cloned())
    }

    pub fn put(&self, key: String, embedding: Vec<f32>) {
        if let Ok(mut map) = self.entries.write() {
            map.insert(key, embedding);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the full in-memory map to disk.
    pub fn persist(&self) -> Result<()> {
        let snapshot = self
            .entries
            .read()
            .map_err(|_| ApiError::InternalError("vector cache lock poisoned".to_string()))?
            .clone();

        let bytes = serde_json::to_vec(&snapshot)?;
        std::fs::write(&self.path, bytes)?;
        info!(
            "Saved embeddings cache with {} entries to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_deterministic_and_prefix_sensitive() {
        let a = cache_key("Dune", "Frank Herbert", "A desert planet");
        let b = cache_key("Dune", "Frank Herbert", "A desert planet");
        assert_eq!(a, b);

        let c = cache_key("Dune", "Frank Herbert", "Something else entirely");
        assert_ne!(a, c);

        // Only the first 100 characters of the synopsis participate.
        let long = "x".repeat(100);
        let d = cache_key("T", "A", &long);
        let e = cache_key("T", "A", &format!("{}trailing difference", long));
        assert_eq!(d, e);
    }

    #[test]
    fn get_put_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VectorCache::load(dir.path().join("cache.json"));

        assert!(cache.get("k").is_none());
        cache.put("k".to_string(), vec![1.0, 2.0, 3.0]);
        assert_eq!(cache.get("k"), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn persist_then_reload_yields_identical_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = VectorCache::load(&path);
        cache.put("a".to_string(), vec![0.25, -1.5]);
        cache.put("b".to_string(), vec![0.0; 4]);
        cache.persist().unwrap();

        let reloaded = VectorCache::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("a"), Some(vec![0.25, -1.5]));
        assert_eq!(reloaded.get("b"), Some(vec![0.0; 4]));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"not json at all {{{").unwrap();

        let cache = VectorCache::load(&path);
        assert!(cache.is_empty());

        // And the cache is usable afterwards.
        cache.put("k".to_string(), vec![1.0]);
        cache.persist().unwrap();
        assert_eq!(VectorCache::load(&path).get("k"), Some(vec![1.0]));
    }
}
