//! Embedding caches
//!
//! A cached vector is keyed by chunk identity plus the content hash of the
//! chunk's file, so edits to a file invalidate its entries implicitly.

mod memory;
mod rocks;

pub use memory::MemoryEmbeddingCache;
pub use rocks::RocksEmbeddingCache;

use crate::error::CacheError;

/// Separator between the key parts; cannot appear in paths or hex hashes
const KEY_SEPARATOR: char = '\u{1f}';

/// Cache key: (chunk id, file content hash)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub chunk_id: String,
    /// Empty when the file hash is unknown
    pub content_hash: String,
}

impl CacheKey {
    pub fn new(chunk_id: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            content_hash: content_hash.into(),
        }
    }

    /// Flat string form for string/byte keyed stores
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.chunk_id, KEY_SEPARATOR, self.content_hash)
    }
}

/// Persists single embedding vectors to skip recomputation
pub trait EmbeddingCache: Send + Sync {
    /// Look up a vector; misses (and unreadable entries) return `None`
    fn get(&self, chunk_id: &str, content_hash: &str) -> Option<Vec<f32>>;

    /// Store a vector
    fn put(&self, vector: &[f32], chunk_id: &str, content_hash: &str) -> Result<(), CacheError>;
}

/// Cache that never stores anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmbeddingCache;

impl EmbeddingCache for NoopEmbeddingCache {
    fn get(&self, _chunk_id: &str, _content_hash: &str) -> Option<Vec<f32>> {
        None
    }

    fn put(&self, _vector: &[f32], _chunk_id: &str, _content_hash: &str) -> Result<(), CacheError> {
        Ok(())
    }
}
