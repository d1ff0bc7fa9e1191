//! In-process embedding cache

use dashmap::DashMap;

use super::{CacheKey, EmbeddingCache};
use crate::error::CacheError;

/// DashMap-backed cache, lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryEmbeddingCache {
    entries: DashMap<CacheKey, Vec<f32>>,
}

impl MemoryEmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl EmbeddingCache for MemoryEmbeddingCache {
    fn get(&self, chunk_id: &str, content_hash: &str) -> Option<Vec<f32>> {
        self.entries
            .get(&CacheKey::new(chunk_id, content_hash))
            .map(|v| v.clone())
    }

    fn put(&self, vector: &[f32], chunk_id: &str, content_hash: &str) -> Result<(), CacheError> {
        self.entries
            .insert(CacheKey::new(chunk_id, content_hash), vector.to_vec());
        Ok(())
    }
}
