//! RocksDB-backed embedding cache
//!
//! Survives restarts, so a full rebuild after a schema bump only embeds
//! chunks whose files actually changed.

use rocksdb::{Options, DB};
use std::path::Path;

use super::{CacheKey, EmbeddingCache};
use crate::error::CacheError;

const KEY_PREFIX: &str = "emb:";

/// Disk cache storing bincode-encoded vectors under `emb:<chunk id>␟<hash>`
pub struct RocksEmbeddingCache {
    db: DB,
}

impl RocksEmbeddingCache {
    /// Open (or create) a cache at the given directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_background_jobs(2);
        opts.set_bytes_per_sync(1048576); // 1MB
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        log::info!("Embedding cache opened at: {}", path.display());

        Ok(Self { db })
    }

    /// Approximate number of cached vectors
    pub fn estimated_len(&self) -> u64 {
        self.db
            .property_int_value("rocksdb.estimate-num-keys")
            .ok()
            .flatten()
            .unwrap_or(0)
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> Result<(), CacheError> {
        self.db.flush()?;
        Ok(())
    }

    fn db_key(chunk_id: &str, content_hash: &str) -> String {
        format!("{}{}", KEY_PREFIX, CacheKey::new(chunk_id, content_hash).encode())
    }
}

impl EmbeddingCache for RocksEmbeddingCache {
    fn get(&self, chunk_id: &str, content_hash: &str) -> Option<Vec<f32>> {
        let key = Self::db_key(chunk_id, content_hash);
        match self.db.get(key.as_bytes()) {
            Ok(Some(bytes)) => match bincode::deserialize::<Vec<f32>>(&bytes) {
                Ok(vector) => Some(vector),
                Err(e) => {
                    log::warn!("Unreadable cached embedding for {}: {}", chunk_id, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("Embedding cache read failed for {}: {}", chunk_id, e);
                None
            }
        }
    }

    fn put(&self, vector: &[f32], chunk_id: &str, content_hash: &str) -> Result<(), CacheError> {
        let key = Self::db_key(chunk_id, content_hash);
        self.db.put(key.as_bytes(), bincode::serialize(vector)?)?;
        Ok(())
    }
}
