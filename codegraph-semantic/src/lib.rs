//! CodeGraph Semantic Index
//!
//! Embedding index for code chunks with exact cosine-similarity search,
//! incremental re-indexing driven by file content hashes, and a versioned
//! on-disk format.
//!
//! ## Features
//!
//! - **Cache-aware indexing** - Vectors are keyed by chunk id + file hash; only misses hit the provider, in one batch
//! - **Exact search** - Linear scan with top-K selection, plus "more like this" via [`EmbeddingIndex::similar_to`]
//! - **Staleness detection** - Loading a saved index drops chunks of files whose hash changed and reports them
//! - **Schema guards** - Saved indexes from another schema version or dimensionality are rejected, never mixed in
//!
//! ## Example
//!
//! ```ignore
//! use codegraph_semantic::{
//!     fingerprint, CodeChunk, EmbeddingIndex, RemoteEmbeddingProvider, RocksEmbeddingCache,
//! };
//!
//! let provider = Arc::new(RemoteEmbeddingProvider::from_env());
//! let cache = Arc::new(RocksEmbeddingCache::open(&cache_dir)?);
//! let mut index = EmbeddingIndex::new(provider, cache);
//!
//! let current = fingerprint::hash_files(&source_files);
//! let changed = match index.load(&index_path, current.clone()) {
//!     Ok(changed) => changed,
//!     Err(e) if e.requires_rebuild() => {
//!         index.set_file_hashes(current);
//!         source_files.iter().cloned().collect()
//!     }
//!     Err(e) => return Err(e.into()),
//! };
//!
//! index.remove_chunks_for_files(&changed);
//! index.index(extract_chunks(&changed))?;
//! index.save(&index_path)?;
//!
//! for hit in index.search("where do we refresh auth tokens", 10)? {
//!     println!("{:.3} {}", hit.score, hit.chunk.display_name());
//! }
//! ```

pub mod cache;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod persistence;
pub mod search;

// Re-exports for convenience
pub use cache::{
    CacheKey, EmbeddingCache, MemoryEmbeddingCache, NoopEmbeddingCache, RocksEmbeddingCache,
};
pub use chunk::{ChunkKind, CodeChunk};
pub use embedding::{EmbeddingProvider, RemoteEmbeddingProvider, RemoteProviderConfig};
pub use error::{CacheError, EmbeddingError, IndexError};
pub use index::{EmbeddingIndex, IndexReport};
pub use persistence::{IndexHeader, PersistedIndex, SCHEMA_VERSION};
pub use search::{cosine_similarity, SearchResult};
