//! Error types for codegraph-semantic

use thiserror::Error;

/// Errors raised by an [`EmbeddingProvider`](crate::embedding::EmbeddingProvider)
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Transport failure talking to the embedding backend
    #[error("Embedding request failed: {0}")]
    Request(String),

    /// Backend answered with a non-success status
    #[error("Embedding server returned {code}: {message}")]
    Status { code: u16, message: String },

    /// Backend response could not be decoded
    #[error("Failed to decode embedding response: {0}")]
    Decode(String),

    /// Backend returned a different number of vectors than texts sent
    #[error("Expected {expected} embeddings, got {got}")]
    CountMismatch { expected: usize, got: usize },

    /// Generic provider error
    #[error("{0}")]
    Other(String),
}

impl EmbeddingError {
    /// Create a request error
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a generic provider error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Errors raised by an [`EmbeddingCache`](crate::cache::EmbeddingCache) write
#[derive(Debug, Error)]
pub enum CacheError {
    /// RocksDB error
    #[error("Cache storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// Vector encoding error (bincode)
    #[error("Cache encoding error: {0}")]
    Encode(#[from] bincode::Error),

    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in the embedding index
#[derive(Debug, Error)]
pub enum IndexError {
    /// Persisted index was written by an incompatible schema version
    #[error("Schema version mismatch: expected {expected}, found {got}")]
    SchemaVersionMismatch { expected: u32, got: u32 },

    /// Vectors do not match the active provider's dimensionality
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Operation requires a non-empty corpus
    #[error("Index is empty; nothing has been indexed yet")]
    NotIndexed,

    /// Embedding provider failure
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Embedding cache failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Persisted index is structurally inconsistent
    #[error("Corrupt index file: {0}")]
    Corrupt(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    /// Create a corrupt-file error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Whether the caller should discard the persisted file and rebuild from scratch
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            Self::SchemaVersionMismatch { .. }
                | Self::DimensionMismatch { .. }
                | Self::Corrupt(_)
                | Self::Json(_)
        )
    }
}

/// Result type for index operations
pub type Result<T> = std::result::Result<T, IndexError>;
