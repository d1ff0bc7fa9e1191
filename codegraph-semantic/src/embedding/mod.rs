//! Embedding providers
//!
//! The index only sees the [`EmbeddingProvider`] trait. The bundled
//! implementation talks to the CodeGraph embedding server over HTTP.

mod discovery;
mod remote;

pub use discovery::{
    default_index_path, BATCH_SIZE_ENV, DIMENSIONS_ENV, ENDPOINT_ENV, INDEX_PATH_ENV, MODEL_ENV,
    TIMEOUT_ENV,
};
pub use remote::{
    HealthStatus, JobStatus, JobTicket, RemoteEmbeddingProvider, RemoteProviderConfig,
    ServerCapabilities, SERVER_MAX_BATCH_SIZE,
};

use crate::error::EmbeddingError;

/// Turns text into fixed-dimension vectors
///
/// Vectors from providers with a different name or dimensionality are not
/// comparable, so the index records both alongside its corpus.
pub trait EmbeddingProvider: Send + Sync {
    /// Provider / model identifier stored with persisted indexes
    fn name(&self) -> &str;

    /// Length of every vector this provider returns
    fn dimensions(&self) -> usize;

    /// Embed a batch, returning one vector per text in input order
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vectors = self.embed(&[text])?;
        let got = vectors.len();
        match (got, vectors.into_iter().next()) {
            (1, Some(vector)) => Ok(vector),
            _ => Err(EmbeddingError::CountMismatch { expected: 1, got }),
        }
    }
}
