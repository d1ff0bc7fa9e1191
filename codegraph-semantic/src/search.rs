//! Exact similarity search
//!
//! Every stored vector is scored against the query by cosine similarity;
//! the top K are selected with a partial sort, then ordered by score.

use std::cmp::Ordering;

use crate::chunk::CodeChunk;
use crate::error::{IndexError, Result};
use crate::index::EmbeddingIndex;

/// A chunk paired with its similarity to the query
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: CodeChunk,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Cosine similarity between two vectors
///
/// Returns 0.0 for mismatched lengths, zero-norm inputs, and non-finite results.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

fn by_score_desc(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1)
}

/// Keep the `k` highest scores, highest first
fn select_top_k(mut scored: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    if k == 0 || scored.is_empty() {
        return Vec::new();
    }

    if k < scored.len() {
        scored.select_nth_unstable_by(k - 1, by_score_desc);
        scored.truncate(k);
    }
    scored.sort_unstable_by(by_score_desc);
    scored
}

impl EmbeddingIndex {
    /// Embed `query` and return the `top_k` most similar chunks
    ///
    /// An empty corpus or `top_k == 0` returns no results without calling the provider.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.provider.embed_one(query)?;
        Ok(self.search_vector(&query_vector, top_k))
    }

    /// Rank the corpus against a precomputed query vector
    pub fn search_vector(&self, query_vector: &[f32], top_k: usize) -> Vec<SearchResult> {
        self.rank(query_vector, top_k, None)
    }

    /// Chunks most similar to an already indexed chunk, excluding the chunk itself
    pub fn similar_to(&self, chunk_id: &str, top_k: usize) -> Vec<SearchResult> {
        let Some(&position) = self.positions.get(chunk_id) else {
            return Vec::new();
        };
        if top_k == 0 {
            return Vec::new();
        }

        let query_vector = &self.entries[position].vector;
        let mut results = self.rank(query_vector, top_k.saturating_add(1), Some(position));
        results.truncate(top_k);
        results
    }

    /// Fail with [`IndexError::NotIndexed`] when the corpus is empty
    pub fn require_indexed(&self) -> Result<()> {
        if self.is_empty() {
            Err(IndexError::NotIndexed)
        } else {
            Ok(())
        }
    }

    fn rank(
        &self,
        query_vector: &[f32],
        top_k: usize,
        exclude: Option<usize>,
    ) -> Vec<SearchResult> {
        if self.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != exclude)
            .map(|(position, entry)| (position, cosine_similarity(query_vector, &entry.vector)))
            .collect();

        select_top_k(scored, top_k)
            .into_iter()
            .map(|(position, score)| SearchResult {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect()
    }
}
