//! In-memory embedding index
//!
//! The corpus is a single ordered list of `{vector, chunk}` records with a
//! derived id → position map. Indexing consults the embedding cache first and
//! sends only the misses to the provider, in one batch.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::EmbeddingCache;
use crate::chunk::CodeChunk;
use crate::embedding::EmbeddingProvider;
use crate::error::{EmbeddingError, IndexError, Result};

/// One corpus record
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub(crate) vector: Vec<f32>,
    pub(crate) chunk: CodeChunk,
}

impl IndexEntry {
    pub(crate) fn id(&self) -> &str {
        &self.chunk.id
    }
}

/// Outcome of an [`EmbeddingIndex::index`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Chunks appended to the corpus
    pub indexed: usize,
    /// Vectors served from the cache
    pub cache_hits: usize,
    /// Vectors computed by the provider
    pub embedded: usize,
    /// Existing entries superseded by a chunk with the same id
    pub replaced: usize,
}

/// Semantic index over code chunks
///
/// Not internally synchronized: mutation takes `&mut self`, so concurrent
/// hosts keep one owner or wrap the index in a lock.
pub struct EmbeddingIndex {
    pub(crate) provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<dyn EmbeddingCache>,
    pub(crate) entries: Vec<IndexEntry>,
    pub(crate) positions: HashMap<String, usize>,
    pub(crate) file_hashes: HashMap<PathBuf, String>,
}

impl EmbeddingIndex {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache: Arc<dyn EmbeddingCache>) -> Self {
        Self {
            provider,
            cache,
            entries: Vec::new(),
            positions: HashMap::new(),
            file_hashes: HashMap::new(),
        }
    }

    /// Embed and append chunks, reusing cached vectors where the file hash still matches
    ///
    /// On error the corpus is left exactly as it was.
    pub fn index(&mut self, chunks: Vec<CodeChunk>) -> Result<IndexReport> {
        if chunks.is_empty() {
            return Ok(IndexReport::default());
        }

        let chunks = dedupe_last_wins(chunks);
        let dimensions = self.provider.dimensions();

        let mut slots: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());
        let mut misses: Vec<usize> = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            match self.cache.get(&chunk.id, self.content_hash_for(&chunk.file)) {
                Some(vector) if vector.len() == dimensions => slots.push(Some(vector)),
                Some(vector) => {
                    log::warn!(
                        "Ignoring cached {}d embedding for {} (provider is {}d)",
                        vector.len(),
                        chunk.id,
                        dimensions
                    );
                    slots.push(None);
                    misses.push(i);
                }
                None => {
                    slots.push(None);
                    misses.push(i);
                }
            }
        }

        if !misses.is_empty() {
            let texts: Vec<&str> = misses
                .iter()
                .map(|&i| chunks[i].embedding_text.as_str())
                .collect();
            let computed = self.provider.embed(&texts)?;

            if computed.len() != misses.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: misses.len(),
                    got: computed.len(),
                }
                .into());
            }
            if let Some(bad) = computed.iter().find(|v| v.len() != dimensions) {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    got: bad.len(),
                });
            }

            for (&i, vector) in misses.iter().zip(computed) {
                let chunk = &chunks[i];
                self.cache
                    .put(&vector, &chunk.id, self.content_hash_for(&chunk.file))?;
                slots[i] = Some(vector);
            }
        }

        let replaced = {
            let incoming: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
            self.retain_entries(|entry| !incoming.contains(entry.id()))
        };

        let mut report = IndexReport {
            indexed: 0,
            cache_hits: chunks.len() - misses.len(),
            embedded: misses.len(),
            replaced,
        };

        self.entries.reserve(chunks.len());
        for (chunk, slot) in chunks.into_iter().zip(slots) {
            debug_assert!(slot.is_some(), "every chunk has a vector by now");
            if let Some(vector) = slot {
                self.positions.insert(chunk.id.clone(), self.entries.len());
                self.entries.push(IndexEntry { vector, chunk });
                report.indexed += 1;
            }
        }

        log::debug!(
            "Indexed {} chunks ({} cached, {} embedded, {} replaced); corpus size {}",
            report.indexed,
            report.cache_hits,
            report.embedded,
            report.replaced,
            self.entries.len()
        );
        Ok(report)
    }

    /// Drop every chunk owned by one of `files`, keeping the order of the rest
    pub fn remove_chunks_for_files(&mut self, files: &HashSet<PathBuf>) -> usize {
        if files.is_empty() {
            return 0;
        }
        let removed = self.retain_entries(|entry| !files.contains(&entry.chunk.file));
        if removed > 0 {
            log::debug!("Removed {} chunks for {} file(s)", removed, files.len());
        }
        removed
    }

    /// Drop chunks by id
    pub fn remove_chunks<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: HashSet<String> = ids.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.retain_entries(|entry| !ids.contains(entry.id()))
    }

    /// Drop the whole corpus; the file-hash table is kept
    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    /// Replace the file → content hash table
    pub fn set_file_hashes(&mut self, hashes: HashMap<PathBuf, String>) {
        self.file_hashes = hashes;
    }

    /// Merge into the file → content hash table
    pub fn update_file_hashes(&mut self, hashes: HashMap<PathBuf, String>) {
        self.file_hashes.extend(hashes);
    }

    pub fn file_hashes(&self) -> &HashMap<PathBuf, String> {
        &self.file_hashes
    }

    /// Files whose current hash differs from (or is missing in) the stored table
    pub fn stale_files(&self, current: &HashMap<PathBuf, String>) -> HashSet<PathBuf> {
        changed_files(&self.file_hashes, current)
    }

    pub fn get_chunk(&self, chunk_id: &str) -> Option<&CodeChunk> {
        self.positions
            .get(chunk_id)
            .map(|&position| &self.entries[position].chunk)
    }

    pub fn get_embedding(&self, chunk_id: &str) -> Option<&[f32]> {
        self.positions
            .get(chunk_id)
            .map(|&position| self.entries[position].vector.as_slice())
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.positions.contains_key(chunk_id)
    }

    /// Chunk ids in corpus order
    pub fn chunk_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(IndexEntry::id)
    }

    /// Chunks in corpus order
    pub fn chunks(&self) -> impl Iterator<Item = &CodeChunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    /// Files with at least one indexed chunk
    pub fn indexed_files(&self) -> HashSet<&Path> {
        self.entries
            .iter()
            .map(|entry| entry.chunk.file.as_path())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Swap in a fully validated corpus
    pub(crate) fn replace_corpus(
        &mut self,
        entries: Vec<IndexEntry>,
        file_hashes: HashMap<PathBuf, String>,
    ) {
        self.entries = entries;
        self.file_hashes = file_hashes;
        self.rebuild_positions();
    }

    fn content_hash_for(&self, file: &Path) -> &str {
        self.file_hashes.get(file).map(String::as_str).unwrap_or("")
    }

    fn retain_entries(&mut self, keep: impl FnMut(&IndexEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(keep);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.rebuild_positions();
        }
        removed
    }

    fn rebuild_positions(&mut self) {
        self.positions = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.id().to_string(), position))
            .collect();
    }
}

/// Files in `current` whose hash differs from `previous` or that `previous` lacks
pub(crate) fn changed_files(
    previous: &HashMap<PathBuf, String>,
    current: &HashMap<PathBuf, String>,
) -> HashSet<PathBuf> {
    current
        .iter()
        .filter(|(file, hash)| previous.get(*file) != Some(*hash))
        .map(|(file, _)| file.clone())
        .collect()
}

/// Keep only the last chunk for each id, preserving relative order
fn dedupe_last_wins(chunks: Vec<CodeChunk>) -> Vec<CodeChunk> {
    let last_index: HashMap<&str, usize> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| (chunk.id.as_str(), i))
        .collect();
    if last_index.len() == chunks.len() {
        return chunks;
    }

    let keep: HashSet<usize> = last_index.into_values().collect();
    log::debug!(
        "Dropping {} duplicate chunk id(s) from batch",
        chunks.len() - keep.len()
    );
    chunks
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, chunk)| chunk)
        .collect()
}
