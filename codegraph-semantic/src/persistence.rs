//! On-disk index format
//!
//! The index is stored as a single JSON document. Loading checks the schema
//! version and vector dimensionality before touching the in-memory index, and
//! drops chunks of files whose content hash changed since the save.

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::chunk::CodeChunk;
use crate::error::{IndexError, Result};
use crate::index::{changed_files, EmbeddingIndex, IndexEntry};

/// Bump whenever chunk extraction or the record shape changes
pub const SCHEMA_VERSION: u32 = 3;

/// Full persisted snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedIndex {
    /// Absent in legacy files, read as 0
    #[serde(default)]
    pub schema_version: u32,
    pub vectors: Vec<Vec<f32>>,
    pub chunk_ids: Vec<String>,
    pub chunks: Vec<CodeChunk>,
    pub provider_name: String,
    pub dimensions: usize,
    pub file_hashes: HashMap<PathBuf, String>,
    pub timestamp: DateTime<Utc>,
}

/// Borrowed view written by `save`, same shape as [`PersistedIndex`]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedIndexRef<'a> {
    schema_version: u32,
    vectors: Vec<&'a [f32]>,
    chunk_ids: Vec<&'a str>,
    chunks: Vec<&'a CodeChunk>,
    provider_name: &'a str,
    dimensions: usize,
    file_hashes: &'a HashMap<PathBuf, String>,
    timestamp: DateTime<Utc>,
}

/// Summary of a persisted index, read without materializing the corpus
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexHeader {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub dimensions: Option<usize>,
    #[serde(default, rename = "chunkIds", deserialize_with = "count_items")]
    pub chunk_count: usize,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn count_items<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Vec::<IgnoredAny>::deserialize(deserializer).map(|items| items.len())
}

impl IndexHeader {
    /// Read the header fields of the index file at `path`
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl PersistedIndex {
    /// Validate structure and pair each id with its vector and chunk record
    fn into_entries(
        self,
        dimensions: usize,
    ) -> Result<(Vec<IndexEntry>, HashMap<PathBuf, String>)> {
        let PersistedIndex {
            vectors,
            chunk_ids,
            chunks,
            file_hashes,
            ..
        } = self;

        if vectors.len() != chunk_ids.len() {
            return Err(IndexError::corrupt(format!(
                "{} vectors for {} chunk ids",
                vectors.len(),
                chunk_ids.len()
            )));
        }

        let mut records: HashMap<String, CodeChunk> = chunks
            .into_iter()
            .map(|chunk| (chunk.id.clone(), chunk))
            .collect();

        let mut entries = Vec::with_capacity(chunk_ids.len());
        for (id, vector) in chunk_ids.into_iter().zip(vectors) {
            if vector.len() != dimensions {
                return Err(IndexError::corrupt(format!(
                    "vector for {} has {} dimensions, expected {}",
                    id,
                    vector.len(),
                    dimensions
                )));
            }
            // `remove` also rejects an id listed twice
            let chunk = records.remove(&id).ok_or_else(|| {
                IndexError::corrupt(format!("missing or duplicate chunk record for {}", id))
            })?;
            entries.push(IndexEntry { vector, chunk });
        }

        Ok((entries, file_hashes))
    }
}

impl EmbeddingIndex {
    /// Write the index to `path`, replacing any previous file atomically
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let record = PersistedIndexRef {
            schema_version: SCHEMA_VERSION,
            vectors: self.entries.iter().map(|e| e.vector.as_slice()).collect(),
            chunk_ids: self.entries.iter().map(|e| e.id()).collect(),
            chunks: self.entries.iter().map(|e| &e.chunk).collect(),
            provider_name: self.provider_name(),
            dimensions: self.dimensions(),
            file_hashes: &self.file_hashes,
            timestamp: Utc::now(),
        };

        let bytes = serde_json::to_vec(&record)?;
        atomic_write(path, &bytes)?;

        log::info!(
            "Saved embedding index ({} chunks, {} files) to {}",
            self.len(),
            self.file_hashes.len(),
            path.display()
        );
        Ok(())
    }

    /// Restore a saved index, keeping only chunks whose files are unchanged
    ///
    /// Returns the files that must be re-indexed: those whose hash in
    /// `current_hashes` differs from the saved one, or that were not saved at
    /// all. Chunks of files absent from `current_hashes` are restored as saved;
    /// drop deleted files with [`EmbeddingIndex::remove_chunks_for_files`].
    /// On error the in-memory index is left untouched.
    pub fn load(
        &mut self,
        path: impl AsRef<Path>,
        current_hashes: HashMap<PathBuf, String>,
    ) -> Result<HashSet<PathBuf>> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;

        let header: IndexHeader = serde_json::from_slice(&bytes)?;
        if header.schema_version != SCHEMA_VERSION {
            log::warn!(
                "Index at {} has schema v{} (current: v{}); rebuild needed",
                path.display(),
                header.schema_version,
                SCHEMA_VERSION
            );
            return Err(IndexError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                got: header.schema_version,
            });
        }

        let expected = self.dimensions();
        if let Some(got) = header.dimensions {
            if got != expected {
                return Err(IndexError::DimensionMismatch { expected, got });
            }
        }

        let record: PersistedIndex = serde_json::from_slice(&bytes)?;
        if record.provider_name != self.provider_name() {
            log::warn!(
                "Index at {} was built by {}, active provider is {}",
                path.display(),
                record.provider_name,
                self.provider_name()
            );
        }

        let (entries, saved_hashes) = record.into_entries(expected)?;
        let changed = changed_files(&saved_hashes, &current_hashes);

        let total = entries.len();
        let kept: Vec<IndexEntry> = entries
            .into_iter()
            .filter(|entry| !changed.contains(&entry.chunk.file))
            .collect();

        log::info!(
            "Loaded embedding index from {}: restored {} of {} chunks, {} changed file(s)",
            path.display(),
            kept.len(),
            total,
            changed.len()
        );

        self.replace_corpus(kept, current_hashes);
        Ok(changed)
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write to a temporary sibling, fsync, then rename over `path`
fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("index path has no file name"))?
        .to_string_lossy();
    let tmp_path = parent.join(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let write_result = (|| -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()
    })();

    let result = write_result.and_then(|()| rename_over(&tmp_path, path));
    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::debug!("Failed to remove {}: {}", tmp_path.display(), e);
            }
        }
    }
    result
}

fn rename_over(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        // Windows refuses to rename onto an existing file
        Err(e) if cfg!(windows) && to.exists() => {
            log::debug!("Replacing {} after rename failure: {}", to.display(), e);
            fs::remove_file(to)?;
            fs::rename(from, to)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryEmbeddingCache, NoopEmbeddingCache};
    use crate::index::tests::{assert_consistent, chunk, CountingProvider};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn hashes(pairs: &[(&str, &str)]) -> HashMap<PathBuf, String> {
        pairs
            .iter()
            .map(|(f, h)| (PathBuf::from(f), h.to_string()))
            .collect()
    }

    fn new_index(dimensions: usize) -> (EmbeddingIndex, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider::with_dimensions(dimensions));
        let index = EmbeddingIndex::new(provider.clone(), Arc::new(NoopEmbeddingCache));
        (index, provider)
    }

    /// Two files, a.swift (a1, a2) and b.swift (b1), saved with hashes h1 / h2
    fn saved_index(dir: &TempDir) -> (PathBuf, EmbeddingIndex) {
        let (mut index, _) = new_index(3);
        index.set_file_hashes(hashes(&[("a.swift", "h1"), ("b.swift", "h2")]));
        index
            .index(vec![
                chunk("a1", "a.swift"),
                chunk("b1", "b.swift"),
                chunk("a2", "a.swift"),
            ])
            .unwrap();

        let path = dir.path().join("index").join("embeddings.json");
        index.save(&path).unwrap();
        (path, index)
    }

    #[test]
    fn test_round_trip_restores_everything() {
        let dir = TempDir::new().unwrap();
        let (path, original) = saved_index(&dir);

        let (mut restored, provider) = new_index(3);
        let changed = restored
            .load(&path, hashes(&[("a.swift", "h1"), ("b.swift", "h2")]))
            .unwrap();

        assert!(changed.is_empty());
        assert_eq!(provider.calls(), 0);
        assert_eq!(
            restored.chunk_ids().collect::<Vec<_>>(),
            original.chunk_ids().collect::<Vec<_>>()
        );
        for id in original.chunk_ids() {
            assert_eq!(restored.get_embedding(id), original.get_embedding(id));
            assert_eq!(
                restored.get_chunk(id).unwrap().embedding_text,
                original.get_chunk(id).unwrap().embedding_text
            );
        }
        assert_consistent(&restored);
    }

    #[test]
    fn test_round_trip_without_hashes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.json");

        let (mut index, _) = new_index(3);
        index.index(vec![chunk("x", "x.swift")]).unwrap();
        index.save(&path).unwrap();

        let (mut restored, _) = new_index(3);
        let changed = restored.load(&path, HashMap::new()).unwrap();

        assert!(changed.is_empty());
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_changed_file_is_reported_and_dropped() {
        let dir = TempDir::new().unwrap();
        let (path, _) = saved_index(&dir);

        let (mut restored, _) = new_index(3);
        let current = hashes(&[("a.swift", "h1-edited"), ("b.swift", "h2")]);
        let changed = restored.load(&path, current.clone()).unwrap();

        assert_eq!(changed, HashSet::from([PathBuf::from("a.swift")]));
        assert_eq!(restored.chunk_ids().collect::<Vec<_>>(), vec!["b1"]);
        assert_eq!(restored.file_hashes(), &current);
        assert_consistent(&restored);
    }

    #[test]
    fn test_new_file_is_reported_changed() {
        let dir = TempDir::new().unwrap();
        let (path, _) = saved_index(&dir);

        let (mut restored, _) = new_index(3);
        let changed = restored
            .load(
                &path,
                hashes(&[("a.swift", "h1"), ("b.swift", "h2"), ("c.swift", "h3")]),
            )
            .unwrap();

        assert_eq!(changed, HashSet::from([PathBuf::from("c.swift")]));
        assert_eq!(restored.len(), 3);
    }

    #[test]
    fn test_files_missing_from_current_table_are_kept() {
        let dir = TempDir::new().unwrap();
        let (path, _) = saved_index(&dir);

        let (mut restored, _) = new_index(3);
        let changed = restored.load(&path, hashes(&[("a.swift", "h1")])).unwrap();

        assert!(changed.is_empty());
        assert_eq!(
            restored.chunk_ids().collect::<Vec<_>>(),
            vec!["a1", "b1", "a2"]
        );
        assert_consistent(&restored);

        // Removing deleted files is left to the caller
        let gone: HashSet<PathBuf> = [PathBuf::from("b.swift")].into_iter().collect();
        assert_eq!(restored.remove_chunks_for_files(&gone), 1);
        assert_eq!(restored.chunk_ids().collect::<Vec<_>>(), vec!["a1", "a2"]);
    }

    #[test]
    fn test_reindex_changed_files_after_load() {
        let dir = TempDir::new().unwrap();
        let (path, _) = saved_index(&dir);

        let provider = Arc::new(CountingProvider::new());
        let cache = Arc::new(MemoryEmbeddingCache::new());
        let mut restored = EmbeddingIndex::new(provider.clone(), cache);
        let changed = restored
            .load(&path, hashes(&[("a.swift", "h1-edited"), ("b.swift", "h2")]))
            .unwrap();

        restored.remove_chunks_for_files(&changed);
        restored
            .index(vec![chunk("a1", "a.swift"), chunk("a3", "a.swift")])
            .unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(
            restored.chunk_ids().collect::<Vec<_>>(),
            vec!["b1", "a1", "a3"]
        );
        assert_consistent(&restored);
    }

    #[test]
    fn test_schema_version_mismatch_leaves_index_untouched() {
        let dir = TempDir::new().unwrap();
        let (path, _) = saved_index(&dir);

        let mut json: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        json["schemaVersion"] = serde_json::json!(SCHEMA_VERSION - 1);
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let (mut target, _) = new_index(3);
        target.index(vec![chunk("existing", "e.swift")]).unwrap();
        target.set_file_hashes(hashes(&[("e.swift", "he")]));

        let err = target.load(&path, HashMap::new()).unwrap_err();
        assert!(matches!(
            err,
            IndexError::SchemaVersionMismatch { expected, got }
                if expected == SCHEMA_VERSION && got == SCHEMA_VERSION - 1
        ));
        assert!(err.requires_rebuild());
        assert_eq!(target.chunk_ids().collect::<Vec<_>>(), vec!["existing"]);
        assert_eq!(target.file_hashes(), &hashes(&[("e.swift", "he")]));
    }

    #[test]
    fn test_missing_schema_version_reads_as_zero() {
        let dir = TempDir::new().unwrap();
        let (path, _) = saved_index(&dir);

        let mut json: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        json.as_object_mut().unwrap().remove("schemaVersion");
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let (mut target, _) = new_index(3);
        assert!(matches!(
            target.load(&path, HashMap::new()),
            Err(IndexError::SchemaVersionMismatch { got: 0, .. })
        ));
        assert!(target.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_leaves_index_untouched() {
        let dir = TempDir::new().unwrap();
        let (path, _) = saved_index(&dir);

        let (mut target, _) = new_index(4);
        target.index(vec![chunk("existing", "e.swift")]).unwrap();

        let err = target
            .load(&path, hashes(&[("a.swift", "h1"), ("b.swift", "h2")]))
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 4,
                got: 3
            }
        ));
        assert_eq!(target.chunk_ids().collect::<Vec<_>>(), vec!["existing"]);
    }

    #[test]
    fn test_inconsistent_record_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let (path, _) = saved_index(&dir);

        let mut json: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        json["chunkIds"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!("ghost"));
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let (mut target, _) = new_index(3);
        assert!(matches!(
            target.load(&path, HashMap::new()),
            Err(IndexError::Corrupt(_))
        ));
        assert!(target.is_empty());
    }

    #[test]
    fn test_garbage_file_is_json_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.json");
        fs::write(&path, b"{\"schemaVersion\": 3, \"vectors\": [[1.0,").unwrap();

        let (mut target, _) = new_index(3);
        let err = target.load(&path, HashMap::new()).unwrap_err();
        assert!(matches!(err, IndexError::Json(_)));
        assert!(err.requires_rebuild());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let (mut target, _) = new_index(3);
        assert!(matches!(
            target.load(dir.path().join("nope.json"), HashMap::new()),
            Err(IndexError::Io(_))
        ));
    }

    #[test]
    fn test_save_replaces_previous_file_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let (path, mut index) = saved_index(&dir);

        index.remove_chunks(["a1"]);
        index.save(&path).unwrap();

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);

        let header = IndexHeader::read(&path).unwrap();
        assert_eq!(header.chunk_count, 2);
    }

    #[test]
    fn test_header_and_record_shape() {
        let dir = TempDir::new().unwrap();
        let (path, _) = saved_index(&dir);

        let header = IndexHeader::read(&path).unwrap();
        assert_eq!(header.schema_version, SCHEMA_VERSION);
        assert_eq!(header.provider_name.as_deref(), Some("counting"));
        assert_eq!(header.dimensions, Some(3));
        assert_eq!(header.chunk_count, 3);
        assert!(header.timestamp.is_some());

        let record: PersistedIndex = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(record.chunk_ids, vec!["a1", "b1", "a2"]);
        assert_eq!(record.vectors.len(), 3);
        assert_eq!(record.file_hashes, hashes(&[("a.swift", "h1"), ("b.swift", "h2")]));
    }
}
