//! Code chunk records
//!
//! A chunk is the unit of source text that gets embedded and searched.
//! Chunks are produced by the analyzers and copied into the index by value.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Kind of code construct a chunk was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Protocol,
    Extension,
    Module,
    Property,
    #[default]
    Other,
}

/// A unit of source code extracted for indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChunk {
    /// Unique identity
    pub id: String,
    /// File the chunk was extracted from
    pub file: PathBuf,
    /// Canonical text fed to the embedding provider
    pub embedding_text: String,
    /// Symbol name, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: ChunkKind,
    /// 1-based inclusive line range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_range: Option<(u32, u32)>,
}

impl CodeChunk {
    pub fn new(
        id: impl Into<String>,
        file: impl Into<PathBuf>,
        embedding_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            file: file.into(),
            embedding_text: embedding_text.into(),
            name: None,
            kind: ChunkKind::Other,
            line_range: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_kind(mut self, kind: ChunkKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_line_range(mut self, start: u32, end: u32) -> Self {
        self.line_range = Some((start, end));
        self
    }

    /// Name shown in search results
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

impl PartialEq for CodeChunk {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CodeChunk {}

impl Hash for CodeChunk {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
