//! Configuration discovery
//!
//! Resolves provider settings and the index file location from the
//! environment, falling back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::remote::RemoteProviderConfig;

/// Embedding server base URL
pub const ENDPOINT_ENV: &str = "CODEGRAPH_EMBEDDING_URL";
/// Model name recorded with the index
pub const MODEL_ENV: &str = "CODEGRAPH_EMBEDDING_MODEL";
/// Vector length
pub const DIMENSIONS_ENV: &str = "CODEGRAPH_EMBEDDING_DIMENSIONS";
/// Texts per request
pub const BATCH_SIZE_ENV: &str = "CODEGRAPH_EMBEDDING_BATCH_SIZE";
/// Request timeout in seconds
pub const TIMEOUT_ENV: &str = "CODEGRAPH_EMBEDDING_TIMEOUT_SECS";
/// Explicit index file location
pub const INDEX_PATH_ENV: &str = "CODEGRAPH_INDEX_PATH";

impl RemoteProviderConfig {
    /// Defaults overridden by `CODEGRAPH_EMBEDDING_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup; unparsable numbers are logged and skipped
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
            log::info!("Using {}: {}", ENDPOINT_ENV, endpoint);
            self.endpoint = endpoint.trim().to_string();
        }

        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.model = model.trim().to_string();
        }

        if let Some(dimensions) = parse_number(&lookup, DIMENSIONS_ENV) {
            self.dimensions = dimensions;
        }

        if let Some(batch) = parse_number(&lookup, BATCH_SIZE_ENV) {
            self.max_batch_size = batch;
        }

        if let Some(secs) = parse_number(&lookup, TIMEOUT_ENV) {
            self.timeout = Duration::from_secs(secs as u64);
        }

        self
    }
}

fn parse_number(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            log::warn!("{} set but not a positive integer: {:?}", key, raw);
            None
        }
    }
}

/// Find the persisted index location with priority:
/// 1. CODEGRAPH_INDEX_PATH environment variable
/// 2. `<workspace>/.codegraph/embeddings.json`
pub fn default_index_path(workspace: &Path) -> PathBuf {
    if let Some(path) = std::env::var_os(INDEX_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    workspace.join(".codegraph").join("embeddings.json")
}
