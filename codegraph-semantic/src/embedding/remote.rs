//! HTTP client for the CodeGraph embedding server
//!
//! Endpoints used:
//! - `POST /embed` with `{"inputs": [...]}`, answers `[[f32]]`
//! - `GET /health` and `GET /capabilities`
//! - `POST /jobs` plus `/jobs/{id}/progress|complete|fail` for queued indexing jobs
//! - `POST /progress` / `DELETE /progress`, the older single-slot progress API

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::EmbeddingProvider;
use crate::error::EmbeddingError;

/// The server rejects requests with more inputs than this
pub const SERVER_MAX_BATCH_SIZE: usize = 64;

/// Remote provider configuration
#[derive(Debug, Clone)]
pub struct RemoteProviderConfig {
    /// Server base URL (default: http://localhost:8080)
    pub endpoint: String,
    /// Model name recorded with the index (default: NV-Embed-v2)
    pub model: String,
    /// Vector length (default: 4096)
    pub dimensions: usize,
    /// Texts per request (default: 64, capped at the server maximum)
    pub max_batch_size: usize,
    /// Per-request timeout (default: 120s)
    pub timeout: Duration,
}

impl Default for RemoteProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            model: "NV-Embed-v2".to_string(),
            dimensions: 4096,
            max_batch_size: SERVER_MAX_BATCH_SIZE,
            timeout: Duration::from_secs(120),
        }
    }
}

/// `GET /health` payload
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dimensions: Option<usize>,
    #[serde(default)]
    pub max_batch_size: Option<usize>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// `GET /capabilities` payload
#[derive(Debug, Clone, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub max_batch_size: Option<usize>,
    /// Batch size the server can take right now given free GPU memory
    pub recommended_batch_size: usize,
    #[serde(default)]
    pub gpu_available_mb: Option<f64>,
    #[serde(default)]
    pub gpu_busy: bool,
}

/// `POST /jobs` answer
#[derive(Debug, Clone, Deserialize)]
pub struct JobTicket {
    pub job_id: String,
    pub status: String,
    /// 0 when active, otherwise the place in the server queue
    pub position: i64,
    #[serde(default)]
    pub message: Option<String>,
    pub recommended_batch_size: usize,
}

impl JobTicket {
    pub fn is_active(&self) -> bool {
        self.position == 0
    }
}

/// `GET /jobs/{id}` answer
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    pub id: String,
    pub project: String,
    pub total_chunks: usize,
    pub current: usize,
    pub status: String,
    /// Absent once the job has finished
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [&'a str],
}

#[derive(Serialize)]
struct ProgressUpdate<'a> {
    current: usize,
    total: usize,
    project: &'a str,
}

#[derive(Serialize)]
struct JobRegisterRequest<'a> {
    project: &'a str,
    total_chunks: usize,
    instance_id: &'a str,
}

#[derive(Serialize)]
struct JobProgressUpdate {
    current: usize,
}

/// Embedding provider backed by the embedding server
pub struct RemoteEmbeddingProvider {
    agent: ureq::Agent,
    config: RemoteProviderConfig,
    /// Texts per `/embed` request, follows the server's recommendation
    batch_size: AtomicUsize,
}

impl RemoteEmbeddingProvider {
    pub fn new(mut config: RemoteProviderConfig) -> Self {
        config.max_batch_size = config.max_batch_size.clamp(1, SERVER_MAX_BATCH_SIZE);
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        let batch_size = AtomicUsize::new(config.max_batch_size);
        Self {
            agent,
            config,
            batch_size,
        }
    }

    /// Create from environment configuration
    pub fn from_env() -> Self {
        Self::new(RemoteProviderConfig::from_env())
    }

    /// Create and adopt the model name, dimensions and batch limit the server reports
    pub fn connect(config: RemoteProviderConfig) -> Result<Self, EmbeddingError> {
        let mut provider = Self::new(config);
        let health = provider.health()?;
        if !health.is_ok() {
            return Err(EmbeddingError::other(format!(
                "Embedding server unhealthy: {}",
                health.status
            )));
        }

        if let Some(dimensions) = health.dimensions {
            if dimensions != provider.config.dimensions {
                log::warn!(
                    "Embedding server reports {}d vectors, configured {}d; using server value",
                    dimensions,
                    provider.config.dimensions
                );
                provider.config.dimensions = dimensions;
            }
        }
        if let Some(model) = health.model {
            provider.config.model = model;
        }
        if let Some(max) = health.max_batch_size {
            provider.config.max_batch_size = provider.config.max_batch_size.min(max.max(1));
            provider
                .batch_size
                .store(provider.config.max_batch_size, Ordering::Relaxed);
        }

        // Older servers have no /capabilities; keep the configured batch size
        match provider.capabilities() {
            Ok(capabilities) => provider.adopt_batch_size(capabilities.recommended_batch_size),
            Err(e) => log::debug!("Embedding server capabilities unavailable: {}", e),
        }

        log::info!(
            "Connected to embedding server {} ({}, {}d, batch {})",
            provider.config.endpoint,
            provider.config.model,
            provider.config.dimensions,
            provider.batch_size()
        );
        Ok(provider)
    }

    pub fn config(&self) -> &RemoteProviderConfig {
        &self.config
    }

    /// Texts sent per `/embed` request
    pub fn batch_size(&self) -> usize {
        self.batch_size.load(Ordering::Relaxed)
    }

    /// Use the server's recommended batch size, bounded by the configured maximum
    pub fn adopt_batch_size(&self, recommended: usize) {
        let size = recommended.clamp(1, self.config.max_batch_size);
        let previous = self.batch_size.swap(size, Ordering::Relaxed);
        if previous != size {
            log::debug!("Embedding batch size {} -> {}", previous, size);
        }
    }

    /// Query `GET /capabilities`
    pub fn capabilities(&self) -> Result<ServerCapabilities, EmbeddingError> {
        let response = self
            .agent
            .get(&self.url("/capabilities"))
            .call()
            .map_err(map_ureq_error)?;
        response
            .into_json()
            .map_err(|e| EmbeddingError::decode(e.to_string()))
    }

    /// Register an indexing job in the server queue and adopt its batch size
    ///
    /// A ticket with a non-zero position is queued behind other jobs; poll
    /// [`job_status`](Self::job_status) until it becomes active.
    pub fn register_job(
        &self,
        project: &str,
        total_chunks: usize,
        instance_id: &str,
    ) -> Result<JobTicket, EmbeddingError> {
        let ticket: JobTicket = self
            .agent
            .post(&self.url("/jobs"))
            .send_json(JobRegisterRequest {
                project,
                total_chunks,
                instance_id,
            })
            .map_err(map_ureq_error)?
            .into_json()
            .map_err(|e| EmbeddingError::decode(e.to_string()))?;

        self.adopt_batch_size(ticket.recommended_batch_size);
        log::info!(
            "Registered indexing job {} for {} ({} chunks, position {})",
            ticket.job_id,
            project,
            total_chunks,
            ticket.position
        );
        Ok(ticket)
    }

    /// Query `GET /jobs/{id}`
    pub fn job_status(&self, job_id: &str) -> Result<JobStatus, EmbeddingError> {
        let response = self
            .agent
            .get(&self.url(&format!("/jobs/{}", job_id)))
            .call()
            .map_err(map_ureq_error)?;
        response
            .into_json()
            .map_err(|e| EmbeddingError::decode(e.to_string()))
    }

    /// Report chunks embedded so far for an active job
    pub fn job_progress(&self, job_id: &str, current: usize) -> Result<(), EmbeddingError> {
        self.agent
            .post(&self.url(&format!("/jobs/{}/progress", job_id)))
            .send_json(JobProgressUpdate { current })
            .map_err(map_ureq_error)?;
        Ok(())
    }

    /// Mark a job as completed, letting the next queued job start
    pub fn complete_job(&self, job_id: &str) -> Result<(), EmbeddingError> {
        self.agent
            .post(&self.url(&format!("/jobs/{}/complete", job_id)))
            .call()
            .map_err(map_ureq_error)?;
        Ok(())
    }

    /// Mark a job as failed with a reason
    pub fn fail_job(&self, job_id: &str, error: &str) -> Result<(), EmbeddingError> {
        self.agent
            .post(&self.url(&format!("/jobs/{}/fail", job_id)))
            .query("error", error)
            .call()
            .map_err(map_ureq_error)?;
        Ok(())
    }

    /// Remove a job from the queue, or stop it if active
    pub fn cancel_job(&self, job_id: &str) -> Result<(), EmbeddingError> {
        self.agent
            .delete(&self.url(&format!("/jobs/{}", job_id)))
            .call()
            .map_err(map_ureq_error)?;
        Ok(())
    }

    /// Query `GET /health`
    pub fn health(&self) -> Result<HealthStatus, EmbeddingError> {
        let response = self
            .agent
            .get(&self.url("/health"))
            .call()
            .map_err(map_ureq_error)?;
        response
            .into_json()
            .map_err(|e| EmbeddingError::decode(e.to_string()))
    }

    /// Publish indexing progress through the single-slot `/progress` endpoint
    ///
    /// Newer servers track progress per job; see [`job_progress`](Self::job_progress).
    pub fn report_progress(
        &self,
        project: &str,
        current: usize,
        total: usize,
    ) -> Result<(), EmbeddingError> {
        self.agent
            .post(&self.url("/progress"))
            .send_json(ProgressUpdate {
                current,
                total,
                project,
            })
            .map_err(map_ureq_error)?;
        Ok(())
    }

    /// Clear published progress
    pub fn clear_progress(&self) -> Result<(), EmbeddingError> {
        self.agent
            .delete(&self.url("/progress"))
            .call()
            .map_err(map_ureq_error)?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn embed_batch(&self, batch: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = self
            .agent
            .post(&self.url("/embed"))
            .send_json(EmbedRequest { inputs: batch })
            .map_err(map_ureq_error)?;

        let vectors: Vec<Vec<f32>> = response
            .into_json()
            .map_err(|e| EmbeddingError::decode(e.to_string()))?;

        if vectors.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                got: vectors.len(),
            });
        }
        Ok(vectors)
    }
}

impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let batch_size = self.batch_size();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            vectors.extend(self.embed_batch(batch)?);
        }

        log::debug!(
            "Embedded {} texts in {} request(s)",
            texts.len(),
            texts.len().div_ceil(batch_size)
        );
        Ok(vectors)
    }
}

fn map_ureq_error(err: ureq::Error) -> EmbeddingError {
    match err {
        ureq::Error::Status(code, response) => EmbeddingError::Status {
            code,
            message: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => EmbeddingError::request(transport.to_string()),
    }
}
