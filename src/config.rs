// config.rs

use crate::error::RagError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

/// Represents the full configuration of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How documents are split into chunks.
    pub chunking: ChunkingConfig,

    /// How many chunks a query retrieves.
    pub retrieval: RetrievalConfig,

    /// Deadlines and trace retention.
    pub orchestration: OrchestrationConfig,

    /// Limits applied to submitted documents.
    pub documents: DocumentLimits,

    /// Embedding and generation backend.
    pub provider: ProviderConfig,
}

/// Defines how the ingestion worker cuts text into chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length, in characters, for non-CSV documents.
    pub chunk_size: usize,

    /// Characters shared by two consecutive windows.
    pub overlap: usize,

    /// Trimmed content shorter than this is rejected as empty.
    pub min_content_length: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
            min_content_length: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of ranked chunks handed to the response worker.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Defines deadlines and retention for traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Deadline for a query to settle, in milliseconds.
    pub query_timeout_ms: u64,

    /// Deadline for a document ingestion to reach a terminal state, in milliseconds.
    pub ingestion_timeout_ms: u64,

    /// Maximum number of finished traces kept for introspection.
    pub max_traces: usize,

    /// Finished traces older than this are evicted, in seconds.
    pub trace_max_age_secs: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 30_000,
            ingestion_timeout_ms: 120_000,
            max_traces: 1_000,
            trace_max_age_secs: 3_600,
        }
    }
}

impl OrchestrationConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn ingestion_timeout(&self) -> Duration {
        Duration::from_millis(self.ingestion_timeout_ms)
    }

    pub fn trace_max_age(&self) -> Duration {
        Duration::from_secs(self.trace_max_age_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentLimits {
    /// Largest accepted document, in bytes of extracted text.
    pub max_document_bytes: usize,
}

impl Default for DocumentLimits {
    fn default() -> Self {
        Self {
            max_document_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Which backend answers embedding and generation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBackend {
    /// A local or remote Ollama server.
    Ollama,
    /// Deterministic in-process providers, no network.
    Offline,
}

/// Defines the model backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub backend: ProviderBackend,

    /// Ollama host, including the scheme.
    pub host: String,

    /// Ollama port.
    pub port: u16,

    /// Model used for chunk and query embeddings.
    pub embedding_model: String,

    /// Model used to write answers.
    pub generation_model: String,

    /// Vector length produced by the offline embedder.
    pub offline_dimensions: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: ProviderBackend::Ollama,
            host: "http://localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text".to_string(),
            generation_model: "llama3.2:latest".to_string(),
            offline_dimensions: 256,
        }
    }
}

impl Config {
    /// Loads a configuration from a JSON file.
    ///
    /// # Arguments
    /// * `path` - The file path to load the configuration from.
    ///
    /// # Returns
    /// * `Ok(Config)` if the file is successfully read, parsed and valid.
    /// * `Err(RagError::Config)` if an error occurs.
    pub fn load(path: &Path) -> Result<Self, RagError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise falls back to the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, RagError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves the current configuration to a JSON file.
    ///
    /// # Arguments
    /// * `path` - The file path to save the configuration to.
    ///
    /// # Returns
    /// * `Ok(())` if the file is successfully written.
    /// * `Err(RagError::Config)` if an error occurs.
    pub fn save(&self, path: &Path) -> Result<(), RagError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), RagError> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(RagError::Config("chunking.chunk_size must be positive".into()));
        }
        if chunking.overlap >= chunking.chunk_size {
            return Err(RagError::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                chunking.overlap, chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::Config("retrieval.top_k must be positive".into()));
        }
        if self.orchestration.max_traces == 0 {
            return Err(RagError::Config("orchestration.max_traces must be positive".into()));
        }
        match self.provider.backend {
            ProviderBackend::Offline if self.provider.offline_dimensions == 0 => {
                return Err(RagError::Config("provider.offline_dimensions must be positive".into()));
            }
            ProviderBackend::Ollama
                if !(self.provider.host.starts_with("http://")
                    || self.provider.host.starts_with("https://")) =>
            {
                return Err(RagError::Config(format!(
                    "provider.host must start with http:// or https://, got {}",
                    self.provider.host
                )));
            }
            _ => {}
        }
        Ok(())
    }
}
