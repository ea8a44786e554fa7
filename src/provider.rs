// provider.rs
//! Embedding and generation backends.
//!
//! The agents only see the two traits below. `OllamaProvider` talks to an Ollama
//! server; `HashEmbedder` and `ExtractiveGenerator` answer in-process with no
//! network, for demos and tests.

use crate::config::{ProviderBackend, ProviderConfig};
use crate::error::RagError;
use crate::prompt::Prompt;
use async_trait::async_trait;
use cli_log::debug;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;
use std::sync::Arc;

/// Turns text into vectors. Vectors from one provider share a dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embeds a batch, one vector per input, in input order.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn model_id(&self) -> &str;
}

/// Writes an answer from a system instruction and a user prompt.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, RagError>;
}

/// Builds the configured pair of providers.
pub fn from_config(
    config: &ProviderConfig,
) -> (Arc<dyn EmbeddingProvider>, Arc<dyn GenerationProvider>) {
    match config.backend {
        ProviderBackend::Ollama => {
            let provider = Arc::new(OllamaProvider::new(config));
            let embedder: Arc<dyn EmbeddingProvider> = provider.clone();
            let generator: Arc<dyn GenerationProvider> = provider;
            (embedder, generator)
        }
        ProviderBackend::Offline => {
            let embedder: Arc<dyn EmbeddingProvider> =
                Arc::new(HashEmbedder::new(config.offline_dimensions));
            let generator: Arc<dyn GenerationProvider> = Arc::new(ExtractiveGenerator);
            (embedder, generator)
        }
    }
}

pub struct OllamaProvider {
    client: Ollama,
    embedding_model: String,
    generation_model: String,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: Ollama::new(config.host.clone(), config.port),
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
        }
    }

    async fn request_embeddings(&self, input: EmbeddingsInput) -> Result<Vec<Vec<f32>>, RagError> {
        let request = GenerateEmbeddingsRequest::new(self.embedding_model.clone(), input);
        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| RagError::provider(format!("embedding with {}: {}", self.embedding_model, e)))?;
        Ok(response.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.request_embeddings(EmbeddingsInput::Single(text.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::provider("Ollama returned no embedding"))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("[Ollama] Embedding {} chunks with {}", texts.len(), self.embedding_model);
        self.request_embeddings(EmbeddingsInput::Multiple(texts.to_vec()))
            .await
    }

    fn model_id(&self) -> &str {
        &self.embedding_model
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, RagError> {
        let request = GenerationRequest::new(self.generation_model.clone(), prompt.to_string())
            .system(system.to_string());
        match self.client.generate(request).await {
            Ok(response) => Ok(response.response),
            Err(e) => Err(RagError::provider(format!(
                "generation with {}: {}",
                self.generation_model, e
            ))),
        }
    }
}

/// Deterministic bag-of-words embedder: each lowercased word is hashed into a
/// bucket and the counts are L2-normalised. Texts sharing words score high.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let bucket = (fnv1a(&word.to_lowercase()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.embed_text(text))
    }

    fn model_id(&self) -> &str {
        "offline-hash"
    }
}

/// Offline generator that quotes the most relevant passage of the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveGenerator;

impl ExtractiveGenerator {
    pub const NO_CONTEXT: &'static str =
        "The provided context does not contain enough information to answer this question.";
}

#[async_trait]
impl GenerationProvider for ExtractiveGenerator {
    async fn generate(&self, _system: &str, prompt: &str) -> Result<String, RagError> {
        let context = Prompt::context_of(prompt).unwrap_or_default();
        let passage = context
            .split(Prompt::CONTEXT_SEPARATOR)
            .next()
            .map(str::trim)
            .unwrap_or_default();
        if passage.is_empty() {
            return Ok(Self::NO_CONTEXT.to_string());
        }
        Ok(format!("According to the documents:\n{}", passage))
    }
}
