#![allow(dead_code)]

use async_trait::async_trait;
use ragbus::config::{Config, ProviderBackend};
use ragbus::coordinator::Coordinator;
use ragbus::provider::{EmbeddingProvider, ExtractiveGenerator, GenerationProvider, HashEmbedder};
use ragbus::trace::{Trace, TraceId};
use ragbus::{MessageBus, RagError};
use std::sync::Arc;
use std::time::Duration;

pub fn offline_config() -> Config {
    let mut config = Config::default();
    config.provider.backend = ProviderBackend::Offline;
    config.provider.offline_dimensions = 128;
    config
}

pub fn coordinator_with(
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
) -> Coordinator {
    Coordinator::new(config, MessageBus::new(), embedder, generator)
        .expect("coordinator attaches to a fresh bus")
}

pub fn offline_coordinator() -> Coordinator {
    coordinator_with(
        offline_config(),
        Arc::new(HashEmbedder::new(128)),
        Arc::new(ExtractiveGenerator),
    )
}

/// Answers with the question it was asked, so answers can be matched to queries.
pub struct QueryEchoGenerator;

#[async_trait]
impl GenerationProvider for QueryEchoGenerator {
    async fn generate(&self, _system: &str, prompt: &str) -> Result<String, RagError> {
        let question = prompt
            .split("\n\nQuestion: ")
            .nth(1)
            .and_then(|rest| rest.split("\n\n").next())
            .unwrap_or_default();
        // Let other traces interleave before answering.
        tokio::task::yield_now().await;
        Ok(format!("Answer to: {}", question))
    }
}

pub struct FailingGenerator;

#[async_trait]
impl GenerationProvider for FailingGenerator {
    async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, RagError> {
        Err(RagError::ProviderFailure("model unavailable".into()))
    }
}

/// Embeds documents normally but never answers a query embedding.
pub struct HangingQueryEmbedder {
    inner: HashEmbedder,
}

impl HangingQueryEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashEmbedder::new(128),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HangingQueryEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
        std::future::pending().await
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.inner.embed_many(texts).await
    }

    fn model_id(&self) -> &str {
        "hanging"
    }
}

/// Polls until the trace reaches a terminal status.
pub async fn wait_for_terminal(coordinator: &Coordinator, trace_id: &TraceId) -> Trace {
    for _ in 0..400 {
        if let Some(trace) = coordinator.trace_status(trace_id) {
            if trace.status.is_terminal() {
                return trace;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("trace {} never finished", trace_id);
}
