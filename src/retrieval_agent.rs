// retrieval_agent.rs
use crate::agent::{report_failure, send, Agent};
use crate::bus::MessageBus;
use crate::document::{DocumentChunk, RetrievalResult};
use crate::error::RagError;
use crate::message::{
    names, ContextResponse, EmbeddingRequest, EmbeddingsCreated, Message, MessageBody,
    RetrievalRequest,
};
use crate::provider::EmbeddingProvider;
use crate::ranking::rank_chunks;
use async_trait::async_trait;
use cli_log::info;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

/// Embeds document chunks, keeps them per document and answers similarity searches.
pub struct RetrievalAgent {
    embedder: Arc<dyn EmbeddingProvider>,
    /// Embedded chunks keyed by document id. Private to this agent.
    store: Mutex<HashMap<String, Vec<DocumentChunk>>>,
}

impl RetrievalAgent {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored chunks for a document, 0 when it is unknown.
    pub fn chunk_count(&self, document_id: &str) -> usize {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document_id)
            .map_or(0, Vec::len)
    }

    async fn embed_chunks(&self, request: &EmbeddingRequest) -> Result<usize, RagError> {
        let texts: Vec<String> = request
            .chunks
            .iter()
            .map(|chunk| chunk.content.clone())
            .collect();
        let embeddings = self.embedder.embed_many(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(RagError::ProviderFailure(format!(
                "{} returned {} embeddings for {} chunks",
                self.embedder.model_id(),
                embeddings.len(),
                texts.len()
            )));
        }

        let chunks: Vec<DocumentChunk> = request
            .chunks
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(mut chunk, embedding)| {
                chunk.embedding = Some(embedding);
                chunk
            })
            .collect();
        let count = chunks.len();
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.document_id.clone(), chunks);
        Ok(count)
    }

    /// Union of the stored chunks of the given documents, each document once, in request order.
    fn candidates(&self, document_ids: &[String]) -> Vec<DocumentChunk> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let mut seen = HashSet::new();
        document_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| store.get(id))
            .flat_map(|chunks| chunks.iter().cloned())
            .collect()
    }

    async fn search(&self, request: &RetrievalRequest) -> Result<RetrievalResult, RagError> {
        let candidates = self.candidates(&request.document_ids);
        if candidates.is_empty() {
            return Err(RagError::NoCandidates);
        }
        let query_embedding = self.embedder.embed(&request.query).await?;
        rank_chunks(&request.query, &query_embedding, candidates, request.top_k)
    }
}

#[async_trait]
impl Agent for RetrievalAgent {
    fn name(&self) -> &'static str {
        names::RETRIEVAL
    }

    fn accepts(&self, body: &MessageBody) -> bool {
        matches!(
            body,
            MessageBody::EmbeddingRequest(_) | MessageBody::RetrievalRequest(_)
        )
    }

    async fn handle(&self, message: Message, bus: Arc<MessageBus>) {
        match &message.body {
            MessageBody::EmbeddingRequest(request) => {
                info!(
                    "[{}] Creating embeddings for {} chunks of {}",
                    self.name(),
                    request.chunks.len(),
                    request.document_id
                );
                match self.embed_chunks(request).await {
                    Ok(chunk_count) => {
                        let body = MessageBody::EmbeddingsCreated(EmbeddingsCreated {
                            document_id: request.document_id.clone(),
                            chunk_count,
                        });
                        send(&bus, self.name(), names::COORDINATOR, &message.trace_id, body);
                    }
                    Err(error) => report_failure(
                        &bus,
                        self.name(),
                        &message.trace_id,
                        MessageBody::EmbeddingError,
                        error,
                        &request.document_id,
                    ),
                }
            }
            MessageBody::RetrievalRequest(request) => {
                info!("[{}] Searching for: {}", self.name(), request.query);
                match self.search(request).await {
                    Ok(result) => {
                        info!(
                            "[{}] Kept {} of {} candidate chunks",
                            self.name(),
                            result.chunks.len(),
                            result.total_results
                        );
                        let body = MessageBody::ContextResponse(ContextResponse {
                            result,
                            original_query: request.query.clone(),
                        });
                        send(&bus, self.name(), names::RESPONSE, &message.trace_id, body);
                    }
                    Err(error) => report_failure(
                        &bus,
                        self.name(),
                        &message.trace_id,
                        MessageBody::RetrievalError,
                        error,
                        &request.query,
                    ),
                }
            }
            _ => {}
        }
    }
}
