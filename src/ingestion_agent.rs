// ingestion_agent.rs
use crate::agent::{report_failure, send, Agent};
use crate::bus::MessageBus;
use crate::chunking::chunk_document;
use crate::config::ChunkingConfig;
use crate::message::{
    names, DocumentRequest, EmbeddingRequest, Message, MessageBody, ProcessingResult,
};
use async_trait::async_trait;
use chrono::Utc;
use cli_log::info;
use std::sync::Arc;

/// Splits submitted documents into chunks and hands them to retrieval.
pub struct IngestionAgent {
    config: ChunkingConfig,
}

impl IngestionAgent {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    fn process(&self, request: &DocumentRequest, message: &Message, bus: &MessageBus) {
        info!("[{}] Processing document: {}", self.name(), request.filename);

        let chunks = match chunk_document(
            &request.content,
            &request.file_type,
            &request.filename,
            &self.config,
        ) {
            Ok(chunks) => chunks,
            Err(error) => {
                report_failure(
                    bus,
                    self.name(),
                    &message.trace_id,
                    MessageBody::DocumentProcessError,
                    error,
                    &request.document_id,
                );
                return;
            }
        };

        info!(
            "[{}] {} split into {} chunks",
            self.name(),
            request.filename,
            chunks.len()
        );

        let processed = MessageBody::DocumentProcessed(ProcessingResult {
            document_id: request.document_id.clone(),
            total_chunks: chunks.len(),
            chunks: chunks.clone(),
            format: request.file_type.clone(),
            processed_at: Utc::now(),
        });
        send(bus, self.name(), names::COORDINATOR, &message.trace_id, processed);

        let embed = MessageBody::EmbeddingRequest(EmbeddingRequest {
            document_id: request.document_id.clone(),
            chunks,
        });
        send(bus, self.name(), names::RETRIEVAL, &message.trace_id, embed);
    }
}

#[async_trait]
impl Agent for IngestionAgent {
    fn name(&self) -> &'static str {
        names::INGESTION
    }

    fn accepts(&self, body: &MessageBody) -> bool {
        matches!(body, MessageBody::DocumentProcessRequest(_))
    }

    async fn handle(&self, message: Message, bus: Arc<MessageBus>) {
        if let MessageBody::DocumentProcessRequest(request) = &message.body {
            self.process(request, &message, &bus);
        }
    }
}
