// message.rs
use crate::document::{DocumentChunk, LlmResponse, RetrievalResult};
use crate::error::RagError;
use crate::trace::TraceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known agent names on the bus.
pub mod names {
    pub const COORDINATOR: &str = "CoordinatorAgent";
    pub const INGESTION: &str = "IngestionAgent";
    pub const RETRIEVAL: &str = "RetrievalAgent";
    pub const RESPONSE: &str = "LLMResponseAgent";
}

/// One hop of communication. Never mutated once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub trace_id: TraceId,
    pub timestamp: DateTime<Utc>,
    pub body: MessageBody,
}

impl Message {
    /// Builds a message with a fresh id stamped with the current time.
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        trace_id: TraceId,
        body: MessageBody,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: sender.into(),
            receiver: receiver.into(),
            trace_id,
            timestamp: Utc::now(),
            body,
        }
    }

    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub document_id: String,
    pub content: String,
    pub filename: String,
    pub file_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub document_id: String,
    pub chunks: Vec<DocumentChunk>,
    pub total_chunks: usize,
    pub format: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub document_id: String,
    pub chunks: Vec<DocumentChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsCreated {
    pub document_id: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub document_ids: Vec<String>,
    pub top_k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextResponse {
    pub result: RetrievalResult,
    pub original_query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub response: LlmResponse,
    pub original_query: String,
}

/// Payload of every error-typed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFailure {
    pub error: RagError,
    /// Document id or query text the failure is about.
    pub subject: String,
}

impl AgentFailure {
    pub fn new(error: RagError, subject: impl Into<String>) -> Self {
        Self {
            error,
            subject: subject.into(),
        }
    }

    pub fn reason(&self) -> String {
        self.error.to_string()
    }
}

/// Every message type exchanged by the agents, each with its own payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageBody {
    DocumentProcessRequest(DocumentRequest),
    DocumentProcessed(ProcessingResult),
    DocumentProcessError(AgentFailure),
    EmbeddingRequest(EmbeddingRequest),
    EmbeddingsCreated(EmbeddingsCreated),
    EmbeddingError(AgentFailure),
    RetrievalRequest(RetrievalRequest),
    ContextResponse(ContextResponse),
    RetrievalError(AgentFailure),
    FinalResponse(FinalResponse),
    #[serde(rename = "LLM_RESPONSE_ERROR")]
    LlmResponseError(AgentFailure),
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::DocumentProcessRequest(_) => "DOCUMENT_PROCESS_REQUEST",
            MessageBody::DocumentProcessed(_) => "DOCUMENT_PROCESSED",
            MessageBody::DocumentProcessError(_) => "DOCUMENT_PROCESS_ERROR",
            MessageBody::EmbeddingRequest(_) => "EMBEDDING_REQUEST",
            MessageBody::EmbeddingsCreated(_) => "EMBEDDINGS_CREATED",
            MessageBody::EmbeddingError(_) => "EMBEDDING_ERROR",
            MessageBody::RetrievalRequest(_) => "RETRIEVAL_REQUEST",
            MessageBody::ContextResponse(_) => "CONTEXT_RESPONSE",
            MessageBody::RetrievalError(_) => "RETRIEVAL_ERROR",
            MessageBody::FinalResponse(_) => "FINAL_RESPONSE",
            MessageBody::LlmResponseError(_) => "LLM_RESPONSE_ERROR",
        }
    }

    /// The failure carried by an error-typed message.
    pub fn failure(&self) -> Option<&AgentFailure> {
        match self {
            MessageBody::DocumentProcessError(failure)
            | MessageBody::EmbeddingError(failure)
            | MessageBody::RetrievalError(failure)
            | MessageBody::LlmResponseError(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.failure().is_some()
    }

    /// Final responses and errors end a trace's active phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageBody::FinalResponse(_)) || self.is_error()
    }
}
