// document.rs

use crate::trace::TraceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Name of the originating document.
    pub source: String,
    /// Human label, e.g. "Row 3" or "Chunk 2".
    pub section: String,
    pub page: Option<u32>,
}

/// A contiguous slice of a document, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Present only once the retrieval worker has embedded the chunk.
    pub embedding: Option<Vec<f32>>,
}

impl DocumentChunk {
    pub fn new(id: String, content: String, source: &str, section: String) -> Self {
        Self {
            id,
            content,
            metadata: ChunkMetadata {
                source: source.to_string(),
                section,
                page: None,
            },
            embedding: None,
        }
    }
}

/// Ranked chunks for one query, best first.
///
/// `chunks` and `scores` are parallel, no longer than the requested top-k,
/// and scores never increase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub chunks: Vec<DocumentChunk>,
    pub scores: Vec<f32>,
    /// Candidate pool size before truncation.
    pub total_results: usize,
}

/// The answer handed back to the caller of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub answer: String,
    pub sources: Vec<String>,
    /// 0 to 100.
    pub confidence: f32,
    pub reasoning: String,
}

/// Processing state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Processing,
    Ready,
    Error,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let status_str = match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        };
        write!(f, "{}", status_str)
    }
}

/// A document as submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub size_bytes: usize,
    pub uploaded_at: DateTime<Utc>,
    /// Ingestion trace driving this document.
    pub trace_id: TraceId,
    pub status: DocumentStatus,
}

/// Keeps track of submitted documents and their processing status.
#[derive(Debug, Default)]
pub struct DocumentStore {
    /// Documents keyed by id.
    documents: HashMap<String, StoredDocument>,

    /// Insertion order, so listings are stable.
    order: Vec<String>,
}

impl DocumentStore {
    /// Creates a new, empty document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a freshly submitted document in the `Processing` state.
    ///
    /// # Arguments
    /// * `document` - The document to store. An existing entry with the same id is replaced.
    pub fn store(&mut self, document: StoredDocument) {
        if !self.documents.contains_key(&document.id) {
            self.order.push(document.id.clone());
        }
        self.documents.insert(document.id.clone(), document);
    }

    /// Retrieves a document by id.
    pub fn get(&self, id: &str) -> Option<&StoredDocument> {
        self.documents.get(id)
    }

    /// Updates the status of a document.
    ///
    /// # Returns
    /// * `true` if the document exists.
    pub fn update_status(&mut self, id: &str, status: DocumentStatus) -> bool {
        match self.documents.get_mut(id) {
            Some(doc) => {
                doc.status = status;
                true
            }
            None => false,
        }
    }

    /// Updates the status of the document driven by `trace_id`.
    ///
    /// # Returns
    /// * The id of the updated document, if one is driven by that trace.
    pub fn update_status_for_trace(
        &mut self,
        trace_id: &TraceId,
        status: DocumentStatus,
    ) -> Option<String> {
        let doc = self
            .documents
            .values_mut()
            .find(|doc| &doc.trace_id == trace_id)?;
        doc.status = status;
        Some(doc.id.clone())
    }

    /// All documents, in submission order.
    pub fn all(&self) -> Vec<StoredDocument> {
        self.order
            .iter()
            .filter_map(|id| self.documents.get(id))
            .cloned()
            .collect()
    }

    /// Documents currently in the given status, in submission order.
    pub fn by_status(&self, status: DocumentStatus) -> Vec<StoredDocument> {
        self.all()
            .into_iter()
            .filter(|doc| doc.status == status)
            .collect()
    }
}
