// service.rs
//! Caller-facing job API: submit documents, ask questions, list what is loaded.

use crate::config::DocumentLimits;
use crate::coordinator::Coordinator;
use crate::document::{DocumentStatus, DocumentStore, LlmResponse, StoredDocument};
use crate::error::RagError;
use crate::state::{TraceKind, TraceStatus};
use crate::trace::{Trace, TraceId};
use chrono::Utc;
use cli_log::info;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// A document handed in by a caller, text already extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub filename: String,
    pub content: String,
    pub file_type: String,
}

/// Identifiers of an accepted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub document_id: String,
    pub trace_id: TraceId,
}

pub struct RagService {
    coordinator: Coordinator,
    documents: Arc<Mutex<DocumentStore>>,
    limits: DocumentLimits,
}

impl RagService {
    pub const NO_DOCUMENTS_ANSWER: &'static str =
        "No documents are available yet. Please upload some documents first.";

    pub fn new(coordinator: Coordinator) -> Self {
        let limits = coordinator.config().documents.clone();
        let documents = Arc::new(Mutex::new(DocumentStore::new()));

        // Statuses follow their ingestion traces as soon as those settle, so a
        // document stays correct after its trace has been evicted.
        let store = Arc::downgrade(&documents);
        coordinator.on_settled(move |trace: &Trace| {
            if trace.kind != TraceKind::DocumentIngestion {
                return;
            }
            let Some(store) = store.upgrade() else {
                return;
            };
            let status = match trace.status {
                TraceStatus::Completed => DocumentStatus::Ready,
                _ => DocumentStatus::Error,
            };
            let updated = store
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .update_status_for_trace(&trace.id, status);
            if let Some(document_id) = updated {
                info!("[RagService] Document {} is now {}", document_id, status);
            }
        });

        Self {
            coordinator,
            documents,
            limits,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    fn store(&self) -> MutexGuard<'_, DocumentStore> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accepts a document and starts ingesting it in the background.
    ///
    /// # Returns
    /// * `Ok(Submission)` with the new document id and its ingestion trace.
    /// * `Err(RagError::UnsupportedOrMalformedContent)` when the content exceeds the size limit.
    pub fn submit_document(&self, upload: DocumentUpload) -> Result<Submission, RagError> {
        let size_bytes = upload.content.len();
        if size_bytes > self.limits.max_document_bytes {
            return Err(RagError::UnsupportedOrMalformedContent(format!(
                "{} is {} bytes, the limit is {}",
                upload.filename, size_bytes, self.limits.max_document_bytes
            )));
        }

        let document_id = Uuid::new_v4().to_string();
        let trace_id = TraceId::for_document(&document_id);
        // Stored before ingestion starts, so the settlement hook always finds it.
        self.store().store(StoredDocument {
            id: document_id.clone(),
            filename: upload.filename.clone(),
            file_type: upload.file_type.clone(),
            size_bytes,
            uploaded_at: Utc::now(),
            trace_id: trace_id.clone(),
            status: DocumentStatus::Processing,
        });
        self.coordinator.process_document_with_trace(
            trace_id.clone(),
            &document_id,
            &upload.content,
            &upload.filename,
            &upload.file_type,
        );

        Ok(Submission {
            document_id,
            trace_id,
        })
    }

    /// All submitted documents with their current status, in submission order.
    pub fn documents(&self) -> Vec<StoredDocument> {
        self.store().all()
    }

    pub fn document(&self, document_id: &str) -> Option<StoredDocument> {
        self.store().get(document_id).cloned()
    }

    /// Answers a question from the ready documents.
    ///
    /// # Arguments
    /// * `query` - The question; must not be blank.
    /// * `document_ids` - Restricts the search; `None` searches every ready document.
    ///   Ids of documents that are not ready are skipped.
    pub async fn submit_query(
        &self,
        query: &str,
        document_ids: Option<&[String]>,
    ) -> Result<LlmResponse, RagError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidRequest("query must not be empty".into()));
        }

        let ready: Vec<String> = {
            let store = self.store();
            match document_ids {
                Some(ids) => ids
                    .iter()
                    .filter(|id| {
                        store
                            .get(id)
                            .is_some_and(|doc| doc.status == DocumentStatus::Ready)
                    })
                    .cloned()
                    .collect(),
                None => store
                    .by_status(DocumentStatus::Ready)
                    .into_iter()
                    .map(|doc| doc.id)
                    .collect(),
            }
        };

        if ready.is_empty() {
            info!("[RagService] No ready documents for: {}", query);
            return Ok(LlmResponse {
                answer: Self::NO_DOCUMENTS_ANSWER.to_string(),
                sources: Vec::new(),
                confidence: 0.0,
                reasoning: "No documents have been processed yet".to_string(),
            });
        }

        self.coordinator.process_query(query, &ready).await
    }
}
