mod support;

use ragbus::document::DocumentStatus;
use ragbus::service::{DocumentUpload, RagService};
use ragbus::RagError;
use std::time::Duration;
use support::*;

fn upload(filename: &str, content: &str, file_type: &str) -> DocumentUpload {
    DocumentUpload {
        filename: filename.into(),
        content: content.into(),
        file_type: file_type.into(),
    }
}

async fn wait_until_settled(service: &RagService, document_id: &str) -> DocumentStatus {
    for _ in 0..400 {
        let status = service.document(document_id).map(|doc| doc.status);
        if let Some(status) = status {
            if status != DocumentStatus::Processing {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("document {} still processing", document_id);
}

#[tokio::test]
async fn uploaded_document_becomes_ready_and_answers_questions() {
    let service = RagService::new(offline_coordinator());
    let submission = service
        .submit_document(upload(
            "rust.md",
            "Rust guarantees memory safety through ownership and borrowing.",
            "text/markdown",
        ))
        .unwrap();
    assert_eq!(wait_until_settled(&service, &submission.document_id).await, DocumentStatus::Ready);

    let listed = service.documents();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].filename, "rust.md");
    assert_eq!(listed[0].trace_id, submission.trace_id);

    let response = service
        .submit_query("How does Rust guarantee memory safety?", None)
        .await
        .unwrap();
    assert_eq!(response.sources, vec!["rust.md"]);
    assert!(response.answer.contains("ownership"));
}

#[tokio::test]
async fn broken_document_ends_in_error() {
    let service = RagService::new(offline_coordinator());
    let submission = service
        .submit_document(upload("empty.csv", "just,a,header", "text/csv"))
        .unwrap();
    assert_eq!(wait_until_settled(&service, &submission.document_id).await, DocumentStatus::Error);

    let trace = service
        .coordinator()
        .trace_status(&submission.trace_id)
        .unwrap();
    assert!(matches!(trace.error, Some(RagError::UnsupportedOrMalformedContent(_))));
}

#[tokio::test]
async fn oversized_document_is_rejected_before_ingestion() {
    let mut config = offline_config();
    config.documents.max_document_bytes = 16;
    let service = RagService::new(coordinator_with(
        config,
        std::sync::Arc::new(ragbus::provider::HashEmbedder::new(8)),
        std::sync::Arc::new(ragbus::provider::ExtractiveGenerator),
    ));

    let err = service
        .submit_document(upload("big.txt", "this is definitely more than sixteen bytes", "text/plain"))
        .unwrap_err();
    assert!(matches!(err, RagError::UnsupportedOrMalformedContent(_)));
    assert!(service.documents().is_empty());
    assert!(service.coordinator().all_traces().is_empty());
}

#[tokio::test]
async fn blank_query_is_invalid() {
    let service = RagService::new(offline_coordinator());
    assert!(matches!(
        service.submit_query("   ", None).await,
        Err(RagError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn query_without_ready_documents_gets_canned_answer() {
    let service = RagService::new(offline_coordinator());
    let response = service
        .submit_query("anything?", Some(&["unknown".to_string()]))
        .await
        .unwrap();

    assert_eq!(response.answer, RagService::NO_DOCUMENTS_ANSWER);
    assert_eq!(response.confidence, 0.0);
    assert!(response.sources.is_empty());
    // The pipeline never ran.
    assert!(service.coordinator().all_traces().is_empty());
}

#[tokio::test]
async fn query_is_restricted_to_requested_documents() {
    let service = RagService::new(offline_coordinator());
    let apples = service
        .submit_document(upload("apples.txt", "Apples grow in orchards in autumn.", "text/plain"))
        .unwrap();
    let boats = service
        .submit_document(upload("boats.txt", "Boats sail across the harbour at dawn.", "text/plain"))
        .unwrap();
    wait_until_settled(&service, &apples.document_id).await;
    wait_until_settled(&service, &boats.document_id).await;

    let response = service
        .submit_query("Where do apples grow?", Some(&[boats.document_id.clone()]))
        .await
        .unwrap();
    assert_eq!(response.sources, vec!["boats.txt"]);
}

#[tokio::test]
async fn document_stays_ready_after_its_trace_is_evicted() {
    let mut config = offline_config();
    config.orchestration.max_traces = 1;
    let service = RagService::new(coordinator_with(
        config,
        std::sync::Arc::new(ragbus::provider::HashEmbedder::new(128)),
        std::sync::Arc::new(ragbus::provider::ExtractiveGenerator),
    ));

    let apples = service
        .submit_document(upload("apples.txt", "Apples grow in orchards in autumn.", "text/plain"))
        .unwrap();
    // Wait on the trace only; nobody looks at the document in between.
    wait_for_terminal(service.coordinator(), &apples.trace_id).await;

    let boats = service
        .submit_document(upload("boats.txt", "Boats sail across the harbour at dawn.", "text/plain"))
        .unwrap();
    assert_eq!(service.coordinator().status(&apples.trace_id), None);
    assert_eq!(
        service.document(&apples.document_id).map(|doc| doc.status),
        Some(DocumentStatus::Ready)
    );

    wait_until_settled(&service, &boats.document_id).await;
    let response = service
        .submit_query("Where do apples grow?", Some(&[apples.document_id.clone()]))
        .await
        .unwrap();
    assert_eq!(response.sources, vec!["apples.txt"]);
}
