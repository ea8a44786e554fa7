// error.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Every failure the pipeline can surface.
///
/// Agent-local failures travel inside error-typed messages, so the type is
/// serializable and cloneable: the coordinator hands the caller exactly the
/// error the failing agent produced.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum RagError {
    #[error("Document appears to be empty or too short to process")]
    EmptyDocument,

    #[error("Unsupported or malformed content: {0}")]
    UnsupportedOrMalformedContent(String),

    #[error("No chunks found for specified documents")]
    NoCandidates,

    #[error("Provider failure: {0}")]
    ProviderFailure(String),

    #[error("Processing timed out after {0:?}")]
    Timeout(Duration),

    #[error("{agent} has no handler for message type {message_type}")]
    UnknownMessageType { agent: String, message_type: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("A coordinator is already attached to this message bus")]
    CoordinatorAlreadyAttached,

    #[error("Query was abandoned by its caller before it settled")]
    Cancelled,
}

impl RagError {
    /// Builds a `ProviderFailure` from any displayable backend error.
    pub fn provider(err: impl std::fmt::Display) -> Self {
        RagError::ProviderFailure(err.to_string())
    }
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        RagError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_survives_json_round_trip() {
        let original = RagError::Timeout(Duration::from_secs(30));
        let json = serde_json::to_string(&original).unwrap();
        let back: RagError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_messages_are_human_readable() {
        assert_eq!(
            RagError::NoCandidates.to_string(),
            "No chunks found for specified documents"
        );
        let err = RagError::UnknownMessageType {
            agent: "IngestionAgent".to_string(),
            message_type: "RETRIEVAL_REQUEST".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "IngestionAgent has no handler for message type RETRIEVAL_REQUEST"
        );
    }
}
