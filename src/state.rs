use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the lifecycle states a trace moves through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TraceStatus {
    /// The trace exists but the coordinator has not observed any of its messages yet.
    Started,

    /// At least one message bearing the trace id has been observed.
    InProgress,

    /// The job produced its final result.
    Completed,

    /// An agent reported an error for this trace.
    Failed,

    /// No terminal message arrived before the deadline.
    TimedOut,
}

impl TraceStatus {
    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TraceStatus::Completed | TraceStatus::Failed | TraceStatus::TimedOut
        )
    }
}

impl fmt::Display for TraceStatus {
    /// Converts a `TraceStatus` into a human-readable string.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let status_str = match self {
            TraceStatus::Started => "started",
            TraceStatus::InProgress => "in-progress",
            TraceStatus::Completed => "completed",
            TraceStatus::Failed => "failed",
            TraceStatus::TimedOut => "timed-out",
        };
        write!(f, "{}", status_str)
    }
}

/// The two long-running jobs the coordinator knows how to drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TraceKind {
    DocumentIngestion,
    QueryAnswering,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind_str = match self {
            TraceKind::DocumentIngestion => "document-ingestion",
            TraceKind::QueryAnswering => "query-answering",
        };
        write!(f, "{}", kind_str)
    }
}

#[test]
fn test_terminal_states() {
    assert!(!TraceStatus::Started.is_terminal());
    assert!(!TraceStatus::InProgress.is_terminal());
    assert!(TraceStatus::Completed.is_terminal());
    assert!(TraceStatus::Failed.is_terminal());
    assert!(TraceStatus::TimedOut.is_terminal());
}

#[test]
fn test_display() {
    assert_eq!(TraceStatus::TimedOut.to_string(), "timed-out");
    assert_eq!(TraceKind::QueryAnswering.to_string(), "query-answering");
}
