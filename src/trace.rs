// trace.rs

use crate::error::RagError;
use crate::message::{Message, MessageBody};
use crate::state::{TraceKind, TraceStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Correlates every message of one logical job. Never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    pub fn for_document(document_id: &str) -> Self {
        Self(format!("doc_{}_{}", document_id, Uuid::new_v4().simple()))
    }

    pub fn for_query() -> Self {
        Self(format!("query_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Everything the coordinator knows about one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub id: TraceId,
    pub kind: TraceKind,
    pub status: TraceStatus,
    /// Messages observed for this trace, in arrival order.
    pub messages: Vec<Message>,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    /// The error that ended the trace, if it failed or timed out.
    pub error: Option<RagError>,
}

impl Trace {
    fn new(id: TraceId, kind: TraceKind) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            status: TraceStatus::Started,
            messages: Vec::new(),
            started_at: now,
            last_updated_at: now,
            error: None,
        }
    }

    /// Status a message moves this trace to. Terminal statuses are sticky.
    fn next_status(&self, body: &MessageBody) -> TraceStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        match body {
            MessageBody::FinalResponse(_) => TraceStatus::Completed,
            MessageBody::EmbeddingsCreated(_) if self.kind == TraceKind::DocumentIngestion => {
                TraceStatus::Completed
            }
            body if body.is_error() => TraceStatus::Failed,
            _ => TraceStatus::InProgress,
        }
    }
}

/// How long finished traces are kept around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub max_traces: usize,
    pub max_age: Duration,
}

/// All traces owned by the coordinator, with bounded retention of finished ones.
#[derive(Debug)]
pub struct TraceRegistry {
    traces: HashMap<TraceId, Trace>,
    /// Start order, oldest first.
    order: VecDeque<TraceId>,
    retention: Retention,
}

impl TraceRegistry {
    pub fn new(retention: Retention) -> Self {
        Self {
            traces: HashMap::new(),
            order: VecDeque::new(),
            retention,
        }
    }

    /// Registers a new trace in the `Started` state and returns the ids of
    /// traces evicted to make room.
    pub fn start(&mut self, id: TraceId, kind: TraceKind) -> Vec<TraceId> {
        self.order.push_back(id.clone());
        self.traces.insert(id.clone(), Trace::new(id, kind));
        self.evict(Utc::now())
    }

    /// Appends a message to its trace and advances the trace status.
    ///
    /// Returns the resulting status, or `None` when the trace is unknown.
    pub fn record(&mut self, message: &Message) -> Option<TraceStatus> {
        let trace = self.traces.get_mut(&message.trace_id)?;
        let status = trace.next_status(&message.body);
        if status != trace.status {
            trace.status = status;
            if let Some(failure) = message.body.failure() {
                trace.error = Some(failure.error.clone());
            }
        }
        trace.messages.push(message.clone());
        trace.last_updated_at = Utc::now();
        Some(trace.status)
    }

    /// Marks a trace as timed out, unless it already reached a terminal state.
    pub fn mark_timed_out(&mut self, id: &TraceId, after: Duration) -> bool {
        self.finish(id, TraceStatus::TimedOut, RagError::Timeout(after))
    }

    /// Fails a trace from outside the message flow, unless it already reached a terminal state.
    pub fn mark_failed(&mut self, id: &TraceId, error: RagError) -> bool {
        self.finish(id, TraceStatus::Failed, error)
    }

    fn finish(&mut self, id: &TraceId, status: TraceStatus, error: RagError) -> bool {
        match self.traces.get_mut(id) {
            Some(trace) if !trace.status.is_terminal() => {
                trace.status = status;
                trace.error = Some(error);
                trace.last_updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &TraceId) -> Option<&Trace> {
        self.traces.get(id)
    }

    pub fn status(&self, id: &TraceId) -> Option<TraceStatus> {
        self.traces.get(id).map(|trace| trace.status)
    }

    /// Every retained trace, oldest first.
    pub fn all(&self) -> Vec<Trace> {
        self.order
            .iter()
            .filter_map(|id| self.traces.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Drops finished traces that are too old, then the oldest finished ones
    /// beyond the count limit. In-flight traces are never evicted.
    pub fn evict(&mut self, now: DateTime<Utc>) -> Vec<TraceId> {
        let max_age = chrono::Duration::from_std(self.retention.max_age)
            .unwrap_or(chrono::Duration::MAX);
        let mut evicted = Vec::new();

        let expired: Vec<TraceId> = self
            .order
            .iter()
            .filter(|id| {
                self.traces.get(*id).is_some_and(|trace| {
                    trace.status.is_terminal() && now - trace.last_updated_at > max_age
                })
            })
            .cloned()
            .collect();
        for id in expired {
            self.remove(&id);
            evicted.push(id);
        }

        let excess = self.traces.len().saturating_sub(self.retention.max_traces);
        if excess > 0 {
            let finished: Vec<TraceId> = self
                .order
                .iter()
                .filter(|id| {
                    self.traces
                        .get(*id)
                        .is_some_and(|trace| trace.status.is_terminal())
                })
                .take(excess)
                .cloned()
                .collect();
            for id in finished {
                self.remove(&id);
                evicted.push(id);
            }
        }

        evicted
    }

    fn remove(&mut self, id: &TraceId) {
        self.traces.remove(id);
        self.order.retain(|other| other != id);
    }
}
