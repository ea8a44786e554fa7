// coordinator.rs
use crate::agent;
use crate::bus::MessageBus;
use crate::config::Config;
use crate::document::LlmResponse;
use crate::error::RagError;
use crate::ingestion_agent::IngestionAgent;
use crate::message::{names, DocumentRequest, Message, MessageBody, RetrievalRequest};
use crate::provider::{EmbeddingProvider, GenerationProvider};
use crate::response_agent::ResponseAgent;
use crate::retrieval_agent::RetrievalAgent;
use crate::state::{TraceKind, TraceStatus};
use crate::trace::{Retention, Trace, TraceId, TraceRegistry};
use cli_log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

type Outcome = Result<LlmResponse, RagError>;

/// Called with a snapshot of a trace right after it reaches a terminal status.
pub type SettledHook = Arc<dyn Fn(&Trace) + Send + Sync>;

type SettledHooks = Arc<RwLock<Vec<SettledHook>>>;

/// Runs the hooks outside of any registry lock, so they may query the coordinator.
fn notify_settled(hooks: &SettledHooks, trace: &Trace) {
    let hooks: Vec<SettledHook> = hooks
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    for hook in &hooks {
        hook(trace);
    }
}

/// Subscriber name of the one-shot listener of a query trace.
pub fn listener_name(trace_id: &TraceId) -> String {
    format!("{}_{}", names::COORDINATOR, trace_id)
}

/// The caller side of one in-flight query. Settles at most once.
struct PendingQuery {
    trace_id: TraceId,
    slot: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl PendingQuery {
    fn new(trace_id: TraceId) -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let pending = Self {
            trace_id,
            slot: Mutex::new(Some(tx)),
        };
        (pending, rx)
    }

    /// Returns false when the query was already settled.
    fn settle(&self, outcome: Outcome) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                // The caller may have stopped waiting; the outcome is settled either way.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Settles from a terminal message of this trace. Other messages are ignored.
    fn observe(&self, message: &Message) -> bool {
        if message.trace_id != self.trace_id {
            return false;
        }
        match &message.body {
            MessageBody::FinalResponse(done) => self.settle(Ok(done.response.clone())),
            body => match body.failure() {
                Some(failure) => self.settle(Err(failure.error.clone())),
                None => false,
            },
        }
    }
}

/// Tears down an in-flight query, also when the caller drops its future early.
struct QueryGuard<'a> {
    coordinator: &'a Coordinator,
    pending: Arc<PendingQuery>,
    listener: String,
}

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.bus.unsubscribe(&self.listener);
        self.coordinator.abandon(&self.pending);
    }
}

/// Drives document ingestion and query answering over the message bus.
///
/// Clones share the bus and the trace registry.
#[derive(Clone)]
pub struct Coordinator {
    bus: Arc<MessageBus>,
    traces: Arc<Mutex<TraceRegistry>>,
    hooks: SettledHooks,
    config: Arc<Config>,
}

impl Coordinator {
    /// Attaches a coordinator and the three pipeline agents to `bus`.
    ///
    /// # Arguments
    /// * `config` - Validated before anything is registered.
    /// * `bus` - Must not have a coordinator yet.
    /// * `embedder` - Used by the retrieval agent for chunks and queries.
    /// * `generator` - Used by the response agent to write answers.
    ///
    /// # Returns
    /// * `Err(RagError::Config)` for an invalid configuration.
    /// * `Err(RagError::CoordinatorAlreadyAttached)` when the bus already has one.
    pub fn new(
        config: Config,
        bus: Arc<MessageBus>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self, RagError> {
        config.validate()?;

        let traces = Arc::new(Mutex::new(TraceRegistry::new(Retention {
            max_traces: config.orchestration.max_traces,
            max_age: config.orchestration.trace_max_age(),
        })));

        let hooks: SettledHooks = Arc::new(RwLock::new(Vec::new()));

        let registry = traces.clone();
        let observers = hooks.clone();
        let weak_bus = Arc::downgrade(&bus);
        let attached = bus.subscribe_exclusive(names::COORDINATOR, move |message: &Message| {
            let settled = {
                // Recording and relaying share one critical section with timeout
                // settlement, so a trace's status always matches its caller's outcome.
                let mut traces = registry.lock().unwrap_or_else(PoisonError::into_inner);
                let was_terminal = traces
                    .status(&message.trace_id)
                    .is_some_and(TraceStatus::is_terminal);
                let Some(status) = traces.record(message) else {
                    debug!(
                        "[Coordinator] {} for unknown trace {}",
                        message.kind(),
                        message.trace_id
                    );
                    return;
                };
                debug!(
                    "[Coordinator] {} {} -> {} (trace {} {})",
                    message.kind(),
                    message.sender,
                    message.receiver,
                    message.trace_id,
                    status
                );
                if let Some(bus) = weak_bus.upgrade() {
                    bus.deliver(&listener_name(&message.trace_id), message);
                }
                if status.is_terminal() && !was_terminal {
                    traces.get(&message.trace_id).cloned()
                } else {
                    None
                }
            };
            if let Some(trace) = settled {
                notify_settled(&observers, &trace);
            }
        });
        if !attached {
            return Err(RagError::CoordinatorAlreadyAttached);
        }

        agent::register(&bus, IngestionAgent::new(config.chunking.clone()));
        agent::register(&bus, RetrievalAgent::new(embedder));
        agent::register(&bus, ResponseAgent::new(generator));
        info!(
            "[Coordinator] Attached; agents registered: {}, {}, {}",
            names::INGESTION,
            names::RETRIEVAL,
            names::RESPONSE
        );

        Ok(Self {
            bus,
            traces,
            hooks,
            config: Arc::new(config),
        })
    }

    /// Registers `hook` to run once for every trace that reaches a terminal
    /// status, whether by message, deadline or abandonment.
    pub fn on_settled<F>(&self, hook: F)
    where
        F: Fn(&Trace) + Send + Sync + 'static,
    {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    fn lock_traces(&self) -> MutexGuard<'_, TraceRegistry> {
        self.traces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_trace(&self, trace_id: TraceId, kind: TraceKind) {
        let evicted = self.lock_traces().start(trace_id, kind);
        if !evicted.is_empty() {
            debug!("[Coordinator] Evicted {} finished traces", evicted.len());
        }
        for old in &evicted {
            self.bus.forget_trace(old);
        }
    }

    /// Starts ingesting a document and returns its trace id without waiting.
    ///
    /// Completion is observed through `trace_status`. The trace times out if it
    /// is still running after the ingestion deadline.
    pub fn process_document(
        &self,
        document_id: &str,
        content: &str,
        filename: &str,
        file_type: &str,
    ) -> TraceId {
        self.process_document_with_trace(
            TraceId::for_document(document_id),
            document_id,
            content,
            filename,
            file_type,
        )
    }

    /// Like `process_document`, under a trace id the caller created beforehand
    /// with `TraceId::for_document`.
    pub fn process_document_with_trace(
        &self,
        trace_id: TraceId,
        document_id: &str,
        content: &str,
        filename: &str,
        file_type: &str,
    ) -> TraceId {
        self.start_trace(trace_id.clone(), TraceKind::DocumentIngestion);
        info!(
            "[Coordinator] Starting document processing: {} (trace {})",
            filename, trace_id
        );

        let body = MessageBody::DocumentProcessRequest(DocumentRequest {
            document_id: document_id.to_string(),
            content: content.to_string(),
            filename: filename.to_string(),
            file_type: file_type.to_string(),
        });
        self.bus.publish(
            self.bus
                .create_message(names::COORDINATOR, names::INGESTION, &trace_id, body),
        );

        self.arm_ingestion_deadline(&trace_id);
        trace_id
    }

    fn arm_ingestion_deadline(&self, trace_id: &TraceId) {
        let deadline = self.config.orchestration.ingestion_timeout();
        let traces = Arc::downgrade(&self.traces);
        let hooks = self.hooks.clone();
        let trace_id = trace_id.clone();
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(deadline).await;
                    let Some(traces) = traces.upgrade() else {
                        return;
                    };
                    let timed_out = {
                        let mut traces = traces.lock().unwrap_or_else(PoisonError::into_inner);
                        if traces.mark_timed_out(&trace_id, deadline) {
                            traces.get(&trace_id).cloned()
                        } else {
                            None
                        }
                    };
                    if let Some(trace) = timed_out {
                        warn!(
                            "[Coordinator] Document trace {} timed out after {:?}",
                            trace_id, deadline
                        );
                        notify_settled(&hooks, &trace);
                    }
                });
            }
            Err(_) => warn!(
                "[Coordinator] No async runtime, trace {} has no ingestion deadline",
                trace_id
            ),
        }
    }

    /// Answers `query` from the chunks of `document_ids`.
    ///
    /// Settles exactly once: with the final response, with the error an agent
    /// reported for this trace, or with `RagError::Timeout` at the query deadline.
    pub async fn process_query(
        &self,
        query: &str,
        document_ids: &[String],
    ) -> Result<LlmResponse, RagError> {
        let trace_id = TraceId::for_query();
        self.start_trace(trace_id.clone(), TraceKind::QueryAnswering);
        info!("[Coordinator] Processing query: {} (trace {})", query, trace_id);

        let (pending, mut outcome) = PendingQuery::new(trace_id.clone());
        let pending = Arc::new(pending);
        let listener = listener_name(&trace_id);
        let observer = pending.clone();
        self.bus.subscribe(listener.clone(), move |message: &Message| {
            observer.observe(message);
        });
        let _guard = QueryGuard {
            coordinator: self,
            pending: pending.clone(),
            listener,
        };

        let body = MessageBody::RetrievalRequest(RetrievalRequest {
            query: query.to_string(),
            document_ids: document_ids.to_vec(),
            top_k: self.config.retrieval.top_k,
        });
        self.bus.publish(
            self.bus
                .create_message(names::COORDINATOR, names::RETRIEVAL, &trace_id, body),
        );

        let deadline = self.config.orchestration.query_timeout();
        let result = match tokio::time::timeout(deadline, &mut outcome).await {
            Ok(Ok(settled)) => settled,
            Ok(Err(_)) | Err(_) => self.expire(&pending, &mut outcome, deadline),
        };

        match &result {
            Ok(response) => info!(
                "[Coordinator] Query trace {} answered from {} sources",
                trace_id,
                response.sources.len()
            ),
            Err(error) => warn!("[Coordinator] Query trace {} failed: {}", trace_id, error),
        }
        result
    }

    /// Settles a query whose deadline elapsed, unless a terminal message won the race.
    fn expire(
        &self,
        pending: &PendingQuery,
        outcome: &mut oneshot::Receiver<Outcome>,
        deadline: Duration,
    ) -> Outcome {
        let timed_out = {
            let mut traces = self.lock_traces();
            if pending.settle(Err(RagError::Timeout(deadline)))
                && traces.mark_timed_out(&pending.trace_id, deadline)
            {
                traces.get(&pending.trace_id).cloned()
            } else {
                None
            }
        };
        if let Some(trace) = timed_out {
            notify_settled(&self.hooks, &trace);
        }
        outcome
            .try_recv()
            .unwrap_or(Err(RagError::Timeout(deadline)))
    }

    /// Fails a query its caller stopped waiting for. No-op once it has settled.
    fn abandon(&self, pending: &PendingQuery) {
        let abandoned = {
            let mut traces = self.lock_traces();
            if pending.settle(Err(RagError::Cancelled))
                && traces.mark_failed(&pending.trace_id, RagError::Cancelled)
            {
                traces.get(&pending.trace_id).cloned()
            } else {
                None
            }
        };
        if let Some(trace) = abandoned {
            warn!("[Coordinator] Query trace {} abandoned before it settled", trace.id);
            notify_settled(&self.hooks, &trace);
        }
    }

    pub fn trace_status(&self, trace_id: &TraceId) -> Option<Trace> {
        self.lock_traces().get(trace_id).cloned()
    }

    /// Every retained trace, oldest first.
    pub fn all_traces(&self) -> Vec<Trace> {
        self.lock_traces().all()
    }

    pub fn status(&self, trace_id: &TraceId) -> Option<TraceStatus> {
        self.lock_traces().status(trace_id)
    }

    /// Messages published under one trace, in publish order.
    pub fn history(&self, trace_id: &TraceId) -> Vec<Message> {
        self.bus.history(Some(trace_id))
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
