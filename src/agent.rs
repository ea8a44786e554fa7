// agent.rs
use crate::bus::MessageBus;
use crate::error::RagError;
use crate::message::{names, AgentFailure, Message, MessageBody};
use crate::trace::TraceId;
use async_trait::async_trait;
use cli_log::{debug, error, warn};
use std::sync::Arc;
use tokio::runtime::Handle;

/// A named worker on the bus.
///
/// `handle` must end by publishing exactly one success continuation, exactly one
/// error to the coordinator, or (for ingestion) a result to the coordinator plus
/// a continuation to the next agent.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Message types this agent reacts to. Anything else is ignored.
    fn accepts(&self, body: &MessageBody) -> bool;

    async fn handle(&self, message: Message, bus: Arc<MessageBus>);
}

/// Subscribes `agent` to the bus under its name and returns a shared handle to it.
///
/// Accepted messages are handled on a spawned task, so `publish` never waits for
/// the agent's work. The subscription holds the bus weakly.
pub fn register<A: Agent>(bus: &Arc<MessageBus>, agent: A) -> Arc<A> {
    let agent = Arc::new(agent);
    let worker = agent.clone();
    let weak_bus = Arc::downgrade(bus);

    bus.subscribe(agent.name(), move |message: &Message| {
        if !worker.accepts(&message.body) {
            let ignored = RagError::UnknownMessageType {
                agent: worker.name().to_string(),
                message_type: message.kind().to_string(),
            };
            debug!("[{}] Ignored: {}", worker.name(), ignored);
            return;
        }
        let Some(bus) = weak_bus.upgrade() else {
            return;
        };
        match Handle::try_current() {
            Ok(runtime) => {
                let worker = worker.clone();
                let message = message.clone();
                runtime.spawn(async move {
                    worker.handle(message, bus).await;
                });
            }
            Err(_) => warn!(
                "[{}] No async runtime, {} for trace {} left unhandled",
                worker.name(),
                message.kind(),
                message.trace_id
            ),
        }
    });

    agent
}

/// Publishes a continuation of `trace_id` from `sender` to `receiver`.
pub fn send(bus: &MessageBus, sender: &str, receiver: &str, trace_id: &TraceId, body: MessageBody) {
    bus.publish(bus.create_message(sender, receiver, trace_id, body));
}

/// Reports a failure of `sender` to the coordinator.
///
/// # Arguments
/// * `kind` - The error variant matching the failed step, e.g. `MessageBody::RetrievalError`.
/// * `subject` - Document id or query text the failure is about.
pub fn report_failure(
    bus: &MessageBus,
    sender: &str,
    trace_id: &TraceId,
    kind: fn(AgentFailure) -> MessageBody,
    error: RagError,
    subject: &str,
) {
    error!("[{}] {} failed for trace {}: {}", sender, subject, trace_id, error);
    send(
        bus,
        sender,
        names::COORDINATOR,
        trace_id,
        kind(AgentFailure::new(error, subject)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{EmbeddingsCreated, RetrievalRequest};
    use std::sync::Mutex;

    /// Acknowledges retrieval requests with an EMBEDDINGS_CREATED to the coordinator.
    struct Echo {
        handled: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Agent for Echo {
        fn name(&self) -> &'static str {
            names::RETRIEVAL
        }

        fn accepts(&self, body: &MessageBody) -> bool {
            matches!(body, MessageBody::RetrievalRequest(_))
        }

        async fn handle(&self, message: Message, bus: Arc<MessageBus>) {
            self.handled.lock().unwrap().push(message.id.clone());
            let body = MessageBody::EmbeddingsCreated(EmbeddingsCreated {
                document_id: "d".into(),
                chunk_count: 0,
            });
            send(&bus, self.name(), names::COORDINATOR, &message.trace_id, body);
        }
    }

    fn request() -> MessageBody {
        MessageBody::RetrievalRequest(RetrievalRequest {
            query: "q".into(),
            document_ids: vec![],
            top_k: 1,
        })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_registered_agent_handles_accepted_messages() {
        let bus = MessageBus::new();
        let agent = register(&bus, Echo { handled: Mutex::new(Vec::new()) });
        let trace = TraceId::for_query();

        bus.publish(bus.create_message(names::COORDINATOR, names::RETRIEVAL, &trace, request()));
        settle().await;

        assert_eq!(agent.handled.lock().unwrap().len(), 1);
        let kinds: Vec<&str> = bus.history(Some(&trace)).iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, vec!["RETRIEVAL_REQUEST", "EMBEDDINGS_CREATED"]);
    }

    #[tokio::test]
    async fn test_unaccepted_messages_are_ignored() {
        let bus = MessageBus::new();
        let agent = register(&bus, Echo { handled: Mutex::new(Vec::new()) });
        let trace = TraceId::for_query();
        let body = MessageBody::RetrievalError(AgentFailure::new(RagError::NoCandidates, "q"));

        bus.publish(bus.create_message(names::COORDINATOR, names::RETRIEVAL, &trace, body));
        settle().await;

        assert!(agent.handled.lock().unwrap().is_empty());
        assert_eq!(bus.history(Some(&trace)).len(), 1);
    }

    #[test]
    fn test_without_runtime_nothing_panics() {
        let bus = MessageBus::new();
        let agent = register(&bus, Echo { handled: Mutex::new(Vec::new()) });
        let trace = TraceId::for_query();
        assert_eq!(
            bus.publish(bus.create_message(names::COORDINATOR, names::RETRIEVAL, &trace, request())),
            1
        );
        assert!(agent.handled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_failure_reaches_coordinator() {
        let bus = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(names::COORDINATOR, move |m: &Message| {
            sink.lock().unwrap().push(m.body.clone());
        });
        let trace = TraceId::for_query();
        report_failure(
            &bus,
            names::RESPONSE,
            &trace,
            MessageBody::LlmResponseError,
            RagError::ProviderFailure("down".into()),
            "q",
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].failure().map(|f| f.error.clone()),
            Some(RagError::ProviderFailure("down".into()))
        );
    }
}
