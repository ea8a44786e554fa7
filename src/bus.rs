// bus.rs
use crate::message::{names, Message, MessageBody};
use crate::trace::TraceId;
use chrono::{DateTime, Utc};
use cli_log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Callback invoked synchronously for every message addressed to its subscriber name.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Publish/subscribe router keyed by agent name, with a full message history.
pub struct MessageBus {
    subscribers: RwLock<HashMap<String, Vec<Handler>>>,
    history: RwLock<Vec<Message>>,
    last_timestamp: Mutex<DateTime<Utc>>,
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = subscribers.keys().collect();
        names.sort();
        f.debug_struct("MessageBus")
            .field("subscribers", &names)
            .field("history_len", &self.history_len())
            .finish()
    }
}

impl MessageBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
            last_timestamp: Mutex::new(DateTime::<Utc>::MIN_UTC),
        })
    }

    /// Registers a handler for every message addressed to `name`.
    /// Several handlers may share a name; they run in registration order.
    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("[MessageBus] {} subscribed", name);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Registers `handler` only if nothing is subscribed under `name` yet.
    /// Returns false, leaving the bus untouched, when the name is taken.
    pub fn subscribe_exclusive<F>(&self, name: impl Into<String>, handler: F) -> bool
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let name = name.into();
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if subscribers.get(&name).is_some_and(|handlers| !handlers.is_empty()) {
            return false;
        }
        debug!("[MessageBus] {} subscribed exclusively", name);
        subscribers.insert(name, vec![Arc::new(handler)]);
        true
    }

    /// Removes every handler registered under `name`, returning how many there were.
    pub fn unsubscribe(&self, name: &str) -> usize {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map_or(0, |handlers| handlers.len())
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Records the message, then hands it to the receiver's handlers and,
    /// unless the coordinator is the receiver, to the coordinator's handlers.
    ///
    /// Handlers are invoked synchronously; whatever async work they start is not
    /// awaited. The return value is the number of handlers invoked.
    pub fn publish(&self, message: Message) -> usize {
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());

        let mut delivered = self.deliver(&message.receiver, &message);
        if delivered == 0 {
            warn!(
                "[MessageBus] No subscriber for {}: {} from {} recorded but undelivered (trace {})",
                message.receiver,
                message.kind(),
                message.sender,
                message.trace_id
            );
        }
        if message.receiver != names::COORDINATOR {
            delivered += self.deliver(names::COORDINATOR, &message);
        }
        delivered
    }

    /// Invokes the handlers registered under `name` without touching history.
    pub fn deliver(&self, name: &str, message: &Message) -> usize {
        // Snapshot so handlers can subscribe or publish without deadlocking.
        let handlers: Vec<Handler> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default();

        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    /// Factory for messages whose timestamps never go backwards.
    pub fn create_message(
        &self,
        sender: &str,
        receiver: &str,
        trace_id: &TraceId,
        body: MessageBody,
    ) -> Message {
        let mut message = Message::new(sender, receiver, trace_id.clone(), body);
        let mut last = self
            .last_timestamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if message.timestamp < *last {
            message.timestamp = *last;
        } else {
            *last = message.timestamp;
        }
        message
    }

    /// All recorded messages, or only those of one trace, in publish order.
    pub fn history(&self, trace_id: Option<&TraceId>) -> Vec<Message> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        match trace_id {
            Some(trace_id) => history
                .iter()
                .filter(|message| &message.trace_id == trace_id)
                .cloned()
                .collect(),
            None => history.clone(),
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drops the messages of an evicted trace.
    pub fn forget_trace(&self, trace_id: &TraceId) -> usize {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        let before = history.len();
        history.retain(|message| &message.trace_id != trace_id);
        before - history.len()
    }
}
