//! Message bus seam.
//!
//! The bus transport itself lives elsewhere; this module defines the message
//! shape, the [`MessageBus`] trait that components depend on, and
//! [`LocalBus`], an in-process implementation that dispatches synchronously.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// A message travelling over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Topic the message is published on.
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub data: Value,
    /// Routing metadata such as `source` and `destination`.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl Message {
    pub fn new(msg_type: impl Into<String>, data: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
            context: Map::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Reply addressed back to the sender of this message.
    ///
    /// The reply is published on `<type>.response` with `source` and
    /// `destination` swapped.
    pub fn response(&self, data: Value) -> Message {
        let mut context = self.context.clone();
        let source = context.shift_remove("source");
        let destination = context.shift_remove("destination");
        if let Some(destination) = destination {
            context.insert("source".to_string(), destination);
        }
        if let Some(source) = source {
            context.insert("destination".to_string(), source);
        }
        Message {
            msg_type: format!("{}.response", self.msg_type),
            data,
            context,
        }
    }
}

/// Callback invoked for each message on a subscribed topic.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Publish/subscribe capability required by bus-aware components.
pub trait MessageBus: Send + Sync {
    /// Register `handler` for messages of type `topic`.
    fn on(&self, topic: &str, handler: Handler);

    /// Publish a message.
    fn emit(&self, message: Message);
}

/// In-process bus that calls handlers on the emitting thread.
///
/// Handlers may emit further messages; the registry lock is not held while
/// they run.
#[derive(Default)]
pub struct LocalBus {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers registered for `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers
            .lock()
            .map(|h| h.get(topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl MessageBus for LocalBus {
    fn on(&self, topic: &str, handler: Handler) {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.entry(topic.to_string()).or_default().push(handler);
    }

    fn emit(&self, message: Message) {
        let targets: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers.get(&message.msg_type).cloned().unwrap_or_default()
        };
        trace!(topic = %message.msg_type, handlers = targets.len(), "Dispatching bus message");
        for handler in targets {
            handler(&message);
        }
    }
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics: Vec<String> = self
            .handlers
            .lock()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("LocalBus").field("topics", &topics).finish()
    }
}
