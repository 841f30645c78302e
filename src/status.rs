//! Process lifecycle tracking with bus-driven liveness and readiness probes.
//!
//! A [`ProcessStatus`] holds the current [`ProcessState`] in an atomic so that
//! bus handlers running on a dispatch thread can read it while the host
//! process drives transitions from its own thread. A reader may observe a
//! value one transition behind; no stronger ordering is provided.

use crate::bus::{Message, MessageBus};
use serde_json::json;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "mycroft";

/// Namespace of the legacy `all_loaded` topic, fixed for compatibility.
pub const LEGACY_NAMESPACE: &str = "mycroft";

/// Lifecycle states, ordered by wire value.
///
/// ERROR sits below ALIVE and READY, so a process in ERROR is neither alive
/// nor ready under the at-least comparisons used by the probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ProcessState {
    NotStarted = 0,
    Started = 1,
    Error = 2,
    Stopping = 3,
    Alive = 4,
    Ready = 5,
}

impl ProcessState {
    /// Decode a wire value. Unknown values map to `NotStarted`.
    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => ProcessState::Started,
            2 => ProcessState::Error,
            3 => ProcessState::Stopping,
            4 => ProcessState::Alive,
            5 => ProcessState::Ready,
            _ => ProcessState::NotStarted,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::NotStarted => write!(f, "not_started"),
            ProcessState::Started => write!(f, "started"),
            ProcessState::Error => write!(f, "error"),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Alive => write!(f, "alive"),
            ProcessState::Ready => write!(f, "ready"),
        }
    }
}

/// Shared, atomically updated state cell.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ProcessState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    fn get(&self) -> ProcessState {
        ProcessState::from_u8(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, state: ProcessState) {
        self.0.store(state.as_u8(), Ordering::Relaxed);
    }

    fn is_alive(&self) -> bool {
        self.get() >= ProcessState::Alive
    }

    fn is_ready(&self) -> bool {
        self.get() >= ProcessState::Ready
    }
}

pub type Callback = Box<dyn Fn() + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Optional hooks fired by the matching transition setter.
#[derive(Default)]
pub struct StatusCallbacks {
    pub on_started: Option<Callback>,
    pub on_alive: Option<Callback>,
    pub on_ready: Option<Callback>,
    pub on_error: Option<ErrorCallback>,
    pub on_stopping: Option<Callback>,
}

impl StatusCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_started(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_started = Some(Box::new(f));
        self
    }

    pub fn on_alive(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_alive = Some(Box::new(f));
        self
    }

    pub fn on_ready(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_ready = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_stopping(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stopping = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for StatusCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCallbacks")
            .field("on_started", &self.on_started.is_some())
            .field("on_alive", &self.on_alive.is_some())
            .field("on_ready", &self.on_ready.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_stopping", &self.on_stopping.is_some())
            .finish()
    }
}

/// Lifecycle tracker for one named process.
pub struct ProcessStatus {
    name: String,
    namespace: String,
    state: Arc<StateCell>,
    callbacks: StatusCallbacks,
    bus: Option<Arc<dyn MessageBus>>,
}

impl ProcessStatus {
    /// New tracker in `NotStarted` under the default namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            state: Arc::new(StateCell::new(ProcessState::NotStarted)),
            callbacks: StatusCallbacks::default(),
            bus: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_callbacks(mut self, callbacks: StatusCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn state(&self) -> ProcessState {
        self.state.get()
    }

    pub fn is_bound(&self) -> bool {
        self.bus.is_some()
    }

    /// `<namespace>.<name>.is_alive`
    pub fn alive_topic(&self) -> String {
        format!("{}.{}.is_alive", self.namespace, self.name)
    }

    /// `<namespace>.<name>.is_ready`
    pub fn ready_topic(&self) -> String {
        format!("{}.{}.is_ready", self.namespace, self.name)
    }

    /// `mycroft.<name>.all_loaded`, independent of the namespace.
    pub fn legacy_ready_topic(&self) -> String {
        format!("{}.{}.all_loaded", LEGACY_NAMESPACE, self.name)
    }

    /// Attach a bus and answer liveness and readiness queries on it.
    ///
    /// Handlers hold only a weak reference to the bus, so the registration
    /// does not keep the bus alive.
    pub fn bind(&mut self, bus: Arc<dyn MessageBus>) {
        let weak = Arc::downgrade(&bus);

        let state = Arc::clone(&self.state);
        let reply_bus = weak.clone();
        bus.on(
            &self.alive_topic(),
            Arc::new(move |message: &Message| reply(&reply_bus, message, state.is_alive())),
        );

        for topic in [self.ready_topic(), self.legacy_ready_topic()] {
            let state = Arc::clone(&self.state);
            let reply_bus = weak.clone();
            bus.on(
                &topic,
                Arc::new(move |message: &Message| reply(&reply_bus, message, state.is_ready())),
            );
        }

        debug!(process = %self.name, namespace = %self.namespace, "Bound process status to bus");
        self.bus = Some(bus);
    }

    /// Answer a liveness query on the bound bus.
    pub fn check_alive(&self, message: &Message) {
        self.answer(message, self.is_alive());
    }

    /// Answer a readiness query on the bound bus.
    pub fn check_ready(&self, message: &Message) {
        self.answer(message, self.is_ready());
    }

    fn answer(&self, message: &Message, status: bool) {
        match &self.bus {
            Some(bus) => bus.emit(message.response(json!({ "status": status }))),
            None => warn!(
                process = %self.name,
                topic = %message.msg_type,
                "Status query before bus bind, not answering"
            ),
        }
    }

    /// True iff the state is at least `Alive`.
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// True iff the state is at least `Ready`.
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn set_started(&self) {
        self.transition(ProcessState::Started);
        if let Some(cb) = &self.callbacks.on_started {
            cb();
        }
    }

    pub fn set_alive(&self) {
        self.transition(ProcessState::Alive);
        if let Some(cb) = &self.callbacks.on_alive {
            cb();
        }
    }

    pub fn set_ready(&self) {
        self.transition(ProcessState::Ready);
        if let Some(cb) = &self.callbacks.on_ready {
            cb();
        }
    }

    pub fn set_stopping(&self) {
        self.transition(ProcessState::Stopping);
        if let Some(cb) = &self.callbacks.on_stopping {
            cb();
        }
    }

    /// Enter `Error` and pass `err` to the error callback.
    pub fn set_error(&self, err: &str) {
        self.transition(ProcessState::Error);
        if !err.is_empty() {
            error!(process = %self.name, error = %err, "Process reported an error");
        }
        if let Some(cb) = &self.callbacks.on_error {
            cb(err);
        }
    }

    fn transition(&self, state: ProcessState) {
        self.state.set(state);
        info!(
            process = %self.name,
            namespace = %self.namespace,
            state = %state,
            "Process state changed"
        );
    }
}

impl std::fmt::Debug for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessStatus")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("state", &self.state.get())
            .field("callbacks", &self.callbacks)
            .field("bound", &self.bus.is_some())
            .finish()
    }
}

fn reply(bus: &Weak<dyn MessageBus>, message: &Message, status: bool) {
    let Some(bus) = bus.upgrade() else {
        return;
    };
    debug!(topic = %message.msg_type, status, "Answering status query");
    bus.emit(message.response(json!({ "status": status })));
}
