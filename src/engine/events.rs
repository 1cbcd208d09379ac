use std::sync::Arc;

use parking_lot::RwLock;

/// Event emitted by an engine while it loads or runs a command.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// One line of engine log output.
    Log(String),
    /// Completion fraction of the running command, nominally `0.0..=1.0`.
    Progress(f64),
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Log(_) => EventKind::Log,
            Self::Progress(_) => EventKind::Progress,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Log,
    Progress,
}

pub type EventHandler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Subscription registry shared by engine implementations.
///
/// There is no unsubscribe path; callers that must not register twice go through
/// [`EngineHandle`](super::EngineHandle).
#[derive(Default)]
pub struct EventHub {
    handlers: RwLock<Vec<(EventKind, EventHandler)>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.write().push((kind, handler));
    }

    pub fn emit(&self, event: &EngineEvent) {
        let kind = event.kind();
        // Clone out so handlers may call back into the hub.
        let matching: Vec<EventHandler> = self
            .handlers
            .read()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in matching {
            handler(event);
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("log_handlers", &self.handler_count(EventKind::Log))
            .field("progress_handlers", &self.handler_count(EventKind::Progress))
            .finish()
    }
}
