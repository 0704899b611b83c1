//! Session lifecycle events and a small publish/subscribe bus

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::error;

/// Something observable that happened to a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connecting,
    Connected,
    /// The session left Connected or Connecting; `reason` is human readable
    Disconnected { reason: String },
    /// A retry is about to be made
    Reconnecting { attempt: u32, max_attempts: u32 },
    /// Terminal: no more retries until `connect()` is called again
    ReconnectExhausted { attempts: u32 },
    /// Server-initiated notification
    Notification { method: String, params: Value },
    /// Server-info announcement from the event stream
    ServerInfo(Value),
}

/// Discriminant used to subscribe to one kind of event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    ReconnectExhausted,
    Notification,
    ServerInfo,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Connecting => EventKind::Connecting,
            SessionEvent::Connected => EventKind::Connected,
            SessionEvent::Disconnected { .. } => EventKind::Disconnected,
            SessionEvent::Reconnecting { .. } => EventKind::Reconnecting,
            SessionEvent::ReconnectExhausted { .. } => EventKind::ReconnectExhausted,
            SessionEvent::Notification { .. } => EventKind::Notification,
            SessionEvent::ServerInfo(_) => EventKind::ServerInfo,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type EventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    handler: EventHandler,
}

/// Synchronous event fan-out.
///
/// Handlers run on the emitting task, in registration order. A handler that
/// panics is logged and skipped; the rest still run.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one kind of event
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.add(Some(kind), Arc::new(handler))
    }

    /// Register a handler for every event
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(handler))
    }

    /// Remove a handler. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    pub fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        // Snapshot so handlers may subscribe or unsubscribe while running
        let handlers: Vec<EventHandler> = self
            .lock()
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
            .map(|s| s.handler.clone())
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("Event handler panicked while handling {:?}", kind);
            }
        }
    }

    fn add(&self, kind: Option<EventKind>, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.lock().push(Subscription { id, kind, handler });
        id
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> EventHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |tag: &str| -> EventHandler {
            let log = log_clone.clone();
            let tag = tag.to_string();
            Arc::new(move |event: &SessionEvent| {
                log.lock().unwrap().push(format!("{}:{:?}", tag, event.kind()));
            })
        };
        (log, make)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let first = make("first");
        let second = make("second");
        bus.subscribe(EventKind::Connected, move |e| first(e));
        bus.subscribe(EventKind::Connected, move |e| second(e));

        bus.emit(&SessionEvent::Connected);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:Connected", "second:Connected"]
        );
    }

    #[test]
    fn test_kind_filtering_and_unsubscribe() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let only_connected = make("c");
        let everything = make("all");
        let id = bus.subscribe(EventKind::Connected, move |e| only_connected(e));
        bus.subscribe_all(move |e| everything(e));

        bus.emit(&SessionEvent::Connecting);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&SessionEvent::Connected);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["all:Connecting", "all:Connected"]
        );
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let after = make("after");
        bus.subscribe(EventKind::Disconnected, |_| panic!("handler bug"));
        bus.subscribe(EventKind::Disconnected, move |e| after(e));

        bus.emit(&SessionEvent::Disconnected {
            reason: "closed".to_string(),
        });
        assert_eq!(*log.lock().unwrap(), vec!["after:Disconnected"]);
    }
}
