//! Typed handler table backing §4.4.1's `on_message`/`on_event`
//! subscriptions. Grounded in the reference client's `message_handlers` /
//! `connection_callbacks` dicts, translated into Rust as two keyed maps of
//! boxed closures rather than untyped dictionaries.

use protocol::ServerMessageIn;
use std::collections::HashMap;
use std::sync::RwLock;

/// Lifecycle events a UI can subscribe to via `on_event` (§4.4.1).
#[derive(Debug, Clone)]
pub enum ClientLifecycleEvent {
    Connect,
    Disconnect,
    ConnectionLost,
    Reconnecting { attempt: u32, max: u32 },
    ReconnectSuccess,
    ReconnectFailed,
    Error(String),
}

impl ClientLifecycleEvent {
    /// The string key a handler registers under — matches the event names
    /// enumerated in §4.4.1 verbatim.
    pub fn key(&self) -> &'static str {
        match self {
            ClientLifecycleEvent::Connect => "connect",
            ClientLifecycleEvent::Disconnect => "disconnect",
            ClientLifecycleEvent::ConnectionLost => "connection_lost",
            ClientLifecycleEvent::Reconnecting { .. } => "reconnecting",
            ClientLifecycleEvent::ReconnectSuccess => "reconnect_success",
            ClientLifecycleEvent::ReconnectFailed => "reconnect_failed",
            ClientLifecycleEvent::Error(_) => "error",
        }
    }
}

type MessageHandler = Box<dyn Fn(&ServerMessageIn) + Send + Sync>;
type LifecycleHandler = Box<dyn Fn(&ClientLifecycleEvent) + Send + Sync>;

/// Registry of message- and lifecycle-event handlers. Lives behind the
/// session's `Arc` so reader/keepalive/reconnector tasks can all dispatch
/// into it without taking a lock longer than a single `Vec` iteration.
#[derive(Default)]
pub struct EventTable {
    message_handlers: RwLock<HashMap<String, Vec<MessageHandler>>>,
    lifecycle_handlers: RwLock<HashMap<&'static str, Vec<LifecycleHandler>>>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one protocol tag, e.g. `"game_move"`.
    /// Multiple handlers for the same tag all fire, in registration order.
    pub fn on_message(&self, tag: impl Into<String>, handler: impl Fn(&ServerMessageIn) + Send + Sync + 'static) {
        self.message_handlers
            .write()
            .unwrap()
            .entry(tag.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Registers a handler for one lifecycle event name (§4.4.1).
    pub fn on_event(&self, name: &'static str, handler: impl Fn(&ClientLifecycleEvent) + Send + Sync + 'static) {
        self.lifecycle_handlers
            .write()
            .unwrap()
            .entry(name)
            .or_default()
            .push(Box::new(handler));
    }

    pub fn dispatch_message(&self, tag: &str, message: &ServerMessageIn) {
        if let Some(handlers) = self.message_handlers.read().unwrap().get(tag) {
            for handler in handlers {
                handler(message);
            }
        }
    }

    pub fn dispatch_event(&self, event: &ClientLifecycleEvent) {
        if let Some(handlers) = self.lifecycle_handlers.read().unwrap().get(event.key()) {
            for handler in handlers {
                handler(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn dispatch_message_only_fires_matching_tag_handlers() {
        let table = EventTable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        table.on_message("pong", move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        table.dispatch_message("pong", &ServerMessageIn::Pong);
        table.dispatch_message("room_list", &ServerMessageIn::Pong);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multiple_handlers_on_the_same_tag_all_fire() {
        let table = EventTable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits_clone = Arc::clone(&hits);
            table.on_message("pong", move |_| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            });
        }
        table.dispatch_message("pong", &ServerMessageIn::Pong);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn lifecycle_events_dispatch_by_key() {
        let table = EventTable::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        table.on_event("reconnecting", move |event| {
            if let ClientLifecycleEvent::Reconnecting { attempt, max } = event {
                assert_eq!(*attempt, 2);
                assert_eq!(*max, 12);
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        table.dispatch_event(&ClientLifecycleEvent::Reconnecting { attempt: 2, max: 12 });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
