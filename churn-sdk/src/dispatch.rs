//! Event fan-out to registered subscribers.
//!
//! A flat map from [`EventKind`] to subscribers, delivered synchronously in
//! registration order. A failing subscriber is logged and skipped so it can
//! never block delivery to the ones behind it.

use std::collections::HashMap;

use crate::event::{Event, EventKind};

/// A subscriber callback. Errors are logged, not propagated.
pub type Handler = Box<dyn FnMut(&Event) -> anyhow::Result<()> + Send>;

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber for one event kind. No deduplication; a handler
    /// registered twice runs twice.
    pub fn register(&mut self, kind: EventKind, handler: Handler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Deliver `event` to every subscriber for its kind, in registration
    /// order.
    pub fn dispatch(&mut self, event: &Event) {
        let Some(handlers) = self.handlers.get_mut(&event.kind()) else {
            return;
        };
        for handler in handlers {
            if let Err(e) = handler(event) {
                tracing::error!(error = %e, kind = ?event.kind(), "event handler failed");
            }
        }
    }
}
