//! Event bus - pub/sub for orchestrator activity
//!
//! Components emit events, consumers (CLI status, log subscribers)
//! subscribe. Fire-and-forget: no subscribers means the event is dropped,
//! and slow subscribers lag rather than block the core.

pub mod types;

pub use types::Event;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4_096;

/// Central event bus
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: Event) {
        debug!(event_type = event.event_type(), "EventBus::emit");
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Shared bus for handing to components
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}
