use tokio::sync::broadcast;

use super::traits::{AppEvent, EventBus, EventFilter};

const DEFAULT_CAPACITY: usize = 1024;

/// [`EventBus`] implementation backed by a `tokio::sync::broadcast` channel.
pub struct TokioBroadcastBus {
    sender: broadcast::Sender<AppEvent>,
}

impl TokioBroadcastBus {
    /// Create with the default channel capacity (1024).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create with an explicit channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for TokioBroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for TokioBroadcastBus {
    fn publish(&self, event: AppEvent) -> Result<(), String> {
        // `send` returns the number of active receivers (may be 0 — that is fine).
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    fn subscribe_filtered(&self, _filter: EventFilter) -> broadcast::Receiver<AppEvent> {
        // The underlying broadcast channel delivers all events; consumers must
        // apply EventFilter::matches() to discard unwanted messages.
        self.sender.subscribe()
    }
}
