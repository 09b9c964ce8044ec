//! Optional event publishing.
//!
//! Components publish `Event`s for whoever drives the core (the HTTP layer,
//! the CLI `serve` loop). Publishing never blocks: the core must not stall
//! because a consumer stopped reading, so events are dropped when the
//! channel is full or closed.

use pq_protocol::ipc::Event;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Non-blocking handle for publishing events.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<Event>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn emit(&self, event: Event) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Event channel full, dropping event"),
            Err(TrySendError::Closed(_)) => debug!("Event channel closed, dropping event"),
        }
    }
}
