//! Status reporting
//!
//! Progress events `{resource, status}` flow to a [`StatusSink`] in the order
//! the orchestrator emits them.

use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;

use crate::types::StatusEvent;

/// Receiver of per-resource status events
pub trait StatusSink: Send + Sync {
    fn report(&self, event: StatusEvent);
}

impl StatusSink for UnboundedSender<StatusEvent> {
    fn report(&self, event: StatusEvent) {
        // A dropped receiver means nobody is listening anymore.
        if self.send(event).is_err() {
            tracing::debug!(?event, "status receiver closed");
        }
    }
}

/// Sink keeping every event in memory
#[derive(Debug, Default)]
pub struct CollectingStatusSink {
    events: Mutex<Vec<StatusEvent>>,
}

impl CollectingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events reported so far, in order
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatusSink for CollectingStatusSink {
    fn report(&self, event: StatusEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Resource, SyncStatus};

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingStatusSink::new();
        sink.report(StatusEvent::new(Resource::Sleep, SyncStatus::Syncing));
        sink.report(StatusEvent::new(Resource::Sleep, SyncStatus::Synced));

        let statuses: Vec<_> = sink.events().iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![SyncStatus::Syncing, SyncStatus::Synced]);
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.report(StatusEvent::new(Resource::Water, SyncStatus::Syncing));
        assert_eq!(
            rx.try_recv().unwrap(),
            StatusEvent::new(Resource::Water, SyncStatus::Syncing)
        );

        drop(rx);
        tx.report(StatusEvent::new(Resource::Water, SyncStatus::Synced));
    }
}
