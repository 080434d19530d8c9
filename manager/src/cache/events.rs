//! Status change events

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::models::status::{ContainerStatus, StatusKey};

/// Default buffered events per subscriber
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Event published on every status change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "status", rename_all = "lowercase")]
pub enum StatusEvent {
    Changed(ContainerStatus),
    Removed(ContainerStatus),
}

impl StatusEvent {
    pub fn status(&self) -> &ContainerStatus {
        match self {
            StatusEvent::Changed(status) | StatusEvent::Removed(status) => status,
        }
    }

    pub fn key(&self) -> StatusKey {
        self.status().key()
    }
}

/// In-process topic fanning status events out to subscribers
pub struct EventBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// Fan an event out; returns the number of subscribers reached.
    pub fn publish(&self, event: StatusEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("Status event dropped, no subscribers");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
