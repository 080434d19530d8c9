//! Status store

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::cache::events::{EventBus, StatusEvent};
use crate::models::status::{ContainerStatus, StatusFilter, StatusKey};

/// Latest known status per (project, environment, container)
///
/// Writes to the same key race and the last one wins. No lock is held
/// outside a single map operation.
pub struct StatusStore {
    entries: RwLock<HashMap<StatusKey, ContainerStatus>>,
    bus: EventBus,
}

impl StatusStore {
    /// Create an empty store with its own event bus
    pub fn new(bus: EventBus) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Get a status by key
    pub fn get(&self, key: &StatusKey) -> Option<ContainerStatus> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// Store a status without notifying subscribers
    pub fn put(&self, status: ContainerStatus) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(status.key(), status);
    }

    /// Store a status and fan it out to every subscriber
    pub fn publish(&self, status: ContainerStatus) {
        self.put(status.clone());
        let reached = self.bus.publish(StatusEvent::Changed(status));
        debug!("Published status change to {} subscriber(s)", reached);
    }

    /// Store an observed status unless it equals the current record.
    ///
    /// Returns true when the change was published.
    pub fn publish_if_changed(&self, status: ContainerStatus) -> bool {
        if self.get(&status.key()).as_ref() == Some(&status) {
            return false;
        }
        self.publish(status);
        true
    }

    /// Remove a status and notify subscribers
    pub fn remove(&self, key: &StatusKey) -> Option<ContainerStatus> {
        let removed = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.remove(key)
        };
        if let Some(status) = &removed {
            self.bus.publish(StatusEvent::Removed(status.clone()));
        }
        removed
    }

    /// List statuses matching a filter, sorted by project id then container name
    pub fn list(&self, filter: &StatusFilter) -> Vec<ContainerStatus> {
        let mut statuses: Vec<ContainerStatus> = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries
                .values()
                .filter(|status| filter.matches(status))
                .cloned()
                .collect()
        };
        statuses.sort_by(|a, b| {
            a.project_id
                .cmp(&b.project_id)
                .then_with(|| a.container_name.cmp(&b.container_name))
        });
        statuses
    }

    /// Subscribe to status events
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.bus.subscribe()
    }

    /// Get store size
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record
    pub fn shutdown(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        info!("Releasing status store with {} record(s)", entries.len());
        entries.clear();
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new(EventBus::default())
    }
}
