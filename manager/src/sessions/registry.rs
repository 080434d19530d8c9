//! Registry of open log sinks

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;
use uuid::Uuid;

use crate::models::status::ContainerType;
use crate::sessions::sink::SinkHandle;

/// Identity of a log session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub service: String,
    pub viewer: String,
    pub target: String,
}

impl SessionKey {
    pub fn new(target_type: ContainerType, viewer: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            service: target_type.as_str().to_string(),
            viewer: viewer.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.service, self.viewer, self.target)
    }
}

/// One open sink per key
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sinks: Mutex<HashMap<SessionKey, SinkHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink under a key, closing the one it replaces.
    pub fn register(&self, key: SessionKey, handle: SinkHandle) -> Option<SinkHandle> {
        let mut sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());
        let previous = sinks.insert(key.clone(), handle);
        if let Some(previous) = &previous {
            if !previous.is_closed() {
                debug!("Closing previous log session {}", key);
            }
            previous.close();
        }
        previous
    }

    /// Remove the entry for `key` only while it still belongs to sink `id`
    pub fn deregister(&self, key: &SessionKey, id: Uuid) -> bool {
        let mut sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());
        match sinks.get(key) {
            Some(handle) if handle.id == id => {
                sinks.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn active(&self, key: &SessionKey) -> Option<Uuid> {
        let sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());
        sinks.get(key).map(|handle| handle.id)
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and forget every session
    pub fn close_all(&self) {
        let mut sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());
        for handle in sinks.values() {
            handle.close();
        }
        sinks.clear();
    }
}

/// Closes a sink and releases its registration when dropped
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    key: SessionKey,
    handle: SinkHandle,
}

impl SessionGuard {
    pub fn new(registry: Arc<SessionRegistry>, key: SessionKey, handle: SinkHandle) -> Self {
        Self {
            registry,
            key,
            handle,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.handle.close();
        self.registry.deregister(&self.key, self.handle.id);
    }
}
