//! Periodic reconciliation of status records with the backend

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::cache::status::StatusStore;
use crate::deploy::RuntimeBackend;
use crate::errors::RuntimeError;

/// Reconciler worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Time between two observations of the backend
    pub interval: Duration,

    /// Delay before the first observation
    pub initial_delay: Duration,

    /// Environment the observed containers belong to
    pub environment: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            initial_delay: Duration::from_secs(1),
            environment: "dev".to_string(),
        }
    }
}

/// Run the reconciler until the shutdown signal fires
pub async fn run<S, F>(
    options: &Options,
    backend: &dyn RuntimeBackend,
    store: &StatusStore,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Reconciler worker starting ({} backend)...", backend.kind());

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Reconciler worker shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    loop {
        match reconcile_once(&options.environment, backend, store).await {
            Ok(changed) if changed > 0 => debug!("Reconciled {} status records", changed),
            Ok(_) => {}
            Err(e) => error!("Reconciliation failed: {}", e),
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Reconciler worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}

/// Observe the backend once and publish every status that changed.
///
/// Returns the number of records published. Records the backend no longer
/// reports are left in place.
pub async fn reconcile_once(
    env: &str,
    backend: &dyn RuntimeBackend,
    store: &StatusStore,
) -> Result<usize, RuntimeError> {
    let observed = backend.statuses(env).await?;

    let mut changed = 0;
    for status in observed {
        let merged = match store.get(&status.key()) {
            Some(current) => current.reconcile(&status),
            None => status,
        };
        if store.publish_if_changed(merged) {
            changed += 1;
        }
    }
    Ok(changed)
}
