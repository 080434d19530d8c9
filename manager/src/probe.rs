//! Active backend detection

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use serde::Serialize;

/// Service-account token mounted into every pod
pub const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

static IS_CLUSTER: OnceLock<bool> = OnceLock::new();

/// Backend the process manages containers on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Engine,
    Cluster,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Engine => "engine",
            BackendKind::Cluster => "cluster",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the process runs inside a cluster. Computed once.
pub fn is_cluster() -> bool {
    *IS_CLUSTER.get_or_init(|| {
        detect(
            |name| std::env::var(name).ok(),
            Path::new(SERVICE_ACCOUNT_TOKEN).exists(),
        )
    })
}

pub fn backend_kind() -> BackendKind {
    if is_cluster() {
        BackendKind::Cluster
    } else {
        BackendKind::Engine
    }
}

/// Cluster markers: the API service host variable or a mounted service-account token.
pub fn detect<F>(env: F, token_present: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let service_host = env("KUBERNETES_SERVICE_HOST")
        .map(|host| !host.trim().is_empty())
        .unwrap_or(false);
    service_host || token_present
}
