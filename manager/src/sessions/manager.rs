//! Log streaming from the active backend to viewers

use std::sync::Arc;

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::deploy::RuntimeBackend;
use crate::models::status::ContainerType;
use crate::sessions::registry::{SessionGuard, SessionKey, SessionRegistry};
use crate::sessions::sink::LogSink;

/// Starts log sessions on the log pool, one open sink per session key
pub struct LogSessionManager {
    backend: Arc<dyn RuntimeBackend>,
    registry: Arc<SessionRegistry>,
    runtime: Handle,
}

impl LogSessionManager {
    /// `runtime` is the pool the copy loops run on
    pub fn new(backend: Arc<dyn RuntimeBackend>, runtime: Handle) -> Self {
        Self {
            backend,
            registry: Arc::new(SessionRegistry::new()),
            runtime,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stream the log of `target_name` into `sink` until either side ends.
    ///
    /// The sink is registered before this returns, so a previous session
    /// under the same key is already closed by then.
    pub fn stream_log(
        &self,
        target_type: ContainerType,
        target_name: &str,
        viewer: &str,
        sink: LogSink,
    ) -> JoinHandle<()> {
        let key = SessionKey::new(target_type, viewer, target_name);
        self.registry.register(key.clone(), sink.handle());
        let guard = SessionGuard::new(self.registry.clone(), key, sink.handle());

        let backend = self.backend.clone();
        let target = target_name.to_string();
        self.runtime
            .spawn(async move { pump(backend, target, sink, guard).await })
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    pub fn shutdown(&self) {
        self.registry.close_all();
    }
}

async fn pump(
    backend: Arc<dyn RuntimeBackend>,
    target: String,
    sink: LogSink,
    guard: SessionGuard,
) {
    let key = guard.key().clone();
    debug!("Log session {} started", key);

    let mut lines = match backend.log_lines(&target).await {
        Ok(lines) => lines,
        Err(e) => {
            info!("Log session {} could not start: {}", key, e);
            return;
        }
    };

    loop {
        if sink.is_closed() {
            break;
        }
        let next = tokio::select! {
            _ = sink.closed() => break,
            next = lines.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                if !forward(&sink, chunk).await {
                    break;
                }
            }
            Some(Err(e)) => {
                info!("Log session {} ended: {}", key, e);
                break;
            }
            None => {
                debug!("Log of {} ended", target);
                break;
            }
        }
    }

    drop(lines);
    drop(guard);
    debug!("Log session {} closed", key);
}

/// Forward every line of a chunk. Returns `false` once the sink is closed.
async fn forward(sink: &LogSink, chunk: String) -> bool {
    for line in split_lines(chunk) {
        if sink.is_closed() || !sink.send(line).await {
            return false;
        }
    }
    !sink.is_closed()
}

/// One entry per line of a backend chunk, line endings removed
pub fn split_lines(chunk: String) -> Vec<String> {
    let chunk = normalize_line(chunk);
    if !chunk.contains('\n') {
        return vec![chunk];
    }
    chunk
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// Strip one trailing `\n` or `\r\n`
pub fn normalize_line(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}
