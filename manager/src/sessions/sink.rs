//! Log line sinks

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default number of lines buffered between the pump and the viewer
pub const DEFAULT_SINK_BUFFER: usize = 256;

/// Receiving end of a log session; forwards lines to one viewer
#[derive(Debug)]
pub struct LogSink {
    id: Uuid,
    tx: mpsc::Sender<String>,
    closed: CancellationToken,
}

/// What the registry keeps of a sink: enough to identify and close it
#[derive(Debug, Clone)]
pub struct SinkHandle {
    pub id: Uuid,
    closed: CancellationToken,
}

impl SinkHandle {
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl LogSink {
    /// New sink plus the receiver the viewer reads lines from
    pub fn channel(buffer: usize) -> (LogSink, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let sink = LogSink {
            id: Uuid::new_v4(),
            tx,
            closed: CancellationToken::new(),
        };
        (sink, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> SinkHandle {
        SinkHandle {
            id: self.id,
            closed: self.closed.clone(),
        }
    }

    /// Closed explicitly or abandoned by the viewer
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Resolves once the sink is closed or the viewer went away
    pub async fn closed(&self) {
        tokio::select! {
            _ = self.closed.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }

    /// Forward one line. Returns `false` when the sink is closed.
    pub async fn send(&self, line: String) -> bool {
        if self.is_closed() {
            return false;
        }
        tokio::select! {
            _ = self.closed.cancelled() => false,
            sent = self.tx.send(line) => sent.is_ok(),
        }
    }
}
