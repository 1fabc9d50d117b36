use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Messages sent from the background worker to the GUI
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// Human-readable progress or error line
    Log(String),
    /// Byte progress of the stream currently downloading (0.0 to 1.0)
    Progress(f32),
    /// The active worker has finished its job, whatever the outcome
    Finished,
    /// The queue drained and no worker is running
    Idle,
}

/// Cloneable sending half handed to every job.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: UnboundedSender<WorkerEvent>,
}

impl LogSink {
    pub fn new(tx: UnboundedSender<WorkerEvent>) -> Self {
        Self { tx }
    }

    /// Creates a sink together with the receiving end polled by the GUI.
    pub fn channel() -> (Self, UnboundedReceiver<WorkerEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "worker", "{}", message);
        // Receiver gone means the window closed; nothing left to show it to.
        let _ = self.tx.send(WorkerEvent::Log(message));
    }

    pub fn progress(&self, fraction: f32) {
        let _ = self.tx.send(WorkerEvent::Progress(fraction.clamp(0.0, 1.0)));
    }

    pub fn send(&self, event: WorkerEvent) {
        let _ = self.tx.send(event);
    }
}

/// Collects every queued event without waiting.
#[cfg(test)]
pub fn drain(rx: &mut UnboundedReceiver<WorkerEvent>) -> Vec<WorkerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

/// Log lines only, in emission order.
#[cfg(test)]
pub fn log_lines(events: &[WorkerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::Log(line) => Some(line.clone()),
            _ => None,
        })
        .collect()
}
