//! Sequential download queue.
//!
//! Requests run strictly one at a time in enqueue order. When a worker
//! finishes, successfully or not, the next request is dispatched; nothing is
//! retried.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use tokio::{runtime::Handle, task::JoinHandle};

use crate::events::{LogSink, WorkerEvent};
use crate::model::{DownloadRequest, JobOutcome};

/// Work executed for one dequeued request.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, request: DownloadRequest, log: LogSink) -> JobOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
}

struct Inner {
    pending: VecDeque<DownloadRequest>,
    state: WorkerState,
    current: Option<DownloadRequest>,
    /// Handle of the single active worker
    worker: Option<JoinHandle<()>>,
}

impl Inner {
    /// A worker that was torn down without reaching `finish_current` (runtime
    /// shutdown, abort) no longer counts as running.
    fn worker_active(&self) -> bool {
        self.state == WorkerState::Running && self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

#[derive(Clone)]
pub struct QueueOrchestrator {
    inner: Arc<Mutex<Inner>>,
    runner: Arc<dyn JobRunner>,
    log: LogSink,
    runtime: Handle,
}

impl QueueOrchestrator {
    pub fn new(runner: Arc<dyn JobRunner>, log: LogSink, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pending: VecDeque::new(),
                state: WorkerState::Idle,
                current: None,
                worker: None,
            })),
            runner,
            log,
            runtime,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking job never holds this lock, so the data is still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends to the tail. Requests with a blank field are dropped with an
    /// advisory and leave the queue untouched.
    pub fn enqueue(&self, request: DownloadRequest) -> bool {
        if !request.is_complete() {
            self.log.log("Please enter a URL, select a path, and choose a quality.");
            return false;
        }
        let mut inner = self.lock();
        tracing::info!(
            url = %request.source_identifier,
            quality = %request.requested_quality,
            position = inner.pending.len() + 1,
            "queued download"
        );
        inner.pending.push_back(request);
        true
    }

    /// Dispatches the head of the queue unless a worker is already running.
    /// Emits [`WorkerEvent::Idle`] when there is nothing left to do.
    pub fn start_or_advance(&self) {
        let mut inner = self.lock();
        if inner.worker_active() {
            return;
        }

        let Some(request) = inner.pending.pop_front() else {
            drop(inner);
            tracing::debug!("queue drained");
            self.log.send(WorkerEvent::Idle);
            return;
        };

        inner.state = WorkerState::Running;
        inner.current = Some(request.clone());

        let this = self.clone();
        let worker = self.runtime.spawn(async move {
            let url = request.source_identifier.clone();
            let job = {
                let runner = this.runner.clone();
                let log = this.log.clone();
                async move { runner.run(request, log).await }
            };
            // Run the job as its own task so a panic is caught here and the queue keeps moving.
            match this.runtime.spawn(job).await {
                Ok(outcome) => tracing::info!(%url, ?outcome, "download job finished"),
                Err(e) => {
                    tracing::error!(%url, "download job aborted: {}", e);
                    this.log.log(format!("An error occurred: {}", e));
                }
            }
            this.log.send(WorkerEvent::Finished);
            this.finish_current();
            this.start_or_advance();
        });
        // Still under the lock, so the worker cannot clear this before it is stored.
        inner.worker = Some(worker);
    }

    fn finish_current(&self) {
        let mut inner = self.lock();
        inner.state = WorkerState::Idle;
        inner.current = None;
        inner.worker = None;
    }

    pub fn is_running(&self) -> bool {
        self.lock().worker_active()
    }

    /// Request the worker is handling right now.
    pub fn current(&self) -> Option<DownloadRequest> {
        self.lock().current.clone()
    }

    /// Snapshot of the requests still waiting, head first.
    pub fn pending(&self) -> Vec<DownloadRequest> {
        self.lock().pending.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }
}
