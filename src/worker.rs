//! Worker threads draining the request queue into an analysis callback.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::agent::Event;
use crate::queue::RequestQueue;
use crate::{LinkError, Result};

/// Callback invoked once per received analysis request.
///
/// The transport never inspects the payload; interpreting it and sending
/// any response through the event is entirely the implementor's business.
pub trait AnalysisHandler: Send + Sync {
    /// Process one event.
    ///
    /// # Errors
    ///
    /// A returned error is logged by the worker, which then moves on to the
    /// next event. One failed analysis never tears the pool down.
    fn on_analysis_requested(&self, event: Event) -> Result<()>;
}

/// Pool of named threads popping one shared [`RequestQueue`].
///
/// Workers exit when `pop` returns `None`, which happens strictly after the
/// queue is aborted; `join` then returns once every in-flight callback has
/// finished naturally.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` worker threads dispatching queue items into `handler`.
    ///
    /// Any number of workers may share one queue; ordering across them is
    /// whatever the queue hands out, with no further coordination.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Io` if the OS refuses to spawn a thread.
    pub fn start(
        count: usize,
        queue: Arc<RequestQueue<Event>>,
        handler: Arc<dyn AnalysisHandler>,
    ) -> Result<Self> {
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let worker = thread::Builder::new()
                .name(format!("scanlink-worker-{index}"))
                .spawn(move || run_worker(&queue, handler.as_ref()))
                .map_err(|err| LinkError::Io(format!("spawn worker: {err}")))?;
            workers.push(worker);
        }
        debug!(count, "worker pool started");
        Ok(Self { workers })
    }

    /// Join every worker thread; call after aborting the queue.
    pub fn join(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

fn run_worker(queue: &RequestQueue<Event>, handler: &dyn AnalysisHandler) {
    while let Some(event) = queue.pop() {
        if let Err(err) = handler.on_analysis_requested(event) {
            warn!(error = %err, "analysis handler failed");
        }
    }
    debug!("worker drained, exiting");
}
