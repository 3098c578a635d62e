//! Thread-safe FIFO of pending analysis work with a one-shot abort.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct QueueState<T> {
    items: VecDeque<T>,
    aborted: bool,
}

/// Abortable FIFO shared between transport reader threads (producers) and
/// the worker pool (consumers).
///
/// `abort` is one-shot and irreversible: once signaled, every blocked and
/// every future `pop` returns `None`, queued items are discarded, and later
/// pushes are dropped.
pub struct RequestQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> RequestQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                aborted: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append one item, waking a single blocked `pop`.
    ///
    /// Discards the item silently if the queue has been aborted.
    pub fn push(&self, item: T) {
        let mut state = self.state.lock();
        if state.aborted {
            return;
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
    }

    /// Block until an item is available or the queue is aborted.
    ///
    /// Items come back in push order across all producers (one global
    /// order). Returns `None` only after `abort`.
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if state.aborted {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            self.available.wait(&mut state);
        }
    }

    /// Signal abort: discard everything queued and wake every blocked `pop`.
    ///
    /// Idempotent. The flag is never cleared, so the queue accepts and
    /// yields nothing afterwards.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        state.items.clear();
        drop(state);
        self.available.notify_all();
    }
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
