//! Shared helpers for live agent/client integration tests.
//!
//! Every test binds its own uniquely named endpoint so parallel runs never
//! collide, and every join goes through a watchdog timeout instead of
//! blocking the suite forever on a regression.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use scanlink::agent::{Agent, Event};
use scanlink::queue::RequestQueue;
use scanlink::worker::AnalysisHandler;
use scanlink::Config;
use uuid::Uuid;

/// Transport configuration pointing at a fresh, never-used endpoint name.
pub fn unique_config() -> Config {
    Config {
        endpoint: format!("scanlink-test-{}", Uuid::new_v4().simple()),
        connect_timeout_ms: 2000,
        connect_retry_delay_ms: 10,
        worker_threads: 1,
    }
}

/// Echoes every request payload straight back as the response.
pub struct EchoHandler;

impl AnalysisHandler for EchoHandler {
    fn on_analysis_requested(&self, event: Event) -> scanlink::Result<()> {
        event.respond(event.payload())
    }
}

/// A bound agent with its accept loop already running on a background
/// thread.
pub struct RunningAgent {
    pub agent: Arc<Agent>,
    pub queue: Arc<RequestQueue<Event>>,
    acceptor: JoinHandle<scanlink::Result<()>>,
}

impl RunningAgent {
    /// Bind the endpoint named by `config` and start accepting.
    pub fn start(config: &Config) -> Self {
        let agent = Arc::new(Agent::bind(config).expect("bind agent endpoint"));
        let queue = Arc::new(RequestQueue::new());
        let acceptor = {
            let agent = Arc::clone(&agent);
            let queue = Arc::clone(&queue);
            thread::spawn(move || agent.handle_events(queue))
        };
        Self {
            agent,
            queue,
            acceptor,
        }
    }

    /// Abort the queue, stop the endpoint, and join the accept loop.
    pub fn shut_down(self) {
        self.queue.abort();
        self.agent.stop();
        let result = join_with_timeout(self.acceptor, Duration::from_secs(5), "accept loop");
        result.expect("accept loop exits cleanly");
    }
}

/// Join `handle`, panicking if it does not finish within `timeout`.
pub fn join_with_timeout<T: Send + 'static>(
    handle: JoinHandle<T>,
    timeout: Duration,
    what: &str,
) -> T {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(handle.join());
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => value,
        Ok(Err(_)) => panic!("{what} thread panicked"),
        Err(_) => panic!("{what} did not finish within {timeout:?}"),
    }
}
