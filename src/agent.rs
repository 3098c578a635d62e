//! Accepting end of the analysis channel.
//!
//! The agent binds the named endpoint, accepts client connections, and runs
//! one blocking reader per connection that turns each inbound framed message
//! into an [`Event`] on the shared request queue. Responses travel back over
//! the connection the request arrived on.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use interprocess::local_socket::{
    prelude::*, GenericNamespaced, Listener, ListenerOptions, Stream,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::channel::shutdown_stream;
use crate::queue::RequestQueue;
use crate::{framing, Config, LinkError, Result};

/// One accepted connection plus the lock serializing writes onto it.
///
/// Workers respond from multiple threads; without the lock two responses
/// could interleave their chunks on the wire.
struct Connection {
    stream: Stream,
    write_lock: Mutex<()>,
}

impl Connection {
    fn write_message(&self, payload: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock();
        framing::write_message(&mut &self.stream, payload)
    }

    fn shutdown(&self) {
        shutdown_stream(&self.stream);
    }
}

/// One received request awaiting analysis.
///
/// Destroyed once the worker has fully processed it, including sending any
/// response.
pub struct Event {
    payload: Bytes,
    connection: Arc<Connection>,
}

impl Event {
    /// Bytes of the received request; opaque to the transport.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Write one framed message back over the connection this request
    /// arrived on.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::ConnectionClosed` if the requester has gone
    /// away, or `LinkError::Io` for other transport faults.
    pub fn respond(&self, payload: &[u8]) -> Result<()> {
        self.connection.write_message(payload)
    }
}

struct AgentShared {
    stopped: AtomicBool,
    connections: Mutex<Vec<Arc<Connection>>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentShared {
    fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            connections: Mutex::new(Vec::new()),
            readers: Mutex::new(Vec::new()),
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn shutdown_connections(&self) {
        for connection in &*self.connections.lock() {
            connection.shutdown();
        }
    }

    /// Join reader threads that have already run to completion.
    ///
    /// Runs on every accept so the handle backlog stays proportional to the
    /// number of live connections however long the endpoint serves.
    /// Still-running readers are left alone; the accept loop joins those on
    /// exit.
    fn reap_finished_readers(&self) {
        let mut readers = self.readers.lock();
        let mut index = 0;
        while index < readers.len() {
            if readers[index].is_finished() {
                if readers.swap_remove(index).join().is_err() {
                    warn!("connection reader panicked");
                }
            } else {
                index += 1;
            }
        }
    }
}

/// Listener side of the transport.
///
/// Queue abort and endpoint stop are independent teardown paths; an
/// embedding process invokes both, in either order, before joining its
/// workers.
pub struct Agent {
    endpoint: String,
    listener: Listener,
    shared: Arc<AgentShared>,
}

impl Agent {
    /// Bind the named listener.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Config` if the endpoint name cannot be resolved,
    /// or `LinkError::Io` if the name is taken or the listener cannot be
    /// created.
    pub fn bind(config: &Config) -> Result<Self> {
        let name = config
            .endpoint
            .as_str()
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| LinkError::Config(format!("invalid endpoint name: {err}")))?;
        let listener = ListenerOptions::new()
            .name(name)
            .create_sync()
            .map_err(|err| LinkError::Io(format!("bind {}: {err}", config.endpoint)))?;
        info!(endpoint = %config.endpoint, "agent endpoint listening");
        Ok(Self {
            endpoint: config.endpoint.clone(),
            listener,
            shared: Arc::new(AgentShared::new()),
        })
    }

    /// Accept connections until `stop`, feeding received requests into
    /// `queue` as [`Event`]s.
    ///
    /// Blocks the calling thread. Each accepted connection gets a dedicated
    /// reader thread; a peer disconnect ends that reader quietly without
    /// affecting other connections. Returns after `stop`, once every reader
    /// thread has been joined.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Io` if accepting fails for a reason other than
    /// shutdown or a transient aborted handshake, with connections shut
    /// down and readers joined before the error surfaces.
    pub fn handle_events(&self, queue: Arc<RequestQueue<Event>>) -> Result<()> {
        let mut next_id = 0usize;
        let result = loop {
            if self.shared.is_stopped() {
                break Ok(());
            }
            match self.listener.accept() {
                Ok(stream) => {
                    if self.shared.is_stopped() {
                        // The stop nudge, or a client that raced it.
                        break Ok(());
                    }
                    if let Err(err) = self.spawn_reader(next_id, stream, &queue) {
                        break Err(err);
                    }
                    next_id += 1;
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::ConnectionAborted | ErrorKind::Interrupted
                    ) =>
                {
                    debug!(error = %err, "transient accept failure");
                }
                Err(err) => {
                    break Err(LinkError::Io(format!("accept on {}: {err}", self.endpoint)));
                }
            }
        };

        // Make the reader join below deterministic on every exit path.
        self.shared.shutdown_connections();
        let readers = std::mem::take(&mut *self.shared.readers.lock());
        for reader in readers {
            if reader.join().is_err() {
                warn!("connection reader panicked");
            }
        }
        info!(endpoint = %self.endpoint, "agent endpoint stopped");
        result
    }

    /// Stop the endpoint: shut down live connections (waking their blocked
    /// readers) and nudge the accept loop awake with one throwaway local
    /// connection so `handle_events` can return.
    ///
    /// Idempotent. Does not touch the request queue; aborting that is the
    /// embedder's separate teardown step.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(endpoint = %self.endpoint, "stopping agent endpoint");
        self.shared.shutdown_connections();
        match self.endpoint.as_str().to_ns_name::<GenericNamespaced>() {
            Ok(name) => {
                if let Err(err) = Stream::connect(name) {
                    debug!(error = %err, "stop nudge connect failed");
                }
            }
            Err(err) => debug!(error = %err, "stop nudge name resolution failed"),
        }
    }

    /// Endpoint name this agent is bound to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Connections the endpoint is currently holding a reader for.
    ///
    /// Departed clients linger in the count until the next accept reclaims
    /// their finished readers, so this can briefly overshoot the number of
    /// live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.shared.readers.lock().len()
    }

    fn spawn_reader(
        &self,
        id: usize,
        stream: Stream,
        queue: &Arc<RequestQueue<Event>>,
    ) -> Result<()> {
        debug!(connection = id, "client connected");
        self.shared.reap_finished_readers();
        let connection = Arc::new(Connection {
            stream,
            write_lock: Mutex::new(()),
        });
        self.shared.connections.lock().push(Arc::clone(&connection));

        let shared = Arc::clone(&self.shared);
        let queue = Arc::clone(queue);
        let reader = thread::Builder::new()
            .name(format!("scanlink-conn-{id}"))
            .spawn(move || {
                run_reader(id, &connection, &queue);
                shared
                    .connections
                    .lock()
                    .retain(|other| !Arc::ptr_eq(other, &connection));
            })
            .map_err(|err| LinkError::Io(format!("spawn connection reader: {err}")))?;
        self.shared.readers.lock().push(reader);
        Ok(())
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_reader(id: usize, connection: &Arc<Connection>, queue: &Arc<RequestQueue<Event>>) {
    loop {
        match framing::read_message(&mut &connection.stream) {
            Ok(payload) => {
                queue.push(Event {
                    payload,
                    connection: Arc::clone(connection),
                });
            }
            Err(LinkError::ConnectionClosed) => {
                debug!(connection = id, "peer disconnected");
                break;
            }
            Err(err) => {
                warn!(connection = id, error = %err, "connection reader failed");
                break;
            }
        }
    }
}
