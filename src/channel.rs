//! Duplex channel to a named local endpoint.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use bytes::Bytes;
use interprocess::local_socket::{prelude::*, GenericNamespaced, Stream};
use parking_lot::Mutex;
use tracing::debug;

use crate::share::{self, PeerProcess};
use crate::{framing, Config, LinkError, Result};

/// Lifecycle states of a [`DuplexChannel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection has been established yet; `connect` is valid.
    Disconnected,
    /// A `connect` is in flight on some thread.
    Connecting,
    /// Live connection; `send` and `receive` are valid.
    Connected,
    /// Terminal state entered by `close`.
    Closed,
}

struct ChannelInner {
    state: ChannelState,
    stream: Option<Arc<Stream>>,
}

/// One duplex connection to a named endpoint.
///
/// The connection handle is owned exclusively by the channel; there is at
/// most one live handle per instance and it is released exactly once, by
/// `close` or by drop. The exchange contract (one request, one response, no
/// interleaving) is enforced a level up by the client, which takes
/// `&mut self` on its operations.
pub struct DuplexChannel {
    inner: Mutex<ChannelInner>,
}

impl DuplexChannel {
    /// Create a channel in the `Disconnected` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ChannelInner {
                state: ChannelState::Disconnected,
                stream: None,
            }),
        }
    }

    /// Connect to the configured endpoint, retrying while the endpoint is
    /// not yet present (`NotFound`) or not yet accepting
    /// (`ConnectionRefused`) until the connect budget runs out.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::ConnectTimeout` when the budget is exhausted,
    /// `LinkError::Io` on a non-retryable connect failure or when the
    /// channel is not in the `Disconnected` state, `LinkError::Config` if
    /// the endpoint name cannot be resolved, and
    /// `LinkError::ConnectionClosed` if `close` raced the attempt.
    pub fn connect(&self, config: &Config) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.state != ChannelState::Disconnected {
                return Err(LinkError::Io(
                    "connect requires a disconnected channel".into(),
                ));
            }
            inner.state = ChannelState::Connecting;
        }

        let deadline = Instant::now() + config.connect_timeout();
        let stream = loop {
            if self.state() == ChannelState::Closed {
                return Err(LinkError::ConnectionClosed);
            }

            let name = config
                .endpoint
                .as_str()
                .to_ns_name::<GenericNamespaced>()
                .map_err(|err| {
                    self.abandon_connect();
                    LinkError::Config(format!("invalid endpoint name: {err}"))
                })?;

            match Stream::connect(name) {
                Ok(stream) => break stream,
                Err(err) if is_retryable_connect(&err) => {
                    if Instant::now() + config.connect_retry_delay() > deadline {
                        self.abandon_connect();
                        return Err(LinkError::ConnectTimeout(format!(
                            "endpoint {} not reachable within {} ms",
                            config.endpoint, config.connect_timeout_ms
                        )));
                    }
                    debug!(endpoint = %config.endpoint, error = %err, "endpoint not ready, retrying");
                    thread::sleep(config.connect_retry_delay());
                }
                Err(err) => {
                    self.abandon_connect();
                    return Err(LinkError::Io(format!(
                        "connect to {}: {err}",
                        config.endpoint
                    )));
                }
            }
        };

        let mut inner = self.inner.lock();
        if inner.state == ChannelState::Closed {
            drop(inner);
            shutdown_stream(&stream);
            return Err(LinkError::ConnectionClosed);
        }
        inner.stream = Some(Arc::new(stream));
        inner.state = ChannelState::Connected;
        debug!(endpoint = %config.endpoint, "channel connected");
        Ok(())
    }

    /// Write one framed message.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::NotConnected` outside the `Connected` state;
    /// otherwise the framing errors of [`framing::write_message`].
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        let stream = self.connected_stream()?;
        framing::write_message(&mut &*stream, payload)
    }

    /// Block until one complete framed message arrives.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::NotConnected` outside the `Connected` state;
    /// `LinkError::ConnectionClosed` when the peer disconnects or a local
    /// `close` lands mid-read; otherwise the framing errors of
    /// [`framing::read_message`].
    pub fn receive(&self) -> Result<Bytes> {
        let stream = self.connected_stream()?;
        framing::read_message(&mut &*stream)
    }

    /// Identity of the process on the other end of the live connection.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::NotConnected` outside the `Connected` state, or
    /// `LinkError::Io` if the OS cannot resolve the peer.
    pub fn peer_process(&self) -> Result<PeerProcess> {
        let stream = self.connected_stream()?;
        share::stream_peer(&stream)
    }

    /// Close the channel and release the connection handle.
    ///
    /// Idempotent from every state. On Unix the socket is shut down first,
    /// so an in-flight `receive` observes end-of-stream and returns
    /// `ConnectionClosed` promptly; on Windows a blocked read returns when
    /// the peer next writes or disconnects (bounded-wait shutdown).
    pub fn close(&self) {
        let stream = {
            let mut inner = self.inner.lock();
            inner.state = ChannelState::Closed;
            inner.stream.take()
        };
        if let Some(stream) = stream {
            shutdown_stream(&stream);
            debug!("channel closed");
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.inner.lock().state
    }

    fn connected_stream(&self) -> Result<Arc<Stream>> {
        let inner = self.inner.lock();
        if let (ChannelState::Connected, Some(stream)) = (inner.state, &inner.stream) {
            Ok(Arc::clone(stream))
        } else {
            Err(LinkError::NotConnected)
        }
    }

    fn abandon_connect(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ChannelState::Connecting {
            inner.state = ChannelState::Disconnected;
        }
    }
}

impl Default for DuplexChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DuplexChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_retryable_connect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
    )
}

/// Shut a stream down so a read blocked on it observes end-of-stream.
///
/// Windows named pipes have no shutdown primitive, so there the blocked
/// side keeps waiting until the peer writes or disconnects.
#[cfg(unix)]
pub(crate) fn shutdown_stream(stream: &Stream) {
    // The enum has exactly one variant per platform; on Unix that is the
    // domain-socket one, which exposes the std stream underneath.
    let Stream::UdSocket(socket) = stream;
    if let Err(err) = socket.inner().shutdown(std::net::Shutdown::Both) {
        debug!(error = %err, "socket shutdown failed");
    }
}

#[cfg(not(unix))]
pub(crate) fn shutdown_stream(_stream: &Stream) {}
