//! Client end of the analysis channel.

use bytes::Bytes;
use tracing::{debug, info};

use crate::channel::DuplexChannel;
use crate::share::{self, RawResource, RemoteHandle, ResourceSharer};
use crate::{Config, Result};

/// Transport client owning one connection to the analysis agent.
///
/// `send` is strictly synchronous request/response on the single underlying
/// channel; the `&mut self` receivers make a second in-flight exchange on
/// the same instance a compile error rather than a runtime race.
pub struct Client {
    config: Config,
    channel: DuplexChannel,
    sharer: Box<dyn ResourceSharer>,
}

impl Client {
    /// Connect to the configured endpoint, retrying within the connect
    /// budget while the agent is still coming up.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::ConnectTimeout` if the endpoint never becomes
    /// reachable within the budget, `LinkError::Config` for an unusable
    /// endpoint name, or `LinkError::Io` for a non-retryable connect
    /// failure. On error no client exists; construction is all or nothing.
    pub fn connect(config: Config) -> Result<Self> {
        Self::connect_with_sharer(config, share::default_sharer())
    }

    /// Connect with a caller-supplied sharer, for tests and for embedders
    /// that broker handle exchange themselves.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Client::connect`].
    pub fn connect_with_sharer(config: Config, sharer: Box<dyn ResourceSharer>) -> Result<Self> {
        let channel = DuplexChannel::new();
        channel.connect(&config)?;
        info!(endpoint = %config.endpoint, "connected to analysis agent");
        Ok(Self {
            config,
            channel,
            sharer,
        })
    }

    /// Send one request and block until exactly one response arrives.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::NotConnected` after `close` raced the exchange,
    /// `LinkError::ConnectionClosed` if the agent goes away mid-exchange,
    /// or `LinkError::Io`/`LinkError::Protocol` for transport faults.
    pub fn send(&mut self, request: &[u8]) -> Result<Bytes> {
        self.channel.send(request)?;
        self.channel.receive()
    }

    /// Send one acknowledgement; no response is read.
    ///
    /// # Errors
    ///
    /// Same failure modes as the write half of [`Client::send`].
    pub fn acknowledge(&mut self, ack: &[u8]) -> Result<()> {
        self.channel.send(ack)
    }

    /// Ask the agent to abandon previously issued requests, identified
    /// inside the opaque payload. Best-effort: requests that already
    /// completed are unaffected. No response is read.
    ///
    /// # Errors
    ///
    /// Same failure modes as the write half of [`Client::send`].
    pub fn cancel_requests(&mut self, cancel: &[u8]) -> Result<()> {
        self.channel.send(cancel)
    }

    /// Duplicate `resource` for use by the agent process.
    ///
    /// Every failure path (no live connection, peer gone, invalid handle,
    /// OS refusal) degrades to `None` with the cause logged; callers
    /// proceed without the shared handle.
    #[must_use]
    pub fn share_resource(&self, resource: RawResource) -> Option<RemoteHandle> {
        let peer = match self.channel.peer_process() {
            Ok(peer) => peer,
            Err(err) => {
                debug!(error = %err, "peer identity unavailable, share skipped");
                return None;
            }
        };
        self.sharer.share(resource, &peer)
    }

    /// Endpoint name this client was configured against.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.channel.close();
        debug!(endpoint = %self.config.endpoint, "client shut down");
    }
}
