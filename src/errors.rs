//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared result type for transport and queue operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Error enumeration covering every transport failure mode.
///
/// `HandleShare` never escapes the public client surface: sharing failures
/// are degraded to "no handle" before reaching callers, and the variant
/// exists so sharer internals can describe the cause on its way to the log.
#[derive(Debug)]
pub enum LinkError {
    /// Endpoint was not reachable within the connect budget; recoverable by
    /// retrying construction once the agent is up.
    ConnectTimeout(String),
    /// Operation attempted on a channel that is not in the connected state.
    NotConnected,
    /// Transport failure mid read or write; the channel is in an
    /// indeterminate state and should be closed and rebuilt.
    Io(String),
    /// Peer closed the connection, or a local close raced an in-flight read.
    /// Distinct from `Io` so callers can tell shutdown from faults.
    ConnectionClosed,
    /// Wire data violated a framing guard (oversized chunk or message).
    Protocol(String),
    /// Resource handle duplication failed; non-fatal by contract.
    HandleShare(String),
    /// Configuration parsing or validation failure.
    Config(String),
}

impl Display for LinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectTimeout(msg) => write!(f, "connect timeout: {msg}"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::HandleShare(msg) => write!(f, "handle share: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<toml::de::Error> for LinkError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
