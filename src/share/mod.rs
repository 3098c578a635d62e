//! Sharing OS resource handles with the connected peer process.
//!
//! Duplication, not transfer: the caller keeps its local handle, and on
//! success the peer gains an independent second reference to the same
//! underlying resource.

use std::sync::Arc;

use parking_lot::Mutex;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixSharer;
#[cfg(windows)]
pub use windows::WindowsSharer;

#[cfg(unix)]
pub(crate) use unix::stream_peer;
#[cfg(windows)]
pub(crate) use windows::stream_peer;

/// Platform-native resource handle accepted for sharing.
#[cfg(unix)]
pub type RawResource = std::os::fd::RawFd;
/// Platform-native resource handle accepted for sharing.
#[cfg(windows)]
pub type RawResource = std::os::windows::io::RawHandle;

/// Handle value meaningful to the peer process.
///
/// On Windows this is an entry in the peer's own handle table. On Unix it
/// is the number of a descriptor pinned in this process, for the peer to
/// fetch with `pidfd_getfd(2)`.
#[cfg(unix)]
pub type RemoteHandle = std::os::fd::RawFd;
/// Handle value meaningful to the peer process.
#[cfg(windows)]
pub type RemoteHandle = isize;

/// Identity of the process at the other end of a live channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerProcess {
    pid: i32,
}

impl PeerProcess {
    /// Wrap a raw process id.
    #[must_use]
    pub fn new(pid: i32) -> Self {
        Self { pid }
    }

    /// Raw process id.
    #[must_use]
    pub fn pid(&self) -> i32 {
        self.pid
    }
}

/// Duplicates local resource handles into a peer process.
///
/// Implementations never panic or abort on failure: every precondition
/// violation and OS refusal comes back as `None`, and the caller proceeds
/// without the shared handle.
pub trait ResourceSharer: Send + Sync {
    /// Produce a handle to `resource` usable by `peer`, or `None`.
    ///
    /// `resource` must be open for the duration of the call.
    fn share(&self, resource: RawResource, peer: &PeerProcess) -> Option<RemoteHandle>;
}

/// Shared sharers delegate, so one instance can serve several clients.
impl<S: ResourceSharer + ?Sized> ResourceSharer for Arc<S> {
    fn share(&self, resource: RawResource, peer: &PeerProcess) -> Option<RemoteHandle> {
        (**self).share(resource, peer)
    }
}

/// Production sharer for the current platform.
#[must_use]
pub fn default_sharer() -> Box<dyn ResourceSharer> {
    #[cfg(unix)]
    {
        Box::new(UnixSharer::new())
    }
    #[cfg(windows)]
    {
        Box::new(WindowsSharer::new())
    }
}

/// Sharer double that records calls and hands back a canned outcome.
///
/// For tests and for embedders that stage handle exchange through their own
/// broker instead of OS duplication.
pub struct RecordingSharer {
    outcome: Option<RemoteHandle>,
    calls: Mutex<Vec<(i64, i32)>>,
}

impl RecordingSharer {
    /// Create a double that answers every `share` with `outcome`.
    #[must_use]
    pub fn returning(outcome: Option<RemoteHandle>) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every `(resource, peer pid)` pair seen so far, in call order, with
    /// the resource rendered numerically.
    #[must_use]
    pub fn calls(&self) -> Vec<(i64, i32)> {
        self.calls.lock().clone()
    }
}

impl ResourceSharer for RecordingSharer {
    fn share(&self, resource: RawResource, peer: &PeerProcess) -> Option<RemoteHandle> {
        self.calls.lock().push((resource_value(resource), peer.pid()));
        self.outcome
    }
}

#[cfg(unix)]
fn resource_value(resource: RawResource) -> i64 {
    i64::from(resource)
}

#[cfg(windows)]
fn resource_value(resource: RawResource) -> i64 {
    resource as isize as i64
}
