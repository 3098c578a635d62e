//! Unix descriptor sharing via pinned duplicates.
//!
//! Raw descriptors cross the API boundary here, so this file opts back into
//! `unsafe` for the borrow at the edge.
#![allow(unsafe_code)]

use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};

use interprocess::local_socket::{traits::StreamCommon, Stream};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use parking_lot::Mutex;
use tracing::debug;

use super::{PeerProcess, RawResource, RemoteHandle, ResourceSharer};
use crate::{LinkError, Result};

/// Resolve the peer process of a connected local-socket stream.
pub(crate) fn stream_peer(stream: &Stream) -> Result<PeerProcess> {
    let creds = stream
        .peer_creds()
        .map_err(|err| LinkError::Io(format!("peer credentials unavailable: {err}")))?;
    let pid = creds
        .pid()
        .ok_or_else(|| LinkError::Io("peer credentials carry no pid".into()))?;
    Ok(PeerProcess::new(pid))
}

/// Shares descriptors by pinning a duplicate for the sharer's lifetime and
/// handing out the duplicate's number, for the peer to fetch with
/// `pidfd_getfd(2)`.
///
/// Platform bound: nothing on Unix writes into another process's descriptor
/// table, so the pinned duplicate is only retrievable while this process
/// lives. Pinned descriptors are released when the sharer drops.
pub struct UnixSharer {
    pinned: Mutex<Vec<OwnedFd>>,
}

impl UnixSharer {
    /// Create a sharer with no pinned descriptors.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pinned: Mutex::new(Vec::new()),
        }
    }

    fn try_share(&self, resource: RawResource, peer: &PeerProcess) -> Result<RemoteHandle> {
        if resource < 0 {
            return Err(LinkError::HandleShare("invalid local descriptor".into()));
        }

        // Signal 0 checks existence and permission without delivering.
        kill(Pid::from_raw(peer.pid()), None)
            .map_err(|err| LinkError::HandleShare(format!("peer process {}: {err}", peer.pid())))?;

        // SAFETY: the descriptor was checked non-negative above, and the
        // `ResourceSharer` contract requires the caller to keep it open for
        // the duration of the call.
        let borrowed = unsafe { BorrowedFd::borrow_raw(resource) };
        let duplicate = borrowed
            .try_clone_to_owned()
            .map_err(|err| LinkError::HandleShare(format!("dup of {resource}: {err}")))?;
        let remote = duplicate.as_raw_fd();
        self.pinned.lock().push(duplicate);
        Ok(remote)
    }
}

impl ResourceSharer for UnixSharer {
    fn share(&self, resource: RawResource, peer: &PeerProcess) -> Option<RemoteHandle> {
        match self.try_share(resource, peer) {
            Ok(remote) => {
                debug!(resource, remote, pid = peer.pid(), "descriptor pinned for peer");
                Some(remote)
            }
            Err(err) => {
                debug!(error = %err, pid = peer.pid(), "resource share degraded to none");
                None
            }
        }
    }
}

impl Default for UnixSharer {
    fn default() -> Self {
        Self::new()
    }
}
