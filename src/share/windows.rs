//! Windows handle sharing via `DuplicateHandle`.
//!
//! The raw Win32 calls live behind this file's boundary.
#![allow(unsafe_code)]

use interprocess::local_socket::{traits::StreamCommon, Stream};
use tracing::debug;
use windows::Win32::Foundation::{CloseHandle, DuplicateHandle, DUPLICATE_SAME_ACCESS, HANDLE};
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcess, PROCESS_DUP_HANDLE};

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
    let pid = i32::try_from(pid)
        .map_err(|_| LinkError::Io(format!("peer process id {pid} out of range")))?;
    Ok(PeerProcess::new(pid))
}

/// Shares handles by duplicating them straight into the peer's handle table
/// with `DuplicateHandle`. The returned value is meaningful only inside the
/// peer process and survives this process exiting.
pub struct WindowsSharer;

impl WindowsSharer {
    /// Create the sharer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn try_share(resource: RawResource, peer: &PeerProcess) -> Result<RemoteHandle> {
        if resource.is_null() {
            return Err(LinkError::HandleShare("invalid local handle".into()));
        }
        let pid = u32::try_from(peer.pid())
            .map_err(|_| LinkError::HandleShare(format!("invalid peer pid {}", peer.pid())))?;

        // SAFETY: plain Win32 call; a dead or forbidden pid comes back as Err.
        let process = unsafe { OpenProcess(PROCESS_DUP_HANDLE, false.into(), pid) }
            .map_err(|err| LinkError::HandleShare(format!("open peer process {pid}: {err}")))?;

        let mut remote = HANDLE::default();
        // SAFETY: the source handle is open per the `ResourceSharer`
        // contract, `process` was opened above with duplicate rights, and
        // the out-pointer refers to a local.
        let duplicated = unsafe {
            DuplicateHandle(
                GetCurrentProcess(),
                HANDLE(resource),
                process,
                &mut remote,
                0,
                false.into(),
                DUPLICATE_SAME_ACCESS,
            )
        };
        // SAFETY: `process` was opened by this function and is closed once.
        if let Err(err) = unsafe { CloseHandle(process) } {
            debug!(pid, error = %err, "closing peer process handle failed");
        }
        duplicated.map_err(|err| LinkError::HandleShare(format!("duplicate into {pid}: {err}")))?;
        Ok(remote.0 as isize)
    }
}

impl ResourceSharer for WindowsSharer {
    fn share(&self, resource: RawResource, peer: &PeerProcess) -> Option<RemoteHandle> {
        match Self::try_share(resource, peer) {
            Ok(remote) => {
                debug!(remote, pid = peer.pid(), "handle duplicated into peer");
                Some(remote)
            }
            Err(err) => {
                debug!(error = %err, pid = peer.pid(), "resource share degraded to none");
                None
            }
        }
    }
}

impl Default for WindowsSharer {
    fn default() -> Self {
        Self::new()
    }
}
