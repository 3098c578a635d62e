//! Chunked message framing over an opaque byte stream.
//!
//! A message is a sequence of chunks, each a 2-byte little-endian size in
//! `1..=MAX_CHUNK_BYTES` followed by that many payload bytes, terminated by a
//! 2-byte zero marker. The reader cannot learn the total length up front; it
//! loops over bounded chunks until the marker. A zero-length message is just
//! the marker.

use std::io::{ErrorKind, Read, Write};

use bytes::{Bytes, BytesMut};

use crate::{LinkError, Result};

/// Largest payload carried by a single chunk.
pub const MAX_CHUNK_BYTES: usize = 4096;

/// Cap on one reassembled message, bounding allocation against a hostile or
/// corrupted peer.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Write one complete message to `writer`.
///
/// Loops until every chunk and the end marker are written; a short write is
/// retried by `write_all`, so the message is either fully framed on the wire
/// or the call fails.
///
/// # Errors
///
/// Returns `LinkError::ConnectionClosed` if the peer closes mid-write, or
/// `LinkError::Io` for any other transport failure.
pub fn write_message(writer: &mut impl Write, payload: &[u8]) -> Result<()> {
    for chunk in payload.chunks(MAX_CHUNK_BYTES) {
        let len = u16::try_from(chunk.len())
            .map_err(|_| LinkError::Protocol("chunk exceeds framing limit".into()))?;
        writer.write_all(&len.to_le_bytes()).map_err(map_io_err)?;
        writer.write_all(chunk).map_err(map_io_err)?;
    }
    writer.write_all(&0u16.to_le_bytes()).map_err(map_io_err)?;
    writer.flush().map_err(map_io_err)?;
    Ok(())
}

/// Read one complete message from `reader`, reassembling chunks in order.
///
/// # Errors
///
/// Returns `LinkError::ConnectionClosed` if the stream ends before the end
/// marker (including before the first chunk header), `LinkError::Protocol`
/// if a chunk size exceeds [`MAX_CHUNK_BYTES`] or the accumulated message
/// exceeds [`MAX_MESSAGE_BYTES`], or `LinkError::Io` for any other transport
/// failure.
pub fn read_message(reader: &mut impl Read) -> Result<Bytes> {
    let mut message = BytesMut::new();
    let mut chunk = [0u8; MAX_CHUNK_BYTES];

    loop {
        let mut header = [0u8; 2];
        reader.read_exact(&mut header).map_err(map_io_err)?;
        let len = usize::from(u16::from_le_bytes(header));

        if len == 0 {
            return Ok(message.freeze());
        }
        if len > MAX_CHUNK_BYTES {
            return Err(LinkError::Protocol(format!(
                "chunk of {len} bytes exceeds limit of {MAX_CHUNK_BYTES}"
            )));
        }
        if message.len() + len > MAX_MESSAGE_BYTES {
            return Err(LinkError::Protocol(format!(
                "message exceeds limit of {MAX_MESSAGE_BYTES} bytes"
            )));
        }

        reader.read_exact(&mut chunk[..len]).map_err(map_io_err)?;
        message.extend_from_slice(&chunk[..len]);
    }
}

fn map_io_err(err: std::io::Error) -> LinkError {
    match err.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => {
            LinkError::ConnectionClosed
        }
        _ => LinkError::Io(err.to_string()),
    }
}
