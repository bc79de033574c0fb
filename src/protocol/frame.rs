//! Frame codec
//!
//! Encoding and decoding of the tagged frames that carry every request
//! and response over the shared stream.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Tag (4)  │ Len (4)  │      Payload (Len bytes)    │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! Both header fields are signed big-endian 32-bit integers. `Len` must
//! be non-negative.

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, Bytes};

use crate::error::{MuxError, Result};

/// Header size: 4 bytes tag + 4 bytes length
pub const HEADER_SIZE: usize = 8;

/// Largest payload the header can describe
pub const MAX_FRAME_PAYLOAD: usize = i32::MAX as usize;

/// A single tagged frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Correlation tag chosen by the requester
    pub tag: i32,

    /// Opaque payload (may be empty, may contain zero bytes)
    pub payload: Bytes,
}

impl Frame {
    pub fn new(tag: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }
}

// =============================================================================
// Buffer Encoding/Decoding
// =============================================================================

/// Encode a frame to bytes
///
/// Format: tag (4) + payload_len (4) + payload
pub fn encode_frame(tag: i32, payload: &[u8]) -> Result<Vec<u8>> {
    let header = encode_header(tag, payload.len())?;

    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.extend_from_slice(&header);
    message.extend_from_slice(payload);
    Ok(message)
}

/// Decode one complete frame from the start of `bytes`
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    if bytes.len() < HEADER_SIZE {
        return Err(MuxError::Protocol(format!(
            "Incomplete frame header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let (tag, payload_len) = decode_header(&bytes[..HEADER_SIZE], MAX_FRAME_PAYLOAD)?;

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(MuxError::Protocol(format!(
            "Incomplete frame payload: expected {} bytes, got {}",
            payload_len,
            bytes.len() - HEADER_SIZE
        )));
    }

    Ok(Frame::new(
        tag,
        Bytes::copy_from_slice(&bytes[HEADER_SIZE..total_len]),
    ))
}

fn encode_header(tag: i32, payload_len: usize) -> Result<[u8; HEADER_SIZE]> {
    if payload_len > MAX_FRAME_PAYLOAD {
        return Err(MuxError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_FRAME_PAYLOAD
        )));
    }

    let mut header = [0u8; HEADER_SIZE];
    let mut buf = &mut header[..];
    buf.put_i32(tag);
    buf.put_i32(payload_len as i32);
    Ok(header)
}

/// Parse tag and length, validating the length against `max_payload`
fn decode_header(mut header: &[u8], max_payload: usize) -> Result<(i32, usize)> {
    let tag = header.get_i32();
    let declared = header.get_i32();

    if declared < 0 {
        return Err(MuxError::Protocol(format!(
            "Negative payload length {} for tag {}",
            declared, tag
        )));
    }

    let payload_len = declared as usize;
    if payload_len > max_payload {
        return Err(MuxError::Protocol(format!(
            "Payload too large: {} bytes for tag {} (max {})",
            payload_len, tag, max_payload
        )));
    }

    Ok((tag, payload_len))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Write one frame to a stream and flush it
///
/// Callers that share the writer must hold a lock for the whole call so
/// frames never interleave.
pub fn write_frame<W: Write>(writer: &mut W, tag: i32, payload: &[u8]) -> Result<()> {
    let header = encode_header(tag, payload.len())?;
    writer.write_all(&header)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one complete frame from a stream
///
/// Blocks until a full frame is available. Returns `Ok(None)` when the
/// stream ends cleanly before the first header byte; an end of stream
/// anywhere later is an `UnexpectedEof` I/O error.
pub fn read_frame<R: Read>(reader: &mut R, max_payload: usize) -> Result<Option<Frame>> {
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;

    while filled < HEADER_SIZE {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(MuxError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "stream ended mid-header ({} of {} bytes)",
                        filled, HEADER_SIZE
                    ),
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let (tag, payload_len) = decode_header(&header, max_payload)?;

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload)?;
    }

    Ok(Some(Frame::new(tag, payload)))
}
