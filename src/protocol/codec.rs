//! Payload field codec
//!
//! Primitive field encoders/decoders shared by the request and response
//! codecs. All integers are big-endian.
//!
//! - `str`:  u16 byte length + UTF-8 bytes
//! - `blob`: i32 byte length + bytes
//!
//! Decoders consume from a `&[u8]` cursor and never panic on short input.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{MuxError, Result};

/// Longest string a `str` field can carry (bytes)
pub const MAX_STR_LEN: usize = u16::MAX as usize;

// =============================================================================
// Encoding
// =============================================================================

pub fn put_str(buf: &mut BytesMut, value: &str) -> Result<()> {
    if value.len() > MAX_STR_LEN {
        return Err(MuxError::Protocol(format!(
            "String field too long: {} bytes (max {})",
            value.len(),
            MAX_STR_LEN
        )));
    }
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
    Ok(())
}

pub fn put_blob(buf: &mut BytesMut, value: &[u8]) -> Result<()> {
    put_count(buf, value.len())?;
    buf.put_slice(value);
    Ok(())
}

/// Write an i32 element count or length
pub fn put_count(buf: &mut BytesMut, count: usize) -> Result<()> {
    let count = i32::try_from(count)
        .map_err(|_| MuxError::Protocol(format!("Count {} does not fit in i32", count)))?;
    buf.put_i32(count);
    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

fn ensure(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(MuxError::Protocol(format!(
            "Truncated {}: expected {} bytes, got {}",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

pub fn get_u8(buf: &mut &[u8], what: &str) -> Result<u8> {
    ensure(*buf, 1, what)?;
    Ok(buf.get_u8())
}

pub fn get_u16(buf: &mut &[u8], what: &str) -> Result<u16> {
    ensure(*buf, 2, what)?;
    Ok(buf.get_u16())
}

pub fn get_i32(buf: &mut &[u8], what: &str) -> Result<i32> {
    ensure(*buf, 4, what)?;
    Ok(buf.get_i32())
}

/// Read a non-negative i32 count
pub fn get_count(buf: &mut &[u8], what: &str) -> Result<usize> {
    let count = get_i32(buf, what)?;
    usize::try_from(count)
        .map_err(|_| MuxError::Protocol(format!("Negative {}: {}", what, count)))
}

pub fn get_bytes(buf: &mut &[u8], len: usize, what: &str) -> Result<Vec<u8>> {
    ensure(*buf, len, what)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

pub fn get_str(buf: &mut &[u8], what: &str) -> Result<String> {
    let len = get_u16(buf, what)? as usize;
    let bytes = get_bytes(buf, len, what)?;
    String::from_utf8(bytes)
        .map_err(|e| MuxError::Protocol(format!("Invalid UTF-8 in {}: {}", what, e)))
}

pub fn get_blob(buf: &mut &[u8], what: &str) -> Result<Vec<u8>> {
    let len = get_count(buf, what)?;
    get_bytes(buf, len, what)
}

/// Reject trailing garbage after a fully decoded payload
pub fn expect_end(buf: &[u8], what: &str) -> Result<()> {
    if !buf.is_empty() {
        return Err(MuxError::Protocol(format!(
            "{}: {} unexpected trailing bytes",
            what,
            buf.len()
        )));
    }
    Ok(())
}
