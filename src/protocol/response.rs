//! Response definitions
//!
//! Responses carry no discriminator on the wire; their layout is implied
//! by the request type they answer.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use super::codec::{
    expect_end, get_blob, get_bytes, get_count, get_i32, get_str, get_u8, put_blob, put_count,
    put_str,
};
use super::RequestType;
use crate::error::{MuxError, Result};

/// GetWhen status byte: condition not satisfied yet
pub const GET_WHEN_PENDING: u8 = 0x00;

/// GetWhen status byte: result follows
pub const GET_WHEN_READY: u8 = 0x01;

/// A typed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Acknowledgement of a write (Put, MultiPut)
    Ack,

    /// Yes/no answer (Authenticate, Register)
    Bool(bool),

    /// Value of a single key, `None` when absent (Get)
    Value(Option<Vec<u8>>),

    /// Values of several keys (MultiGet)
    Values(HashMap<String, Vec<u8>>),

    /// GetWhen condition not satisfied yet; the real answer follows on the same tag
    Pending,

    /// GetWhen result
    Ready(Vec<u8>),
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response payload
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();

    match response {
        Response::Ack => {}
        Response::Bool(value) => buf.put_u8(u8::from(*value)),
        Response::Value(Some(value)) => put_blob(&mut buf, value)?,
        Response::Value(None) => buf.put_i32(-1),
        Response::Values(values) => {
            put_count(&mut buf, values.len())?;
            for (key, value) in values {
                put_str(&mut buf, key)?;
                put_blob(&mut buf, value)?;
            }
        }
        Response::Pending => buf.put_u8(GET_WHEN_PENDING),
        Response::Ready(value) => {
            buf.put_u8(GET_WHEN_READY);
            put_blob(&mut buf, value)?;
        }
    }

    Ok(buf.to_vec())
}

/// Decode the payload answering a request of `request_type`
pub fn decode_response(request_type: RequestType, payload: &[u8]) -> Result<Response> {
    let mut buf = payload;

    let response = match request_type {
        RequestType::Authenticate | RequestType::Register => {
            Response::Bool(get_u8(&mut buf, "boolean answer")? != 0)
        }
        // Write acknowledgements carry nothing the client needs
        RequestType::Put | RequestType::MultiPut => return Ok(Response::Ack),
        RequestType::Get => {
            let len = get_i32(&mut buf, "value length")?;
            if len < 0 {
                Response::Value(None)
            } else {
                Response::Value(Some(get_bytes(&mut buf, len as usize, "value")?))
            }
        }
        RequestType::MultiGet => {
            let count = get_count(&mut buf, "entry count")?;
            let mut values = HashMap::with_capacity(count.min(1024));
            for _ in 0..count {
                let key = get_str(&mut buf, "key")?;
                let value = get_blob(&mut buf, "value")?;
                values.insert(key, value);
            }
            Response::Values(values)
        }
        RequestType::GetWhen => {
            // Empty payload is the legacy "not yet" placeholder
            if buf.is_empty() {
                return Ok(Response::Pending);
            }
            match get_u8(&mut buf, "get-when status")? {
                GET_WHEN_PENDING => Response::Pending,
                GET_WHEN_READY => Response::Ready(get_blob(&mut buf, "value")?),
                other => {
                    return Err(MuxError::Protocol(format!(
                        "Unknown get-when status: 0x{:02x}",
                        other
                    )))
                }
            }
        }
        RequestType::Disconnect => {
            return Err(MuxError::Protocol(
                "Disconnect has no response".to_string(),
            ))
        }
    };

    expect_end(buf, "response")?;
    Ok(response)
}
