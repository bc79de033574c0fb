//! Request definitions
//!
//! Represents requests from clients and their payload encoding.
//!
//! Every request payload starts with a 2-byte discriminator followed by
//! the fields of that request type.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use super::codec::{
    expect_end, get_blob, get_count, get_str, get_u16, put_blob, put_count, put_str,
};
use crate::error::{MuxError, Result};

/// Request discriminators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RequestType {
    Authenticate = 1,
    Register = 2,
    Put = 3,
    Get = 4,
    MultiPut = 5,
    MultiGet = 6,
    GetWhen = 7,
    Disconnect = 8,
}

impl TryFrom<u16> for RequestType {
    type Error = MuxError;

    fn try_from(value: u16) -> Result<Self> {
        Ok(match value {
            1 => RequestType::Authenticate,
            2 => RequestType::Register,
            3 => RequestType::Put,
            4 => RequestType::Get,
            5 => RequestType::MultiPut,
            6 => RequestType::MultiGet,
            7 => RequestType::GetWhen,
            8 => RequestType::Disconnect,
            _ => {
                return Err(MuxError::Protocol(format!(
                    "Unknown request type: 0x{:04x}",
                    value
                )))
            }
        })
    }
}

/// A typed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Check credentials
    Authenticate { username: String, password: String },

    /// Create an account
    Register { username: String, password: String },

    /// Store a value under a key
    Put { key: String, value: Vec<u8> },

    /// Fetch the value of a key
    Get { key: String },

    /// Store several key-value pairs
    MultiPut { pairs: HashMap<String, Vec<u8>> },

    /// Fetch several keys
    MultiGet { keys: Vec<String> },

    /// Fetch `key` once `cond_key` holds `cond_value`
    GetWhen {
        key: String,
        cond_key: String,
        cond_value: Vec<u8>,
    },

    /// Announce an orderly client shutdown
    Disconnect,
}

impl Request {
    /// Get the request type
    pub fn request_type(&self) -> RequestType {
        match self {
            Request::Authenticate { .. } => RequestType::Authenticate,
            Request::Register { .. } => RequestType::Register,
            Request::Put { .. } => RequestType::Put,
            Request::Get { .. } => RequestType::Get,
            Request::MultiPut { .. } => RequestType::MultiPut,
            Request::MultiGet { .. } => RequestType::MultiGet,
            Request::GetWhen { .. } => RequestType::GetWhen,
            Request::Disconnect => RequestType::Disconnect,
        }
    }
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request payload
///
/// Format: discriminator (2) + request-specific fields
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u16(request.request_type() as u16);

    match request {
        Request::Authenticate { username, password }
        | Request::Register { username, password } => {
            put_str(&mut buf, username)?;
            put_str(&mut buf, password)?;
        }
        Request::Put { key, value } => {
            put_str(&mut buf, key)?;
            put_blob(&mut buf, value)?;
        }
        Request::Get { key } => {
            put_str(&mut buf, key)?;
        }
        Request::MultiPut { pairs } => {
            put_count(&mut buf, pairs.len())?;
            for (key, value) in pairs {
                put_str(&mut buf, key)?;
                put_blob(&mut buf, value)?;
            }
        }
        Request::MultiGet { keys } => {
            put_count(&mut buf, keys.len())?;
            for key in keys {
                put_str(&mut buf, key)?;
            }
        }
        Request::GetWhen {
            key,
            cond_key,
            cond_value,
        } => {
            put_str(&mut buf, key)?;
            put_str(&mut buf, cond_key)?;
            put_blob(&mut buf, cond_value)?;
        }
        Request::Disconnect => {}
    }

    Ok(buf.to_vec())
}

/// Decode a request payload (the peer's side of `encode_request`)
pub fn decode_request(payload: &[u8]) -> Result<Request> {
    let mut buf = payload;
    let request_type = RequestType::try_from(get_u16(&mut buf, "request type")?)?;

    let request = match request_type {
        RequestType::Authenticate => Request::Authenticate {
            username: get_str(&mut buf, "username")?,
            password: get_str(&mut buf, "password")?,
        },
        RequestType::Register => Request::Register {
            username: get_str(&mut buf, "username")?,
            password: get_str(&mut buf, "password")?,
        },
        RequestType::Put => Request::Put {
            key: get_str(&mut buf, "key")?,
            value: get_blob(&mut buf, "value")?,
        },
        RequestType::Get => Request::Get {
            key: get_str(&mut buf, "key")?,
        },
        RequestType::MultiPut => {
            let count = get_count(&mut buf, "pair count")?;
            let mut pairs = HashMap::new();
            for _ in 0..count {
                let key = get_str(&mut buf, "key")?;
                let value = get_blob(&mut buf, "value")?;
                pairs.insert(key, value);
            }
            Request::MultiPut { pairs }
        }
        RequestType::MultiGet => {
            let count = get_count(&mut buf, "key count")?;
            let mut keys = Vec::new();
            for _ in 0..count {
                keys.push(get_str(&mut buf, "key")?);
            }
            Request::MultiGet { keys }
        }
        RequestType::GetWhen => Request::GetWhen {
            key: get_str(&mut buf, "key")?,
            cond_key: get_str(&mut buf, "condition key")?,
            cond_value: get_blob(&mut buf, "condition value")?,
        },
        RequestType::Disconnect => Request::Disconnect,
    };

    expect_end(buf, "request")?;
    Ok(request)
}
