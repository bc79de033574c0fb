//! Protocol Module
//!
//! Defines the wire protocol between clients and the key-value server.
//!
//! ## Framing
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Tag (4)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! The tag pairs a response with its request. The framing layer never
//! looks inside the payload.
//!
//! ## Request Payloads
//! ```text
//! ┌──────────┬─────────────────────────────┐
//! │ Type (2) │         Fields              │
//! └──────────┴─────────────────────────────┘
//! ```
//!
//! ### Request Types
//! - 0x0001: AUTHENTICATE - str user, str password
//! - 0x0002: REGISTER     - str user, str password
//! - 0x0003: PUT          - str key, blob value
//! - 0x0004: GET          - str key
//! - 0x0005: MULTI_PUT    - count (4) + (str key, blob value)*
//! - 0x0006: MULTI_GET    - count (4) + (str key)*
//! - 0x0007: GET_WHEN     - str key, str cond_key, blob cond_value
//! - 0x0008: DISCONNECT   - empty
//!
//! `str` is a u16 length + UTF-8, `blob` an i32 length + bytes.
//!
//! ## Response Payloads
//! - AUTHENTICATE / REGISTER: 1 byte, non-zero = true
//! - PUT / MULTI_PUT: acknowledgement, contents ignored
//! - GET: blob, negative length = absent
//! - MULTI_GET: count (4) + (str key, blob value)*
//! - GET_WHEN: status (1) = 0x00 pending | 0x01 ready + blob.
//!   An empty payload also means pending.

mod codec;
mod frame;
mod request;
mod response;

pub use codec::MAX_STR_LEN;
pub use frame::{
    decode_frame, encode_frame, read_frame, write_frame, Frame, HEADER_SIZE, MAX_FRAME_PAYLOAD,
};
pub use request::{decode_request, encode_request, Request, RequestType};
pub use response::{decode_response, encode_response, Response, GET_WHEN_PENDING, GET_WHEN_READY};
