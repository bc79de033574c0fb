//! # kvmux
//!
//! Tagged request/response multiplexing over a single TCP connection:
//! - Length-prefixed, tagged framing
//! - One background reader routing frames to per-tag slots
//! - Any number of concurrent callers, each receiving exactly its own response
//! - Typed key-value client on top, including deferred ("get when") answers
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       KvClient                               │
//! │        (tags, request/response codec, get-when loop)         │
//! └──────────────┬──────────────────────────────▲───────────────┘
//!                │ submit(tag, payload)         │ await_response(tag)
//! ┌──────────────▼──────────────────────────────┴───────────────┐
//! │                     Demultiplexer                            │
//! │     slot table: tag → bounded FIFO   (reader thread)         │
//! └──────────────┬──────────────────────────────▲───────────────┘
//!                │ send                         │ receive
//! ┌──────────────▼──────────────────────────────┴───────────────┐
//! │                   TaggedConnection                           │
//! │        send lock  │  receive lock   (one TCP stream)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod network;
pub mod demux;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{MuxError, Result};
pub use config::Config;
pub use client::KvClient;
pub use demux::Demultiplexer;
pub use network::TaggedConnection;
pub use protocol::Frame;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvmux
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
