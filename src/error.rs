//! Error types for kvmux
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using MuxError
pub type Result<T> = std::result::Result<T, MuxError>;

/// Unified error type for kvmux operations
#[derive(Debug, Error)]
pub enum MuxError {
    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Wait Errors
    // -------------------------------------------------------------------------
    #[error("Timed out waiting for response to tag {tag}")]
    Timeout { tag: i32 },

    #[error("Wait for tag {tag} was cancelled")]
    Cancelled { tag: i32 },

    /// The peer delivered more frames for a tag than its slot can hold
    #[error("Slot for tag {tag} overflowed; frames were rejected")]
    SlotOverflow { tag: i32 },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MuxError {
    /// Whether this error means the connection is gone for good
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, MuxError::ConnectionClosed | MuxError::Io(_))
    }
}
