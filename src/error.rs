//! Error types for mcharness
//!
//! Provides a unified error type for codec, client and template operations.

use thiserror::Error;

use crate::protocol::binary::Status;

/// Result type alias using McError
pub type Result<T> = std::result::Result<T, McError>;

/// Unified error type for mcharness operations
#[derive(Debug, Error)]
pub enum McError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Wire Errors
    // -------------------------------------------------------------------------
    /// Truncated or malformed frame/line. The connection is unusable afterwards.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Well-formed reply that is not legal for the command issued.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// ERROR / CLIENT_ERROR / SERVER_ERROR where the command has no typed outcome for it.
    #[error("Error reply from server: {0}")]
    ErrorReply(String),

    /// Binary status outside the set of normal outcomes.
    #[error("Binary status {status:?}: {message}")]
    Status { status: Status, message: String },

    #[error("Unknown binary status: 0x{0:04x}")]
    UnknownStatus(u16),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not connected")]
    NotConnected,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    /// Config document and substitution ports disagree in size.
    #[error("Configuration mismatch: {0}")]
    ConfigMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl McError {
    /// The connection must be torn down; nothing more can be read from it safely.
    pub fn poisons_connection(&self) -> bool {
        matches!(self, McError::Io(_) | McError::Framing(_))
    }

    /// The call failed on an illegal reply; reopen before the next request.
    pub fn wants_reconnect(&self) -> bool {
        matches!(self, McError::Protocol(_))
    }

    pub(crate) fn closed_mid_frame(expected: usize, got: usize) -> Self {
        McError::Framing(format!(
            "connection closed after {} of {} bytes",
            got, expected
        ))
    }
}
