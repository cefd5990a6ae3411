//! Domain-specific error types for the VBridge protocol.
//!
//! All fallible operations return `Result<T, VbError>`.
//! "Need more I/O" is never an error: it is [`crate::Step::Pending`].
//! Every `VbError` reaching a connection loop tears down that one
//! connection and nothing else.

use thiserror::Error;

use crate::command::Command;

/// The canonical error type for the VBridge protocol.
#[derive(Debug, Error)]
pub enum VbError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A tag byte did not map to any known command.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// A known tag arrived while it was not in the legal mask.
    #[error("illegal command {0} for current state")]
    IllegalCommand(Command),

    /// A length-prefixed token announced an unacceptable size.
    #[error("invalid token size: {size} bytes (max {max})")]
    TokenSize { size: usize, max: usize },

    /// A packet violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Codec Errors ─────────────────────────────────────────────
    /// The image stream decoded to something no encoder can produce.
    #[error("corrupt image stream: {0}")]
    CorruptStream(&'static str),

    // ── Connection Errors ────────────────────────────────────────
    /// The transport reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The peer closed the byte stream.
    #[error("connection closed by peer")]
    Closed,

    /// The peer sent `stop`, or the local side asked to close.
    #[error("connection stopped")]
    Stopped,

    // ── Auth Errors ──────────────────────────────────────────────
    /// The peer sent an unusable credential blob.
    #[error("malformed credentials")]
    MalformedCredentials,

    // ── Application Errors ───────────────────────────────────────
    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl VbError {
    /// Whether this error is an orderly end of the connection rather
    /// than a fault worth a warning.
    pub fn is_orderly(&self) -> bool {
        matches!(self, VbError::Closed | VbError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = VbError::TokenSize {
            size: 40000,
            max: 32768,
        };
        assert!(e.to_string().contains("40000"));
        assert!(e.to_string().contains("32768"));

        let e = VbError::IllegalCommand(Command::Key);
        assert!(e.to_string().contains("key"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: VbError = io_err.into();
        assert!(matches!(e, VbError::Connection(_)));
        assert!(!e.is_orderly());
        assert!(VbError::Closed.is_orderly());
    }
}
