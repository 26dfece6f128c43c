//! Protocol-level error types.

use thiserror::Error;

/// Errors that can occur while parsing or encoding protocol payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A payload ended before a required field.
    #[error("truncated payload: missing {field}")]
    Truncated {
        /// Name of the field that could not be read.
        field: &'static str,
    },

    /// The server announced a protocol version we cannot speak.
    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(u8),

    /// A length-encoded integer used the reserved 0xFB/0xFF prefix.
    #[error("invalid length-encoded integer prefix: {0:#x}")]
    InvalidLenencPrefix(u8),

    /// A string field contained invalid UTF-8.
    #[error("invalid utf-8 in {field}")]
    InvalidUtf8 {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The first byte of a response packet did not match any known kind.
    #[error("unexpected packet: first byte {0:#x}")]
    UnexpectedPacket(u8),

    /// A response packet was empty.
    #[error("empty packet")]
    EmptyPacket,
}
