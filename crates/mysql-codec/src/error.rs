//! Codec error types.

use thiserror::Error;

/// Errors that can occur while framing or de-framing packets.
#[derive(Debug, Error)]
pub enum CodecError {
    /// IO error during read/write operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame arrived with an unexpected sequence id.
    #[error("packet sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        /// Sequence id we were waiting for.
        expected: u8,
        /// Sequence id the frame carried.
        actual: u8,
    },

    /// The peer closed the connection mid-message.
    #[error("connection closed")]
    ConnectionClosed,
}
