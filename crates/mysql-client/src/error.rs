//! Client error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use mysql_codec::CodecError;
use mysql_protocol::response::ErrPacket;
use mysql_protocol::ProtocolError;

/// Errors produced by a [`Session`](crate::Session).
#[derive(Debug, Error)]
pub enum Error {
    /// DNS resolution failed.
    #[error("failed to resolve {host}:{port}")]
    Resolve {
        /// Hostname we tried to resolve.
        host: String,
        /// Port the lookup was for.
        port: u16,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },

    /// The TCP connect step failed or timed out.
    #[error("failed to connect to {endpoint}")]
    Connect {
        /// Endpoint we dialed.
        endpoint: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The server reported an error. This is the carrier for
    /// server-origin diagnostics (error code, SQLSTATE and message are
    /// forwarded verbatim).
    #[error("server error {code} ({sql_state}): {message}")]
    Server {
        /// MySQL error code.
        code: u16,
        /// Five-character SQLSTATE.
        sql_state: String,
        /// Server-provided message.
        message: String,
    },

    /// TLS negotiation failed.
    #[error("TLS error")]
    Tls(#[source] io::Error),

    /// The server and this client share no workable protocol subset.
    #[error("unsupported server: {0}")]
    Unsupported(&'static str),

    /// The chosen auth path needs an encrypted stream.
    #[error("server requires a secure channel to complete authentication")]
    AuthRequiresTls,

    /// An operation was invoked on a session with no live stream.
    #[error("session is not connected")]
    NotConnected,

    /// Malformed payload.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Framing or transport failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ErrPacket> for Error {
    fn from(err: ErrPacket) -> Self {
        Self::Server {
            code: err.code,
            sql_state: err.sql_state,
            message: err.message,
        }
    }
}

impl Error {
    /// Whether this error came from the server rather than the transport.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_err_packet_conversion() {
        let packet = ErrPacket {
            code: 1045,
            sql_state: "28000".into(),
            message: "Access denied".into(),
        };
        let err = Error::from(packet);
        assert!(err.is_server_error());
        assert_eq!(
            err.to_string(),
            "server error 1045 (28000): Access denied"
        );
    }
}
