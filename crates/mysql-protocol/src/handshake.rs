//! The initial handshake exchange.
//!
//! The server opens the conversation with a HandshakeV10 payload; the
//! client answers with a HandshakeResponse41 (optionally preceded by a
//! short SSL request when upgrading to TLS).

use bytes::Bytes;

use crate::auth;
use crate::constants::{capabilities, PROTOCOL_VERSION};
use crate::error::ProtocolError;
use crate::packet::{PacketReader, PacketWriter};

/// The server's HandshakeV10 greeting.
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    /// Announced protocol version (always 10).
    pub protocol_version: u8,
    /// Human-readable server version, e.g. `8.0.36`.
    pub server_version: String,
    /// Server-assigned connection id (thread id).
    pub connection_id: u32,
    /// Combined capability flags.
    pub capabilities: u32,
    /// Server default charset.
    pub charset: u8,
    /// Server status bits.
    pub status_flags: u16,
    /// Authentication plugin the server wants to start with.
    pub auth_plugin: String,
    /// Scramble for the auth response (normally 20 bytes).
    pub auth_data: Vec<u8>,
}

impl ServerHandshake {
    /// Parse a HandshakeV10 payload.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PacketReader::new(payload);

        let protocol_version = r
            .read_u8()
            .ok_or(ProtocolError::Truncated { field: "protocol_version" })?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedProtocolVersion(protocol_version));
        }

        let server_version = r
            .read_null_terminated()
            .ok_or(ProtocolError::Truncated { field: "server_version" })?;
        let server_version = String::from_utf8_lossy(server_version).into_owned();

        let connection_id = r
            .read_u32_le()
            .ok_or(ProtocolError::Truncated { field: "connection_id" })?;

        let auth_data_1 = r
            .read_bytes(8)
            .ok_or(ProtocolError::Truncated { field: "auth_plugin_data" })?
            .to_vec();
        r.skip(1); // filler

        let caps_lower = r
            .read_u16_le()
            .ok_or(ProtocolError::Truncated { field: "capability_flags" })?;

        // Everything past this point is absent in ancient servers.
        let charset = r.read_u8().unwrap_or(0);
        let status_flags = r.read_u16_le().unwrap_or(0);
        let caps_upper = r.read_u16_le().unwrap_or(0);
        let caps = u32::from(caps_lower) | (u32::from(caps_upper) << 16);

        // This byte is always present; it only carries meaning when the
        // server speaks plugin auth.
        let auth_data_len_byte = r.read_u8().unwrap_or(0);
        let auth_data_len = if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            usize::from(auth_data_len_byte)
        } else {
            0
        };
        r.skip(10); // reserved

        let mut auth_data = auth_data_1;
        if caps & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            let len2 = auth_data_len.saturating_sub(8).max(13);
            if let Some(part2) = r.read_bytes(len2) {
                let part2 = match part2.last() {
                    Some(0) => &part2[..part2.len() - 1],
                    _ => part2,
                };
                auth_data.extend_from_slice(part2);
            }
        }

        let auth_plugin = if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            r.read_null_terminated()
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .unwrap_or_default()
        } else {
            auth::plugin::NATIVE_PASSWORD.to_string()
        };

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            capabilities: caps,
            charset,
            status_flags,
            auth_plugin,
            auth_data,
        })
    }

    /// Whether the server advertises all of the given capability bits.
    #[must_use]
    pub fn supports(&self, flags: u32) -> bool {
        self.capabilities & flags == flags
    }
}

/// The client's HandshakeResponse41 payload.
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    /// Negotiated capability flags (client mask ANDed with the server's).
    pub capabilities: u32,
    /// Largest packet the client will send.
    pub max_packet_size: u32,
    /// Charset the session runs in.
    pub charset: u8,
    /// Login user name.
    pub username: String,
    /// Scramble output for the chosen plugin.
    pub auth_response: Vec<u8>,
    /// Default schema, if any.
    pub database: Option<String>,
    /// Plugin the auth response was computed with.
    pub auth_plugin: String,
}

impl HandshakeResponse {
    /// Encode the payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut w = PacketWriter::with_capacity(128);
        w.put_u32_le(self.capabilities);
        w.put_u32_le(self.max_packet_size);
        w.put_u8(self.charset);
        w.put_zeros(23);
        w.put_null_terminated(&self.username);

        if self.capabilities & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            w.put_lenenc_bytes(&self.auth_response);
        } else if self.capabilities & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            // Scrambles are 20 or 32 bytes; the length always fits.
            w.put_u8(self.auth_response.len() as u8);
            w.put_bytes(&self.auth_response);
        } else {
            w.put_bytes(&self.auth_response);
            w.put_u8(0);
        }

        if self.capabilities & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
            match &self.database {
                Some(db) => w.put_null_terminated(db),
                None => w.put_u8(0),
            }
        }

        if self.capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            w.put_null_terminated(&self.auth_plugin);
        }

        w.into_bytes()
    }
}

/// The 32-byte SSL request sent instead of the full response when the
/// client wants to upgrade the stream to TLS first.
#[derive(Debug, Clone, Copy)]
pub struct SslRequest {
    /// Negotiated capability flags; `CLIENT_SSL` is forced on.
    pub capabilities: u32,
    /// Largest packet the client will send.
    pub max_packet_size: u32,
    /// Charset the session runs in.
    pub charset: u8,
}

impl SslRequest {
    /// Encode the payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut w = PacketWriter::with_capacity(32);
        w.put_u32_le(self.capabilities | capabilities::CLIENT_SSL);
        w.put_u32_le(self.max_packet_size);
        w.put_u8(self.charset);
        w.put_zeros(23);
        w.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::charset;

    /// Build a plausible HandshakeV10 payload the way a server would.
    fn sample_handshake(caps: u32, plugin: &str) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.put_u8(10);
        w.put_null_terminated("8.0.36");
        w.put_u32_le(42);
        w.put_bytes(&[0x11; 8]); // auth data part 1
        w.put_u8(0); // filler
        w.put_u16_le((caps & 0xFFFF) as u16);
        w.put_u8(charset::UTF8MB4_GENERAL_CI);
        w.put_u16_le(0x0002);
        w.put_u16_le((caps >> 16) as u16);
        if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            w.put_u8(21);
        } else {
            w.put_u8(0);
        }
        w.put_zeros(10);
        if caps & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            w.put_bytes(&[0x22; 12]); // auth data part 2
            w.put_u8(0);
        }
        if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            w.put_null_terminated(plugin);
        }
        w.into_bytes().to_vec()
    }

    const FULL_CAPS: u32 = capabilities::CLIENT_PROTOCOL_41
        | capabilities::CLIENT_SECURE_CONNECTION
        | capabilities::CLIENT_PLUGIN_AUTH
        | capabilities::CLIENT_SSL;

    #[test]
    fn test_parse_full_handshake() {
        let payload = sample_handshake(FULL_CAPS, "caching_sha2_password");
        let hs = ServerHandshake::parse(&payload).unwrap();

        assert_eq!(hs.protocol_version, 10);
        assert_eq!(hs.server_version, "8.0.36");
        assert_eq!(hs.connection_id, 42);
        assert_eq!(hs.capabilities, FULL_CAPS);
        assert_eq!(hs.auth_plugin, "caching_sha2_password");
        // 8 bytes part 1 + 12 bytes part 2, trailing NUL stripped.
        assert_eq!(hs.auth_data.len(), 20);
        assert!(hs.supports(capabilities::CLIENT_SSL));
        assert!(!hs.supports(capabilities::CLIENT_DEPRECATE_EOF));
    }

    #[test]
    fn test_parse_without_plugin_auth() {
        let payload = sample_handshake(
            capabilities::CLIENT_PROTOCOL_41 | capabilities::CLIENT_SECURE_CONNECTION,
            "",
        );
        let hs = ServerHandshake::parse(&payload).unwrap();
        assert_eq!(hs.auth_plugin, auth::plugin::NATIVE_PASSWORD);
    }

    #[test]
    fn test_parse_rejects_wrong_protocol() {
        let mut payload = sample_handshake(FULL_CAPS, "mysql_native_password");
        payload[0] = 9;
        assert!(matches!(
            ServerHandshake::parse(&payload),
            Err(ProtocolError::UnsupportedProtocolVersion(9))
        ));
    }

    #[test]
    fn test_parse_truncated() {
        assert!(matches!(
            ServerHandshake::parse(&[10, b'8', 0]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_response_encoding_secure_connection() {
        let resp = HandshakeResponse {
            capabilities: capabilities::CLIENT_PROTOCOL_41
                | capabilities::CLIENT_SECURE_CONNECTION
                | capabilities::CLIENT_PLUGIN_AUTH
                | capabilities::CLIENT_CONNECT_WITH_DB,
            max_packet_size: 1 << 24,
            charset: charset::UTF8MB4_GENERAL_CI,
            username: "app".into(),
            auth_response: vec![0xAA; 20],
            database: Some("orders".into()),
            auth_plugin: auth::plugin::NATIVE_PASSWORD.into(),
        };
        let bytes = resp.encode();

        let mut r = PacketReader::new(&bytes);
        assert_eq!(r.read_u32_le(), Some(resp.capabilities));
        assert_eq!(r.read_u32_le(), Some(1 << 24));
        assert_eq!(r.read_u8(), Some(charset::UTF8MB4_GENERAL_CI));
        r.skip(23);
        assert_eq!(r.read_null_terminated(), Some(&b"app"[..]));
        assert_eq!(r.read_u8(), Some(20));
        assert_eq!(r.read_bytes(20), Some(&[0xAA; 20][..]));
        assert_eq!(r.read_null_terminated(), Some(&b"orders"[..]));
        assert_eq!(
            r.read_null_terminated(),
            Some(auth::plugin::NATIVE_PASSWORD.as_bytes())
        );
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_ssl_request_is_32_bytes_and_forces_ssl_flag() {
        let req = SslRequest {
            capabilities: capabilities::CLIENT_PROTOCOL_41,
            max_packet_size: 1 << 24,
            charset: charset::UTF8MB4_GENERAL_CI,
        };
        let bytes = req.encode();
        assert_eq!(bytes.len(), 32);

        let mut r = PacketReader::new(&bytes);
        let caps = r.read_u32_le().unwrap();
        assert_ne!(caps & capabilities::CLIENT_SSL, 0);
    }
}
