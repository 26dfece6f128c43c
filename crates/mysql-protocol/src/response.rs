//! Generic server response packets: OK, ERR, EOF and auth continuations.

use crate::error::ProtocolError;
use crate::packet::PacketReader;

/// Classification of a server response by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// 0x00 header: the operation succeeded.
    Ok,
    /// 0xFF header: the server reports an error.
    Err,
    /// Short 0xFE packet: end of a result fragment (legacy).
    Eof,
    /// Long 0xFE packet: the server asks for a different auth plugin.
    AuthSwitch,
    /// 0x01 header: extra authentication data follows.
    AuthMoreData,
    /// Anything else (result set headers, rows, ...).
    Other,
}

impl PacketKind {
    /// Classify a payload. EOF and auth-switch packets share the 0xFE
    /// header byte and are told apart by length: a genuine EOF payload is
    /// at most 9 bytes.
    #[must_use]
    pub fn of(payload: &[u8]) -> Self {
        match payload.first() {
            Some(0x00) => Self::Ok,
            Some(0xFF) => Self::Err,
            Some(0xFE) if payload.len() <= 9 => Self::Eof,
            Some(0xFE) => Self::AuthSwitch,
            Some(0x01) => Self::AuthMoreData,
            _ => Self::Other,
        }
    }
}

/// A parsed OK packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OkPacket {
    /// Rows affected by the last statement.
    pub affected_rows: u64,
    /// Last value generated for an AUTO_INCREMENT column.
    pub last_insert_id: u64,
    /// Server status bits.
    pub status_flags: u16,
    /// Warning count.
    pub warnings: u16,
}

impl OkPacket {
    /// Parse an OK payload (first byte 0x00, already classified).
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PacketReader::new(payload);
        let header = r.read_u8().ok_or(ProtocolError::EmptyPacket)?;
        if header != 0x00 {
            return Err(ProtocolError::UnexpectedPacket(header));
        }
        let affected_rows = r
            .read_lenenc_uint()
            .ok_or(ProtocolError::Truncated { field: "affected_rows" })?;
        let last_insert_id = r
            .read_lenenc_uint()
            .ok_or(ProtocolError::Truncated { field: "last_insert_id" })?;
        let status_flags = r
            .read_u16_le()
            .ok_or(ProtocolError::Truncated { field: "status_flags" })?;
        let warnings = r
            .read_u16_le()
            .ok_or(ProtocolError::Truncated { field: "warnings" })?;
        Ok(Self {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
        })
    }
}

/// A parsed ERR packet: the server-reported diagnostics for a failed
/// operation, forwarded verbatim to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    /// MySQL error code (e.g. 1045 for access denied).
    pub code: u16,
    /// Five-character SQLSTATE.
    pub sql_state: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrPacket {
    /// Parse an ERR payload (first byte 0xFF, already classified).
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PacketReader::new(payload);
        let header = r.read_u8().ok_or(ProtocolError::EmptyPacket)?;
        if header != 0xFF {
            return Err(ProtocolError::UnexpectedPacket(header));
        }
        let code = r
            .read_u16_le()
            .ok_or(ProtocolError::Truncated { field: "error_code" })?;

        // Protocol 4.1 inserts '#' + a 5-byte SQLSTATE before the message.
        let sql_state = if r.peek() == Some(b'#') {
            r.skip(1);
            let raw = r
                .read_bytes(5)
                .ok_or(ProtocolError::Truncated { field: "sql_state" })?;
            String::from_utf8(raw.to_vec())
                .map_err(|_| ProtocolError::InvalidUtf8 { field: "sql_state" })?
        } else {
            String::from("HY000")
        };

        let message = String::from_utf8_lossy(r.read_rest()).into_owned();
        Ok(Self {
            code,
            sql_state,
            message,
        })
    }
}

/// A parsed legacy EOF packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EofPacket {
    /// Warning count.
    pub warnings: u16,
    /// Server status bits.
    pub status_flags: u16,
}

impl EofPacket {
    /// Parse an EOF payload (first byte 0xFE, length <= 9).
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PacketReader::new(payload);
        let header = r.read_u8().ok_or(ProtocolError::EmptyPacket)?;
        if header != 0xFE {
            return Err(ProtocolError::UnexpectedPacket(header));
        }
        // 3.23 servers send a bare 0xFE.
        let warnings = r.read_u16_le().unwrap_or(0);
        let status_flags = r.read_u16_le().unwrap_or(0);
        Ok(Self {
            warnings,
            status_flags,
        })
    }
}

/// An auth-switch request: the server wants the scramble redone with a
/// different plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSwitchRequest {
    /// Name of the plugin to switch to.
    pub plugin: String,
    /// Fresh scramble data for the new plugin.
    pub data: Vec<u8>,
}

impl AuthSwitchRequest {
    /// Parse an auth-switch payload (first byte 0xFE, already classified).
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PacketReader::new(payload);
        let header = r.read_u8().ok_or(ProtocolError::EmptyPacket)?;
        if header != 0xFE {
            return Err(ProtocolError::UnexpectedPacket(header));
        }
        let plugin = r
            .read_null_terminated()
            .ok_or(ProtocolError::Truncated { field: "plugin_name" })?;
        let plugin = String::from_utf8(plugin.to_vec())
            .map_err(|_| ProtocolError::InvalidUtf8 { field: "plugin_name" })?;
        // Strip the trailing NUL some servers append to the scramble.
        let mut data = r.read_rest().to_vec();
        if data.last() == Some(&0) {
            data.pop();
        }
        Ok(Self { plugin, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketWriter;

    #[test]
    fn test_classify() {
        assert_eq!(PacketKind::of(&[0x00, 0, 0]), PacketKind::Ok);
        assert_eq!(PacketKind::of(&[0xFF, 0x15, 0x04]), PacketKind::Err);
        assert_eq!(PacketKind::of(&[0xFE, 0, 0, 0, 0]), PacketKind::Eof);
        assert_eq!(PacketKind::of(&[0xFE; 30]), PacketKind::AuthSwitch);
        assert_eq!(PacketKind::of(&[0x01, 0x03]), PacketKind::AuthMoreData);
        assert_eq!(PacketKind::of(&[0x05]), PacketKind::Other);
        assert_eq!(PacketKind::of(&[]), PacketKind::Other);
    }

    #[test]
    fn test_ok_packet_roundtrip() {
        let mut w = PacketWriter::new();
        w.put_u8(0x00);
        w.put_lenenc_uint(3);
        w.put_lenenc_uint(17);
        w.put_u16_le(0x0002);
        w.put_u16_le(1);

        let ok = OkPacket::parse(w.as_bytes()).unwrap();
        assert_eq!(ok.affected_rows, 3);
        assert_eq!(ok.last_insert_id, 17);
        assert_eq!(ok.status_flags, 0x0002);
        assert_eq!(ok.warnings, 1);
    }

    #[test]
    fn test_err_packet_with_sql_state() {
        let mut w = PacketWriter::new();
        w.put_u8(0xFF);
        w.put_u16_le(1045);
        w.put_u8(b'#');
        w.put_bytes(b"28000");
        w.put_bytes(b"Access denied for user 'app'");

        let err = ErrPacket::parse(w.as_bytes()).unwrap();
        assert_eq!(err.code, 1045);
        assert_eq!(err.sql_state, "28000");
        assert_eq!(err.message, "Access denied for user 'app'");
    }

    #[test]
    fn test_err_packet_without_sql_state() {
        let mut w = PacketWriter::new();
        w.put_u8(0xFF);
        w.put_u16_le(2013);
        w.put_bytes(b"Lost connection");

        let err = ErrPacket::parse(w.as_bytes()).unwrap();
        assert_eq!(err.code, 2013);
        assert_eq!(err.sql_state, "HY000");
        assert_eq!(err.message, "Lost connection");
    }

    #[test]
    fn test_auth_switch_request() {
        let mut w = PacketWriter::new();
        w.put_u8(0xFE);
        w.put_null_terminated("mysql_native_password");
        w.put_bytes(&[1, 2, 3, 4, 0]);

        let req = AuthSwitchRequest::parse(w.as_bytes()).unwrap();
        assert_eq!(req.plugin, "mysql_native_password");
        assert_eq!(req.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_ok_packet_truncated() {
        assert!(matches!(
            OkPacket::parse(&[0x00, 0x01]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_wrong_header_rejected() {
        assert!(matches!(
            OkPacket::parse(&[0xFF]),
            Err(ProtocolError::UnexpectedPacket(0xFF))
        ));
        assert!(matches!(
            ErrPacket::parse(&[0x00]),
            Err(ProtocolError::UnexpectedPacket(0x00))
        ));
    }
}
