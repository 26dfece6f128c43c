//! The frame-level codec.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use mysql_protocol::constants::MAX_PAYLOAD_LEN;

use crate::error::CodecError;

const HEADER_LEN: usize = 4;

/// One de-framed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence id carried by the frame header.
    pub sequence: u8,
    /// Frame payload; exactly `MAX_PAYLOAD_LEN` bytes means a
    /// continuation frame follows.
    pub payload: Bytes,
}

impl Packet {
    /// Whether this frame is full, i.e. the message continues in the
    /// next frame.
    #[must_use]
    pub fn is_continued(&self) -> bool {
        self.payload.len() == MAX_PAYLOAD_LEN
    }
}

/// Codec for the MySQL packet header.
///
/// Sequence ids are tracked internally: encoding stamps and increments,
/// decoding verifies and increments. Both directions share the counter,
/// which is how the protocol numbers a request/response exchange. Call
/// [`reset_sequence`](Self::reset_sequence) before each new command.
#[derive(Debug, Default)]
pub struct PacketCodec {
    next_sequence: u8,
}

impl PacketCodec {
    /// Create a codec with the sequence counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence id the next frame will carry (or must carry, on read).
    #[must_use]
    pub fn sequence(&self) -> u8 {
        self.next_sequence
    }

    /// Restart sequence numbering for a new command exchange.
    pub fn reset_sequence(&mut self) {
        self.next_sequence = 0;
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let payload_len = u32::from_le_bytes([src[0], src[1], src[2], 0]) as usize;
        if src.len() < HEADER_LEN + payload_len {
            src.reserve(HEADER_LEN + payload_len - src.len());
            return Ok(None);
        }

        let sequence = src[3];
        if sequence != self.next_sequence {
            return Err(CodecError::SequenceMismatch {
                expected: self.next_sequence,
                actual: sequence,
            });
        }
        self.next_sequence = sequence.wrapping_add(1);

        src.advance(HEADER_LEN);
        let payload = src.split_to(payload_len).freeze();
        Ok(Some(Packet { sequence, payload }))
    }
}

impl Encoder<Bytes> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), CodecError> {
        let mut offset = 0;
        loop {
            let chunk = (payload.len() - offset).min(MAX_PAYLOAD_LEN);
            dst.reserve(HEADER_LEN + chunk);
            dst.put_slice(&(chunk as u32).to_le_bytes()[..3]);
            dst.put_u8(self.next_sequence);
            dst.put_slice(&payload[offset..offset + chunk]);
            self.next_sequence = self.next_sequence.wrapping_add(1);
            offset += chunk;

            // A maximal frame promises a follow-up; a payload that is an
            // exact multiple of the limit therefore ends with an empty one.
            if chunk < MAX_PAYLOAD_LEN {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut PacketCodec, buf: &mut BytesMut) -> Vec<Packet> {
        let mut out = Vec::new();
        while let Some(packet) = codec.decode(buf).unwrap() {
            out.push(packet);
        }
        out
    }

    #[test]
    fn test_roundtrip_small_payload() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"\x0ePING"), &mut buf).unwrap();

        assert_eq!(&buf[..4], &[5, 0, 0, 0]);

        let mut reader = PacketCodec::new();
        let packets = decode_all(&mut reader, &mut buf);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].sequence, 0);
        assert_eq!(&packets[0].payload[..], b"\x0ePING");
        assert!(!packets[0].is_continued());
    }

    #[test]
    fn test_incomplete_frames_wait_for_more() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::from(&[5u8, 0, 0][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[0, b'a', b'b']);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"cde");
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&packet.payload[..], b"abcde");
    }

    #[test]
    fn test_sequence_increments_across_frames() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"one"), &mut buf).unwrap();
        codec.encode(Bytes::from_static(b"two"), &mut buf).unwrap();

        let mut reader = PacketCodec::new();
        let packets = decode_all(&mut reader, &mut buf);
        assert_eq!(packets[0].sequence, 0);
        assert_eq!(packets[1].sequence, 1);
    }

    #[test]
    fn test_sequence_mismatch_is_an_error() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::from(&[1u8, 0, 0, 7, b'x'][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::SequenceMismatch {
                expected: 0,
                actual: 7
            })
        ));
    }

    #[test]
    fn test_reset_sequence() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"cmd"), &mut buf).unwrap();
        assert_eq!(codec.sequence(), 1);
        codec.reset_sequence();
        assert_eq!(codec.sequence(), 0);
    }

    #[test]
    fn test_oversized_payload_is_split() {
        let payload = Bytes::from(vec![0x42u8; MAX_PAYLOAD_LEN + 5]);
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(payload, &mut buf).unwrap();

        let mut reader = PacketCodec::new();
        let packets = decode_all(&mut reader, &mut buf);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].payload.len(), MAX_PAYLOAD_LEN);
        assert!(packets[0].is_continued());
        assert_eq!(packets[1].payload.len(), 5);
        assert_eq!(packets[1].sequence, 1);
    }

    #[test]
    fn test_exact_multiple_gets_empty_trailer() {
        let payload = Bytes::from(vec![0u8; MAX_PAYLOAD_LEN]);
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(payload, &mut buf).unwrap();

        let mut reader = PacketCodec::new();
        let packets = decode_all(&mut reader, &mut buf);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].payload.len(), MAX_PAYLOAD_LEN);
        assert!(packets[1].payload.is_empty());
    }

    #[test]
    fn test_empty_payload_still_frames() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::new(), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 0]);
    }
}
