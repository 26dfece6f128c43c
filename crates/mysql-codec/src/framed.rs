//! Framed packet stream for async I/O.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::{Sink, SinkExt, StreamExt};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::error::CodecError;
use crate::packet_codec::{Packet, PacketCodec};

pin_project! {
    /// A framed packet stream over an async transport.
    ///
    /// Wraps a tokio-util `Framed` and adds whole-payload reads and
    /// writes: a logical payload larger than a single frame is split on
    /// write and reassembled on read transparently.
    pub struct PacketStream<T> {
        #[pin]
        inner: Framed<T, PacketCodec>,
    }
}

impl<T> PacketStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a packet stream over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Framed::new(transport, PacketCodec::new()),
        }
    }

    /// Get a reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        self.inner.get_ref()
    }

    /// Get a reference to the codec.
    pub fn codec(&self) -> &PacketCodec {
        self.inner.codec()
    }

    /// Restart sequence numbering for a new command exchange.
    pub fn reset_sequence(&mut self) {
        self.inner.codec_mut().reset_sequence();
    }

    /// Tear the stream down to its transport and codec.
    ///
    /// Used for the TLS upgrade: the plain-TCP transport is wrapped in a
    /// TLS stream and the codec (with its sequence counter) carries over
    /// via [`from_parts`](Self::from_parts). Any unread buffered input is
    /// discarded; the protocol guarantees the server is not speaking at
    /// upgrade time.
    pub fn into_parts(self) -> (T, PacketCodec) {
        let parts = self.inner.into_parts();
        (parts.io, parts.codec)
    }

    /// Rebuild a stream around a new transport, keeping codec state.
    pub fn from_parts(transport: T, codec: PacketCodec) -> Self {
        Self {
            inner: Framed::new(transport, codec),
        }
    }
}

impl<T> PacketStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Read one complete payload, reassembling continuation frames.
    pub async fn read_payload(&mut self) -> Result<Bytes, CodecError> {
        let first = self.next_packet().await?;
        if !first.is_continued() {
            return Ok(first.payload);
        }

        let mut acc = BytesMut::from(&first.payload[..]);
        loop {
            let next = self.next_packet().await?;
            acc.extend_from_slice(&next.payload);
            if !next.is_continued() {
                return Ok(acc.freeze());
            }
        }
    }

    /// Write one complete payload and flush it.
    pub async fn write_payload(&mut self, payload: Bytes) -> Result<(), CodecError> {
        self.inner.send(payload).await
    }

    async fn next_packet(&mut self) -> Result<Packet, CodecError> {
        match self.inner.next().await {
            Some(result) => result,
            None => Err(CodecError::ConnectionClosed),
        }
    }
}

impl<T> Stream for PacketStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    type Item = Result<Packet, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

impl<T> Sink<Bytes> for PacketStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_payload_roundtrip_over_duplex() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let mut client = PacketStream::new(client_io);
        let mut server = PacketStream::new(server_io);

        client
            .write_payload(Bytes::from_static(b"\x0E"))
            .await
            .unwrap();

        let payload = server.read_payload().await.unwrap();
        assert_eq!(&payload[..], b"\x0E");

        // Server answers with sequence 1, matching the client's counter.
        server
            .write_payload(Bytes::from_static(b"\x00\x00\x00\x02\x00\x00\x00"))
            .await
            .unwrap();
        let reply = client.read_payload().await.unwrap();
        assert_eq!(reply[0], 0x00);
    }

    #[tokio::test]
    async fn test_sequence_reset_before_new_command() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let mut client = PacketStream::new(client_io);
        let mut server = PacketStream::new(server_io);

        client.write_payload(Bytes::from_static(b"a")).await.unwrap();
        server.read_payload().await.unwrap();

        client.reset_sequence();
        server.reset_sequence();
        client.write_payload(Bytes::from_static(b"b")).await.unwrap();
        assert_eq!(&server.read_payload().await.unwrap()[..], b"b");
    }

    #[tokio::test]
    async fn test_peer_hangup_is_connection_closed() {
        let (client_io, server_io) = tokio::io::duplex(64);
        let mut server = PacketStream::new(server_io);
        drop(client_io);

        assert!(matches!(
            server.read_payload().await,
            Err(CodecError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_parts_preserve_sequence_counter() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let mut client = PacketStream::new(client_io);
        let mut server = PacketStream::new(server_io);

        client.write_payload(Bytes::from_static(b"x")).await.unwrap();
        server.read_payload().await.unwrap();

        let (io, codec) = client.into_parts();
        assert_eq!(codec.sequence(), 1);
        let mut client = PacketStream::from_parts(io, codec);

        client.write_payload(Bytes::from_static(b"y")).await.unwrap();
        assert_eq!(&server.read_payload().await.unwrap()[..], b"y");
    }
}
