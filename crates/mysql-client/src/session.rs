//! A single MySQL protocol session.
//!
//! A [`Session`] owns at most one stream (TCP, optionally upgraded to
//! TLS) and exposes the primitives connection management is built from:
//! endpoint resolution, connect-with-handshake, ping, close and reset.
//!
//! Sessions are deliberately cheap to construct: a fresh session holds no
//! socket and shares the pool-wide [`TlsContext`]. TLS streams cannot be
//! reconnected, so recovery after a dead connection means building a new
//! session rather than re-dialing an old one.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::client::TlsStream;

use mysql_codec::PacketStream;
use mysql_protocol::auth;
use mysql_protocol::constants::{capabilities, Command};
use mysql_protocol::response::AuthSwitchRequest;
use mysql_protocol::{ErrPacket, HandshakeResponse, OkPacket, PacketKind, ProtocolError};
use mysql_protocol::{ServerHandshake, SslRequest};

use crate::config::Config;
use crate::error::Error;
use crate::tls::TlsContext;

/// The stream a session talks over.
enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Facts learned from the server during the handshake.
#[derive(Debug, Clone)]
struct ServerInfo {
    connection_id: u32,
    server_version: String,
    tls_active: bool,
}

/// One MySQL protocol session.
pub struct Session {
    tls: Option<TlsContext>,
    stream: Option<PacketStream<Transport>>,
    server: Option<ServerInfo>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.stream.is_some())
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a disconnected session sharing the given TLS context.
    #[must_use]
    pub fn new(tls: Option<TlsContext>) -> Self {
        Self {
            tls,
            stream: None,
            server: None,
        }
    }

    /// Whether the session currently holds a stream.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Server-assigned connection id, once connected.
    #[must_use]
    pub fn connection_id(&self) -> Option<u32> {
        self.server.as_ref().map(|s| s.connection_id)
    }

    /// Server version string, once connected.
    #[must_use]
    pub fn server_version(&self) -> Option<&str> {
        self.server.as_ref().map(|s| s.server_version.as_str())
    }

    /// Whether the stream was upgraded to TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.server.as_ref().is_some_and(|s| s.tls_active)
    }

    /// Resolve a hostname and port to socket addresses.
    pub async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, Error> {
        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .map_err(|source| Error::Resolve {
                host: host.to_string(),
                port,
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Resolve {
                host: host.to_string(),
                port,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "lookup returned no addresses",
                ),
            });
        }
        Ok(addrs)
    }

    /// Establish the session: TCP connect, handshake, optional TLS
    /// upgrade, authentication.
    ///
    /// Server-reported failures (bad credentials, unknown schema, ...)
    /// surface as [`Error::Server`] with the code, SQLSTATE and message
    /// forwarded verbatim.
    pub async fn connect(&mut self, endpoint: SocketAddr, config: &Config) -> Result<(), Error> {
        tracing::debug!(
            endpoint = %endpoint,
            host = %config.host,
            database = ?config.database,
            "connecting to MySQL server"
        );
        self.stream = None;
        self.server = None;

        let tcp = tokio::time::timeout(config.connect_timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|elapsed| Error::Connect {
                endpoint,
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, elapsed),
            })?
            .map_err(|source| Error::Connect { endpoint, source })?;
        tcp.set_nodelay(true).ok();

        let mut plain = PacketStream::new(tcp);

        let payload = plain.read_payload().await?;
        if PacketKind::of(&payload) == PacketKind::Err {
            // Servers reject over-capacity connections before handshaking.
            return Err(ErrPacket::parse(&payload)?.into());
        }
        let handshake = ServerHandshake::parse(&payload)?;

        if !handshake.supports(capabilities::CLIENT_PROTOCOL_41) {
            return Err(Error::Unsupported("server does not speak protocol 4.1"));
        }
        if !handshake.supports(capabilities::CLIENT_SECURE_CONNECTION) {
            return Err(Error::Unsupported("server uses pre-4.1 authentication"));
        }

        let caps = config.capability_flags() & handshake.capabilities;

        let use_tls = if config.ssl_mode.should_try_ssl() {
            if self.tls.is_none() {
                return Err(Error::Config(
                    "ssl_mode requires a TLS context but none was built".into(),
                ));
            }
            if handshake.supports(capabilities::CLIENT_SSL) {
                true
            } else if config.ssl_mode.is_required() {
                return Err(Error::Unsupported("server does not support TLS"));
            } else {
                false
            }
        } else {
            false
        };

        let mut stream = if use_tls {
            let request = SslRequest {
                capabilities: caps,
                max_packet_size: config.max_packet_size,
                charset: config.charset,
            };
            plain.write_payload(request.encode()).await?;

            let (tcp, codec) = plain.into_parts();
            let ctx = self
                .tls
                .as_ref()
                .ok_or_else(|| Error::Config("TLS context disappeared".into()))?;
            let tls = ctx.upgrade(&config.host, tcp).await?;
            PacketStream::from_parts(Transport::Tls(Box::new(tls)), codec)
        } else {
            let (tcp, codec) = plain.into_parts();
            PacketStream::from_parts(Transport::Plain(tcp), codec)
        };

        let response = HandshakeResponse {
            capabilities: caps,
            max_packet_size: config.max_packet_size,
            charset: config.charset,
            username: config.username.clone(),
            auth_response: auth::scramble_for(
                &handshake.auth_plugin,
                &config.password,
                &handshake.auth_data,
            ),
            database: config.database.clone(),
            auth_plugin: handshake.auth_plugin.clone(),
        };
        stream.write_payload(response.encode()).await?;

        self.authenticate(&mut stream, config, use_tls).await?;

        tracing::info!(
            connection_id = handshake.connection_id,
            server_version = %handshake.server_version,
            tls = use_tls,
            "MySQL session established"
        );
        self.server = Some(ServerInfo {
            connection_id: handshake.connection_id,
            server_version: handshake.server_version,
            tls_active: use_tls,
        });
        self.stream = Some(stream);
        Ok(())
    }

    /// Drive the post-response authentication exchange to an OK packet.
    async fn authenticate(
        &self,
        stream: &mut PacketStream<Transport>,
        config: &Config,
        tls_active: bool,
    ) -> Result<(), Error> {
        loop {
            let payload = stream.read_payload().await?;
            match PacketKind::of(&payload) {
                PacketKind::Ok => {
                    OkPacket::parse(&payload)?;
                    return Ok(());
                }
                PacketKind::Err => return Err(ErrPacket::parse(&payload)?.into()),
                PacketKind::AuthSwitch => {
                    let switch = AuthSwitchRequest::parse(&payload)?;
                    tracing::debug!(plugin = %switch.plugin, "authentication plugin switch");
                    let scramble =
                        auth::scramble_for(&switch.plugin, &config.password, &switch.data);
                    stream.write_payload(Bytes::from(scramble)).await?;
                }
                PacketKind::AuthMoreData => match payload.get(1).copied() {
                    Some(auth::caching_sha2::FAST_AUTH_OK) => {
                        // Server found its cache entry; the OK packet is next.
                    }
                    Some(auth::caching_sha2::FULL_AUTH_REQUIRED) => {
                        if !tls_active {
                            return Err(Error::AuthRequiresTls);
                        }
                        // Over an encrypted stream the protocol accepts the
                        // cleartext password, NUL-terminated.
                        let mut cleartext = config.password.clone().into_bytes();
                        cleartext.push(0);
                        stream.write_payload(Bytes::from(cleartext)).await?;
                    }
                    other => {
                        return Err(
                            ProtocolError::UnexpectedPacket(other.unwrap_or(0x01)).into()
                        )
                    }
                },
                PacketKind::Eof | PacketKind::Other => {
                    return Err(ProtocolError::UnexpectedPacket(
                        payload.first().copied().unwrap_or(0),
                    )
                    .into())
                }
            }
        }
    }

    /// Send COM_PING and wait for the OK reply.
    pub async fn ping(&mut self) -> Result<(), Error> {
        let payload = self.command(Command::Ping).await?;
        expect_ok(&payload)
    }

    /// Send COM_RESET_CONNECTION, clearing session state server-side
    /// without re-authenticating.
    pub async fn reset(&mut self) -> Result<(), Error> {
        let payload = self.command(Command::ResetConnection).await?;
        expect_ok(&payload)
    }

    /// Best-effort graceful close: send COM_QUIT and drop the stream.
    ///
    /// The stream is discarded even when the write fails; callers
    /// normally ignore the result.
    pub async fn close(&mut self) -> Result<(), Error> {
        self.server = None;
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        stream.reset_sequence();
        let result = stream
            .write_payload(Bytes::copy_from_slice(&[Command::Quit.as_u8()]))
            .await;
        // The server answers COM_QUIT by closing the socket; there is
        // nothing to read.
        result.map_err(Error::from)
    }

    async fn command(&mut self, command: Command) -> Result<Bytes, Error> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        stream.reset_sequence();
        stream
            .write_payload(Bytes::copy_from_slice(&[command.as_u8()]))
            .await?;
        Ok(stream.read_payload().await?)
    }
}

fn expect_ok(payload: &[u8]) -> Result<(), Error> {
    match PacketKind::of(payload) {
        PacketKind::Ok => {
            OkPacket::parse(payload)?;
            Ok(())
        }
        PacketKind::Err => Err(ErrPacket::parse(payload)?.into()),
        _ => Err(ProtocolError::UnexpectedPacket(payload.first().copied().unwrap_or(0)).into()),
    }
}
