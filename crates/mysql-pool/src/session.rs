//! The session seam the pool drives.
//!
//! The pool never touches sockets itself; it manages values implementing
//! [`ManagedSession`] and replaces them through a [`SessionFactory`] when
//! a session's stream is beyond recovery (TLS streams are single-use, so
//! "reconnect" always means "new session, same shared TLS context").

use std::future::Future;
use std::net::SocketAddr;

use mysql_client::{Config, Error, Session, TlsContext};

/// The primitives the pool's setup state machine needs from a session.
///
/// Implemented by the real [`Session`]; tests substitute mocks.
pub trait ManagedSession: Send + 'static {
    /// Resolve the server hostname to socket addresses.
    fn resolve(
        &mut self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<Vec<SocketAddr>, Error>> + Send;

    /// Establish the session against one endpoint: TCP, handshake,
    /// authentication.
    fn connect(
        &mut self,
        endpoint: SocketAddr,
        config: &Config,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Check the server still answers on this session.
    fn ping(&mut self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Best-effort graceful close; the pool ignores the result.
    fn close(&mut self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Reset server-side session state without re-authenticating.
    fn reset(&mut self) -> impl Future<Output = Result<(), Error>> + Send;
}

impl ManagedSession for Session {
    fn resolve(
        &mut self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<Vec<SocketAddr>, Error>> + Send {
        async move { Session::resolve(self, host, port).await }
    }

    fn connect(
        &mut self,
        endpoint: SocketAddr,
        config: &Config,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        Session::connect(self, endpoint, config)
    }

    fn ping(&mut self) -> impl Future<Output = Result<(), Error>> + Send {
        Session::ping(self)
    }

    fn close(&mut self) -> impl Future<Output = Result<(), Error>> + Send {
        Session::close(self)
    }

    fn reset(&mut self) -> impl Future<Output = Result<(), Error>> + Send {
        Session::reset(self)
    }
}

/// Creates replacement sessions for pool entries.
///
/// Construction is synchronous and cheap: a fresh session holds no socket
/// until the setup state machine connects it.
pub trait SessionFactory: Send + Sync + 'static {
    /// The session type this factory produces.
    type Session: ManagedSession;

    /// Create a disconnected session.
    fn create_session(&self) -> Self::Session;
}

/// Factory for real MySQL sessions sharing one TLS context.
#[derive(Debug, Clone)]
pub struct MySqlSessionFactory {
    tls: Option<TlsContext>,
}

impl MySqlSessionFactory {
    /// Build the factory, constructing the shared TLS context the
    /// configuration calls for.
    pub fn new(config: &Config) -> Result<Self, Error> {
        Ok(Self {
            tls: TlsContext::new(config)?,
        })
    }
}

impl SessionFactory for MySqlSessionFactory {
    type Session = Session;

    fn create_session(&self) -> Session {
        Session::new(self.tls.clone())
    }
}
