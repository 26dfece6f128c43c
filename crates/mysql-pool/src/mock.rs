//! Scripted sessions for pool tests.

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use mysql_client::{Config, Error};

use crate::session::{ManagedSession, SessionFactory};

/// One scripted outcome for a primitive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Ok,
    Fail,
    /// Never completes; exercises cancellation mid-setup.
    Hang,
}

#[derive(Debug)]
struct Scripted {
    steps: VecDeque<Step>,
    default: Step,
}

impl Scripted {
    fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            default: Step::Ok,
        }
    }

    fn next(&mut self) -> Step {
        self.steps.pop_front().unwrap_or(self.default)
    }
}

/// Shared script and call log for every session a [`MockFactory`] makes.
#[derive(Debug)]
pub(crate) struct MockScript {
    resolve: Mutex<Scripted>,
    connect: Mutex<Scripted>,
    ping: Mutex<Scripted>,
    pub resolve_calls: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub ping_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub reset_calls: AtomicUsize,
}

impl MockScript {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            resolve: Mutex::new(Scripted::new()),
            connect: Mutex::new(Scripted::new()),
            ping: Mutex::new(Scripted::new()),
            resolve_calls: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            ping_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
        })
    }

    pub fn push_resolve(&self, steps: impl IntoIterator<Item = Step>) {
        self.resolve.lock().steps.extend(steps);
    }

    pub fn push_connect(&self, steps: impl IntoIterator<Item = Step>) {
        self.connect.lock().steps.extend(steps);
    }

    pub fn push_ping(&self, steps: impl IntoIterator<Item = Step>) {
        self.ping.lock().steps.extend(steps);
    }

    /// Make every connect beyond the scripted ones fail.
    pub fn connect_fails_by_default(&self) {
        self.connect.lock().default = Step::Fail;
    }
}

/// A session whose primitives play back the shared script.
#[derive(Debug)]
pub(crate) struct MockSession {
    /// Creation ordinal, for asserting session replacement.
    pub id: usize,
    script: Arc<MockScript>,
}

async fn run_step<T: Send>(step: Step, ok: T, fail: Error) -> Result<T, Error> {
    match step {
        Step::Ok => Ok(ok),
        Step::Fail => Err(fail),
        Step::Hang => std::future::pending().await,
    }
}

impl ManagedSession for MockSession {
    fn resolve(
        &mut self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<Vec<SocketAddr>, Error>> + Send {
        self.script.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.resolve.lock().next();
        let host = host.to_string();
        async move {
            run_step(
                step,
                vec![SocketAddr::from(([127, 0, 0, 1], 3306))],
                Error::Resolve {
                    host,
                    port,
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted"),
                },
            )
            .await
        }
    }

    fn connect(
        &mut self,
        endpoint: SocketAddr,
        _config: &Config,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        self.script.connect_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.connect.lock().next();
        async move {
            run_step(
                step,
                (),
                Error::Connect {
                    endpoint,
                    source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "scripted"),
                },
            )
            .await
        }
    }

    fn ping(&mut self) -> impl Future<Output = Result<(), Error>> + Send {
        self.script.ping_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.ping.lock().next();
        async move {
            run_step(
                step,
                (),
                Error::Codec(mysql_codec_closed()),
            )
            .await
        }
    }

    fn close(&mut self) -> impl Future<Output = Result<(), Error>> + Send {
        self.script.close_calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok(()) }
    }

    fn reset(&mut self) -> impl Future<Output = Result<(), Error>> + Send {
        self.script.reset_calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok(()) }
    }
}

fn mysql_codec_closed() -> mysql_codec::CodecError {
    mysql_codec::CodecError::ConnectionClosed
}

/// Factory handing out [`MockSession`]s with increasing ids.
#[derive(Debug)]
pub(crate) struct MockFactory {
    pub script: Arc<MockScript>,
    pub created: AtomicUsize,
}

impl MockFactory {
    pub fn new(script: Arc<MockScript>) -> Self {
        Self {
            script,
            created: AtomicUsize::new(0),
        }
    }
}

impl SessionFactory for MockFactory {
    type Session = MockSession;

    fn create_session(&self) -> MockSession {
        let id = self.created.fetch_add(1, Ordering::SeqCst);
        MockSession {
            id,
            script: Arc::clone(&self.script),
        }
    }
}
