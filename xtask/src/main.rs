//! Workspace automation for rust-mysql-driver.
//!
//! Invoked as `cargo xtask <task>` (the alias lives in
//! `.cargo/config.toml`). Besides the usual check wrappers there is
//! `fake-server`, which serves the same scripted handshake the client
//! integration tests play back, so a client build can be exercised by
//! hand without a MySQL installation:
//!
//! ```text
//! cargo xtask fake-server --addr 127.0.0.1:3309
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for rust-mysql-driver")]
struct Cli {
    #[command(subcommand)]
    task: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Everything CI runs: formatting, lints, tests, docs
    Ci,
    /// Formatting check only
    Fmt,
    /// Clippy over all targets, warnings denied
    Clippy,
    /// Workspace test suite
    Test,
    /// API docs for the workspace crates
    Doc,
    /// Serve scripted MySQL handshakes on a local port: any credentials
    /// accepted, PING and RESET answered, everything else rejected
    FakeServer {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:3309")]
        addr: SocketAddr,
    },
}

/// Label and cargo argv for each check stage, in the order `ci` runs them.
const CHECKS: &[(&str, &[&str])] = &[
    ("rustfmt", &["fmt", "--all", "--", "--check"]),
    (
        "clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    ),
    ("tests", &["test", "--workspace"]),
    ("docs", &["doc", "--workspace", "--no-deps"]),
];

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.task {
        Task::Ci => {
            for (label, args) in CHECKS {
                cargo(&sh, label, args)?;
            }
            eprintln!("xtask: all checks passed");
            Ok(())
        }
        Task::Fmt => cargo(&sh, CHECKS[0].0, CHECKS[0].1),
        Task::Clippy => cargo(&sh, CHECKS[1].0, CHECKS[1].1),
        Task::Test => cargo(&sh, CHECKS[2].0, CHECKS[2].1),
        Task::Doc => cargo(&sh, CHECKS[3].0, CHECKS[3].1),
        Task::FakeServer { addr } => fake_server(addr),
    }
}

/// `xtask/` sits directly under the workspace root.
fn workspace_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("cannot locate workspace root")
}

fn cargo(sh: &Shell, label: &str, args: &[&str]) -> Result<()> {
    eprintln!("xtask: running {label}");
    cmd!(sh, "cargo {args...}")
        .run()
        .with_context(|| format!("{label} failed"))
}

fn fake_server(addr: SocketAddr) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(serve(addr))
}

async fn serve(addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    eprintln!("xtask: fake MySQL server listening on {addr} (ctrl-c to stop)");

    loop {
        let (stream, peer) = listener.accept().await?;
        eprintln!("xtask: connection from {peer}");
        match handle_connection(stream).await {
            Ok(()) => eprintln!("xtask: {peer} disconnected"),
            Err(err) => eprintln!("xtask: {peer} errored: {err:#}"),
        }
    }
}

/// One scripted conversation: greeting, accept whatever credentials
/// arrive, then answer commands until the client quits.
async fn handle_connection(tcp: tokio::net::TcpStream) -> Result<()> {
    use bytes::Bytes;
    use mysql_codec::PacketStream;
    use mysql_protocol::auth::plugin;
    use mysql_protocol::constants::{capabilities, charset, Command};
    use mysql_protocol::packet::PacketWriter;

    const NONCE: [u8; 20] = *b"xtask-fake-nonce-000";
    const OK: &[u8] = &[0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];

    let server_caps = capabilities::CLIENT_LONG_PASSWORD
        | capabilities::CLIENT_PROTOCOL_41
        | capabilities::CLIENT_TRANSACTIONS
        | capabilities::CLIENT_SECURE_CONNECTION
        | capabilities::CLIENT_PLUGIN_AUTH
        | capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
        | capabilities::CLIENT_CONNECT_WITH_DB
        | capabilities::CLIENT_DEPRECATE_EOF;

    let mut stream = PacketStream::new(tcp);

    let mut greeting = PacketWriter::new();
    greeting.put_u8(10);
    greeting.put_null_terminated("8.0.36-xtask-fake");
    greeting.put_u32_le(1);
    greeting.put_bytes(&NONCE[..8]);
    greeting.put_u8(0);
    greeting.put_u16_le((server_caps & 0xFFFF) as u16);
    greeting.put_u8(charset::UTF8MB4_GENERAL_CI);
    greeting.put_u16_le(0x0002);
    greeting.put_u16_le((server_caps >> 16) as u16);
    greeting.put_u8(21);
    greeting.put_zeros(10);
    greeting.put_bytes(&NONCE[8..]);
    greeting.put_u8(0);
    greeting.put_null_terminated(plugin::NATIVE_PASSWORD);
    stream.write_payload(greeting.into_bytes()).await?;

    // Whoever you are, you're in.
    stream.read_payload().await?;
    stream.write_payload(Bytes::from_static(OK)).await?;

    loop {
        stream.reset_sequence();
        let payload = match stream.read_payload().await {
            Ok(payload) => payload,
            Err(_) => return Ok(()), // client hung up without COM_QUIT
        };
        match payload.first().copied() {
            Some(b) if b == Command::Quit.as_u8() => return Ok(()),
            Some(b) if b == Command::Ping.as_u8() || b == Command::ResetConnection.as_u8() => {
                stream.write_payload(Bytes::from_static(OK)).await?;
            }
            other => {
                let mut err = PacketWriter::new();
                err.put_u8(0xFF);
                err.put_u16_le(1235); // ER_NOT_SUPPORTED_YET
                err.put_u8(b'#');
                err.put_bytes(b"42000");
                err.put_bytes(format!("fake server does not handle command {other:?}").as_bytes());
                stream.write_payload(err.into_bytes()).await?;
            }
        }
    }
}
