//! Remote command sessions.
//!
//! The orchestrator only needs to run a command on the bound host and read its
//! exit status and stdout. [`SessionConnector`] opens a [`RemoteSession`] for a
//! (user, host, port) triple; [`SshConnector`] does so over SSH via `ssh2`.

use std::io::{self, Read};
use std::net::TcpStream;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use directories::BaseDirs;
use eyre::{eyre, Context, Result};
use ssh2::Session;

use crate::errors::{categorize_io_error, ErrorCategory, SyncError};

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// An open command session on one remote host.
pub trait RemoteSession: Send {
    /// Run `command` to completion.
    fn exec(&mut self, command: &str) -> Result<CommandOutput>;

    fn is_connected(&self) -> bool;

    /// Release the underlying connection. Further `exec` calls fail.
    fn close(&mut self);
}

/// Opens sessions for a client.
pub trait SessionConnector: Send + Sync {
    fn connect(&self, username: &str, hostname: &str, port: u16) -> Result<Box<dyn RemoteSession>>;
}

/// SSH connector authenticating with the running agent, then the default
/// private keys under `~/.ssh`.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    identity_files: Vec<PathBuf>,
}

impl SshConnector {
    const DEFAULT_KEYS: [&'static str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

    pub fn new() -> Self {
        let identity_files = BaseDirs::new()
            .map(|base| {
                Self::DEFAULT_KEYS
                    .iter()
                    .map(|name| base.home_dir().join(".ssh").join(name))
                    .collect()
            })
            .unwrap_or_default();
        Self { identity_files }
    }

    /// Use an explicit identity list instead of the default keys.
    pub fn with_identity_files(identity_files: Vec<PathBuf>) -> Self {
        Self { identity_files }
    }

    fn authenticate(&self, session: &Session, username: &str) -> Result<()> {
        let mut failures: Vec<String> = Vec::new();
        match session.userauth_agent(username) {
            Ok(()) => {}
            Err(err) => failures.push(format!("agent: {err}")),
        }
        if !session.authenticated() {
            for key in &self.identity_files {
                if !key.exists() {
                    continue;
                }
                match session.userauth_pubkey_file(username, None, key, None) {
                    Ok(()) => break,
                    Err(err) => failures.push(format!("{}: {err}", key.display())),
                }
            }
        }
        if !session.authenticated() {
            return Err(eyre!(
                "SSH authentication failed for {username}: {}",
                failures.join("; ")
            ));
        }
        Ok(())
    }
}

impl SessionConnector for SshConnector {
    fn connect(&self, username: &str, hostname: &str, port: u16) -> Result<Box<dyn RemoteSession>> {
        let addr = format!("{hostname}:{port}");
        log::debug!("opening SSH session to {username}@{addr}");

        let tcp = TcpStream::connect(&addr).map_err(|err| {
            let message = format!("TCP connection failed: {err}");
            let error = match categorize_io_error(&err) {
                ErrorCategory::Connectivity => SyncError {
                    message,
                    subject: Some(addr.clone()),
                    category: ErrorCategory::Connectivity,
                },
                _ => SyncError::remote_command(message, Some(addr.clone())),
            };
            eyre::Report::new(error)
        })?;

        let mut session = Session::new().wrap_err("failed to create SSH session")?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .wrap_err_with(|| format!("SSH handshake failed: {addr}"))?;
        self.authenticate(&session, username)?;

        Ok(Box::new(SshSession {
            session,
            connected: true,
        }))
    }
}

/// A live `ssh2` session.
pub struct SshSession {
    session: Session,
    connected: bool,
}

impl RemoteSession for SshSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        if !self.connected {
            return Err(eyre!("SSH session is closed"));
        }
        let mut channel = self
            .session
            .channel_session()
            .wrap_err("failed to open SSH channel")?;
        channel
            .exec(command)
            .wrap_err_with(|| format!("failed to execute remote command: {command}"))?;

        // Both streams share one channel window, so they are drained together.
        let mut out = channel.stream(0);
        let mut err = channel.stderr();
        self.session.set_blocking(false);
        let drained = drain_streams(&mut out, &mut err, || channel.eof());
        self.session.set_blocking(true);
        let (stdout, stderr) = drained?;

        channel.wait_close().wrap_err("failed to close SSH channel")?;
        let exit_code = channel.exit_status().wrap_err("missing remote exit status")?;

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        if self.connected {
            if let Err(err) = self.session.disconnect(None, "gatesync closing session", None) {
                log::debug!("SSH disconnect reported an error: {err}");
            }
            self.connected = false;
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Read two non-blocking streams until both reach end of file. A zero-length
/// read only counts as end of file once `at_eof` agrees.
fn drain_streams(
    stdout: &mut impl Read,
    stderr: &mut impl Read,
    at_eof: impl Fn() -> bool,
) -> Result<(String, String)> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut out_done = false;
    let mut err_done = false;
    let mut buf = [0u8; 8192];

    while !(out_done && err_done) {
        let mut progressed = false;
        if !out_done {
            match poll_read(stdout, &mut buf, &mut out, &at_eof)
                .wrap_err("failed to read remote stdout")?
            {
                Poll::Data => progressed = true,
                Poll::Eof => out_done = true,
                Poll::Pending => {}
            }
        }
        if !err_done {
            match poll_read(stderr, &mut buf, &mut err, &at_eof)
                .wrap_err("failed to read remote stderr")?
            {
                Poll::Data => progressed = true,
                Poll::Eof => err_done = true,
                Poll::Pending => {}
            }
        }
        if !progressed && !(out_done && err_done) {
            thread::sleep(POLL_INTERVAL);
        }
    }

    Ok((
        String::from_utf8_lossy(&out).into_owned(),
        String::from_utf8_lossy(&err).into_owned(),
    ))
}

enum Poll {
    Data,
    Eof,
    Pending,
}

fn poll_read(
    source: &mut impl Read,
    buf: &mut [u8],
    sink: &mut Vec<u8>,
    at_eof: &impl Fn() -> bool,
) -> io::Result<Poll> {
    match source.read(buf) {
        Ok(0) if at_eof() => Ok(Poll::Eof),
        Ok(0) => Ok(Poll::Pending),
        Ok(n) => {
            sink.extend_from_slice(&buf[..n]);
            Ok(Poll::Data)
        }
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(Poll::Pending),
        Err(err) => Err(err),
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close();
    }
}
