//! Capability object bound to one remote host.
//!
//! Remote queries run over a [`RemoteSession`] opened on first use. Only POSIX
//! remotes are probed; every other OS gets the "unsupported" answer without
//! touching the session. Local queries always work.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use eyre::{bail, Context, Result};
use walkdir::WalkDir;

use crate::os_kind::{quote_posix, quote_windows, OsKind};
use crate::probe::ReachabilityProbe;
use crate::session::{CommandOutput, RemoteSession, SessionConnector};

/// Outcome of a directory size query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeProbe {
    /// Size in bytes.
    Measured(u64),
    /// The remote OS has no implemented size query.
    Unsupported,
    /// The query ran but failed (non-zero exit, unparsable output, dropped session).
    ProbeFailed,
}

impl SizeProbe {
    pub fn measured(self) -> Option<u64> {
        match self {
            SizeProbe::Measured(bytes) => Some(bytes),
            SizeProbe::Unsupported | SizeProbe::ProbeFailed => None,
        }
    }

    /// Unknown sizes count as empty so that an unknown destination never
    /// satisfies a non-zero threshold.
    pub fn bytes_or_zero(self) -> u64 {
        self.measured().unwrap_or(0)
    }
}

/// Outcome of a directory existence query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    Present,
    Absent,
    /// The query could not be answered (session error, permission problem,
    /// unexpected exit status).
    Unknown,
}

impl DirectoryState {
    pub fn exists(self) -> bool {
        self == DirectoryState::Present
    }
}

/// Remote operations with an OS-specific command form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    DiskUsage,
    DirectoryExists,
    CreateDirectory,
}

impl RemoteCommand {
    /// Command text for `os`, or `None` where no translation exists.
    pub fn render(self, os: OsKind, path: &str) -> Option<String> {
        match (os, self) {
            (OsKind::Posix, RemoteCommand::DiskUsage) => {
                Some(format!("du -sLb {}", quote_posix(path)))
            }
            (OsKind::Posix, RemoteCommand::DirectoryExists) => {
                Some(format!("test -d {}", quote_posix(path)))
            }
            (OsKind::Posix, RemoteCommand::CreateDirectory) => {
                Some(format!("mkdir -p {}", quote_posix(path)))
            }
            (OsKind::Windows, RemoteCommand::DirectoryExists) => {
                let dir = quote_windows(&format!("{}\\*", path.trim_end_matches('\\')));
                Some(format!("IF EXIST {dir} (exit 0) ELSE (exit 1)"))
            }
            (OsKind::Windows, RemoteCommand::CreateDirectory) => {
                let dir = quote_windows(path);
                Some(format!("IF NOT EXIST {dir} MKDIR {dir}"))
            }
            (OsKind::Windows, RemoteCommand::DiskUsage) | (OsKind::Unknown, _) => None,
        }
    }
}

/// Parse the leading integer field of `du -s` style output.
pub fn parse_du_output(stdout: &str) -> Option<u64> {
    stdout.split_whitespace().next()?.parse::<u64>().ok()
}

pub struct RemoteClient {
    username: String,
    hostname: String,
    port: u16,
    remote_os: OsKind,
    local_os: OsKind,
    connector: Arc<dyn SessionConnector>,
    probe: Arc<dyn ReachabilityProbe>,
    session: Option<Box<dyn RemoteSession>>,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("username", &self.username)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("remote_os", &self.remote_os)
            .field("local_os", &self.local_os)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl RemoteClient {
    /// Bind a client to one host. No session is opened until the first remote
    /// query.
    pub fn new(
        username: impl Into<String>,
        hostname: impl Into<String>,
        port: u16,
        remote_os: OsKind,
        connector: Arc<dyn SessionConnector>,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Self {
        Self {
            username: username.into(),
            hostname: hostname.into(),
            port,
            remote_os,
            local_os: OsKind::detect_local(),
            connector,
            probe,
            session: None,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn remote_os(&self) -> OsKind {
        self.remote_os
    }

    pub fn local_os(&self) -> OsKind {
        self.local_os
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.is_connected())
            .unwrap_or(false)
    }

    /// `user@host`, as used in transfer arguments.
    pub fn remote_prefix(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }

    /// Ping the bound host.
    pub fn is_reachable(&self) -> bool {
        self.probe.is_reachable(&self.hostname)
    }

    fn supports_remote_probing(&self, operation: &str) -> bool {
        if self.remote_os == OsKind::Posix {
            return true;
        }
        log::debug!(
            "{operation}: not supported on remote OS {} ({})",
            self.remote_os,
            self.hostname
        );
        false
    }

    fn session(&mut self) -> Result<&mut Box<dyn RemoteSession>> {
        if self.session.is_none() {
            let session = self
                .connector
                .connect(&self.username, &self.hostname, self.port)?;
            self.session = Some(session);
        }
        match self.session.as_mut() {
            Some(session) => Ok(session),
            None => bail!("no session bound to {}", self.hostname),
        }
    }

    fn run_remote(&mut self, command: RemoteCommand, path: &Path) -> Result<CommandOutput> {
        let rendered = match command.render(self.remote_os, &path.to_string_lossy()) {
            Some(rendered) => rendered,
            None => bail!("{command:?} has no form for remote OS {}", self.remote_os),
        };
        let wrapped = match self.remote_os.wrap_in_shell(&rendered) {
            Some(wrapped) => wrapped,
            None => bail!("no shell dialect for remote OS {}", self.remote_os),
        };
        log::debug!("{}: {}", self.remote_prefix(), wrapped);
        self.session()?.exec(&wrapped)
    }

    /// Size of `path` on the remote host, following symlinks.
    pub fn directory_size_remote(&mut self, path: &Path) -> SizeProbe {
        if !self.supports_remote_probing("directory_size_remote") {
            return SizeProbe::Unsupported;
        }
        match self.run_remote(RemoteCommand::DiskUsage, path) {
            Ok(output) if output.success() => match parse_du_output(&output.stdout) {
                Some(bytes) => {
                    log::debug!("remote size of {} is {bytes} byte(s)", path.display());
                    SizeProbe::Measured(bytes)
                }
                None => {
                    log::warn!(
                        "unparsable du output for {}: {:?}",
                        path.display(),
                        output.stdout
                    );
                    SizeProbe::ProbeFailed
                }
            },
            Ok(output) => {
                log::warn!(
                    "du exited with {} for {} on {}: {}",
                    output.exit_code,
                    path.display(),
                    self.hostname,
                    output.stderr.trim()
                );
                SizeProbe::ProbeFailed
            }
            Err(err) => {
                log::warn!("remote size query for {} failed: {err:#}", path.display());
                SizeProbe::ProbeFailed
            }
        }
    }

    /// Sum of regular file sizes under `path`. Symlinks are not followed,
    /// unlike the remote query.
    pub fn directory_size_local(&self, path: &Path) -> Result<u64> {
        if !path.exists() {
            bail!("directory does not exist: {}", path.display());
        }
        let mut total: u64 = 0;
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if err.depth() == 0 {
                        return Err(err).wrap_err_with(|| format!("reading {}", path.display()));
                    }
                    log::debug!("skipping unreadable entry under {}: {err}", path.display());
                    continue;
                }
            };
            if entry.file_type().is_file() {
                let metadata = entry
                    .metadata()
                    .wrap_err_with(|| format!("stat {}", entry.path().display()))?;
                total += metadata.len();
            }
        }
        log::debug!("local size of {} is {total} byte(s)", path.display());
        Ok(total)
    }

    /// Existence of `path` on the remote host. `test -d` and the Windows form
    /// both exit 1 for "absent"; any other failure leaves the answer unknown.
    /// Remotes without probing support report `Absent`.
    pub fn directory_state_remote(&mut self, path: &Path) -> DirectoryState {
        if !self.supports_remote_probing("directory_exists_remote") {
            return DirectoryState::Absent;
        }
        match self.run_remote(RemoteCommand::DirectoryExists, path) {
            Ok(output) => match output.exit_code {
                0 => DirectoryState::Present,
                1 => DirectoryState::Absent,
                code => {
                    log::warn!(
                        "existence check for {} on {} exited with {code}: {}",
                        path.display(),
                        self.hostname,
                        output.stderr.trim()
                    );
                    DirectoryState::Unknown
                }
            },
            Err(err) => {
                log::warn!("remote existence check for {} failed: {err:#}", path.display());
                DirectoryState::Unknown
            }
        }
    }

    pub fn directory_exists_remote(&mut self, path: &Path) -> bool {
        self.directory_state_remote(path).exists()
    }

    pub fn directory_state_local(&self, path: &Path) -> DirectoryState {
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => DirectoryState::Present,
            Ok(_) => DirectoryState::Absent,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => DirectoryState::Absent,
            Err(err) => {
                log::warn!("existence check for {} failed: {err}", path.display());
                DirectoryState::Unknown
            }
        }
    }

    pub fn directory_exists_local(&self, path: &Path) -> bool {
        self.directory_state_local(path).exists()
    }

    /// Create `path` on the remote host if it is absent. Returns `false` when
    /// the directory could not be created.
    pub fn create_root_directory_remote(&mut self, path: &Path) -> bool {
        if !self.supports_remote_probing("create_root_directory_remote") {
            return false;
        }
        match self.run_remote(RemoteCommand::CreateDirectory, path) {
            Ok(output) if output.success() => true,
            Ok(output) => {
                log::error!(
                    "mkdir exited with {} for {} on {}: {}",
                    output.exit_code,
                    path.display(),
                    self.hostname,
                    output.stderr.trim()
                );
                false
            }
            Err(err) => {
                log::error!("failed to create {} on {}: {err:#}", path.display(), self.hostname);
                false
            }
        }
    }

    /// Create `path` locally if it is absent.
    pub fn create_root_directory_local(&self, path: &Path) -> bool {
        match fs::create_dir_all(path) {
            Ok(()) => true,
            Err(err) => {
                log::error!("failed to create {}: {err}", path.display());
                false
            }
        }
    }

    /// Close the current session (if any) and bind to a new host.
    pub fn reconnect(
        &mut self,
        username: &str,
        hostname: &str,
        port: u16,
        os_kind: Option<OsKind>,
    ) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            if session.is_connected() {
                session.close();
            }
        }
        self.username = username.to_string();
        self.hostname = hostname.to_string();
        self.port = port;
        if let Some(os_kind) = os_kind {
            self.remote_os = os_kind;
        }
        let session = self
            .connector
            .connect(&self.username, &self.hostname, self.port)
            .wrap_err_with(|| format!("reconnecting to {}", self.remote_prefix()))?;
        self.session = Some(session);
        Ok(())
    }
}
