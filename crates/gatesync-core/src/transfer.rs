//! Invocation of the external mirroring tool (rsync).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use eyre::{eyre, Context, Result};

/// One side of a transfer as rsync sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEndpoint {
    Local(PathBuf),
    Remote { prefix: String, path: PathBuf },
}

impl TransferEndpoint {
    /// The argument handed to rsync. No shell sits between us and rsync, so
    /// the path goes in unquoted; `--protect-args` keeps it intact remotely.
    pub fn to_argument(&self) -> OsString {
        match self {
            TransferEndpoint::Local(path) => path.as_os_str().to_os_string(),
            TransferEndpoint::Remote { prefix, path } => {
                let mut arg = OsString::from(format!("{prefix}:"));
                arg.push(path.as_os_str());
                arg
            }
        }
    }

    /// Shell-style rendering for logs.
    pub fn display(&self) -> String {
        match self {
            TransferEndpoint::Local(path) => format!("\"{}\"", path.display()),
            TransferEndpoint::Remote { prefix, path } => {
                format!("{prefix}:\"{}\"", path.display())
            }
        }
    }
}

/// A fully described rsync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInvocation {
    pub source: TransferEndpoint,
    pub destination: TransferEndpoint,
    /// Pass `--dry-run` to rsync itself.
    pub tool_dry_run: bool,
}

impl TransferInvocation {
    const BASE_FLAGS: [&'static str; 4] =
        ["-avzh", "--delete", "--safe-links", "--protect-args"];

    pub fn arguments(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Self::BASE_FLAGS.iter().map(OsString::from).collect();
        if self.tool_dry_run {
            args.push(OsString::from("--dry-run"));
        }
        args.push(self.source.to_argument());
        args.push(self.destination.to_argument());
        args
    }

    /// Command line as it would be typed in a shell.
    pub fn command_line(&self, program: &str) -> String {
        let mut parts: Vec<String> = vec![program.to_string()];
        parts.extend(Self::BASE_FLAGS.iter().map(|flag| flag.to_string()));
        if self.tool_dry_run {
            parts.push("--dry-run".to_string());
        }
        parts.push(self.source.display());
        parts.push(self.destination.display());
        parts.join(" ")
    }
}

/// Result of a finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStatus {
    pub exit_code: Option<i32>,
}

impl TransferStatus {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a transfer to completion.
pub trait TransferTool {
    fn name(&self) -> &str;

    fn run(&self, invocation: &TransferInvocation) -> Result<TransferStatus>;
}

/// The system `rsync`.
#[derive(Debug, Clone)]
pub struct RsyncTool {
    program: PathBuf,
}

impl RsyncTool {
    /// Locate `rsync` on `PATH`.
    pub fn locate() -> Result<Self> {
        let program = which::which("rsync")
            .map_err(|err| eyre!("rsync not found on PATH ({err}); please install rsync"))?;
        Ok(Self { program })
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl TransferTool for RsyncTool {
    fn name(&self) -> &str {
        "rsync"
    }

    fn run(&self, invocation: &TransferInvocation) -> Result<TransferStatus> {
        let status = Command::new(&self.program)
            .args(invocation.arguments())
            .status()
            .wrap_err_with(|| format!("failed to launch {}", self.program.display()))?;
        Ok(TransferStatus {
            exit_code: status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push() -> TransferInvocation {
        TransferInvocation {
            source: TransferEndpoint::Local(PathBuf::from("/home/me/My Pictures/Laser")),
            destination: TransferEndpoint::Remote {
                prefix: "backup@nas".to_string(),
                path: PathBuf::from("/srv/backup/"),
            },
            tool_dry_run: false,
        }
    }

    #[test]
    fn push_arguments_pass_remote_path_verbatim() {
        let args = push().arguments();
        assert_eq!(
            args,
            vec![
                OsString::from("-avzh"),
                OsString::from("--delete"),
                OsString::from("--safe-links"),
                OsString::from("--protect-args"),
                OsString::from("/home/me/My Pictures/Laser"),
                OsString::from("backup@nas:/srv/backup/"),
            ]
        );
    }

    #[test]
    fn remote_argument_has_no_literal_quotes() {
        let endpoint = TransferEndpoint::Remote {
            prefix: "backup@nas".to_string(),
            path: PathBuf::from("/srv/My Photos/Laser"),
        };
        assert_eq!(
            endpoint.to_argument(),
            OsString::from("backup@nas:/srv/My Photos/Laser")
        );
        assert_eq!(endpoint.display(), "backup@nas:\"/srv/My Photos/Laser\"");
    }

    #[test]
    fn tool_dry_run_adds_flag() {
        let mut invocation = push();
        invocation.tool_dry_run = true;
        assert!(invocation
            .arguments()
            .contains(&OsString::from("--dry-run")));
    }

    #[test]
    fn command_line_quotes_local_paths() {
        assert_eq!(
            push().command_line("rsync"),
            "rsync -avzh --delete --safe-links --protect-args \"/home/me/My Pictures/Laser\" backup@nas:\"/srv/backup/\""
        );
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_is_reported() -> Result<()> {
        assert!(RsyncTool::with_program("true").run(&push())?.success());
        assert_eq!(
            RsyncTool::with_program("false").run(&push())?.exit_code,
            Some(1)
        );
        Ok(())
    }

    #[test]
    fn missing_program_is_an_error() {
        assert!(RsyncTool::with_program("gatesync-no-such-rsync")
            .run(&push())
            .is_err());
    }
}
