use std::process::{Command, Stdio};

use crate::os_kind::OsKind;

/// Decides whether a host answers before any session is opened.
pub trait ReachabilityProbe: Send + Sync {
    fn is_reachable(&self, hostname: &str) -> bool;
}

/// Sends a single ICMP echo with the system `ping`. A host may ignore ICMP
/// even when it is up; such hosts are treated as unreachable.
#[derive(Debug, Clone)]
pub struct PingProbe {
    local_os: OsKind,
    program: String,
}

impl PingProbe {
    pub fn new(local_os: OsKind) -> Self {
        Self {
            local_os,
            program: "ping".to_string(),
        }
    }

    /// Override the executable (used to point at a stand-in in tests).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments for one echo request, or `None` when the local OS has no
    /// known ping dialect.
    pub fn arguments(&self, hostname: &str) -> Option<Vec<String>> {
        let flag = self.local_os.ping_count_flag()?;
        Some(vec![flag.to_string(), "1".to_string(), hostname.to_string()])
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(OsKind::detect_local())
    }
}

impl ReachabilityProbe for PingProbe {
    fn is_reachable(&self, hostname: &str) -> bool {
        let Some(args) = self.arguments(hostname) else {
            log::error!(
                "cannot ping {hostname}: no ping dialect for local OS {}",
                self.local_os
            );
            return false;
        };
        log::debug!("{} {}", self.program, args.join(" "));

        match Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(err) => {
                log::warn!("failed to launch {}: {err}", self.program);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_uses_count_flag() {
        let probe = PingProbe::new(OsKind::Posix);
        assert_eq!(
            probe.arguments("10.0.0.1").unwrap(),
            vec!["-c", "1", "10.0.0.1"]
        );
    }

    #[test]
    fn windows_uses_n_flag() {
        let probe = PingProbe::new(OsKind::Windows);
        assert_eq!(probe.arguments("nas").unwrap(), vec!["-n", "1", "nas"]);
    }

    #[test]
    fn unknown_os_is_never_reachable() {
        let probe = PingProbe::new(OsKind::Unknown);
        assert!(probe.arguments("nas").is_none());
        assert!(!probe.is_reachable("nas"));
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_decides_reachability() {
        let up = PingProbe::new(OsKind::Posix).with_program("true");
        assert!(up.is_reachable("anything"));
        let down = PingProbe::new(OsKind::Posix).with_program("false");
        assert!(!down.is_reachable("anything"));
    }

    #[test]
    fn missing_program_is_unreachable() {
        let probe = PingProbe::new(OsKind::Posix).with_program("gatesync-no-such-ping");
        assert!(!probe.is_reachable("nas"));
    }
}
