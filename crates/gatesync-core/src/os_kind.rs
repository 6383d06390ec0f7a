use serde::{Deserialize, Serialize};

/// Operating system family of an endpoint. Selects the command dialect used
/// for remote probes and the flags passed to `ping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsKind {
    Posix,
    Windows,
    #[default]
    Unknown,
}

impl OsKind {
    /// Map the running platform to an [`OsKind`].
    pub fn detect_local() -> Self {
        Self::from_family(std::env::consts::FAMILY)
    }

    fn from_family(family: &str) -> Self {
        match family {
            "unix" => OsKind::Posix,
            "windows" => OsKind::Windows,
            _ => OsKind::Unknown,
        }
    }

    /// Wrap `command` so it runs under this OS's shell.
    pub fn wrap_in_shell(self, command: &str) -> Option<String> {
        match self {
            OsKind::Posix => Some(format!("/bin/sh -c {}", quote_posix(command))),
            OsKind::Windows => Some(format!("cmd.exe /C {command}")),
            OsKind::Unknown => None,
        }
    }

    /// Packet-count flag understood by this OS's `ping`.
    pub fn ping_count_flag(self) -> Option<&'static str> {
        match self {
            OsKind::Posix => Some("-c"),
            OsKind::Windows => Some("-n"),
            OsKind::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OsKind::Posix => "posix",
            OsKind::Windows => "windows",
            OsKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-quote `raw` for a POSIX shell. Embedded single quotes are closed,
/// escaped and reopened.
pub fn quote_posix(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('\'');
    for ch in raw.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Double-quote `raw` for `cmd.exe`.
pub fn quote_windows(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_platform_families() {
        assert_eq!(OsKind::from_family("unix"), OsKind::Posix);
        assert_eq!(OsKind::from_family("windows"), OsKind::Windows);
        assert_eq!(OsKind::from_family("wasm"), OsKind::Unknown);
    }

    #[cfg(unix)]
    #[test]
    fn detects_posix_host() {
        assert_eq!(OsKind::detect_local(), OsKind::Posix);
    }

    #[test]
    fn ping_flags_follow_os() {
        assert_eq!(OsKind::Posix.ping_count_flag(), Some("-c"));
        assert_eq!(OsKind::Windows.ping_count_flag(), Some("-n"));
        assert_eq!(OsKind::Unknown.ping_count_flag(), None);
    }

    #[test]
    fn quotes_spaces_and_single_quotes() {
        assert_eq!(quote_posix("/srv/My Photos"), "'/srv/My Photos'");
        assert_eq!(quote_posix("it's"), "'it'\\''s'");
    }

    #[test]
    fn wraps_commands_per_dialect() {
        assert_eq!(
            OsKind::Posix.wrap_in_shell("test -d '/srv'").as_deref(),
            Some("/bin/sh -c 'test -d '\\''/srv'\\'''")
        );
        assert_eq!(
            OsKind::Windows.wrap_in_shell("IF EXIST x (exit 0)").as_deref(),
            Some("cmd.exe /C IF EXIST x (exit 0)")
        );
        assert!(OsKind::Unknown.wrap_in_shell("true").is_none());
    }
}
