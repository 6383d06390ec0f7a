//! Error categorization for sync runs.
//!
//! Every fatal condition carries a category so the launcher can report which
//! invariant was violated:
//! - Configuration: invalid threshold, missing fields, unresolvable usernames
//! - Direction: transfer direction could not be inferred from topology
//! - Connectivity: no host in the candidate pool answered
//! - RemoteCommand: a probe command failed on the remote side
//!
//! Threshold rejections are not errors and never surface here.

use std::io;

/// Category of a sync error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid or incomplete configuration. Raised at validation time.
    Configuration,
    /// Direction inference was ambiguous and no explicit direction was given.
    Direction,
    /// None of the candidate hosts could be reached.
    Connectivity,
    /// A remote probe or session operation failed.
    RemoteCommand,
}

/// A sync error with its category.
#[derive(Debug)]
pub struct SyncError {
    /// The underlying error message.
    pub message: String,
    /// The host, path or field the error refers to (if applicable).
    pub subject: Option<String>,
    /// The error category.
    pub category: ErrorCategory,
}

impl SyncError {
    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>, subject: Option<String>) -> Self {
        Self {
            message: message.into(),
            subject,
            category: ErrorCategory::Configuration,
        }
    }

    /// Create a new direction-ambiguity error.
    pub fn direction(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            subject: None,
            category: ErrorCategory::Direction,
        }
    }

    /// Create a connectivity error naming every host that was attempted.
    pub fn no_reachable_host(attempted: &[String]) -> Self {
        Self {
            message: format!(
                "could not reach any host in the candidate list (tried {}); check the network \
                 connection and make sure at least one machine is online",
                attempted.len()
            ),
            subject: Some(attempted.join(", ")),
            category: ErrorCategory::Connectivity,
        }
    }

    /// Create a new remote-command error.
    pub fn remote_command(message: impl Into<String>, subject: Option<String>) -> Self {
        Self {
            message: message.into(),
            subject,
            category: ErrorCategory::RemoteCommand,
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref subject) = self.subject {
            write!(f, "{}: {}", subject, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for SyncError {}

/// Categorize an IO error raised while talking to a remote host.
pub fn categorize_io_error(err: &io::Error) -> ErrorCategory {
    match err.kind() {
        // The host never answered or went away before the session existed.
        io::ErrorKind::TimedOut
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrNotAvailable => ErrorCategory::Connectivity,

        _ => ErrorCategory::RemoteCommand,
    }
}

/// Return the category of an eyre report if it wraps a [`SyncError`].
pub fn category_of(report: &eyre::Report) -> Option<ErrorCategory> {
    report.downcast_ref::<SyncError>().map(|err| err.category)
}
