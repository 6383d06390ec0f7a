use directories::{BaseDirs, ProjectDirs};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::direction::TransferDirection;
use crate::errors::SyncError;
use crate::os_kind::OsKind;

/// Lowest accepted threshold percentage (inclusive).
pub const MIN_THRESHOLD_PERCENT: i64 = 40;
/// Upper bound of the threshold percentage (exclusive).
pub const MAX_THRESHOLD_PERCENT: i64 = 101;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "GATESYNC_CONFIG";
const CONFIG_FILE_NAME: &str = "gatesync.toml";

/// One candidate endpoint in a host pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostDescriptor {
    #[serde(default)]
    pub username: Option<String>,
    pub hostname: String,
    #[serde(default)]
    pub os_kind: OsKind,
    #[serde(default)]
    pub port: Option<u16>,
}

impl HostDescriptor {
    pub fn new(username: Option<&str>, hostname: impl Into<String>, os_kind: OsKind) -> Self {
        Self {
            username: username.map(str::to_string),
            hostname: hostname.into(),
            os_kind,
            port: None,
        }
    }

    /// Per-host username if set, else `fallback`. Empty strings count as unset.
    pub fn effective_username<'a>(&'a self, fallback: Option<&'a str>) -> Option<&'a str> {
        non_empty(self.username.as_deref()).or_else(|| non_empty(fallback))
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SSH_PORT)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Description of one side (source or destination) of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub host_list: Vec<HostDescriptor>,
    pub root_path: PathBuf,
    #[serde(default)]
    pub directory_list: Vec<PathBuf>,
}

impl EndpointSpec {
    /// A side with no host pool, i.e. the machine running the sync.
    pub fn local(root_path: impl Into<PathBuf>, directory_list: Vec<PathBuf>) -> Self {
        Self {
            username: None,
            host_list: Vec::new(),
            root_path: root_path.into(),
            directory_list,
        }
    }

    /// A side backed by a pool of candidate hosts.
    pub fn remote(
        username: Option<&str>,
        host_list: Vec<HostDescriptor>,
        root_path: impl Into<PathBuf>,
        directory_list: Vec<PathBuf>,
    ) -> Self {
        Self {
            username: username.map(str::to_string),
            host_list,
            root_path: root_path.into(),
            directory_list,
        }
    }
}

/// Raw threshold fields before range validation.
#[derive(Debug, Clone, Deserialize)]
struct RawThreshold {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    percentage: f64,
}

fn default_enabled() -> bool {
    true
}

/// Threshold gate settings. The percentage range is checked at construction,
/// including deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThreshold")]
pub struct ThresholdConfig {
    enabled: bool,
    percentage: f64,
}

impl ThresholdConfig {
    /// Build an enabled or disabled gate. When enabled, the percentage is
    /// truncated to an integer and must land in `[40, 100]`.
    pub fn new(enabled: bool, percentage: f64) -> Result<Self> {
        if enabled {
            let truncated = percentage.trunc();
            let in_range = percentage.is_finite()
                && truncated >= MIN_THRESHOLD_PERCENT as f64
                && truncated < MAX_THRESHOLD_PERCENT as f64;
            if !in_range {
                return Err(SyncError::configuration(
                    format!(
                        "{percentage} is outside the valid threshold of [{MIN_THRESHOLD_PERCENT}, {}]",
                        MAX_THRESHOLD_PERCENT - 1
                    ),
                    Some("threshold.percentage".to_string()),
                )
                .into());
            }
        }
        Ok(Self {
            enabled,
            percentage,
        })
    }

    /// A gate that never blocks; sync behaves like plain rsync.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            percentage: 0.0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn percentage(&self) -> f64 {
        self.percentage
    }
}

impl TryFrom<RawThreshold> for ThresholdConfig {
    type Error = eyre::Report;

    fn try_from(raw: RawThreshold) -> Result<Self> {
        ThresholdConfig::new(raw.enabled, raw.percentage)
    }
}

/// Complete description of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub source: EndpointSpec,
    pub destination: EndpointSpec,
    pub threshold: ThresholdConfig,
    /// Explicit direction; inferred from the host pools when absent.
    #[serde(default)]
    pub direction: Option<TransferDirection>,
    #[serde(default)]
    pub debug_mode: bool,
}

impl SyncConfig {
    /// Resolve the direction for this run (explicit value first).
    pub fn resolve_direction(&self) -> Result<TransferDirection> {
        TransferDirection::resolve_or_explicit(
            self.direction,
            &self.source.host_list,
            &self.destination.host_list,
        )
    }

    /// The side holding the candidate host pool.
    pub fn remote_side(&self, direction: TransferDirection) -> &EndpointSpec {
        if direction.source_is_remote() {
            &self.source
        } else {
            &self.destination
        }
    }

    /// Check the invariants that depend on the resolved direction.
    pub fn validate(&self, direction: TransferDirection) -> Result<()> {
        if self.source.directory_list.is_empty() {
            return Err(config_error(
                "there should be at least one directory in the source directory list",
                "source.directory_list",
            ));
        }
        if self.source.root_path.as_os_str().is_empty() {
            return Err(config_error(
                "the source root path must be defined",
                "source.root_path",
            ));
        }
        if self.destination.root_path.as_os_str().is_empty() {
            return Err(config_error(
                "the destination root path must be defined",
                "destination.root_path",
            ));
        }

        let (remote, label) = if direction.source_is_remote() {
            (&self.source, "source")
        } else {
            (&self.destination, "destination")
        };
        if remote.host_list.is_empty() {
            return Err(config_error(
                "there should be at least one host in the remote host list",
                &format!("{label}.host_list"),
            ));
        }
        for host in &remote.host_list {
            if host.hostname.trim().is_empty() {
                return Err(config_error(
                    "host entries must have a hostname",
                    &format!("{label}.host_list"),
                ));
            }
            if host.effective_username(remote.username.as_deref()).is_none() {
                return Err(config_error(
                    "a username must be defined for the side or for the host",
                    &host.hostname,
                ));
            }
        }
        Ok(())
    }
}

fn config_error(message: &str, subject: &str) -> eyre::Report {
    SyncError::configuration(message, Some(subject.to_string())).into()
}

/// Resolve the configuration directory.
/// Priority: platform standard -> ~/.config/gatesync
pub fn config_dir() -> Result<PathBuf> {
    if let Some(proj) = ProjectDirs::from("com", "Gatesync", "gatesync") {
        return Ok(proj.config_dir().to_path_buf());
    }

    if let Some(base) = BaseDirs::new() {
        return Ok(base.home_dir().join(".config").join("gatesync"));
    }

    Err(eyre!(
        "unable to determine configuration directory for gatesync (no platform default)"
    ))
}

/// Resolve the configuration file: `explicit` (typically `$GATESYNC_CONFIG`)
/// wins over the default file inside [`config_dir`].
pub fn config_file_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(config_dir()?.join(CONFIG_FILE_NAME)),
    }
}
