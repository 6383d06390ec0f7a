use eyre::{Context, Result};
use gatesync_core::config::{config_file_path, CONFIG_ENV};
use gatesync_core::{SyncConfig, SyncOptions};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::Cli;

/// Everything a run needs from the command line and the config file.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config_path: PathBuf,
    pub config: SyncConfig,
    pub options: SyncOptions,
    pub debug: bool,
}

impl AppContext {
    pub fn load(cli: &Cli) -> Result<Self> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let config_path = config_file_path(explicit.as_deref())?;
        let config = load_config(&config_path)?;
        let debug = cli.debug_mode || config.debug_mode;
        Ok(Self {
            config_path,
            config,
            options: SyncOptions {
                dry_run: cli.dry_run,
            },
            debug,
        })
    }
}

pub fn load_config(path: &Path) -> Result<SyncConfig> {
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .wrap_err_with(|| format!("failed to parse config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<SyncConfig> {
    let config: SyncConfig = toml::from_str(content)?;
    Ok(config)
}
