use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gatesync")]
#[command(about = "Mirror directories with rsync, refusing to overwrite copies that shrank")]
#[command(
    after_help = "The run is described by gatesync.toml in the configuration directory, or by the file named in GATESYNC_CONFIG."
)]
pub struct Cli {
    /// Perform every check but never invoke rsync
    #[arg(long)]
    pub dry_run: bool,
    /// Log at debug level (overrides the config file's debug_mode)
    #[arg(long)]
    pub debug_mode: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_to_off() {
        let cli = Cli::try_parse_from(["gatesync"]).unwrap();
        assert!(!cli.dry_run);
        assert!(!cli.debug_mode);
    }

    #[test]
    fn parses_both_flags() {
        let cli = Cli::try_parse_from(["gatesync", "--dry-run", "--debug-mode"]).unwrap();
        assert!(cli.dry_run);
        assert!(cli.debug_mode);
    }

    #[test]
    fn rejects_unknown_arguments() {
        assert!(Cli::try_parse_from(["gatesync", "--threshold", "50"]).is_err());
    }
}
