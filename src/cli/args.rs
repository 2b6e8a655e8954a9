//! CLI argument parsing using clap.
//!
//! Defines the command-line interface for identity-cli.

use clap::Parser;
use std::path::PathBuf;

/// identity-cli - Drive an identity resolver against in-memory collaborators
#[derive(Parser, Debug, Clone)]
#[command(name = "identity-cli")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Run a single command (e.g. "login vera@loom.test secret") and exit
    #[arg(short = 'e', long, conflicts_with = "file")]
    pub execute: Option<String>,

    /// Run commands from a file (one per line) and exit
    #[arg(short = 'f', long, conflicts_with = "execute")]
    pub file: Option<PathBuf>,

    /// Settings file (default: ~/.identity-resolver/settings.toml)
    #[arg(long, env = "IDENTITY_RESOLVER_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Override the profile store latency from settings
    #[arg(long)]
    pub store_latency_ms: Option<u64>,

    /// Start with the profile store failing every call
    #[arg(long)]
    pub store_offline: bool,

    /// Require email confirmation before sign-up yields a session
    #[arg(long)]
    pub confirm_email: bool,

    /// Output events as JSON lines (for scripting/parsing)
    #[arg(long)]
    pub json: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_values() {
        let args = Args::parse_from(["identity-cli"]);
        assert!(args.execute.is_none());
        assert!(args.file.is_none());
        assert!(args.store_latency_ms.is_none());
        assert!(!args.store_offline);
        assert!(!args.confirm_email);
        assert!(!args.json);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_execute_flag() {
        let args = Args::parse_from(["identity-cli", "-e", "whoami"]);
        assert_eq!(args.execute, Some("whoami".to_string()));
    }

    #[test]
    fn test_args_execute_conflicts_with_file() {
        let result = Args::try_parse_from(["identity-cli", "-e", "whoami", "-f", "cmds.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_args_store_knobs() {
        let args = Args::parse_from([
            "identity-cli",
            "--store-latency-ms",
            "4000",
            "--store-offline",
            "--confirm-email",
        ]);
        assert_eq!(args.store_latency_ms, Some(4000));
        assert!(args.store_offline);
        assert!(args.confirm_email);
    }

    #[test]
    fn test_args_output_modes() {
        let args = Args::parse_from(["identity-cli", "--json", "-v"]);
        assert!(args.json);
        assert!(args.verbose);
    }

    #[test]
    fn test_args_settings_path() {
        let args = Args::parse_from(["identity-cli", "--settings", "/tmp/resolver.toml"]);
        assert_eq!(args.settings, Some(PathBuf::from("/tmp/resolver.toml")));
    }
}
