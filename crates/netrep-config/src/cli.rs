//! Command-line overrides for the relay configuration.

use std::path::PathBuf;

use clap::Args;

use crate::Config;

/// Configuration flags shared by every netrep binary.
///
/// CLI values override settings loaded from `config.ron`. Binaries embed this
/// with `#[command(flatten)]`.
#[derive(Args, Debug, Clone, Default)]
pub struct CliArgs {
    /// Authority address.
    #[arg(long)]
    pub server: Option<String>,

    /// Authority port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seconds between replication passes.
    #[arg(long)]
    pub replication_interval: Option<f32>,

    /// Relevancy distance.
    #[arg(long)]
    pub max_distance: Option<f32>,

    /// Log every replication at info level.
    #[arg(long)]
    pub debug_logging: bool,
}

impl Config {
    /// Overwrites every field the command line set; unset flags keep the
    /// loaded value. `--debug-logging` can only turn logging on.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.server {
            self.network.server_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(interval) = args.replication_interval {
            self.replication.replication_interval = interval;
        }
        if let Some(distance) = args.max_distance {
            self.replication.max_replication_distance = distance;
        }
        if args.debug_logging {
            self.debug.debug_logging = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: CliArgs,
    }

    #[test]
    fn test_replication_overrides_leave_network_alone() {
        let mut config = Config::default();
        let args = CliArgs {
            replication_interval: Some(0.2),
            max_distance: Some(2500.0),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.replication.replication_interval, 0.2);
        assert_eq!(config.replication.max_replication_distance, 2500.0);
        assert_eq!(config.network, Config::default().network);
        assert!(!config.debug.debug_logging);
    }

    #[test]
    fn test_empty_args_change_nothing() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_authority_address_override() {
        let mut config = Config::default();
        let cli = TestCli::parse_from(["netrep", "--server", "10.1.2.3", "--port", "9100"]);
        config.apply_cli_overrides(&cli.args);
        assert_eq!(config.network.server_address, "10.1.2.3");
        assert_eq!(config.network.server_port, 9100);
    }

    #[test]
    fn test_flags_parse() {
        let cli = TestCli::parse_from([
            "netrep",
            "--port",
            "9000",
            "--log-level",
            "debug",
            "--debug-logging",
        ]);
        assert_eq!(cli.args.port, Some(9000));
        assert_eq!(cli.args.log_level.as_deref(), Some("debug"));
        assert!(cli.args.debug_logging);
    }
}
