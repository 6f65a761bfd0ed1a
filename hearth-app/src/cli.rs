use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Thin CLI front-end (§6 "handed off to an external wrapper"): the
/// long-running daemon logic in [`crate::daemon`] never depends on this
/// module directly, only on [`hearth_config::Settings`].
#[derive(Parser, Debug)]
#[command(name = "hearthd", about = "Smart-home event ingestion, pipeline, and alerting daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Loads environment variables from this file before reading settings,
    /// in addition to a `.env` in the working directory.
    #[arg(long, global = true, env = "HEARTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides `RUST_LOG` for this process only.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs the daemon in the foreground until a shutdown signal arrives.
    Start,
    /// Not implemented by this binary: process lifecycle is owned by an
    /// external supervisor (systemd, a container runtime, …), per §6.
    Stop,
    /// Not implemented by this binary: poll `GET /health` instead.
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_pretty_logging_with_no_config_override() {
        let cli = Cli::parse_from(["hearthd", "start"]);
        assert!(matches!(cli.command, Command::Start));
        assert_eq!(cli.log_format, LogFormat::Pretty);
        assert!(cli.config.is_none());
    }

    #[test]
    fn parses_json_log_format_and_config_path() {
        let cli = Cli::parse_from(["hearthd", "--log-format", "json", "--config", "/etc/hearth.env", "start"]);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/hearth.env")));
    }

    #[test]
    fn stop_and_status_are_distinct_subcommands() {
        let cli = Cli::parse_from(["hearthd", "stop"]);
        assert!(matches!(cli.command, Command::Stop));
        let cli = Cli::parse_from(["hearthd", "status"]);
        assert!(matches!(cli.command, Command::Status));
    }
}
