mod cli;
mod daemon;
mod http;
mod logging;

use clap::Parser;
use cli::{Cli, Command};
use daemon::Daemon;
use hearth_config::Settings;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref(), cli.log_format);

    match cli.command {
        Command::Start => run_start(cli.config),
        Command::Stop => {
            eprintln!(
                "hearthd does not manage other processes: stop it through whatever supervisor \
                 started it (systemd, a container runtime, ...)."
            );
            ExitCode::from(1)
        }
        Command::Status => {
            eprintln!("hearthd does not track other processes: poll GET /health on the running daemon instead.");
            ExitCode::from(1)
        }
    }
}

/// Exit codes per §6: 0 on a clean stop, 1 on a fatal configuration error,
/// 2 on a fatal runtime error.
fn run_start(config_path: Option<PathBuf>) -> ExitCode {
    if let Some(path) = &config_path {
        if let Err(error) = dotenvy::from_path(path) {
            error!(%error, path = %path.display(), "failed to load config file");
            return ExitCode::from(1);
        }
    }

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(error) => {
            error!(%error, "invalid configuration");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "failed to start the async runtime");
            return ExitCode::from(2);
        }
    };

    runtime.block_on(async move {
        let daemon = match Daemon::bootstrap(settings).await {
            Ok(daemon) => daemon,
            Err(error) => {
                error!(%error, "failed to initialize daemon");
                return ExitCode::from(2);
            }
        };

        match daemon.run().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                error!(%error, "daemon exited with an error");
                ExitCode::from(2)
            }
        }
    })
}
