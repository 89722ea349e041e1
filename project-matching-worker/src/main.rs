use std::process::ExitCode;

use clap::Parser;
use project_matching_config::get_config;
use project_matching_worker::cli::Cli;
use project_matching_worker::error::WorkerError;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,project_matching=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = match get_config() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            return ExitCode::from(WorkerError::from(error).exit_code());
        }
    };
    info!(?config, "starting worker");

    match project_matching_worker::run(cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, state = error.task_state().as_str(), "job failed");
            ExitCode::from(error.exit_code())
        }
    }
}
