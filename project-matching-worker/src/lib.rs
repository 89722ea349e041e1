//! Background worker running optimizer jobs against the attempt tables.

pub mod cli;
pub mod error;
pub mod progress;
pub mod signal;
pub mod tasks;

use std::io;

use cli::{Cli, Command};
use error::WorkerError;
use project_matching_config::Config;
use project_matching_database::get_database_connection;
use project_matching_optimizer::solver::CancelFlag;
use tracing::info;

pub async fn run(cli: Cli, config: &Config) -> Result<(), WorkerError> {
    let pool = get_database_connection(&config.database_url)?;
    let cancel = CancelFlag::new();
    signal::cancel_on_shutdown(cancel.clone());

    match cli.command {
        Command::Match(args) => tasks::run_match(config, &pool, args, cancel).await,
        Command::Offline(args) => tasks::run_offline(config, &pool, args).await,
        Command::Ingest(args) => tasks::run_ingest(config, &pool, args).await,
        Command::Schedule(args) => tasks::run_schedule(config, &pool, args, cancel).await,
        Command::Diff(args) => {
            let changes = tasks::run_diff(&pool, &args, &mut io::stdout().lock()).await?;
            info!(changes, "compared schedules");
            Ok(())
        }
    }
}
