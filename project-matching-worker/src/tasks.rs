//! One function per subcommand. Each loads its attempt, refuses to touch it when
//! the lifecycle forbids, runs the optimizer on a blocking thread and stores the
//! result. Once the lifecycle check has passed, a failure that a rerun would not
//! fix closes the attempt; transient ones leave it open for the retry.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use project_matching_config::Config;
use project_matching_database::{matching, schedule, DatabaseError, DatabasePool, PooledConnection};
use project_matching_optimizer::entities::{AttemptId, MatchingDataset};
use project_matching_optimizer::enumerate::EnumerationSnapshot;
use project_matching_optimizer::job::{self, MatchingOutcome};
use project_matching_optimizer::pair_slots::{pair_slots, ScheduleSlot};
use project_matching_optimizer::params::MatchingParams;
use project_matching_optimizer::progress::Monotonic;
use project_matching_optimizer::schedule::{ScheduleDataset, ScheduleParams};
use project_matching_optimizer::solver::CancelFlag;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::cli::{DiffArgs, IngestArgs, JobInput, MatchArgs, OfflineArgs, ScheduleArgs, SlotSource};
use crate::error::WorkerError;
use crate::progress::{spawn_progress_writer, ChannelProgress, ProgressTarget};

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, WorkerError> {
    let text = fs::read_to_string(path).map_err(|source| WorkerError::Read {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| WorkerError::Parse {
        path: path.to_owned(),
        source,
    })
}

fn read_params<T: DeserializeOwned + Default>(input: &JobInput) -> Result<T, WorkerError> {
    input
        .params
        .as_deref()
        .map_or_else(|| Ok(T::default()), read_json)
}

async fn connect(pool: &DatabasePool) -> Result<PooledConnection, WorkerError> {
    Ok(pool.get().await.map_err(DatabaseError::from)?)
}

/// Runs `work` on the blocking pool while its progress streams into `target`.
async fn with_progress<T, F>(
    config: &Config,
    pool: &DatabasePool,
    target: ProgressTarget,
    work: F,
) -> Result<T, WorkerError>
where
    T: Send + 'static,
    F: FnOnce(&mut Monotonic<ChannelProgress>) -> project_matching_optimizer::Result<T>
        + Send
        + 'static,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    let writer = spawn_progress_writer(pool.clone(), target, receiver);
    let interval = Duration::from_secs(config.progress_interval_secs);
    let result = tokio::task::spawn_blocking(move || {
        let mut progress = Monotonic::new(ChannelProgress::new(sender, interval));
        work(&mut progress)
    })
    .await;
    // the sender went away with the closure, so the writer drains and stops
    writer.await?;
    Ok(result??)
}

async fn close_failed(pool: &DatabasePool, target: ProgressTarget, failure: &WorkerError) {
    let message = failure.to_string();
    let closed = match target {
        ProgressTarget::Matching(attempt) => match connect(pool).await {
            Ok(mut connection) => matching::mark_failed(&mut connection, attempt, &message)
                .await
                .map_err(WorkerError::from),
            Err(error) => Err(error),
        },
        ProgressTarget::Schedule(attempt) => match connect(pool).await {
            Ok(mut connection) => schedule::mark_failed(&mut connection, attempt, &message)
                .await
                .map_err(WorkerError::from),
            Err(error) => Err(error),
        },
    };
    if let Err(error) = closed {
        error!(?target, %error, "could not close failed attempt");
    }
}

/// Closes the attempt behind `target` when `result` is a failure a rerun would not fix.
async fn settle(
    pool: &DatabasePool,
    target: ProgressTarget,
    result: Result<(), WorkerError>,
) -> Result<(), WorkerError> {
    match &result {
        Err(failure) if failure.closes_attempt() => close_failed(pool, target, failure).await,
        Err(failure) => warn!(?target, %failure, "transient failure, leaving attempt open for a retry"),
        Ok(()) => {}
    }
    result
}

async fn load_matching_snapshot(
    pool: &DatabasePool,
    attempt: AttemptId,
) -> Result<EnumerationSnapshot, WorkerError> {
    let mut connection = connect(pool).await?;
    let row = matching::load_attempt(&mut connection, attempt).await?;
    row.lifecycle()?.ensure_mutable()?;
    Ok(row.snapshot()?)
}

async fn ensure_matching_mutable(pool: &DatabasePool, attempt: AttemptId) -> Result<(), WorkerError> {
    let mut connection = connect(pool).await?;
    let row = matching::load_attempt(&mut connection, attempt).await?;
    row.lifecycle()?.ensure_mutable()?;
    Ok(())
}

async fn ensure_schedule_mutable(pool: &DatabasePool, attempt: AttemptId) -> Result<(), WorkerError> {
    let mut connection = connect(pool).await?;
    let row = schedule::load_attempt(&mut connection, attempt).await?;
    row.lifecycle()?.ensure_mutable()?;
    Ok(())
}

async fn store_matching(
    pool: &DatabasePool,
    attempt: AttemptId,
    outcome: &MatchingOutcome,
) -> Result<(), WorkerError> {
    let mut connection = connect(pool).await?;
    matching::store_matching_outcome(&mut connection, attempt, outcome).await?;
    info!(
        %attempt,
        status = ?outcome.status,
        score = ?outcome.score,
        records = outcome.records.len(),
        "stored matching outcome"
    );
    Ok(())
}

async fn matching_job(
    config: &Config,
    pool: &DatabasePool,
    args: MatchArgs,
    cancel: CancelFlag,
) -> Result<(), WorkerError> {
    let attempt = args.input.attempt;
    let dataset: MatchingDataset = read_json(&args.input.dataset)?;
    let params: MatchingParams = read_params(&args.input)?;
    let backend = args
        .solver
        .unwrap_or(config.solver)
        .backend(&config.solver_programs);
    let limits = config.limits();
    let outcome = with_progress(config, pool, ProgressTarget::Matching(attempt), move |progress| {
        job::run_matching(&dataset, &params, backend.as_ref(), &limits, &cancel, progress)
    })
    .await?;
    store_matching(pool, attempt, &outcome).await
}

pub async fn run_match(
    config: &Config,
    pool: &DatabasePool,
    args: MatchArgs,
    cancel: CancelFlag,
) -> Result<(), WorkerError> {
    let attempt = args.input.attempt;
    ensure_matching_mutable(pool, attempt).await?;
    let result = matching_job(config, pool, args, cancel).await;
    settle(pool, ProgressTarget::Matching(attempt), result).await
}

async fn offline_job(config: &Config, pool: &DatabasePool, args: OfflineArgs) -> Result<(), WorkerError> {
    let attempt = args.input.attempt;
    let dataset: MatchingDataset = read_json(&args.input.dataset)?;
    let params: MatchingParams = read_params(&args.input)?;
    let directory = args.dir.unwrap_or_else(|| config.offline_dir.clone());
    let stem = format!("attempt_{attempt}");
    let export = with_progress(config, pool, ProgressTarget::Matching(attempt), move |progress| {
        job::export_offline(&dataset, &params, &directory, &stem, progress)
    })
    .await?;

    let mut connection = connect(pool).await?;
    matching::save_snapshot(&mut connection, attempt, &export.snapshot).await?;
    info!(
        %attempt,
        lp = %export.files.lp.display(),
        mps = %export.files.mps.display(),
        construct_time = ?export.construct_time,
        "exported matching model"
    );
    Ok(())
}

/// Leaves the attempt open, waiting for a solution to be ingested.
pub async fn run_offline(config: &Config, pool: &DatabasePool, args: OfflineArgs) -> Result<(), WorkerError> {
    let attempt = args.input.attempt;
    ensure_matching_mutable(pool, attempt).await?;
    let result = offline_job(config, pool, args).await;
    settle(pool, ProgressTarget::Matching(attempt), result).await
}

async fn ingest_job(
    config: &Config,
    pool: &DatabasePool,
    args: IngestArgs,
    snapshot: EnumerationSnapshot,
) -> Result<(), WorkerError> {
    let attempt = args.input.attempt;
    let dataset: MatchingDataset = read_json(&args.input.dataset)?;
    let params: MatchingParams = read_params(&args.input)?;
    let solution = args.solution;
    let outcome = with_progress(config, pool, ProgressTarget::Matching(attempt), move |progress| {
        job::ingest_offline(&dataset, &params, &snapshot, &solution, progress)
    })
    .await?;
    store_matching(pool, attempt, &outcome).await
}

pub async fn run_ingest(config: &Config, pool: &DatabasePool, args: IngestArgs) -> Result<(), WorkerError> {
    let attempt = args.input.attempt;
    let snapshot = load_matching_snapshot(pool, attempt).await?;
    let result = ingest_job(config, pool, args, snapshot).await;
    settle(pool, ProgressTarget::Matching(attempt), result).await
}

async fn schedule_job(
    config: &Config,
    pool: &DatabasePool,
    args: ScheduleArgs,
    cancel: CancelFlag,
) -> Result<(), WorkerError> {
    let attempt = args.input.attempt;
    let dataset: ScheduleDataset = read_json(&args.input.dataset)?;
    let params: ScheduleParams = read_params(&args.input)?;
    let backend = args
        .solver
        .unwrap_or(config.solver)
        .backend(&config.solver_programs);
    let limits = config.limits();
    let outcome = with_progress(config, pool, ProgressTarget::Schedule(attempt), move |progress| {
        job::run_schedule(&dataset, &params, backend.as_ref(), &limits, &cancel, progress)
    })
    .await?;

    let mut connection = connect(pool).await?;
    schedule::store_schedule_outcome(&mut connection, attempt, &outcome).await?;
    info!(
        %attempt,
        status = ?outcome.status,
        score = ?outcome.score,
        slots = outcome.slots.len(),
        "stored schedule outcome"
    );
    Ok(())
}

pub async fn run_schedule(
    config: &Config,
    pool: &DatabasePool,
    args: ScheduleArgs,
    cancel: CancelFlag,
) -> Result<(), WorkerError> {
    let attempt = args.input.attempt;
    ensure_schedule_mutable(pool, attempt).await?;
    let result = schedule_job(config, pool, args, cancel).await;
    settle(pool, ProgressTarget::Schedule(attempt), result).await
}

async fn load_slots(pool: &DatabasePool, source: &SlotSource) -> Result<Vec<ScheduleSlot>, WorkerError> {
    match source {
        SlotSource::File(path) => read_json(path),
        SlotSource::Attempt(attempt) => {
            let mut connection = connect(pool).await?;
            Ok(schedule::load_slots(&mut connection, *attempt).await?)
        }
    }
}

/// Writes the paired slot changes of two schedules to `out` as JSON and returns
/// how many there were.
pub async fn run_diff(
    pool: &DatabasePool,
    args: &DiffArgs,
    out: &mut impl Write,
) -> Result<usize, WorkerError> {
    let old = load_slots(pool, &args.old).await?;
    let new = load_slots(pool, &args.new).await?;
    let changes = pair_slots(&old, &new)?;
    serde_json::to_writer_pretty(&mut *out, &changes)?;
    writeln!(out).map_err(WorkerError::Stdout)?;
    Ok(changes.len())
}
