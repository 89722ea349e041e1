//! End-to-end jobs: enumerate, model, solve or export, decode.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{info, info_span, warn};

use crate::decode::{decode, MatchingRecord};
use crate::entities::MatchingDataset;
use crate::enumerate::{Enumeration, EnumerationSnapshot};
use crate::error::{OptimizerError, Result};
use crate::lp_format::{self, ExportedModel};
use crate::matching::{build_model, MatchingModel};
use crate::matrices::{build_matrices, Matrices};
use crate::pair_slots::ScheduleSlot;
use crate::params::MatchingParams;
use crate::progress::ProgressReporter;
use crate::schedule::{build_schedule_model, decode_schedule, ScheduleDataset, ScheduleParams};
use crate::solver::{CancelFlag, SolveLimits, SolveStatus, SolverBackend, SolverSolution};

/// Everything a finished matching run leaves behind.
#[derive(Debug, Clone)]
pub struct MatchingOutcome {
    pub status: SolveStatus,
    pub score: Option<f64>,
    /// empty unless the solve was optimal
    pub records: Vec<MatchingRecord>,
    pub construct_time: Duration,
    pub compute_time: Duration,
    pub snapshot: EnumerationSnapshot,
}

#[derive(Debug, Clone)]
pub struct OfflineExport {
    pub files: ExportedModel,
    pub snapshot: EnumerationSnapshot,
    pub construct_time: Duration,
}

#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub status: SolveStatus,
    pub score: Option<f64>,
    pub slots: Vec<ScheduleSlot>,
    pub construct_time: Duration,
    pub compute_time: Duration,
}

fn model_for(
    dataset: &MatchingDataset,
    enumeration: &Enumeration,
    params: &MatchingParams,
    progress: &mut impl ProgressReporter,
) -> Result<(Matrices, MatchingModel)> {
    progress.report(15, "Building coefficient matrices");
    let matrices = build_matrices(dataset, enumeration, params)?;
    progress.report(30, "Building MILP model");
    let model = build_model(enumeration, &matrices, params, dataset.base.as_ref())?;
    Ok((matrices, model))
}

fn finish(
    enumeration: &Enumeration,
    matrices: &Matrices,
    model: &MatchingModel,
    solution: &SolverSolution,
    progress: &mut impl ProgressReporter,
) -> Result<Vec<MatchingRecord>> {
    if solution.status != SolveStatus::Optimal {
        warn!(status = ?solution.status, "solver did not yield a usable solution");
        return Ok(Vec::new());
    }
    progress.report(80, "Decoding solution");
    decode(enumeration, matrices, model, solution)
}

/// Build and solve a matching live.
pub fn run_matching(
    dataset: &MatchingDataset,
    params: &MatchingParams,
    backend: &dyn SolverBackend,
    limits: &SolveLimits,
    cancel: &CancelFlag,
    progress: &mut impl ProgressReporter,
) -> Result<MatchingOutcome> {
    let _span = info_span!("matching", solver = backend.name()).entered();
    let started = Instant::now();
    progress.report(5, "Enumerating selectors, projects and faculty");
    let enumeration = Enumeration::build(dataset, params)?;
    cancel.check()?;
    let (matrices, model) = model_for(dataset, &enumeration, params, progress)?;
    let construct_time = started.elapsed();
    cancel.check()?;

    progress.report(50, &format!("Solving with {}", backend.name()));
    let started = Instant::now();
    let solution = backend.solve(&model.model, limits, cancel)?;
    let compute_time = started.elapsed();
    info!(status = ?solution.status, ?construct_time, ?compute_time, "solve finished");

    let records = finish(&enumeration, &matrices, &model, &solution, progress)?;
    progress.report(100, "Matching complete");
    Ok(MatchingOutcome {
        status: solution.status,
        score: solution.objective,
        records,
        construct_time,
        compute_time,
        snapshot: enumeration.snapshot(),
    })
}

/// Build the model and write it out for solving elsewhere.
pub fn export_offline(
    dataset: &MatchingDataset,
    params: &MatchingParams,
    directory: &Path,
    stem: &str,
    progress: &mut impl ProgressReporter,
) -> Result<OfflineExport> {
    let _span = info_span!("offline export", stem).entered();
    let started = Instant::now();
    progress.report(5, "Enumerating selectors, projects and faculty");
    let enumeration = Enumeration::build(dataset, params)?;
    let (_, model) = model_for(dataset, &enumeration, params, progress)?;
    let construct_time = started.elapsed();

    progress.report(60, "Writing LP and MPS files");
    let files = lp_format::export_model(&model.model, directory, stem)?;
    let mut snapshot = enumeration.snapshot();
    snapshot.model = Some(model.model.shape());
    progress.report(100, "Model exported");
    Ok(OfflineExport {
        files,
        snapshot,
        construct_time,
    })
}

/// Rebuild an exported model from its snapshot and decode an uploaded solution.
pub fn ingest_offline(
    dataset: &MatchingDataset,
    params: &MatchingParams,
    snapshot: &EnumerationSnapshot,
    solution_file: &Path,
    progress: &mut impl ProgressReporter,
) -> Result<MatchingOutcome> {
    let _span = info_span!("offline ingest", file = %solution_file.display()).entered();
    let started = Instant::now();
    progress.report(5, "Restoring enumeration");
    let enumeration = Enumeration::from_snapshot(dataset, params, snapshot)?;
    let (matrices, model) = model_for(dataset, &enumeration, params, progress)?;
    let construct_time = started.elapsed();
    // solution files address columns by position
    snapshot
        .model
        .as_ref()
        .ok_or_else(|| OptimizerError::Integrity("snapshot does not come from an offline export".to_owned()))?
        .ensure_matches(&model.model.shape())?;

    progress.report(50, "Reading solution file");
    let solution = lp_format::read_solution_file(&model.model, solution_file)?;
    let records = finish(&enumeration, &matrices, &model, &solution, progress)?;
    progress.report(100, "Solution imported");
    Ok(MatchingOutcome {
        status: solution.status,
        score: solution.objective,
        records,
        construct_time,
        compute_time: Duration::ZERO,
        snapshot: snapshot.clone(),
    })
}

pub fn run_schedule(
    dataset: &ScheduleDataset,
    params: &ScheduleParams,
    backend: &dyn SolverBackend,
    limits: &SolveLimits,
    cancel: &CancelFlag,
    progress: &mut impl ProgressReporter,
) -> Result<ScheduleOutcome> {
    let _span = info_span!("schedule", solver = backend.name()).entered();
    let started = Instant::now();
    progress.report(10, "Building schedule model");
    let schedule = build_schedule_model(dataset, params)?;
    let construct_time = started.elapsed();
    cancel.check()?;

    progress.report(50, &format!("Solving with {}", backend.name()));
    let started = Instant::now();
    let solution = backend.solve(&schedule.model, limits, cancel)?;
    let compute_time = started.elapsed();

    let slots = if solution.status == SolveStatus::Optimal {
        progress.report(80, "Decoding schedule");
        decode_schedule(&schedule, &solution)?
    } else {
        warn!(status = ?solution.status, "schedule solve did not yield a usable solution");
        Vec::new()
    };
    progress.report(100, "Schedule complete");
    Ok(ScheduleOutcome {
        status: solution.status,
        score: solution.objective,
        slots,
        construct_time,
        compute_time,
    })
}
