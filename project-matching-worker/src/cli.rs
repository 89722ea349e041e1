use core::str::FromStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use project_matching_optimizer::entities::AttemptId;
use project_matching_optimizer::solver::SolverKind;

#[derive(Debug, Parser)]
#[command(version, about = "Runs project matching and scheduling jobs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build and solve a matching attempt
    Match(MatchArgs),
    /// Write the matching model as LP and MPS files for an external solver
    Offline(OfflineArgs),
    /// Import a solution file produced from an offline export
    Ingest(IngestArgs),
    /// Build and solve a presentation schedule
    Schedule(ScheduleArgs),
    /// Pair the slots of two schedules and print the differences as JSON
    Diff(DiffArgs),
}

#[derive(Debug, Args)]
pub struct JobInput {
    #[arg(long, value_parser = parse_attempt)]
    pub attempt: AttemptId,
    /// dataset exported by the web application
    #[arg(long)]
    pub dataset: PathBuf,
    /// job parameters; defaults apply to anything left out
    #[arg(long)]
    pub params: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MatchArgs {
    #[command(flatten)]
    pub input: JobInput,
    /// overrides the configured backend
    #[arg(long, value_parser = parse_solver)]
    pub solver: Option<SolverKind>,
}

#[derive(Debug, Args)]
pub struct OfflineArgs {
    #[command(flatten)]
    pub input: JobInput,
    /// overrides the configured offline directory
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[command(flatten)]
    pub input: JobInput,
    /// `.sol`, `.lpsol` or `.mpssol` file
    #[arg(long)]
    pub solution: PathBuf,
}

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    #[command(flatten)]
    pub input: JobInput,
    #[arg(long, value_parser = parse_solver)]
    pub solver: Option<SolverKind>,
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// `attempt:<id>` or a JSON file of slots
    pub old: SlotSource,
    pub new: SlotSource,
}

/// Where a schedule to compare comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSource {
    Attempt(AttemptId),
    File(PathBuf),
}

impl FromStr for SlotSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.strip_prefix("attempt:") {
            Some(id) => parse_attempt(id).map(Self::Attempt),
            None => Ok(Self::File(PathBuf::from(value))),
        }
    }
}

fn parse_attempt(value: &str) -> Result<AttemptId, String> {
    value
        .parse()
        .map(AttemptId)
        .map_err(|error| format!("invalid attempt id {value:?}: {error}"))
}

fn parse_solver(value: &str) -> Result<SolverKind, String> {
    serde_json::from_value(serde_json::Value::String(value.to_owned()))
        .map_err(|_| format!("unknown solver {value:?}"))
}
