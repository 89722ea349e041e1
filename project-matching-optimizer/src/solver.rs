//! Solver backends behind one capability trait.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{OptimizerError, Result};
use crate::lp_format::{self, Naming, ParsedSolution};
use crate::model::{Model, VarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    NotSolved,
    Undefined,
}

/// Wall clock budget and relative optimality gap handed to every backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveLimits {
    pub time_limit: Duration,
    pub relative_gap: f64,
}

impl Default for SolveLimits {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(3600),
            relative_gap: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverSolution {
    pub status: SolveStatus,
    /// objective of `values` under the model, only for optimal solutions
    pub objective: Option<f64>,
    /// one value per model variable, empty when the solver produced none
    pub values: Vec<f64>,
}

impl SolverSolution {
    #[must_use]
    pub fn from_values(model: &Model, status: SolveStatus, values: Vec<f64>) -> Self {
        let objective = (status == SolveStatus::Optimal && values.len() == model.variables().len())
            .then(|| model.objective.evaluate(&values));
        Self {
            status,
            objective,
            values,
        }
    }

    #[must_use]
    pub const fn without_values(status: SolveStatus) -> Self {
        Self {
            status,
            objective: None,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.index()).copied().unwrap_or(0.0)
    }

    /// Rounded value of an integral variable.
    #[must_use]
    pub fn count(&self, var: VarId) -> u32 {
        self.value(var).round().max(0.0) as u32
    }
}

/// Cooperative cancellation shared between the signal handler and the solve.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(OptimizerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Solve `model`. Infeasibility and unboundedness come back as a status, only
    /// a broken solver or a cancellation is an error.
    fn solve(&self, model: &Model, limits: &SolveLimits, cancel: &CancelFlag) -> Result<SolverSolution>;
}

/// Which backend an attempt asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// CBC linked into the process
    PackagedCbc,
    /// pure Rust branch and bound, always available
    #[default]
    MicroLp,
    CbcCommand,
    HighsCommand,
    ScipCommand,
}

/// Executables for the command line backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverPrograms {
    pub cbc: PathBuf,
    pub highs: PathBuf,
    pub scip: PathBuf,
}

impl Default for SolverPrograms {
    fn default() -> Self {
        Self {
            cbc: PathBuf::from("cbc"),
            highs: PathBuf::from("highs"),
            scip: PathBuf::from("scip"),
        }
    }
}

impl SolverKind {
    #[must_use]
    pub fn backend(self, programs: &SolverPrograms) -> Box<dyn SolverBackend> {
        match self {
            Self::PackagedCbc => Box::new(PackagedCbc),
            Self::MicroLp => Box::new(MicroLp),
            Self::CbcCommand => Box::new(CommandSolver::new(CommandFlavour::Cbc, &programs.cbc)),
            Self::HighsCommand => {
                Box::new(CommandSolver::new(CommandFlavour::Highs, &programs.highs))
            }
            Self::ScipCommand => Box::new(CommandSolver::new(CommandFlavour::Scip, &programs.scip)),
        }
    }
}

#[cfg(any(feature = "cbc", feature = "microlp"))]
mod in_process {
    use good_lp::solvers::{ResolutionError, Solution, Solver, SolverModel};
    use good_lp::{constraint, variable, Expression, ProblemVariables, Variable};
    use tracing::warn;

    use super::{SolveStatus, SolverSolution};
    use crate::error::Result;
    use crate::model::{Model, Relation, Sense, VarKind};

    fn expression(expr: &crate::model::LinExpr, vars: &[Variable]) -> Expression {
        let mut translated = Expression::with_capacity(expr.terms().count());
        for (var, coefficient) in expr.terms() {
            translated.add_mul(coefficient, vars[var.index()]);
        }
        translated
    }

    /// Translate `model` for a `good_lp` solver, let `configure` set solver
    /// parameters, and solve.
    pub fn solve<S>(model: &Model, solver: S, configure: impl FnOnce(&mut S::Model)) -> Result<SolverSolution>
    where
        S: Solver,
        S::Model: SolverModel<Error = ResolutionError>,
    {
        let mut problem = ProblemVariables::new();
        let vars: Vec<Variable> = model
            .variables()
            .iter()
            .map(|definition| {
                let mut builder = variable().name(definition.name.clone()).min(definition.lower);
                if let Some(upper) = definition.upper {
                    builder = builder.max(upper);
                }
                builder = match definition.kind {
                    VarKind::Binary => builder.binary(),
                    VarKind::Integer => builder.integer(),
                    VarKind::Continuous => builder,
                };
                problem.add(builder)
            })
            .collect();

        let mut objective = expression(&model.objective, &vars);
        objective += model.objective.constant_term();
        let unsolved = match model.sense {
            Sense::Maximise => problem.maximise(objective),
            Sense::Minimise => problem.minimise(objective),
        };
        let mut solver_model = unsolved.using(solver);
        configure(&mut solver_model);
        for definition in model.constraints() {
            let lhs = expression(&definition.expr, &vars);
            let translated = match definition.relation {
                Relation::LessEqual => constraint::leq(lhs, definition.rhs),
                Relation::GreaterEqual => constraint::geq(lhs, definition.rhs),
                Relation::Equal => constraint::eq(lhs, definition.rhs),
            };
            solver_model.add_constraint(translated);
        }

        match solver_model.solve() {
            Ok(solution) => {
                let values = vars.iter().map(|var| solution.value(*var)).collect();
                Ok(SolverSolution::from_values(model, SolveStatus::Optimal, values))
            }
            Err(ResolutionError::Infeasible) => Ok(SolverSolution::without_values(SolveStatus::Infeasible)),
            Err(ResolutionError::Unbounded) => Ok(SolverSolution::without_values(SolveStatus::Unbounded)),
            Err(other) => {
                warn!(error = %other, "solver gave up");
                Ok(SolverSolution::without_values(SolveStatus::Undefined))
            }
        }
    }
}

/// CBC through `good_lp`'s `coin_cbc` binding. It cannot be interrupted once
/// started, so cancellation is only observed around the solve.
#[derive(Debug, Clone, Copy)]
pub struct PackagedCbc;

impl SolverBackend for PackagedCbc {
    fn name(&self) -> &'static str {
        "cbc (packaged)"
    }

    #[cfg(feature = "cbc")]
    fn solve(&self, model: &Model, limits: &SolveLimits, cancel: &CancelFlag) -> Result<SolverSolution> {
        cancel.check()?;
        let seconds = limits.time_limit.as_secs().to_string();
        let gap = limits.relative_gap.to_string();
        let solution = in_process::solve(model, good_lp::solvers::coin_cbc::coin_cbc, |problem| {
            problem.set_parameter("log", "0");
            problem.set_parameter("sec", &seconds);
            problem.set_parameter("ratioGap", &gap);
        })?;
        cancel.check()?;
        Ok(solution)
    }

    #[cfg(not(feature = "cbc"))]
    fn solve(&self, _model: &Model, _limits: &SolveLimits, _cancel: &CancelFlag) -> Result<SolverSolution> {
        Err(OptimizerError::SolverUnavailable(self.name()))
    }
}

/// `microlp` through `good_lp`. It has no time or gap control.
#[derive(Debug, Clone, Copy)]
pub struct MicroLp;

impl SolverBackend for MicroLp {
    fn name(&self) -> &'static str {
        "microlp"
    }

    #[cfg(feature = "microlp")]
    fn solve(&self, model: &Model, limits: &SolveLimits, cancel: &CancelFlag) -> Result<SolverSolution> {
        cancel.check()?;
        debug!(?limits, "microlp ignores solve limits");
        let solution = in_process::solve(model, good_lp::solvers::microlp::microlp, |_| {})?;
        cancel.check()?;
        Ok(solution)
    }

    #[cfg(not(feature = "microlp"))]
    fn solve(&self, _model: &Model, _limits: &SolveLimits, _cancel: &CancelFlag) -> Result<SolverSolution> {
        Err(OptimizerError::SolverUnavailable(self.name()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlavour {
    Cbc,
    Highs,
    Scip,
}

impl CommandFlavour {
    const fn name(self) -> &'static str {
        match self {
            Self::Cbc => "cbc",
            Self::Highs => "highs",
            Self::Scip => "scip",
        }
    }

    const fn naming(self) -> Naming {
        match self {
            Self::Cbc | Self::Scip => Naming::Lp,
            Self::Highs => Naming::Mps,
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Time a solver gets past its own limit before it is killed.
const GRACE: Duration = Duration::from_secs(60);

/// A solver run as a child process on files in a scratch directory.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    flavour: CommandFlavour,
    program: PathBuf,
}

impl CommandSolver {
    #[must_use]
    pub fn new(flavour: CommandFlavour, program: &Path) -> Self {
        Self {
            flavour,
            program: program.to_owned(),
        }
    }

    /// Write the model and build the command line.
    fn prepare(&self, model: &Model, limits: &SolveLimits, dir: &Path) -> Result<Command> {
        let seconds = limits.time_limit.as_secs().to_string();
        let gap = limits.relative_gap.to_string();
        let mut command = Command::new(&self.program);
        command.current_dir(dir);
        match self.flavour {
            CommandFlavour::Cbc => {
                lp_format::write_lp(model, &mut io::BufWriter::new(fs::File::create(dir.join("model.lp"))?))?;
                command.args([
                    "model.lp",
                    "-sec",
                    &seconds,
                    "-ratioGap",
                    &gap,
                    "-solve",
                    "-solution",
                    "model.sol",
                ]);
            }
            CommandFlavour::Highs => {
                lp_format::write_mps(model, &mut io::BufWriter::new(fs::File::create(dir.join("model.mps"))?))?;
                fs::write(dir.join("highs.opt"), format!("mip_rel_gap = {gap}\n"))?;
                command.args([
                    "--model_file",
                    "model.mps",
                    "--time_limit",
                    &seconds,
                    "--options_file",
                    "highs.opt",
                    "--solution_file",
                    "model.sol",
                ]);
            }
            CommandFlavour::Scip => {
                lp_format::write_lp(model, &mut io::BufWriter::new(fs::File::create(dir.join("model.lp"))?))?;
                command.arg("-c").arg(format!(
                    "read model.lp set limits time {seconds} set limits gap {gap} optimize write \
                     solution model.sol quit"
                ));
            }
        }
        Ok(command)
    }

    fn parse(&self, text: &str) -> Result<ParsedSolution> {
        match self.flavour {
            CommandFlavour::Cbc => lp_format::parse_cbc_solution(text),
            CommandFlavour::Highs => lp_format::parse_highs_solution(text),
            CommandFlavour::Scip => lp_format::parse_listing(text),
        }
    }

    fn failed(&self, message: String) -> OptimizerError {
        OptimizerError::SolverFailed {
            solver: self.flavour.name(),
            message,
        }
    }
}

fn log_tail(path: &Path) -> String {
    let log = fs::read_to_string(path).unwrap_or_default();
    let lines: Vec<&str> = log.lines().collect();
    lines[lines.len().saturating_sub(5)..].join("\n")
}

impl SolverBackend for CommandSolver {
    fn name(&self) -> &'static str {
        self.flavour.name()
    }

    fn solve(&self, model: &Model, limits: &SolveLimits, cancel: &CancelFlag) -> Result<SolverSolution> {
        cancel.check()?;
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("solver.log");
        let mut command = self.prepare(model, limits, dir.path())?;
        let log = fs::File::create(&log_path)?;
        command
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log);

        let mut child = command.spawn().map_err(|error| {
            if error.kind() == io::ErrorKind::NotFound {
                OptimizerError::SolverUnavailable(self.flavour.name())
            } else {
                OptimizerError::Io(error)
            }
        })?;
        info!(solver = self.name(), pid = child.id(), "started solver process");

        let started = Instant::now();
        let exit = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.is_cancelled() {
                warn!(solver = self.name(), "cancelled, killing solver process");
                child.kill()?;
                child.wait()?;
                return Err(OptimizerError::Cancelled);
            }
            if started.elapsed() > limits.time_limit + GRACE {
                warn!(solver = self.name(), "solver overran its time limit, killing it");
                child.kill()?;
                child.wait()?;
                return Ok(SolverSolution::without_values(SolveStatus::NotSolved));
            }
            thread::sleep(POLL_INTERVAL);
        };
        debug!(solver = self.name(), ?exit, elapsed = ?started.elapsed(), "solver process finished");

        if !exit.success() {
            return Err(self.failed(format!("exited with {exit}: {}", log_tail(&log_path))));
        }
        let solution_path = dir.path().join("model.sol");
        if !solution_path.exists() {
            warn!(solver = self.name(), "solver wrote no solution file");
            return Ok(SolverSolution::without_values(SolveStatus::NotSolved));
        }
        let parsed = self.parse(&fs::read_to_string(&solution_path)?)?;
        if parsed.status != SolveStatus::Optimal {
            return Ok(SolverSolution::without_values(parsed.status));
        }
        let values = lp_format::resolve_values(model, self.flavour.naming(), &parsed.values)?;
        Ok(SolverSolution::from_values(model, parsed.status, values))
    }
}
