use crate::entities::{ConfigId, FacultyId, ProjectClassId, ProjectId, RoomId, SelectorId, SessionId};

/// Everything that can abort an optimizer run.
///
/// None of these are worth retrying: rerunning against the same data reproduces the
/// same inconsistency. Solver-reported infeasibility is not an error, it is an
/// outcome on the attempt.
#[derive(thiserror::Error, Debug)]
pub enum OptimizerError {
    #[error("no live configuration for project class {pclass} in year {year}")]
    MissingConfiguration { pclass: ProjectClassId, year: i32 },
    #[error("data integrity violation: {0}")]
    Integrity(String),
    #[error(
        "faculty member {faculty} already carries {existing} CATS of {role} from included \
         matches, above their limit of {limit}"
    )]
    CatsLimitExceeded {
        faculty: FacultyId,
        role: &'static str,
        existing: u32,
        limit: u32,
    },
    #[error("required assignment of selector {selector} to project {project} is infeasible: {reason}")]
    InfeasibleRequirement {
        selector: SelectorId,
        project: ProjectId,
        reason: String,
    },
    #[error("base match cannot be carried over: {0}")]
    InfeasibleBaseMatch(String),
    #[error("constraint {0} has no free variables and cannot be satisfied")]
    InfeasibleConstraint(String),
    #[error("solution does not decode: {0}")]
    DecodeInvariant(String),
    #[error("solver {0} is not available in this build")]
    SolverUnavailable(&'static str),
    #[error("solver {solver} failed: {message}")]
    SolverFailed { solver: &'static str, message: String },
    #[error("cannot read solution file: {0}")]
    SolutionFormat(String),
    #[error("solution refers to unknown variable {0}")]
    UnknownVariable(String),
    #[error("more than one slot occupies session {session} in room {room}")]
    DuplicateSlot { session: SessionId, room: RoomId },
    #[error("configuration {0} is not part of this attempt")]
    UnknownConfiguration(ConfigId),
    #[error("run was cancelled")]
    Cancelled,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, OptimizerError>;
