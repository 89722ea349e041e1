//! What may be done to an attempt, and when.

use serde::{Deserialize, Serialize};

use crate::decode::{MatchingRecord, MatchingRole};
use crate::entities::{AttemptId, ProjectId};
use crate::solver::SolveStatus;

/// Terminal result recorded on an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Optimal,
    NotSolved,
    Infeasible,
    Unbounded,
    Undefined,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::NotSolved => "not_solved",
            Self::Infeasible => "infeasible",
            Self::Unbounded => "unbounded",
            Self::Undefined => "undefined",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::Optimal,
            Self::NotSolved,
            Self::Infeasible,
            Self::Unbounded,
            Self::Undefined,
        ]
        .into_iter()
        .find(|outcome| outcome.as_str() == value)
    }
}

impl From<SolveStatus> for Outcome {
    fn from(status: SolveStatus) -> Self {
        match status {
            SolveStatus::Optimal => Self::Optimal,
            SolveStatus::NotSolved => Self::NotSolved,
            SolveStatus::Infeasible => Self::Infeasible,
            SolveStatus::Unbounded => Self::Unbounded,
            SolveStatus::Undefined => Self::Undefined,
        }
    }
}

/// Requests that are refused before any optimizer code runs.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("attempt has already finished, duplicate it to run again")]
    AlreadyFinished,
    #[error("attempt is published and cannot be changed")]
    Published,
    #[error("attempt is selected and cannot be changed")]
    Selected,
    #[error("attempt has not finished yet")]
    NotFinished,
    #[error("attempt did not yield a usable solution")]
    NoUsableSolution,
    #[error("attempt has no record {0}")]
    UnknownRecord(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptLifecycle {
    pub finished: bool,
    /// the background task has returned, whatever the outcome
    pub task_finished: bool,
    pub outcome: Option<Outcome>,
    pub published: bool,
    pub selected: bool,
}

impl AttemptLifecycle {
    /// Whether the optimizer may (re)run on this attempt.
    pub const fn ensure_mutable(&self) -> Result<(), WorkflowError> {
        if self.published {
            Err(WorkflowError::Published)
        } else if self.selected {
            Err(WorkflowError::Selected)
        } else if self.finished {
            Err(WorkflowError::AlreadyFinished)
        } else {
            Ok(())
        }
    }

    pub const fn ensure_deletable(&self) -> Result<(), WorkflowError> {
        if self.published {
            Err(WorkflowError::Published)
        } else if self.selected {
            Err(WorkflowError::Selected)
        } else {
            Ok(())
        }
    }

    /// Finished with an optimal outcome, so it has records worth acting on.
    pub fn ensure_usable(&self) -> Result<(), WorkflowError> {
        if !self.finished {
            Err(WorkflowError::NotFinished)
        } else if self.outcome != Some(Outcome::Optimal) {
            Err(WorkflowError::NoUsableSolution)
        } else {
            Ok(())
        }
    }

    pub fn complete(&mut self, outcome: Outcome) {
        self.finished = true;
        self.task_finished = true;
        self.outcome = Some(outcome);
    }

    /// Mark a run that aborted; the attempt is never left finished without outcome.
    pub fn fail(&mut self) {
        self.complete(Outcome::Undefined);
    }

    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        !self.finished || self.outcome.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingAttempt {
    pub id: AttemptId,
    pub name: String,
    pub lifecycle: AttemptLifecycle,
    pub score: Option<f64>,
    /// seconds spent building the model
    pub construct_time: Option<f64>,
    /// seconds spent in the solver
    pub compute_time: Option<f64>,
    pub records: Vec<MatchingRecord>,
}

impl MatchingAttempt {
    #[must_use]
    pub fn new(id: AttemptId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            lifecycle: AttemptLifecycle::default(),
            score: None,
            construct_time: None,
            compute_time: None,
            records: Vec::new(),
        }
    }

    /// Hand-edit one record after the run.
    pub fn reassign(
        &mut self,
        record: usize,
        project: ProjectId,
        roles: Vec<MatchingRole>,
    ) -> Result<(), WorkflowError> {
        self.lifecycle.ensure_usable()?;
        if self.lifecycle.published {
            return Err(WorkflowError::Published);
        }
        let record = self
            .records
            .get_mut(record)
            .ok_or(WorkflowError::UnknownRecord(record))?;
        record.project = project;
        record.roles = roles;
        Ok(())
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.records.iter().any(|record| {
            record.project != record.original_project || record.roles != record.original_roles
        })
    }

    /// Undo every hand edit.
    pub fn revert(&mut self) -> Result<(), WorkflowError> {
        self.lifecycle.ensure_usable()?;
        if self.lifecycle.published {
            return Err(WorkflowError::Published);
        }
        for record in &mut self.records {
            record.project = record.original_project;
            record.roles.clone_from(&record.original_roles);
        }
        Ok(())
    }

    /// Copy into a fresh attempt whose records take the current state as original.
    pub fn duplicate(&self, id: AttemptId, name: impl Into<String>) -> Result<Self, WorkflowError> {
        self.lifecycle.ensure_usable()?;
        let records = self
            .records
            .iter()
            .map(|record| MatchingRecord {
                original_project: record.project,
                original_roles: record.roles.clone(),
                ..record.clone()
            })
            .collect();
        Ok(Self {
            id,
            name: name.into(),
            lifecycle: AttemptLifecycle {
                finished: true,
                task_finished: true,
                outcome: self.lifecycle.outcome,
                published: false,
                selected: false,
            },
            score: self.score,
            construct_time: self.construct_time,
            compute_time: self.compute_time,
            records,
        })
    }

    pub fn set_published(&mut self, published: bool) -> Result<(), WorkflowError> {
        self.lifecycle.ensure_usable()?;
        self.lifecycle.published = published;
        Ok(())
    }

    pub fn set_selected(&mut self, selected: bool) -> Result<(), WorkflowError> {
        self.lifecycle.ensure_usable()?;
        self.lifecycle.selected = selected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::{AttemptLifecycle, MatchingAttempt, Outcome, WorkflowError};
    use crate::decode::{MatchingRecord, MatchingRole, RoleKind};
    use crate::entities::{AttemptId, ConfigId, FacultyId, ProjectId, SelectorId};
    use crate::solver::SolveStatus;

    fn finished_attempt() -> MatchingAttempt {
        let mut attempt = MatchingAttempt::new(AttemptId(1), "first");
        attempt.lifecycle.complete(Outcome::Optimal);
        let roles = vec![MatchingRole {
            faculty: FacultyId(7),
            role: RoleKind::Supervisor,
        }];
        attempt.records.push(MatchingRecord {
            selector: SelectorId(1),
            config: ConfigId(1),
            period: 1,
            project: ProjectId(3),
            rank: Some(1),
            score: 1.0,
            roles: roles.clone(),
            original_project: ProjectId(3),
            original_roles: roles,
        });
        attempt
    }

    #[test]
    fn failure_never_leaves_a_finished_attempt_without_outcome() {
        let mut lifecycle = AttemptLifecycle::default();
        assert!(lifecycle.is_consistent());
        lifecycle.fail();
        assert!(lifecycle.finished && lifecycle.task_finished);
        assert_eq!(lifecycle.outcome, Some(Outcome::Undefined));
        assert!(lifecycle.is_consistent());
    }

    #[test]
    fn finished_published_or_selected_attempts_do_not_rerun() {
        let mut lifecycle = AttemptLifecycle::default();
        assert_eq!(lifecycle.ensure_mutable(), Ok(()));
        lifecycle.complete(Outcome::Infeasible);
        assert_eq!(lifecycle.ensure_mutable(), Err(WorkflowError::AlreadyFinished));
        assert_eq!(lifecycle.ensure_deletable(), Ok(()));
        assert_eq!(lifecycle.ensure_usable(), Err(WorkflowError::NoUsableSolution));

        let selected = AttemptLifecycle {
            selected: true,
            ..AttemptLifecycle::default()
        };
        assert_eq!(selected.ensure_mutable(), Err(WorkflowError::Selected));
        assert_eq!(selected.ensure_deletable(), Err(WorkflowError::Selected));
    }

    #[test]
    fn revert_restores_original_assignment() {
        let mut attempt = finished_attempt();
        attempt.reassign(0, ProjectId(4), Vec::new()).unwrap();
        assert!(attempt.is_modified());
        attempt.revert().unwrap();
        assert!(!attempt.is_modified());
        assert_eq!(attempt.records[0].project, ProjectId(3));
    }

    #[test]
    fn published_attempt_is_frozen() {
        let mut attempt = finished_attempt();
        attempt.set_published(true).unwrap();
        assert_matches!(attempt.revert(), Err(WorkflowError::Published));
        assert_matches!(
            attempt.reassign(0, ProjectId(4), Vec::new()),
            Err(WorkflowError::Published)
        );
        assert_eq!(attempt.lifecycle.ensure_deletable(), Err(WorkflowError::Published));
    }

    #[test]
    fn duplicate_takes_edits_as_the_new_original() {
        let mut attempt = finished_attempt();
        attempt.reassign(0, ProjectId(4), Vec::new()).unwrap();
        attempt.set_selected(true).unwrap();

        let copy = attempt.duplicate(AttemptId(2), "second").unwrap();
        assert!(!copy.is_modified());
        assert_eq!(copy.records[0].original_project, ProjectId(4));
        assert!(!copy.lifecycle.selected && !copy.lifecycle.published);
        assert_eq!(copy.lifecycle.ensure_usable(), Ok(()));
    }

    #[test]
    fn outcome_names_round_trip() {
        for status in [SolveStatus::Optimal, SolveStatus::NotSolved, SolveStatus::Undefined] {
            let outcome = Outcome::from(status);
            assert_eq!(Outcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(Outcome::parse("bogus"), None);
    }
}
