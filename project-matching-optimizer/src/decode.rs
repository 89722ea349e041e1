//! Turning solver output back into matching records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::{ConfigId, FacultyId, ProjectId, SelectorId};
use crate::enumerate::Enumeration;
use crate::error::{OptimizerError, Result};
use crate::matching::MatchingModel;
use crate::matrices::Matrices;
use crate::solver::SolverSolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Supervisor,
    Marker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchingRole {
    pub faculty: FacultyId,
    pub role: RoleKind,
}

/// One selector's assignment for one submission period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingRecord {
    pub selector: SelectorId,
    pub config: ConfigId,
    pub period: u32,
    pub project: ProjectId,
    /// the selector's own rank for the project, if they gave one
    pub rank: Option<u32>,
    /// contribution of this assignment to the objective
    pub score: f64,
    pub roles: Vec<MatchingRole>,
    pub original_project: ProjectId,
    pub original_roles: Vec<MatchingRole>,
}

impl MatchingRecord {
    pub fn supervisors(&self) -> impl Iterator<Item = FacultyId> + '_ {
        self.roles_of(RoleKind::Supervisor)
    }

    pub fn markers(&self) -> impl Iterator<Item = FacultyId> + '_ {
        self.roles_of(RoleKind::Marker)
    }

    fn roles_of(&self, kind: RoleKind) -> impl Iterator<Item = FacultyId> + '_ {
        self.roles
            .iter()
            .filter(move |role| role.role == kind)
            .map(|role| role.faculty)
    }
}

/// Remaining role multiplicity per holder on one project.
///
/// Holders are handed out by remaining multiplicity, largest first, and by lowest
/// index among equals. This departs on purpose from plain lowest-index-first
/// popping: with that order a holder with several slots left can end up as the only
/// one remaining when a record needs two distinct markers, while serving the
/// largest first decodes every solution where enough distinct holders exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleQueue {
    remaining: BTreeMap<usize, u32>,
}

impl RoleQueue {
    pub fn new<I: IntoIterator<Item = (usize, u32)>>(holders: I) -> Self {
        Self {
            remaining: holders
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .collect(),
        }
    }

    /// Take `count` distinct holders, or `None` if fewer than that are left, in
    /// which case nothing is taken.
    pub fn take(&mut self, count: usize) -> Option<Vec<usize>> {
        if self.remaining.len() < count {
            return None;
        }
        let mut order: Vec<(usize, u32)> = self
            .remaining
            .iter()
            .map(|(holder, left)| (*holder, *left))
            .collect();
        order.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut taken: Vec<usize> = order.into_iter().take(count).map(|(holder, _)| holder).collect();
        for holder in &taken {
            if let Some(left) = self.remaining.get_mut(holder) {
                *left -= 1;
                if *left == 0 {
                    self.remaining.remove(holder);
                }
            }
        }
        taken.sort_unstable();
        Some(taken)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.remaining.values().sum()
    }
}

fn queues(
    vars: &BTreeMap<(usize, usize), crate::model::VarId>,
    solution: &SolverSolution,
) -> BTreeMap<usize, RoleQueue> {
    let mut per_project: BTreeMap<usize, Vec<(usize, u32)>> = BTreeMap::new();
    for (&(holder, project), var) in vars {
        let count = solution.count(*var);
        if count > 0 {
            per_project.entry(project).or_default().push((holder, count));
        }
    }
    per_project
        .into_iter()
        .map(|(project, holders)| (project, RoleQueue::new(holders)))
        .collect()
}

fn invariant(message: String) -> OptimizerError {
    OptimizerError::DecodeInvariant(message)
}

/// Build one record per selector and matched period from an optimal solution.
///
/// Any inconsistency aborts the whole decode: it means the model and the decoder
/// disagree, and a partial result would be misleading.
pub fn decode(
    enumeration: &Enumeration,
    matrices: &Matrices,
    model: &MatchingModel,
    solution: &SolverSolution,
) -> Result<Vec<MatchingRecord>> {
    if solution.values.len() != model.model.variables().len() {
        return Err(invariant(format!(
            "solution has {} values for {} variables",
            solution.values.len(),
            model.model.variables().len()
        )));
    }

    let mut supervisors = queues(&model.s, solution);
    let mut markers = queues(&model.y, solution);
    let mut records = Vec::new();

    for (selector, selector_id) in enumeration.selectors.iter() {
        let projects: Vec<usize> = model
            .x
            .range((selector, 0)..=(selector, usize::MAX))
            .filter(|(_, var)| solution.count(**var) == 1)
            .map(|((_, project), _)| *project)
            .collect();
        let periods = &enumeration.selector_periods[selector];
        if projects.len() != periods.len() {
            return Err(invariant(format!(
                "selector {selector_id} received {} projects but needs {}",
                projects.len(),
                periods.len()
            )));
        }

        for (project, period) in projects.into_iter().zip(periods.iter().copied()) {
            let project_id = enumeration.projects.id(project);
            let config = enumeration.config(enumeration.project_config[project]);

            let rank = matrices.recorded_rank(selector, project);
            if matrices.submitted[selector] && rank.is_none() {
                return Err(invariant(format!(
                    "selector {selector_id} was assigned project {project_id}, which they did not rank"
                )));
            }

            let mut roles = Vec::new();
            if config.uses_supervisor {
                let taken = supervisors
                    .get_mut(&project)
                    .and_then(|queue| queue.take(1))
                    .ok_or_else(|| {
                        invariant(format!("no supervisor left for project {project_id}"))
                    })?;
                roles.extend(taken.into_iter().map(|holder| MatchingRole {
                    faculty: enumeration.supervisors.id(holder),
                    role: RoleKind::Supervisor,
                }));
            }
            let valence = matrices.marker_valence[project] as usize;
            if config.uses_marker && valence > 0 {
                let taken = markers
                    .get_mut(&project)
                    .and_then(|queue| queue.take(valence))
                    .ok_or_else(|| {
                        invariant(format!(
                            "fewer than {valence} markers left for project {project_id}"
                        ))
                    })?;
                roles.extend(taken.into_iter().map(|holder| MatchingRole {
                    faculty: enumeration.markers.id(holder),
                    role: RoleKind::Marker,
                }));
            }

            let record = MatchingRecord {
                selector: selector_id,
                config: config.id,
                period,
                project: project_id,
                rank,
                score: matrices.weight.get(selector, project)
                    / f64::from(matrices.rank.get(selector, project).max(1)),
                original_project: project_id,
                original_roles: roles.clone(),
                roles,
            };
            if let Some(conflict) = record.supervisors().find(|faculty| record.markers().any(|m| m == *faculty)) {
                return Err(invariant(format!(
                    "faculty member {conflict} both supervises and marks selector {selector_id} on project {project_id}"
                )));
            }
            records.push(record);
        }
    }

    for (role, leftovers) in [("supervision", &supervisors), ("marking", &markers)] {
        if let Some((project, queue)) = leftovers.iter().find(|(_, queue)| !queue.is_empty()) {
            return Err(invariant(format!(
                "{} units of {role} left over on project {}",
                queue.total(),
                enumeration.projects.id(*project)
            )));
        }
    }

    debug!(records = records.len(), "decoded matching");
    Ok(records)
}
