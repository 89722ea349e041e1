//! The project matching MILP.
//!
//! Variables are only created where they can be non-zero: X where the rank is
//! positive, S where the supervisor is eligible, Y where the marker is eligible. An
//! absent variable is fixed at zero, which is how `X <= R`, `S <= cap · P` and
//! `Y <= M` hold for ineligible pairs.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use tracing::{debug, info};

use crate::entities::{BaseMatch, ConfigId, FacultyId};
use crate::enumerate::{Enumeration, UNBOUNDED_CAPACITY};
use crate::error::{OptimizerError, Result};
use crate::matrices::Matrices;
use crate::model::{LinExpr, Model, Relation, Sense, VarId};
use crate::params::MatchingParams;

/// The model plus handles on its decision variables, keyed by dense indices.
#[derive(Debug, Clone)]
pub struct MatchingModel {
    pub model: Model,
    /// `(selector, project)`
    pub x: BTreeMap<(usize, usize), VarId>,
    /// `(supervisor, project)`
    pub s: BTreeMap<(usize, usize), VarId>,
    /// `(marker, project)`
    pub y: BTreeMap<(usize, usize), VarId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Supervising,
    Marking,
}

impl Role {
    const fn label(self) -> &'static str {
        match self {
            Self::Supervising => "supervising",
            Self::Marking => "marking",
        }
    }
}

/// Effective CATS limit of one faculty member in one role, and the per-class
/// limits that tighten it.
struct Limits {
    global: Option<u32>,
    per_config: Vec<(ConfigId, u32)>,
}

fn min_limit(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn limits_for(
    enumeration: &Enumeration,
    params: &MatchingParams,
    role: Role,
    index: usize,
) -> Limits {
    let (attempt_limit, own_limit, overrides, faculty) = match role {
        Role::Supervising => (
            params.supervising_limit,
            enumeration.supervisor_limits[index],
            &enumeration.supervisor_overrides,
            enumeration.supervisors.id(index),
        ),
        Role::Marking => (
            params.marking_limit,
            enumeration.marker_limits[index],
            &enumeration.marker_overrides,
            enumeration.markers.id(index),
        ),
    };
    if params.ignore_per_faculty_limits {
        return Limits {
            global: attempt_limit,
            per_config: Vec::new(),
        };
    }
    let global = min_limit(attempt_limit, own_limit);
    let per_config = overrides
        .iter()
        .filter(|((_, member), _)| *member == faculty)
        .map(|((config, _), limit)| (*config, min_limit(global, Some(*limit)).unwrap_or(*limit)))
        .collect();
    Limits { global, per_config }
}

/// Refuse to build a model whose CATS limits are already broken by included
/// matches; no assignment could repair that.
pub fn check_existing_workload(enumeration: &Enumeration, params: &MatchingParams) -> Result<()> {
    for role in [Role::Supervising, Role::Marking] {
        let (population, existing, existing_by_config) = match role {
            Role::Supervising => (
                &enumeration.supervisors,
                &enumeration.existing.supervision,
                &enumeration.existing.supervision_by_config,
            ),
            Role::Marking => (
                &enumeration.markers,
                &enumeration.existing.marking,
                &enumeration.existing.marking_by_config,
            ),
        };
        for (index, faculty) in population.iter() {
            let limits = limits_for(enumeration, params, role, index);
            let current = existing.get(&faculty).copied().unwrap_or(0);
            if let Some(limit) = limits.global {
                if current > limit {
                    return Err(exceeded(faculty, role, current, limit));
                }
            }
            for (config, limit) in limits.per_config {
                let current = existing_by_config
                    .get(&(config, faculty))
                    .copied()
                    .unwrap_or(0);
                if current > limit {
                    return Err(exceeded(faculty, role, current, limit));
                }
            }
        }
    }
    Ok(())
}

const fn exceeded(faculty: FacultyId, role: Role, existing: u32, limit: u32) -> OptimizerError {
    OptimizerError::CatsLimitExceeded {
        faculty,
        role: role.label(),
        existing,
        limit,
    }
}

struct Builder<'a> {
    enumeration: &'a Enumeration,
    matrices: &'a Matrices,
    params: &'a MatchingParams,
    model: Model,
    x: BTreeMap<(usize, usize), VarId>,
    s: BTreeMap<(usize, usize), VarId>,
    y: BTreeMap<(usize, usize), VarId>,
    ss: BTreeMap<(usize, usize), VarId>,
    yy: BTreeMap<(usize, usize), VarId>,
    q: BTreeMap<usize, VarId>,
}

impl Builder<'_> {
    fn project_uses_supervisor(&self, project: usize) -> bool {
        self.enumeration
            .config(self.enumeration.project_config[project])
            .uses_supervisor
    }

    fn project_uses_marker(&self, project: usize) -> bool {
        self.enumeration
            .config(self.enumeration.project_config[project])
            .uses_marker
    }

    fn create_variables(&mut self) {
        for ((selector, project), _) in self.matrices.rank.entries() {
            let var = self.model.binary(format!("X_{selector}_{project}"));
            self.x.insert((selector, project), var);
        }
        for ((supervisor, project), _) in self.matrices.supervisors.entries() {
            let capacity = f64::from(self.enumeration.capacity[project]);
            let var = self
                .model
                .integer(format!("S_{supervisor}_{project}"), 0.0, Some(capacity));
            self.s.insert((supervisor, project), var);
            let indicator = self.model.binary(format!("ss_{supervisor}_{project}"));
            self.ss.insert((supervisor, project), indicator);
        }
        for ((marker, project), multiplicity) in self.matrices.markers.entries() {
            let var = self.model.integer(
                format!("Y_{marker}_{project}"),
                0.0,
                Some(f64::from(multiplicity)),
            );
            self.y.insert((marker, project), var);
            let indicator = self.model.binary(format!("yy_{marker}_{project}"));
            self.yy.insert((marker, project), indicator);
        }
        let assigned_projects: BTreeSet<usize> =
            self.x.keys().map(|(_, project)| *project).collect();
        for project in assigned_projects {
            let var = self.model.binary(format!("Q_{project}"));
            self.q.insert(project, var);
        }
    }

    fn selectors_on(&self, project: usize) -> LinExpr {
        LinExpr::sum(
            self.x
                .iter()
                .filter(|((_, p), _)| *p == project)
                .map(|(_, var)| *var),
        )
    }

    /// `indicator <= value` and `big_m · indicator >= value`: the indicator is 1
    /// exactly when the value is positive.
    fn link_indicator(&mut self, name: &str, indicator: VarId, value: &LinExpr, big_m: f64) -> Result<()> {
        self.model.constrain(
            format!("{name}_lo"),
            LinExpr::var(indicator),
            Relation::LessEqual,
            value.clone(),
        )?;
        self.model.constrain(
            format!("{name}_hi"),
            LinExpr::var(indicator).scaled(big_m),
            Relation::GreaterEqual,
            value.clone(),
        )
    }

    fn assignment_constraints(&mut self) -> Result<()> {
        for (selector, _) in self.enumeration.selectors.iter() {
            let row = LinExpr::sum(
                self.x
                    .range((selector, 0)..=(selector, usize::MAX))
                    .map(|(_, var)| *var),
            );
            let multiplicity = f64::from(self.enumeration.multiplicity(selector));
            self.model.constrain(
                format!("assign_{selector}"),
                row,
                Relation::Equal,
                LinExpr::constant(multiplicity),
            )?;
        }

        for &(selector, project) in &self.matrices.required {
            let var = self.x[&(selector, project)];
            self.model.constrain(
                format!("require_{selector}_{project}"),
                LinExpr::var(var),
                Relation::Equal,
                LinExpr::constant(1.0),
            )?;
        }

        for (project, _) in self.enumeration.projects.iter() {
            let assigned = self.selectors_on(project);
            if self.enumeration.capacity_enforced[project] {
                self.model.constrain(
                    format!("capacity_{project}"),
                    assigned.clone(),
                    Relation::LessEqual,
                    LinExpr::constant(f64::from(self.enumeration.capacity[project])),
                )?;
            }
            if let Some(indicator) = self.q.get(&project).copied() {
                self.link_indicator(
                    &format!("Q_{project}"),
                    indicator,
                    &assigned,
                    f64::from(UNBOUNDED_CAPACITY.max(self.enumeration.capacity[project])),
                )?;
            }
        }
        Ok(())
    }

    fn supervision_constraints(&mut self) -> Result<()> {
        let s: Vec<_> = self.s.iter().map(|(key, var)| (*key, *var)).collect();
        for ((supervisor, project), var) in s {
            let indicator = self.ss[&(supervisor, project)];
            self.link_indicator(
                &format!("ss_{supervisor}_{project}"),
                indicator,
                &LinExpr::var(var),
                f64::from(self.enumeration.capacity[project]),
            )?;
        }

        for (project, _) in self.enumeration.projects.iter() {
            let supervision = LinExpr::sum(
                self.s
                    .iter()
                    .filter(|((_, p), _)| *p == project)
                    .map(|(_, var)| *var),
            );
            if self.project_uses_supervisor(project) {
                let assigned = self.selectors_on(project);
                self.model.constrain(
                    format!("supervised_{project}"),
                    supervision,
                    Relation::Equal,
                    assigned,
                )?;
            } else {
                self.model.constrain(
                    format!("unsupervised_{project}"),
                    supervision,
                    Relation::Equal,
                    LinExpr::new(),
                )?;
            }
        }

        let group_cap = self.params.max_different_group_projects;
        let all_cap = self.params.max_different_all_projects;
        for (supervisor, _) in self.enumeration.supervisors.iter() {
            let indicators: Vec<(usize, VarId)> = self
                .ss
                .iter()
                .filter(|((s, _), _)| *s == supervisor)
                .map(|((_, project), var)| (*project, *var))
                .collect();
            if let Some(cap) = group_cap {
                let group = LinExpr::sum(
                    indicators
                        .iter()
                        .filter(|(project, _)| self.enumeration.project_generic[*project])
                        .map(|(_, var)| *var),
                );
                self.model.constrain(
                    format!("group_projects_{supervisor}"),
                    group,
                    Relation::LessEqual,
                    LinExpr::constant(f64::from(cap)),
                )?;
            }
            if let Some(cap) = all_cap {
                self.model.constrain(
                    format!("all_projects_{supervisor}"),
                    LinExpr::sum(indicators.iter().map(|(_, var)| *var)),
                    Relation::LessEqual,
                    LinExpr::constant(f64::from(cap)),
                )?;
            }
        }
        Ok(())
    }

    fn marking_constraints(&mut self) -> Result<()> {
        let y: Vec<_> = self.y.iter().map(|(key, var)| (*key, *var)).collect();
        for ((marker, project), var) in y {
            let indicator = self.yy[&(marker, project)];
            let multiplicity = f64::from(self.matrices.markers.get(marker, project));
            self.link_indicator(
                &format!("yy_{marker}_{project}"),
                indicator,
                &LinExpr::var(var),
                multiplicity,
            )?;
        }

        for (project, _) in self.enumeration.projects.iter() {
            let marking = LinExpr::sum(
                self.y
                    .iter()
                    .filter(|((_, p), _)| *p == project)
                    .map(|(_, var)| *var),
            );
            let valence = self.matrices.marker_valence[project];
            if !self.project_uses_marker(project) || valence == 0 {
                self.model.constrain(
                    format!("unmarked_{project}"),
                    marking,
                    Relation::Equal,
                    LinExpr::new(),
                )?;
                continue;
            }
            let valence = f64::from(valence);
            let assigned = self.selectors_on(project);
            self.model.constrain(
                format!("marked_{project}"),
                assigned.scaled(valence),
                Relation::Equal,
                marking,
            )?;

            let distinct = LinExpr::sum(
                self.yy
                    .iter()
                    .filter(|((_, p), _)| *p == project)
                    .map(|(_, var)| *var),
            );
            let required = self
                .q
                .get(&project)
                .map_or_else(LinExpr::new, |q| LinExpr::var(*q).scaled(valence));
            self.model.constrain(
                format!("distinct_markers_{project}"),
                distinct,
                Relation::GreaterEqual,
                required,
            )?;
        }

        // one person never supervises and marks the same project
        for ((supervisor, project), ss) in &self.ss {
            let faculty = self.enumeration.supervisors.id(*supervisor);
            let Some(marker) = self.enumeration.markers.index_of(faculty) else {
                continue;
            };
            if let Some(yy) = self.yy.get(&(marker, *project)) {
                self.model.constrain(
                    format!("conflict_{supervisor}_{project}"),
                    LinExpr::sum([*ss, *yy]),
                    Relation::LessEqual,
                    LinExpr::constant(1.0),
                )?;
            }
        }
        Ok(())
    }

    /// CATS carried by every faculty member in one role.
    fn workloads(&self, role: Role) -> Vec<LinExpr> {
        let (population, vars, costs) = match role {
            Role::Supervising => (
                &self.enumeration.supervisors,
                &self.s,
                &self.enumeration.cats_supervision,
            ),
            Role::Marking => (
                &self.enumeration.markers,
                &self.y,
                &self.enumeration.cats_marking,
            ),
        };
        let mut workloads = vec![LinExpr::new(); population.len()];
        for ((member, project), var) in vars {
            workloads[*member].add(*var, f64::from(costs[*project]));
        }
        workloads
    }

    /// `existing + workload <= limit + slack`, globally and per project class.
    fn cats_limits(&mut self, role: Role, workloads: &[LinExpr]) -> Result<LinExpr> {
        let mut violation = LinExpr::new();
        let population = match role {
            Role::Supervising => &self.enumeration.supervisors,
            Role::Marking => &self.enumeration.markers,
        };
        let prefix = match role {
            Role::Supervising => "sup",
            Role::Marking => "mark",
        };
        let (existing, existing_by_config) = match role {
            Role::Supervising => (
                &self.enumeration.existing.supervision,
                &self.enumeration.existing.supervision_by_config,
            ),
            Role::Marking => (
                &self.enumeration.existing.marking,
                &self.enumeration.existing.marking_by_config,
            ),
        };

        for (index, faculty) in population.iter() {
            let limits = limits_for(self.enumeration, self.params, role, index);
            if limits.global.is_none() && limits.per_config.is_empty() {
                continue;
            }
            let slack = self
                .model
                .continuous(format!("slack_{prefix}_{index}"), 0.0, None);
            violation.add(slack, 1.0);

            if let Some(limit) = limits.global {
                let current = existing.get(&faculty).copied().unwrap_or(0);
                let mut load = workloads[index].clone();
                load.add_constant(f64::from(current));
                let mut bound = LinExpr::var(slack);
                bound.add_constant(f64::from(limit));
                self.model.constrain(
                    format!("cats_{prefix}_{index}"),
                    load,
                    Relation::LessEqual,
                    bound,
                )?;
            }

            for (config, limit) in limits.per_config {
                let vars = match role {
                    Role::Supervising => &self.s,
                    Role::Marking => &self.y,
                };
                let costs = match role {
                    Role::Supervising => &self.enumeration.cats_supervision,
                    Role::Marking => &self.enumeration.cats_marking,
                };
                let mut load = LinExpr::new();
                for ((member, project), var) in vars {
                    if *member == index && self.enumeration.project_config[*project] == config {
                        load.add(*var, f64::from(costs[*project]));
                    }
                }
                let current = existing_by_config
                    .get(&(config, faculty))
                    .copied()
                    .unwrap_or(0);
                load.add_constant(f64::from(current));
                let mut bound = LinExpr::var(slack);
                bound.add_constant(f64::from(limit));
                self.model.constrain(
                    format!("cats_{prefix}_{index}_c{config}"),
                    load,
                    Relation::LessEqual,
                    bound,
                )?;
            }
        }
        Ok(violation)
    }

    /// `min <= load_i <= max` for every member, and `min <= max`.
    fn bracket(&mut self, name: &str, loads: &[LinExpr]) -> Result<LinExpr> {
        let max = self.model.continuous(format!("{name}Max"), 0.0, None);
        let min = self.model.continuous(format!("{name}Min"), 0.0, None);
        self.model.constrain(
            format!("{name}_order"),
            LinExpr::var(min),
            Relation::LessEqual,
            LinExpr::var(max),
        )?;
        for (position, load) in loads.iter().enumerate() {
            self.model.constrain(
                format!("{name}_max_{position}"),
                LinExpr::var(max),
                Relation::GreaterEqual,
                load.clone(),
            )?;
            self.model.constrain(
                format!("{name}_min_{position}"),
                LinExpr::var(min),
                Relation::LessEqual,
                load.clone(),
            )?;
        }
        let mut spread = LinExpr::var(max);
        spread.add(min, -1.0);
        Ok(spread)
    }

    /// Levelling penalty over the three faculty partitions plus everybody at once.
    fn levelling(&mut self, supervising: &[LinExpr], marking: &[LinExpr]) -> Result<(LinExpr, LinExpr)> {
        let mut supervisors_only = Vec::new();
        let mut markers_only = Vec::new();
        let mut both = Vec::new();
        for (index, faculty) in self.enumeration.supervisors.iter() {
            match self.enumeration.markers.index_of(faculty) {
                Some(marker) => {
                    let mut total = supervising[index].clone();
                    total.add_scaled(&marking[marker], 1.0);
                    both.push(total);
                }
                None => supervisors_only.push(supervising[index].clone()),
            }
        }
        for (index, faculty) in self.enumeration.markers.iter() {
            if !self.enumeration.supervisors.contains(faculty) {
                markers_only.push(marking[index].clone());
            }
        }
        let everybody: Vec<LinExpr> = supervisors_only
            .iter()
            .chain(&markers_only)
            .chain(&both)
            .cloned()
            .collect();

        let mut partitions = LinExpr::new();
        partitions.add_scaled(&self.bracket("sup", &supervisors_only)?, 1.0);
        partitions.add_scaled(&self.bracket("mark", &markers_only)?, 1.0);
        partitions.add_scaled(&self.bracket("supMark", &both)?, 1.0);
        let global = self.bracket("global", &everybody)?;
        Ok((partitions, global))
    }

    /// `maxProjects` and `maxMarking` track the busiest individual in each role.
    fn busiest(&mut self) -> Result<(VarId, VarId)> {
        let max_projects = self.model.continuous("maxProjects", 0.0, None);
        for (supervisor, _) in self.enumeration.supervisors.iter() {
            let projects = LinExpr::sum(
                self.ss
                    .iter()
                    .filter(|((s, _), _)| *s == supervisor)
                    .map(|(_, var)| *var),
            );
            self.model.constrain(
                format!("maxProjects_{supervisor}"),
                LinExpr::var(max_projects),
                Relation::GreaterEqual,
                projects,
            )?;
        }
        let max_marking = self.model.continuous("maxMarking", 0.0, None);
        for (marker, _) in self.enumeration.markers.iter() {
            let marking = LinExpr::sum(
                self.y
                    .iter()
                    .filter(|((m, _), _)| *m == marker)
                    .map(|(_, var)| *var),
            );
            self.model.constrain(
                format!("maxMarking_{marker}"),
                LinExpr::var(max_marking),
                Relation::GreaterEqual,
                marking,
            )?;
        }
        Ok((max_projects, max_marking))
    }

    /// `Σ (1 - Z)` over supervisors, where `Z` says the supervisor got anything.
    fn idle_supervisors(&mut self) -> Result<LinExpr> {
        let mut idle = LinExpr::new();
        for (supervisor, _) in self.enumeration.supervisors.iter() {
            let indicators: Vec<VarId> = self
                .ss
                .iter()
                .filter(|((s, _), _)| *s == supervisor)
                .map(|(_, var)| *var)
                .collect();
            if indicators.is_empty() {
                idle.add_constant(1.0);
                continue;
            }
            let busy = self.model.binary(format!("Z_{supervisor}"));
            let count = indicators.len() as f64;
            self.link_indicator(
                &format!("Z_{supervisor}"),
                busy,
                &LinExpr::sum(indicators),
                count,
            )?;
            idle.add_constant(1.0);
            idle.add(busy, -1.0);
        }
        Ok(idle)
    }

    fn base_match(&mut self, base: &BaseMatch) -> Result<LinExpr> {
        let mut continuity = LinExpr::new();
        let mut supervision: BTreeMap<(usize, usize), u32> = BTreeMap::new();
        let mut marking: BTreeMap<(usize, usize), u32> = BTreeMap::new();

        for record in &base.records {
            let (Some(selector), Some(project)) = (
                self.enumeration.selectors.index_of(record.selector),
                self.enumeration.projects.index_of(record.project),
            ) else {
                if base.force {
                    return Err(OptimizerError::InfeasibleBaseMatch(format!(
                        "selector {} or project {} is not part of this attempt",
                        record.selector, record.project
                    )));
                }
                continue;
            };
            let Some(x) = self.x.get(&(selector, project)).copied() else {
                if base.force {
                    return Err(OptimizerError::InfeasibleBaseMatch(format!(
                        "selector {} can no longer be assigned project {}",
                        record.selector, record.project
                    )));
                }
                continue;
            };
            if base.force {
                self.model.constrain(
                    format!("base_X_{selector}_{project}"),
                    LinExpr::var(x),
                    Relation::Equal,
                    LinExpr::constant(1.0),
                )?;
            } else {
                continuity.add(x, 1.0);
            }
            for faculty in &record.supervisors {
                if let Some(index) = self.enumeration.supervisors.index_of(*faculty) {
                    *supervision.entry((index, project)).or_default() += 1;
                }
            }
            for faculty in &record.markers {
                if let Some(index) = self.enumeration.markers.index_of(*faculty) {
                    *marking.entry((index, project)).or_default() += 1;
                }
            }
        }

        if base.force {
            self.pin_roles("S", &supervision, true)?;
            self.pin_roles("Y", &marking, false)?;
        }
        Ok(continuity)
    }

    fn pin_roles(&mut self, label: &str, counts: &BTreeMap<(usize, usize), u32>, supervising: bool) -> Result<()> {
        for (&(member, project), &count) in counts {
            let vars = if supervising { &self.s } else { &self.y };
            let Some(var) = vars.get(&(member, project)).copied() else {
                return Err(OptimizerError::InfeasibleBaseMatch(format!(
                    "{label} assignment of faculty index {member} to project index {project} is no \
                     longer eligible"
                )));
            };
            self.model.constrain(
                format!("base_{label}_{member}_{project}"),
                LinExpr::var(var),
                Relation::Equal,
                LinExpr::constant(f64::from(count)),
            )?;
        }
        Ok(())
    }

    fn objective(&mut self, base: Option<&BaseMatch>) -> Result<()> {
        let params = self.params;
        let mut objective = LinExpr::new();
        for (&(selector, project), &var) in &self.x {
            let rank = self.matrices.rank.get(selector, project);
            let weight = self.matrices.weight.get(selector, project);
            objective.add(var, weight / f64::from(rank));
        }

        let supervising = self.workloads(Role::Supervising);
        let marking = self.workloads(Role::Marking);
        let (partitions, global) = self.levelling(&supervising, &marking)?;
        objective.add_scaled(&partitions, -params.levelling_bias.abs());
        objective.add_scaled(&global, -params.intra_group_tension.abs());

        let (max_projects, max_marking) = self.busiest()?;
        objective.add(max_projects, -params.supervising_pressure.abs());
        objective.add(max_marking, -params.marking_pressure.abs());

        let idle = self.idle_supervisors()?;
        objective.add_scaled(&idle, -params.no_assignment_penalty.abs());

        let mut violation = self.cats_limits(Role::Supervising, &supervising)?;
        violation.add_scaled(&self.cats_limits(Role::Marking, &marking)?, 1.0);
        objective.add_scaled(&violation, -params.cats_violation_penalty.abs());

        if let Some(base) = base {
            let continuity = self.base_match(base)?;
            objective.add_scaled(&continuity, base.bias.abs());
        }

        self.model.objective = objective;
        Ok(())
    }
}

/// Build the matching MILP for an enumerated attempt.
pub fn build_model(
    enumeration: &Enumeration,
    matrices: &Matrices,
    params: &MatchingParams,
    base: Option<&BaseMatch>,
) -> Result<MatchingModel> {
    check_existing_workload(enumeration, params)?;

    let mut builder = Builder {
        enumeration,
        matrices,
        params,
        model: Model::new("matching", Sense::Maximise),
        x: BTreeMap::new(),
        s: BTreeMap::new(),
        y: BTreeMap::new(),
        ss: BTreeMap::new(),
        yy: BTreeMap::new(),
        q: BTreeMap::new(),
    };
    builder.create_variables();
    debug!(
        x = builder.x.len(),
        s = builder.s.len(),
        y = builder.y.len(),
        "created decision variables"
    );
    builder.assignment_constraints()?;
    builder.supervision_constraints()?;
    builder.marking_constraints()?;
    builder.objective(base)?;

    info!(
        variables = builder.model.variables().len(),
        constraints = builder.model.constraints().len(),
        "built matching model"
    );
    let projects_without_candidates = enumeration
        .projects
        .iter()
        .filter(|(project, _)| !builder.x.keys().any(|(_, p)| p == project))
        .map(|(_, id)| id)
        .collect_vec();
    if !projects_without_candidates.is_empty() {
        debug!(?projects_without_candidates, "projects nobody can be assigned to");
    }

    Ok(MatchingModel {
        model: builder.model,
        x: builder.x,
        s: builder.s,
        y: builder.y,
    })
}
