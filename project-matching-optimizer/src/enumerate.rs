//! Dense numbering of everything the matching model talks about.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entities::{
    AutoEnrol, Catalog, ConfigId, FacultyId, MatchingDataset, ProjectClassConfig, ProjectId,
    Selector, SelectorId, DEFAULT_CATS_MARKING, DEFAULT_CATS_SUPERVISION,
};
use crate::error::{OptimizerError, Result};
use crate::index::DenseIndex;
use crate::model::ModelShape;
use crate::params::MatchingParams;

/// Capacity used for projects that do not enforce one.
pub const UNBOUNDED_CAPACITY: u32 = 100;

/// Decide whether a selector takes part in matching.
///
/// Anybody who submitted a ranking or accepted an offer is in. Without either,
/// "open to all" classes read silence as lack of interest and carryover classes read
/// it as contentment with the current supervisor; outside those bands we assume a
/// project is wanted.
#[must_use]
pub fn include_selector(
    selector: &Selector,
    config: &ProjectClassConfig,
    include_only_submitted: bool,
) -> bool {
    if selector.submitted || selector.accepted_offer.is_some() {
        return true;
    }
    if include_only_submitted {
        return false;
    }
    let Some(year) = selector.academic_year else {
        return true;
    };
    if selector.graduated {
        return true;
    }

    let not_interested = config.selection_open_to_all
        && match config.auto_enrol {
            AutoEnrol::FirstYear => year == config.start_year,
            AutoEnrol::AllYears => config.within_extent(year),
        };
    let carried_over = config.supervisor_carryover && config.within_extent(year);

    !(not_interested || carried_over)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGroup {
    pub config: ConfigId,
    pub projects: Vec<ProjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOverride {
    pub config: ConfigId,
    pub faculty: FacultyId,
    pub limit: u32,
}

/// What has to be kept to decode an offline solution against a dataset that may
/// have moved on since the model was exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationSnapshot {
    pub selectors: Vec<SelectorId>,
    pub projects: Vec<ProjectId>,
    pub supervisors: Vec<FacultyId>,
    pub markers: Vec<FacultyId>,
    pub project_groups: Vec<ProjectGroup>,
    pub supervisor_overrides: Vec<LimitOverride>,
    pub marker_overrides: Vec<LimitOverride>,
    /// layout of the exported model; only offline exports record it
    #[serde(default)]
    pub model: Option<ModelShape>,
}

#[derive(Debug, Clone)]
pub struct Enumeration {
    pub configs: BTreeMap<ConfigId, ProjectClassConfig>,
    pub selectors: DenseIndex<SelectorId>,
    pub projects: DenseIndex<ProjectId>,
    pub supervisors: DenseIndex<FacultyId>,
    pub markers: DenseIndex<FacultyId>,
    pub selector_config: Vec<ConfigId>,
    /// matched submission periods per selector, ascending
    pub selector_periods: Vec<Vec<u32>>,
    pub project_config: Vec<ConfigId>,
    pub project_generic: Vec<bool>,
    pub cats_supervision: Vec<u32>,
    pub cats_marking: Vec<u32>,
    pub capacity: Vec<u32>,
    pub capacity_enforced: Vec<bool>,
    pub supervisor_limits: Vec<Option<u32>>,
    pub marker_limits: Vec<Option<u32>>,
    pub supervisor_overrides: BTreeMap<(ConfigId, FacultyId), u32>,
    pub marker_overrides: BTreeMap<(ConfigId, FacultyId), u32>,
    pub existing: ExistingWorkload,
}

/// CATS already committed through included matches.
#[derive(Debug, Clone, Default)]
pub struct ExistingWorkload {
    pub supervision: BTreeMap<FacultyId, u32>,
    pub marking: BTreeMap<FacultyId, u32>,
    pub supervision_by_config: BTreeMap<(ConfigId, FacultyId), u32>,
    pub marking_by_config: BTreeMap<(ConfigId, FacultyId), u32>,
}

impl ExistingWorkload {
    fn from_dataset(dataset: &MatchingDataset) -> Self {
        let mut workload = Self::default();
        for assignment in dataset
            .included_matches
            .iter()
            .flat_map(|prior| &prior.assignments)
        {
            for faculty in &assignment.supervisors {
                *workload.supervision.entry(*faculty).or_default() += assignment.cats_supervision;
                *workload
                    .supervision_by_config
                    .entry((assignment.config, *faculty))
                    .or_default() += assignment.cats_supervision;
            }
            for faculty in &assignment.markers {
                *workload.marking.entry(*faculty).or_default() += assignment.cats_marking;
                *workload
                    .marking_by_config
                    .entry((assignment.config, *faculty))
                    .or_default() += assignment.cats_marking;
            }
        }
        workload
    }
}

struct Populations {
    selectors: DenseIndex<SelectorId>,
    projects: DenseIndex<ProjectId>,
    supervisors: DenseIndex<FacultyId>,
    markers: DenseIndex<FacultyId>,
    supervisor_overrides: BTreeMap<(ConfigId, FacultyId), u32>,
    marker_overrides: BTreeMap<(ConfigId, FacultyId), u32>,
}

/// The live configurations an attempt covers, one per requested project class.
fn resolve_configs<'a>(
    dataset: &'a MatchingDataset,
    params: &MatchingParams,
) -> Result<BTreeMap<ConfigId, &'a ProjectClassConfig>> {
    params
        .project_classes
        .iter()
        .map(|pclass| {
            dataset
                .configs
                .iter()
                .find(|config| config.pclass == *pclass && config.year == params.year)
                .map(|config| (config.id, config))
                .ok_or(OptimizerError::MissingConfiguration {
                    pclass: *pclass,
                    year: params.year,
                })
        })
        .collect()
}

impl Enumeration {
    /// Number everything taking part in an attempt from the live dataset.
    pub fn build(dataset: &MatchingDataset, params: &MatchingParams) -> Result<Self> {
        let configs = resolve_configs(dataset, params)?;

        let mut selectors = Vec::new();
        for selector in &dataset.selectors {
            let Some(config) = configs.get(&selector.config) else {
                continue;
            };
            if include_selector(selector, config, params.include_only_submitted) {
                selectors.push(selector.id);
            } else {
                debug!(selector = %selector.id, "selector opted out of matching");
            }
        }

        let projects = dataset
            .projects
            .iter()
            .filter(|project| configs.contains_key(&project.config))
            .map(|project| project.id);

        let mut supervisors = Vec::new();
        let mut markers = Vec::new();
        let mut supervisor_overrides = BTreeMap::new();
        let mut marker_overrides = BTreeMap::new();
        for member in &dataset.faculty {
            for enrollment in &member.enrollments {
                let Some(config) = configs.get(&enrollment.config) else {
                    continue;
                };
                if enrollment.supervising && config.uses_supervisor {
                    supervisors.push(member.id);
                    if let Some(limit) = enrollment.cats_supervision_override {
                        supervisor_overrides.insert((config.id, member.id), limit);
                    }
                }
                if enrollment.marking && config.uses_marker {
                    markers.push(member.id);
                    if let Some(limit) = enrollment.cats_marking_override {
                        marker_overrides.insert((config.id, member.id), limit);
                    }
                }
            }
        }

        let populations = Populations {
            selectors: DenseIndex::sorted(selectors),
            projects: DenseIndex::sorted(projects),
            supervisors: DenseIndex::sorted(supervisors),
            markers: DenseIndex::sorted(markers),
            supervisor_overrides,
            marker_overrides,
        };
        Self::assemble(dataset, &configs, populations)
    }

    /// Rebuild the numbering captured in `snapshot` on top of the current dataset.
    ///
    /// Fails if anything the snapshot numbered has since disappeared or moved to a
    /// different project class; decoding against drifted numbering would silently
    /// assign the wrong people.
    pub fn from_snapshot(
        dataset: &MatchingDataset,
        params: &MatchingParams,
        snapshot: &EnumerationSnapshot,
    ) -> Result<Self> {
        let configs = resolve_configs(dataset, params)?;
        let catalog = Catalog::new(dataset);

        let duplicate = |what: &str, id: &dyn core::fmt::Display| {
            OptimizerError::Integrity(format!("snapshot numbers {what} {id} twice"))
        };
        let selectors = DenseIndex::new(snapshot.selectors.clone())
            .map_err(|id| duplicate("selector", &id))?;
        let projects = DenseIndex::new(snapshot.projects.clone())
            .map_err(|id| duplicate("project", &id))?;
        let supervisors = DenseIndex::new(snapshot.supervisors.clone())
            .map_err(|id| duplicate("supervisor", &id))?;
        let markers =
            DenseIndex::new(snapshot.markers.clone()).map_err(|id| duplicate("marker", &id))?;

        for id in selectors.ids() {
            catalog.selector(*id)?;
        }
        for id in supervisors.ids().iter().chain(markers.ids()) {
            catalog.faculty(*id)?;
        }

        let mut grouped = BTreeSet::new();
        for group in &snapshot.project_groups {
            if !configs.contains_key(&group.config) {
                return Err(OptimizerError::UnknownConfiguration(group.config));
            }
            for project in &group.projects {
                let live = catalog.project(*project)?;
                if live.config != group.config {
                    return Err(OptimizerError::Integrity(format!(
                        "project {project} moved from configuration {} to {} since export",
                        group.config, live.config
                    )));
                }
                grouped.insert(*project);
            }
        }
        if let Some(ungrouped) = projects.ids().iter().find(|id| !grouped.contains(*id)) {
            return Err(OptimizerError::Integrity(format!(
                "project {ungrouped} is numbered but belongs to no project group"
            )));
        }

        let overrides = |entries: &[LimitOverride]| {
            entries
                .iter()
                .map(|entry| ((entry.config, entry.faculty), entry.limit))
                .collect::<BTreeMap<_, _>>()
        };
        let populations = Populations {
            selectors,
            projects,
            supervisors,
            markers,
            supervisor_overrides: overrides(snapshot.supervisor_overrides.as_slice()),
            marker_overrides: overrides(snapshot.marker_overrides.as_slice()),
        };
        Self::assemble(dataset, &configs, populations)
    }

    fn assemble(
        dataset: &MatchingDataset,
        configs: &BTreeMap<ConfigId, &ProjectClassConfig>,
        populations: Populations,
    ) -> Result<Self> {
        let catalog = Catalog::new(dataset);
        let config_of = |id: ConfigId| {
            configs
                .get(&id)
                .copied()
                .ok_or(OptimizerError::UnknownConfiguration(id))
        };

        let mut selector_config = Vec::with_capacity(populations.selectors.len());
        let mut selector_periods = Vec::with_capacity(populations.selectors.len());
        for (_, id) in populations.selectors.iter() {
            let selector = catalog.selector(id)?;
            let config = config_of(selector.config)?;
            let mut periods = config.matched_periods();
            if periods.is_empty() {
                periods.push(config.periods.first().map_or(1, |period| period.period));
            }
            selector_config.push(config.id);
            selector_periods.push(periods);
        }

        let project_count = populations.projects.len();
        let mut project_config = Vec::with_capacity(project_count);
        let mut project_generic = Vec::with_capacity(project_count);
        let mut cats_supervision = Vec::with_capacity(project_count);
        let mut cats_marking = Vec::with_capacity(project_count);
        let mut capacity = Vec::with_capacity(project_count);
        let mut capacity_enforced = Vec::with_capacity(project_count);
        for (_, id) in populations.projects.iter() {
            let project = catalog.project(id)?;
            let config = config_of(project.config)?;
            project_config.push(config.id);
            project_generic.push(project.generic);
            cats_supervision.push(
                project
                    .cats_supervision
                    .or(config.cats_supervision)
                    .unwrap_or(DEFAULT_CATS_SUPERVISION),
            );
            cats_marking.push(
                project
                    .cats_marking
                    .or(config.cats_marking)
                    .unwrap_or(DEFAULT_CATS_MARKING),
            );
            match project.capacity.filter(|_| project.enforce_capacity) {
                Some(limit) => {
                    capacity.push(limit);
                    capacity_enforced.push(true);
                }
                None => {
                    capacity.push(UNBOUNDED_CAPACITY);
                    capacity_enforced.push(false);
                }
            }
        }

        let supervisor_limits = populations
            .supervisors
            .ids()
            .iter()
            .map(|id| Ok(catalog.faculty(*id)?.cats_supervision_limit))
            .collect::<Result<Vec<_>>>()?;
        let marker_limits = populations
            .markers
            .ids()
            .iter()
            .map(|id| Ok(catalog.faculty(*id)?.cats_marking_limit))
            .collect::<Result<Vec<_>>>()?;

        info!(
            selectors = populations.selectors.len(),
            projects = project_count,
            supervisors = populations.supervisors.len(),
            markers = populations.markers.len(),
            "enumerated matching populations"
        );

        Ok(Self {
            configs: configs
                .iter()
                .map(|(id, config)| (*id, (*config).clone()))
                .collect(),
            selectors: populations.selectors,
            projects: populations.projects,
            supervisors: populations.supervisors,
            markers: populations.markers,
            selector_config,
            selector_periods,
            project_config,
            project_generic,
            cats_supervision,
            cats_marking,
            capacity,
            capacity_enforced,
            supervisor_limits,
            marker_limits,
            supervisor_overrides: populations.supervisor_overrides,
            marker_overrides: populations.marker_overrides,
            existing: ExistingWorkload::from_dataset(dataset),
        })
    }

    /// Number of project slots the selector needs.
    #[must_use]
    pub fn multiplicity(&self, selector: usize) -> u32 {
        self.selector_periods[selector].len() as u32
    }

    /// # Panics
    ///
    /// If the configuration was not part of the enumeration, which cannot happen for
    /// ids taken from `selector_config` or `project_config`.
    #[must_use]
    pub fn config(&self, id: ConfigId) -> &ProjectClassConfig {
        &self.configs[&id]
    }

    pub fn snapshot(&self) -> EnumerationSnapshot {
        let project_groups = self
            .configs
            .keys()
            .map(|config| ProjectGroup {
                config: *config,
                projects: self
                    .projects
                    .iter()
                    .filter(|(index, _)| self.project_config[*index] == *config)
                    .map(|(_, id)| id)
                    .collect(),
            })
            .collect();
        let overrides = |map: &BTreeMap<(ConfigId, FacultyId), u32>| -> Vec<LimitOverride> {
            map.iter()
                .map(|((config, faculty), limit)| LimitOverride {
                    config: *config,
                    faculty: *faculty,
                    limit: *limit,
                })
                .collect()
        };
        EnumerationSnapshot {
            selectors: self.selectors.ids().to_vec(),
            projects: self.projects.ids().to_vec(),
            supervisors: self.supervisors.ids().to_vec(),
            markers: self.markers.ids().to_vec(),
            project_groups,
            supervisor_overrides: overrides(&self.supervisor_overrides),
            marker_overrides: overrides(&self.marker_overrides),
            model: None,
        }
    }
}
