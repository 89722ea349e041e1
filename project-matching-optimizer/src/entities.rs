//! The relational snapshot the optimizer consumes.
//!
//! The web application exports these as one JSON document per attempt. Only the
//! fields the optimizer looks at are modelled here.

use core::fmt;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};

macro_rules! id_type {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(
                Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(pub i32);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0, f)
                }
            }
        )*
    };
}

id_type!(
    /// A student taking part in project selection.
    SelectorId,
    ProjectId,
    FacultyId,
    /// One project class in one academic year.
    ConfigId,
    ProjectClassId,
    ProgrammeId,
    AttemptId,
    SessionId,
    RoomId,
    /// A submission record that has to be presented.
    TalkId,
);

pub const DEFAULT_CATS_SUPERVISION: u32 = 35;
pub const DEFAULT_CATS_MARKING: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoEnrol {
    /// only selectors in the first year of the class are enrolled automatically
    FirstYear,
    AllYears,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPeriodConfig {
    pub period: u32,
    #[serde(default)]
    pub number_markers: u32,
    #[serde(default = "default_true")]
    pub requires_project: bool,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectClassConfig {
    pub id: ConfigId,
    pub pclass: ProjectClassId,
    pub year: i32,
    #[serde(default)]
    pub name: String,
    pub uses_supervisor: bool,
    pub uses_marker: bool,
    #[serde(default)]
    pub selection_open_to_all: bool,
    #[serde(default = "default_auto_enrol")]
    pub auto_enrol: AutoEnrol,
    #[serde(default)]
    pub supervisor_carryover: bool,
    pub start_year: u32,
    pub extent: u32,
    #[serde(default)]
    pub cats_supervision: Option<u32>,
    #[serde(default)]
    pub cats_marking: Option<u32>,
    pub periods: Vec<SubmissionPeriodConfig>,
}

const fn default_auto_enrol() -> AutoEnrol {
    AutoEnrol::FirstYear
}

impl ProjectClassConfig {
    /// Whether `year` lies inside the academic years this class runs over.
    #[must_use]
    pub const fn within_extent(&self, year: u32) -> bool {
        year >= self.start_year && year < self.start_year + self.extent
    }

    /// Periods that need a project, ascending.
    pub fn matched_periods(&self) -> Vec<u32> {
        let mut periods: Vec<u32> = self
            .periods
            .iter()
            .filter(|period| period.requires_project)
            .map(|period| period.period)
            .collect();
        periods.sort_unstable();
        periods
    }

    /// The most markers any matched period asks for. The period is only fixed when
    /// decoding, so the model has to reserve for the worst case.
    #[must_use]
    pub fn marker_valence(&self) -> u32 {
        if !self.uses_marker {
            return 0;
        }
        self.periods
            .iter()
            .filter(|period| period.requires_project)
            .map(|period| period.number_markers)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hint {
    #[default]
    Neutral,
    Require,
    Forbid,
    Encourage,
    Discourage,
    StrongEncourage,
    StrongDiscourage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionChoice {
    pub project: ProjectId,
    /// 1 is the most preferred
    pub rank: u32,
    #[serde(default)]
    pub from_bookmark: bool,
    #[serde(default)]
    pub hint: Hint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selector {
    pub id: SelectorId,
    pub config: ConfigId,
    #[serde(default)]
    pub academic_year: Option<u32>,
    #[serde(default)]
    pub graduated: bool,
    #[serde(default)]
    pub programme: Option<ProgrammeId>,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default)]
    pub choices: Vec<SelectionChoice>,
    #[serde(default)]
    pub accepted_offer: Option<ProjectId>,
}

impl Selector {
    #[must_use]
    pub fn choice_for(&self, project: ProjectId) -> Option<&SelectionChoice> {
        self.choices.iter().find(|choice| choice.project == project)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveProject {
    pub id: ProjectId,
    pub config: ConfigId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub generic: bool,
    #[serde(default)]
    pub owner: Option<FacultyId>,
    #[serde(default)]
    pub supervisor_pool: Vec<FacultyId>,
    #[serde(default)]
    pub assessors: Vec<FacultyId>,
    #[serde(default)]
    pub enforce_capacity: bool,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub cats_supervision: Option<u32>,
    #[serde(default)]
    pub cats_marking: Option<u32>,
    #[serde(default)]
    pub programmes: Vec<ProgrammeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub config: ConfigId,
    #[serde(default)]
    pub supervising: bool,
    #[serde(default)]
    pub marking: bool,
    #[serde(default)]
    pub cats_supervision_override: Option<u32>,
    #[serde(default)]
    pub cats_marking_override: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacultyMember {
    pub id: FacultyId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cats_supervision_limit: Option<u32>,
    #[serde(default)]
    pub cats_marking_limit: Option<u32>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
}

impl FacultyMember {
    #[must_use]
    pub fn enrollment(&self, config: ConfigId) -> Option<&Enrollment> {
        self.enrollments
            .iter()
            .find(|enrollment| enrollment.config == config)
    }
}

/// One assignment of a previously computed match whose workload counts against
/// this attempt's limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorAssignment {
    pub config: ConfigId,
    #[serde(default)]
    pub supervisors: Vec<FacultyId>,
    #[serde(default)]
    pub markers: Vec<FacultyId>,
    pub cats_supervision: u32,
    pub cats_marking: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorMatch {
    pub id: AttemptId,
    pub assignments: Vec<PriorAssignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseRecord {
    pub selector: SelectorId,
    pub project: ProjectId,
    #[serde(default)]
    pub supervisors: Vec<FacultyId>,
    #[serde(default)]
    pub markers: Vec<FacultyId>,
}

/// A previous attempt used to bias (or pin) this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseMatch {
    pub id: AttemptId,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub bias: f64,
    pub records: Vec<BaseRecord>,
}

/// Everything an attempt reads from the relational store, captured at one point in
/// time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingDataset {
    pub configs: Vec<ProjectClassConfig>,
    pub selectors: Vec<Selector>,
    pub projects: Vec<LiveProject>,
    pub faculty: Vec<FacultyMember>,
    #[serde(default)]
    pub included_matches: Vec<PriorMatch>,
    #[serde(default)]
    pub base: Option<BaseMatch>,
}

/// Id lookups over a [`MatchingDataset`].
pub struct Catalog<'a> {
    pub configs: HashMap<ConfigId, &'a ProjectClassConfig>,
    pub selectors: HashMap<SelectorId, &'a Selector>,
    pub projects: HashMap<ProjectId, &'a LiveProject>,
    pub faculty: HashMap<FacultyId, &'a FacultyMember>,
}

impl<'a> Catalog<'a> {
    #[must_use]
    pub fn new(dataset: &'a MatchingDataset) -> Self {
        Self {
            configs: dataset.configs.iter().map(|c| (c.id, c)).collect(),
            selectors: dataset.selectors.iter().map(|s| (s.id, s)).collect(),
            projects: dataset.projects.iter().map(|p| (p.id, p)).collect(),
            faculty: dataset.faculty.iter().map(|f| (f.id, f)).collect(),
        }
    }

    pub fn config(&self, id: ConfigId) -> Result<&'a ProjectClassConfig> {
        self.configs
            .get(&id)
            .copied()
            .ok_or(OptimizerError::UnknownConfiguration(id))
    }

    pub fn selector(&self, id: SelectorId) -> Result<&'a Selector> {
        self.selectors
            .get(&id)
            .copied()
            .ok_or_else(|| OptimizerError::Integrity(format!("selector {id} is missing")))
    }

    pub fn project(&self, id: ProjectId) -> Result<&'a LiveProject> {
        self.projects
            .get(&id)
            .copied()
            .ok_or_else(|| OptimizerError::Integrity(format!("project {id} is missing")))
    }

    pub fn faculty(&self, id: FacultyId) -> Result<&'a FacultyMember> {
        self.faculty
            .get(&id)
            .copied()
            .ok_or_else(|| OptimizerError::Integrity(format!("faculty member {id} is missing")))
    }
}
