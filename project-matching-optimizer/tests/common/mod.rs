#![allow(dead_code)]

use project_matching_optimizer::entities::{
    AutoEnrol, ConfigId, Enrollment, FacultyId, FacultyMember, LiveProject, MatchingDataset, ProjectClassConfig,
    ProjectClassId, ProjectId, SelectionChoice, Selector, SelectorId, SubmissionPeriodConfig,
};
use project_matching_optimizer::params::MatchingParams;

pub const YEAR: i32 = 2024;

pub fn config(id: i32, uses_supervisor: bool, number_markers: u32) -> ProjectClassConfig {
    ProjectClassConfig {
        id: ConfigId(id),
        pclass: ProjectClassId(id),
        year: YEAR,
        name: format!("class {id}"),
        uses_supervisor,
        uses_marker: number_markers > 0,
        selection_open_to_all: false,
        auto_enrol: AutoEnrol::FirstYear,
        supervisor_carryover: false,
        start_year: 3,
        extent: 2,
        cats_supervision: None,
        cats_marking: None,
        periods: vec![SubmissionPeriodConfig {
            period: 1,
            number_markers,
            requires_project: true,
        }],
    }
}

pub fn ranking(id: i32, config: i32, choices: &[(i32, u32)]) -> Selector {
    Selector {
        id: SelectorId(id),
        config: ConfigId(config),
        academic_year: Some(3),
        graduated: false,
        programme: None,
        submitted: !choices.is_empty(),
        choices: choices
            .iter()
            .map(|(project, rank)| SelectionChoice {
                project: ProjectId(*project),
                rank: *rank,
                from_bookmark: false,
                hint: Default::default(),
            })
            .collect(),
        accepted_offer: None,
    }
}

pub fn project(id: i32, config: i32, owner: i32, assessors: &[i32]) -> LiveProject {
    LiveProject {
        id: ProjectId(id),
        config: ConfigId(config),
        name: format!("project {id}"),
        generic: false,
        owner: Some(FacultyId(owner)),
        supervisor_pool: Vec::new(),
        assessors: assessors.iter().copied().map(FacultyId).collect(),
        enforce_capacity: false,
        capacity: None,
        cats_supervision: None,
        cats_marking: None,
        programmes: Vec::new(),
    }
}

pub fn group_project(id: i32, config: i32, pool: &[i32], assessors: &[i32], capacity: u32) -> LiveProject {
    LiveProject {
        generic: true,
        owner: None,
        supervisor_pool: pool.iter().copied().map(FacultyId).collect(),
        enforce_capacity: true,
        capacity: Some(capacity),
        ..project(id, config, 0, assessors)
    }
}

pub fn faculty(id: i32, config: i32) -> FacultyMember {
    FacultyMember {
        id: FacultyId(id),
        name: format!("faculty {id}"),
        cats_supervision_limit: None,
        cats_marking_limit: None,
        enrollments: vec![Enrollment {
            config: ConfigId(config),
            supervising: true,
            marking: true,
            cats_supervision_override: None,
            cats_marking_override: None,
        }],
    }
}

pub fn params() -> MatchingParams {
    MatchingParams {
        year: YEAR,
        project_classes: vec![ProjectClassId(1)],
        ..MatchingParams::default()
    }
}

/// One class with supervisors and a single marker per project, three selectors
/// with rankings, two owned projects and one group project of capacity 2.
pub fn small_dataset() -> MatchingDataset {
    MatchingDataset {
        configs: vec![config(1, true, 1)],
        selectors: vec![
            ranking(100, 1, &[(10, 1), (11, 2)]),
            ranking(101, 1, &[(11, 1), (12, 2)]),
            ranking(102, 1, &[(12, 1), (10, 2)]),
        ],
        projects: vec![
            project(10, 1, 1, &[2, 3]),
            project(11, 1, 2, &[1, 3]),
            group_project(12, 1, &[1, 3], &[2], 2),
        ],
        faculty: vec![faculty(1, 1), faculty(2, 1), faculty(3, 1)],
        included_matches: Vec::new(),
        base: None,
    }
}
