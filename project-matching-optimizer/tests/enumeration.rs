mod common;

use assert_matches::assert_matches;
use project_matching_optimizer::entities::{
    AutoEnrol, ProjectClassId, ProjectId, SelectorId, SubmissionPeriodConfig,
};
use project_matching_optimizer::enumerate::{include_selector, Enumeration, UNBOUNDED_CAPACITY};
use project_matching_optimizer::matrices::build_matrices;
use project_matching_optimizer::OptimizerError;

use crate::common::{config, group_project, params, project, ranking, small_dataset};

#[test]
fn open_to_all_non_submitter_is_left_out() {
    let mut dataset = small_dataset();
    dataset.configs[0].selection_open_to_all = true;
    dataset.configs[0].auto_enrol = AutoEnrol::FirstYear;
    dataset.projects.push(project(13, 1, 3, &[1]));

    let mut offer = ranking(201, 1, &[]);
    offer.accepted_offer = Some(ProjectId(13));
    dataset.selectors = vec![
        ranking(200, 1, &[(10, 1), (11, 2)]),
        offer,
        ranking(202, 1, &[]),
    ];

    let enumeration = Enumeration::build(&dataset, &params()).unwrap();
    assert_eq!(enumeration.selectors.len(), 2);
    assert!(!enumeration.selectors.contains(SelectorId(202)));

    let matrices = build_matrices(&dataset, &enumeration, &params()).unwrap();
    let row = enumeration.selectors.index_of(SelectorId(201)).unwrap();
    let column = enumeration.projects.index_of(ProjectId(13)).unwrap();
    assert!(matrices.required.contains(&(row, column)));
    assert_eq!(matrices.rank.row(row).collect::<Vec<_>>(), vec![(column, 1)]);
}

#[test]
fn inclusion_policy() {
    let mut open = config(1, true, 0);
    open.selection_open_to_all = true;
    open.start_year = 2;
    open.extent = 3;
    let mut silent = ranking(1, 1, &[]);

    // first year only
    silent.academic_year = Some(2);
    assert!(!include_selector(&silent, &open, false));
    silent.academic_year = Some(3);
    assert!(include_selector(&silent, &open, false));

    open.auto_enrol = AutoEnrol::AllYears;
    assert!(!include_selector(&silent, &open, false));
    silent.academic_year = Some(5);
    assert!(include_selector(&silent, &open, false));

    // unknown year and graduates never opt out
    silent.academic_year = None;
    assert!(include_selector(&silent, &open, false));
    silent.academic_year = Some(3);
    silent.graduated = true;
    assert!(include_selector(&silent, &open, false));
    assert!(!include_selector(&silent, &open, true));

    let mut carryover = config(1, true, 0);
    carryover.supervisor_carryover = true;
    carryover.start_year = 2;
    carryover.extent = 2;
    let mut continuing = ranking(2, 1, &[]);
    continuing.academic_year = Some(3);
    assert!(!include_selector(&continuing, &carryover, false));
    continuing.academic_year = Some(4);
    assert!(include_selector(&continuing, &carryover, false));

    let submitted = ranking(3, 1, &[(10, 1)]);
    assert!(include_selector(&submitted, &carryover, true));
}

#[test]
fn missing_configuration_is_fatal() {
    let mut parameters = params();
    parameters.project_classes.push(ProjectClassId(9));
    assert_matches!(
        Enumeration::build(&small_dataset(), &parameters),
        Err(OptimizerError::MissingConfiguration { pclass: ProjectClassId(9), year: 2024 })
    );
}

#[test]
fn per_project_data_falls_back_to_defaults() {
    let mut dataset = small_dataset();
    dataset.projects[1].cats_supervision = Some(12);
    dataset.configs[0].cats_marking = Some(5);
    dataset.configs[0].periods.push(SubmissionPeriodConfig {
        period: 2,
        number_markers: 2,
        requires_project: true,
    });

    let enumeration = Enumeration::build(&dataset, &params()).unwrap();
    assert_eq!(enumeration.projects.ids(), &[ProjectId(10), ProjectId(11), ProjectId(12)]);
    assert_eq!(enumeration.cats_supervision, vec![35, 12, 35]);
    assert_eq!(enumeration.cats_marking, vec![5, 5, 5]);
    assert_eq!(enumeration.capacity, vec![UNBOUNDED_CAPACITY, UNBOUNDED_CAPACITY, 2]);
    assert_eq!(enumeration.capacity_enforced, vec![false, false, true]);
    assert_eq!(enumeration.multiplicity(0), 2);
    assert_eq!(enumeration.selector_periods[0], vec![1, 2]);
    assert_eq!(enumeration.config(enumeration.project_config[0]).marker_valence(), 2);
}

#[test]
fn snapshot_restores_numbering() {
    let dataset = small_dataset();
    let enumeration = Enumeration::build(&dataset, &params()).unwrap();
    let snapshot = enumeration.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();

    // new data arriving after export must not shift the numbering
    let mut later = dataset.clone();
    later.selectors.insert(0, ranking(50, 1, &[(10, 1)]));
    later.projects.push(group_project(5, 1, &[1], &[2], 1));

    let restored =
        Enumeration::from_snapshot(&later, &params(), &serde_json::from_str(&json).unwrap()).unwrap();
    assert_eq!(restored.selectors, enumeration.selectors);
    assert_eq!(restored.projects, enumeration.projects);
    assert_eq!(restored.supervisors, enumeration.supervisors);
    assert_eq!(restored.markers, enumeration.markers);
}

#[test]
fn snapshot_detects_drift() {
    let dataset = small_dataset();
    let snapshot = Enumeration::build(&dataset, &params()).unwrap().snapshot();

    let mut removed = dataset.clone();
    removed.selectors.retain(|selector| selector.id != SelectorId(101));
    assert_matches!(
        Enumeration::from_snapshot(&removed, &params(), &snapshot),
        Err(OptimizerError::Integrity(_))
    );

    let mut moved = dataset.clone();
    moved.configs.push(config(2, true, 0));
    moved.projects[0].config = project_matching_optimizer::entities::ConfigId(2);
    assert_matches!(
        Enumeration::from_snapshot(&moved, &params(), &snapshot),
        Err(OptimizerError::Integrity(_))
    );
}
