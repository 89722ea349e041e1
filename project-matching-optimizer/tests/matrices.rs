mod common;

use assert_matches::assert_matches;
use project_matching_optimizer::entities::{
    FacultyId, Hint, MatchingDataset, ProgrammeId, ProjectId, SelectionChoice,
};
use project_matching_optimizer::enumerate::Enumeration;
use project_matching_optimizer::matrices::{build_matrices, Matrices};
use project_matching_optimizer::params::MatchingParams;
use project_matching_optimizer::OptimizerError;

use crate::common::{params, small_dataset};

fn matrices(dataset: &MatchingDataset, params: &MatchingParams) -> Matrices {
    let enumeration = Enumeration::build(dataset, params).unwrap();
    build_matrices(dataset, &enumeration, params).unwrap()
}

fn hinted() -> MatchingDataset {
    let mut dataset = small_dataset();
    let choices = &mut dataset.selectors[0].choices;
    choices[0].hint = Hint::Require;
    choices[1].hint = Hint::Forbid;
    choices.push(SelectionChoice {
        project: ProjectId(12),
        rank: 3,
        from_bookmark: true,
        hint: Hint::Encourage,
    });
    dataset
}

#[test]
fn ranks_and_weights_follow_choices() {
    let matrices = matrices(&small_dataset(), &params());
    assert_eq!(matrices.rank.get(0, 0), 1);
    assert_eq!(matrices.rank.get(0, 1), 2);
    assert_eq!(matrices.rank.get(0, 2), 0);
    assert_eq!(matrices.weight.get(0, 1), 1.0);
    assert!(matrices.required.is_empty());
    assert_eq!(matrices.submitted, vec![true, true, true]);
    assert_eq!(matrices.recorded_rank(1, 2), Some(2));
    assert_eq!(matrices.recorded_rank(1, 0), None);
}

#[test]
fn hints_shape_the_rank_matrix() {
    let matrices = matrices(&hinted(), &params());
    assert!(matrices.required.contains(&(0, 0)));
    // forbidden choices are not assignable at all
    assert_eq!(matrices.rank.get(0, 1), 0);
    assert_eq!(matrices.rank.get(0, 2), 3);
    assert!((matrices.weight.get(0, 2) - 2.0 * 0.8).abs() < 1e-9);
}

#[test]
fn hard_hints_can_be_softened_or_ignored() {
    let mut parameters = params();
    parameters.hints.require_to_encourage = true;
    parameters.hints.forbid_to_discourage = true;
    let softened = matrices(&hinted(), &parameters);
    assert!(softened.required.is_empty());
    assert_eq!(softened.weight.get(0, 0), 5.0);
    assert_eq!(softened.rank.get(0, 1), 2);
    assert!((softened.weight.get(0, 1) - 0.2).abs() < 1e-9);

    parameters.hints.use_hints = false;
    let ignored = matrices(&hinted(), &parameters);
    assert!(ignored.required.is_empty());
    assert_eq!(ignored.weight.get(0, 0), 1.0);
    assert!((ignored.weight.get(0, 2) - 0.8).abs() < 1e-9);
}

#[test]
fn programme_preference_scales_the_weight() {
    let mut dataset = small_dataset();
    dataset.selectors[0].programme = Some(ProgrammeId(7));
    dataset.projects[0].programmes = vec![ProgrammeId(7)];

    let preferred = matrices(&dataset, &params());
    assert_eq!(preferred.weight.get(0, 0), 1.5);
    assert_eq!(preferred.weight.get(0, 1), 1.0);

    let mut parameters = params();
    parameters.ignore_programme_prefs = true;
    assert_eq!(matrices(&dataset, &parameters).weight.get(0, 0), 1.0);
}

#[test]
fn silent_selector_may_take_any_project_of_their_class() {
    let mut dataset = small_dataset();
    dataset.selectors[2].choices.clear();
    dataset.selectors[2].submitted = false;

    let matrices = matrices(&dataset, &params());
    assert_eq!(
        matrices.rank.row(2).collect::<Vec<_>>(),
        vec![(0, 1), (1, 1), (2, 1)]
    );
    assert!(!matrices.has_ranking[2]);
    assert_eq!(matrices.recorded_rank(2, 0), None);
}

#[test]
fn eligibility_of_supervisors_and_markers() {
    let mut parameters = params();
    parameters.max_marking_multiplicity = 3;
    let matrices = matrices(&small_dataset(), &parameters);

    let supervisors: Vec<_> = matrices.supervisors.entries().map(|(pair, _)| pair).collect();
    assert_eq!(supervisors.len(), 4);
    for pair in [(0, 0), (1, 1), (0, 2), (2, 2)] {
        assert!(supervisors.contains(&pair), "{pair:?}");
    }

    assert_eq!(matrices.markers.get(1, 0), 3);
    assert_eq!(matrices.markers.get(2, 0), 3);
    assert_eq!(matrices.markers.get(0, 0), 0);
    assert_eq!(matrices.markers.get(1, 2), 3);
    assert_eq!(matrices.marker_valence, vec![1, 1, 1]);
}

#[test]
fn individual_project_with_two_supervisors_is_rejected() {
    let mut dataset = small_dataset();
    dataset.projects[0].supervisor_pool = vec![FacultyId(2)];
    let enumeration = Enumeration::build(&dataset, &params()).unwrap();
    assert_matches!(
        build_matrices(&dataset, &enumeration, &params()),
        Err(OptimizerError::Integrity(_))
    );
}

#[test]
fn zero_rank_is_rejected() {
    let mut dataset = small_dataset();
    dataset.selectors[1].choices[0].rank = 0;
    let enumeration = Enumeration::build(&dataset, &params()).unwrap();
    assert_matches!(
        build_matrices(&dataset, &enumeration, &params()),
        Err(OptimizerError::Integrity(_))
    );
}

#[test]
fn unreachable_requirements_are_rejected() {
    let mut dataset = small_dataset();
    dataset.selectors[0].accepted_offer = Some(ProjectId(99));
    let enumeration = Enumeration::build(&dataset, &params()).unwrap();
    assert_matches!(
        build_matrices(&dataset, &enumeration, &params()),
        Err(OptimizerError::InfeasibleRequirement { project: ProjectId(99), .. })
    );

    // two required projects for a selector who needs one
    let mut dataset = small_dataset();
    dataset.selectors[0].choices[0].hint = Hint::Require;
    dataset.selectors[0].choices[1].hint = Hint::Require;
    let enumeration = Enumeration::build(&dataset, &params()).unwrap();
    assert_matches!(
        build_matrices(&dataset, &enumeration, &params()),
        Err(OptimizerError::InfeasibleRequirement { .. })
    );
}
