mod common;

use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use project_matching_optimizer::job::{export_offline, ingest_offline, run_matching};
use project_matching_optimizer::model::Model;
use project_matching_optimizer::progress::{Monotonic, NoProgress};
use project_matching_optimizer::solver::{
    CancelFlag, SolveLimits, SolveStatus, SolverBackend, SolverSolution,
};
use project_matching_optimizer::{OptimizerError, Result};

use crate::common::{params, ranking, small_dataset};

/// Hands back a fixed status and remembers how big the model was.
struct Scripted {
    status: SolveStatus,
    seen: Mutex<Option<usize>>,
}

impl Scripted {
    fn new(status: SolveStatus) -> Self {
        Self {
            status,
            seen: Mutex::new(None),
        }
    }
}

impl SolverBackend for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn solve(&self, model: &Model, _limits: &SolveLimits, cancel: &CancelFlag) -> Result<SolverSolution> {
        cancel.check()?;
        *self.seen.lock().unwrap() = Some(model.variables().len());
        Ok(SolverSolution::without_values(self.status))
    }
}

#[test]
fn unusable_status_yields_no_records() {
    let backend = Scripted::new(SolveStatus::Infeasible);
    let mut milestones = Vec::new();
    let outcome = run_matching(
        &small_dataset(),
        &params(),
        &backend,
        &SolveLimits::default(),
        &CancelFlag::new(),
        &mut Monotonic::new(|percent: u8, _: &str| milestones.push(percent)),
    )
    .unwrap();

    assert_eq!(outcome.status, SolveStatus::Infeasible);
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.score, None);
    assert!(backend.seen.lock().unwrap().is_some());
    assert_eq!(milestones.first(), Some(&5));
    assert_eq!(milestones.last(), Some(&100));
    assert!(milestones.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn cancelled_run_never_reaches_the_solver() {
    let backend = Scripted::new(SolveStatus::Optimal);
    let cancel = CancelFlag::new();
    cancel.cancel();
    assert_matches!(
        run_matching(
            &small_dataset(),
            &params(),
            &backend,
            &SolveLimits::default(),
            &cancel,
            &mut NoProgress,
        ),
        Err(OptimizerError::Cancelled)
    );
    assert!(backend.seen.lock().unwrap().is_none());
}

#[test]
fn offline_export_writes_both_formats() {
    let dir = tempfile::tempdir().unwrap();
    let export = export_offline(&small_dataset(), &params(), dir.path(), "attempt_1", &mut NoProgress).unwrap();
    let lp = fs::read_to_string(&export.files.lp).unwrap();
    let mps = fs::read_to_string(&export.files.mps).unwrap();
    assert!(lp.contains("X_0_0"));
    assert!(mps.starts_with("NAME"));
    assert!(!mps.contains("X_0_0"));
    assert_eq!(export.snapshot.selectors.len(), 3);
}

#[test]
fn solution_with_unknown_variable_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = small_dataset();
    let export = export_offline(&dataset, &params(), dir.path(), "attempt", &mut NoProgress).unwrap();
    let path = dir.path().join("attempt.lpsol");
    fs::write(&path, "X_0_0 1\nX_99_99 1\n").unwrap();
    assert_matches!(
        ingest_offline(&dataset, &params(), &export.snapshot, &path, &mut NoProgress),
        Err(OptimizerError::UnknownVariable(name)) if name == "X_99_99"
    );

    let path = dir.path().join("attempt.txt");
    fs::write(&path, "X_0_0 1\n").unwrap();
    assert_matches!(
        ingest_offline(&dataset, &params(), &export.snapshot, &path, &mut NoProgress),
        Err(OptimizerError::SolutionFormat(_))
    );
}

#[cfg(feature = "microlp")]
mod in_process {
    use std::collections::BTreeMap;
    use std::fs;

    use project_matching_optimizer::decode::MatchingRecord;
    use project_matching_optimizer::entities::{
        FacultyId, MatchingDataset, ProjectId, RoomId, SelectorId, SessionId, SubmissionPeriodConfig, TalkId,
    };
    use project_matching_optimizer::enumerate::Enumeration;
    use project_matching_optimizer::job::{export_offline, ingest_offline, run_matching, run_schedule};
    use project_matching_optimizer::matching::build_model;
    use project_matching_optimizer::matrices::build_matrices;
    use project_matching_optimizer::model::Model;
    use project_matching_optimizer::pair_slots::{pair_slots, SlotOperation};
    use project_matching_optimizer::progress::NoProgress;
    use project_matching_optimizer::schedule::{Room, ScheduleAssessor, ScheduleDataset, ScheduleParams, Talk};
    use project_matching_optimizer::solver::{CancelFlag, MicroLp, SolveLimits, SolveStatus, SolverBackend};

    use crate::common::{config, faculty, params, project, ranking, small_dataset};

    /// Every record must respect ranking, capacity and role rules of the dataset.
    fn assert_valid_matching(dataset: &MatchingDataset, records: &[MatchingRecord]) {
        assert_eq!(records.len(), dataset.selectors.len());
        let mut per_project: BTreeMap<ProjectId, u32> = BTreeMap::new();
        for record in records {
            let selector = dataset.selectors.iter().find(|s| s.id == record.selector).unwrap();
            let choice = selector.choice_for(record.project).unwrap();
            assert_eq!(record.rank, Some(choice.rank));
            *per_project.entry(record.project).or_default() += 1;

            let project = dataset.projects.iter().find(|p| p.id == record.project).unwrap();
            let supervisors: Vec<FacultyId> = record.supervisors().collect();
            let markers: Vec<FacultyId> = record.markers().collect();
            assert_eq!(supervisors.len(), 1);
            assert!(project.owner == Some(supervisors[0]) || project.supervisor_pool.contains(&supervisors[0]));
            assert_eq!(markers.len(), 1);
            assert!(project.assessors.contains(&markers[0]));
            assert_ne!(markers[0], supervisors[0]);
            assert_eq!(record.original_project, record.project);
        }
        for project in &dataset.projects {
            if project.enforce_capacity {
                let assigned = per_project.get(&project.id).copied().unwrap_or(0);
                assert!(assigned <= project.capacity.unwrap_or(u32::MAX));
            }
        }
    }

    #[test]
    fn live_run_produces_a_valid_matching() {
        let dataset = small_dataset();
        let outcome = run_matching(
            &dataset,
            &params(),
            &MicroLp,
            &SolveLimits::default(),
            &CancelFlag::new(),
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert!(outcome.score.is_some());
        assert_valid_matching(&dataset, &outcome.records);
    }

    #[test]
    fn two_periods_with_two_markers_each() {
        let mut class = config(1, true, 2);
        class.periods = [1, 2]
            .into_iter()
            .map(|period| SubmissionPeriodConfig {
                period,
                number_markers: 2,
                requires_project: true,
            })
            .collect();
        let dataset = MatchingDataset {
            configs: vec![class],
            selectors: vec![
                ranking(100, 1, &[(10, 1), (11, 2)]),
                ranking(101, 1, &[(11, 1), (10, 2)]),
            ],
            projects: vec![project(10, 1, 1, &[2, 3, 4, 5]), project(11, 1, 2, &[1, 3, 4, 5])],
            faculty: (1..=5).map(|id| faculty(id, 1)).collect(),
            included_matches: Vec::new(),
            base: None,
        };

        let outcome = run_matching(
            &dataset,
            &params(),
            &MicroLp,
            &SolveLimits::default(),
            &CancelFlag::new(),
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_eq!(outcome.records.len(), 4);

        for selector in [SelectorId(100), SelectorId(101)] {
            let mine: Vec<&MatchingRecord> =
                outcome.records.iter().filter(|record| record.selector == selector).collect();
            let mut periods: Vec<u32> = mine.iter().map(|record| record.period).collect();
            periods.sort_unstable();
            assert_eq!(periods, vec![1, 2]);
            assert_ne!(mine[0].project, mine[1].project);
        }

        for record in &outcome.records {
            let supervisors: Vec<FacultyId> = record.supervisors().collect();
            let mut markers: Vec<FacultyId> = record.markers().collect();
            assert_eq!(supervisors.len(), 1);
            markers.sort_unstable();
            markers.dedup();
            assert_eq!(markers.len(), 2);
            assert!(!markers.contains(&supervisors[0]));
        }

        // every project is marked twice per assigned selector, no marker more than once
        for id in [ProjectId(10), ProjectId(11)] {
            let mut markers: Vec<FacultyId> = outcome
                .records
                .iter()
                .filter(|record| record.project == id)
                .flat_map(|record| record.markers().collect::<Vec<_>>())
                .collect();
            assert_eq!(markers.len(), 4);
            markers.sort_unstable();
            markers.dedup();
            assert_eq!(markers.len(), 4);
        }
    }

    #[test]
    fn required_offer_is_honoured() {
        let mut dataset = small_dataset();
        dataset.selectors[0].accepted_offer = Some(ProjectId(12));
        let outcome = run_matching(
            &dataset,
            &params(),
            &MicroLp,
            &SolveLimits::default(),
            &CancelFlag::new(),
            &mut NoProgress,
        )
        .unwrap();
        let record = outcome
            .records
            .iter()
            .find(|record| record.selector == SelectorId(100))
            .unwrap();
        assert_eq!(record.project, ProjectId(12));
        assert_eq!(record.rank, Some(1));
    }

    #[test]
    fn offline_solution_decodes_like_a_live_one() {
        let dataset = small_dataset();
        let dir = tempfile::tempdir().unwrap();
        let export = export_offline(&dataset, &params(), dir.path(), "attempt", &mut NoProgress).unwrap();

        // solve the rebuilt model elsewhere and write its values out by MPS column
        let enumeration = Enumeration::from_snapshot(&dataset, &params(), &export.snapshot).unwrap();
        let matrices = build_matrices(&dataset, &enumeration, &params()).unwrap();
        let model = build_model(&enumeration, &matrices, &params(), None).unwrap();
        let solution = MicroLp
            .solve(&model.model, &SolveLimits::default(), &CancelFlag::new())
            .unwrap();
        let listing: String = solution
            .values
            .iter()
            .enumerate()
            .filter(|(_, value)| **value != 0.0)
            .map(|(index, value)| {
                let var = model.model.names()[model.model.variables()[index].name.as_str()];
                format!("{} {value}\n", Model::column_name(var))
            })
            .collect();
        let path = dir.path().join("attempt.mpssol");
        fs::write(&path, listing).unwrap();

        // selectors arriving after the export do not disturb the numbering
        let mut later = dataset.clone();
        later.selectors.push(ranking(103, 1, &[(10, 1)]));
        let outcome = ingest_offline(&later, &params(), &export.snapshot, &path, &mut NoProgress).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_valid_matching(&dataset, &outcome.records);
        assert!(outcome.records.iter().all(|record| record.selector != SelectorId(103)));
    }

    #[test]
    fn schedule_round_trip_and_diff() {
        let dataset = ScheduleDataset {
            sessions: vec![SessionId(1), SessionId(2)],
            rooms: vec![Room {
                id: RoomId(1),
                capacity: 2,
            }],
            assessors: [1, 2, 3]
                .into_iter()
                .map(|id| ScheduleAssessor {
                    id: FacultyId(id),
                    available: Vec::new(),
                })
                .collect(),
            talks: vec![
                Talk {
                    id: TalkId(10),
                    supervisors: vec![FacultyId(1)],
                    assessors: vec![FacultyId(1), FacultyId(2), FacultyId(3)],
                    available: vec![SessionId(1)],
                },
                Talk {
                    id: TalkId(11),
                    supervisors: Vec::new(),
                    assessors: vec![FacultyId(2), FacultyId(3)],
                    available: Vec::new(),
                },
            ],
        };
        let outcome = run_schedule(
            &dataset,
            &ScheduleParams::default(),
            &MicroLp,
            &SolveLimits::default(),
            &CancelFlag::new(),
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);

        let scheduled: Vec<TalkId> = outcome.slots.iter().flat_map(|slot| slot.talks.clone()).collect();
        assert_eq!(scheduled.len(), 2);
        for slot in &outcome.slots {
            assert_eq!(slot.assessors.len(), 2);
            if slot.talks.contains(&TalkId(10)) {
                assert_eq!(slot.session, SessionId(1));
                assert!(!slot.assessors.contains(&FacultyId(1)));
            }
        }

        assert!(pair_slots(&outcome.slots, &outcome.slots).unwrap().is_empty());

        let mut moved = outcome.slots.clone();
        for slot in &mut moved {
            slot.room = RoomId(2);
        }
        let changes = pair_slots(&outcome.slots, &moved).unwrap();
        let vacated = changes
            .iter()
            .filter(|change| matches!(change.operation, SlotOperation::Move | SlotOperation::Delete))
            .count();
        assert_eq!(vacated, outcome.slots.len());
        assert!(changes.iter().all(|change| change.operation != SlotOperation::Edit));
    }
}

#[test]
fn late_selectors_do_not_change_the_export() {
    let dataset = small_dataset();
    let dir = tempfile::tempdir().unwrap();
    let first = export_offline(&dataset, &params(), dir.path(), "first", &mut NoProgress).unwrap();

    let mut later = dataset.clone();
    later.selectors.push(ranking(103, 1, &[(10, 1)]));
    let snapshot_json = serde_json::to_string(&first.snapshot).unwrap();
    let restored = serde_json::from_str(&snapshot_json).unwrap();
    let dir_later = tempfile::tempdir().unwrap();
    let path = dir_later.path().join("empty.lpsol");
    fs::write(&path, "solution status: infeasible\n").unwrap();
    let outcome = ingest_offline(&later, &params(), &restored, &path, &mut NoProgress).unwrap();
    assert_eq!(outcome.status, SolveStatus::Infeasible);
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.snapshot, first.snapshot);
}

#[test]
fn changed_rankings_invalidate_an_export() {
    let dataset = small_dataset();
    let dir = tempfile::tempdir().unwrap();
    let export = export_offline(&dataset, &params(), dir.path(), "attempt", &mut NoProgress).unwrap();
    assert!(export.snapshot.model.is_some());
    let path = dir.path().join("attempt.mpssol");
    fs::write(&path, "C0000000 1\n").unwrap();

    // a new choice adds a column ahead of later ones, so positions would shift
    let mut later = dataset.clone();
    later.selectors[0] = ranking(100, 1, &[(10, 1), (11, 2), (12, 3)]);
    assert_matches!(
        ingest_offline(&later, &params(), &export.snapshot, &path, &mut NoProgress),
        Err(OptimizerError::Integrity(_))
    );

    let mut live = export.snapshot.clone();
    live.model = None;
    assert_matches!(
        ingest_offline(&dataset, &params(), &live, &path, &mut NoProgress),
        Err(OptimizerError::Integrity(_))
    );
}
