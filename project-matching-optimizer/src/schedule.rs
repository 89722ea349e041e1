//! Presentation scheduling: talks and assessors into (session, room) slots.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entities::{FacultyId, RoomId, SessionId, TalkId};
use crate::error::{OptimizerError, Result};
use crate::index::DenseIndex;
use crate::model::{LinExpr, Model, Relation, Sense, VarId};
use crate::pair_slots::ScheduleSlot;
use crate::solver::SolverSolution;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    /// talks the room holds in one session
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAssessor {
    pub id: FacultyId,
    /// sessions the assessor can attend, empty for all of them
    #[serde(default)]
    pub available: Vec<SessionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Talk {
    pub id: TalkId,
    /// the presenter's supervisors, who may not assess the talk
    #[serde(default)]
    pub supervisors: Vec<FacultyId>,
    /// faculty allowed to assess the talk
    pub assessors: Vec<FacultyId>,
    /// sessions the presenter can attend, empty for all of them
    #[serde(default)]
    pub available: Vec<SessionId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDataset {
    pub sessions: Vec<SessionId>,
    pub rooms: Vec<Room>,
    pub assessors: Vec<ScheduleAssessor>,
    pub talks: Vec<Talk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleParams {
    pub assessors_per_slot: u32,
    pub max_sessions_per_assessor: Option<u32>,
    pub slot_penalty: f64,
    pub levelling_bias: f64,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            assessors_per_slot: 2,
            max_sessions_per_assessor: None,
            slot_penalty: 1.0,
            levelling_bias: 1.0,
        }
    }
}

fn attends(available: &[SessionId], session: SessionId) -> bool {
    available.is_empty() || available.contains(&session)
}

/// The scheduling MILP and handles on its variables.
#[derive(Debug, Clone)]
pub struct ScheduleModel {
    pub model: Model,
    pub sessions: DenseIndex<SessionId>,
    pub rooms: DenseIndex<RoomId>,
    pub assessors: DenseIndex<FacultyId>,
    pub talks: DenseIndex<TalkId>,
    /// `(talk, slot)`
    pub x: BTreeMap<(usize, usize), VarId>,
    /// `(assessor, slot)`
    pub y: BTreeMap<(usize, usize), VarId>,
    /// slot in use
    pub u: BTreeMap<usize, VarId>,
    assessors_per_slot: u32,
}

impl ScheduleModel {
    /// Slots are numbered session-major.
    #[must_use]
    pub fn slot(&self, session: usize, room: usize) -> usize {
        session * self.rooms.len() + room
    }

    #[must_use]
    pub fn slot_key(&self, slot: usize) -> (SessionId, RoomId) {
        (
            self.sessions.id(slot / self.rooms.len()),
            self.rooms.id(slot % self.rooms.len()),
        )
    }
}

fn index<K: Ord + Copy + std::fmt::Display>(what: &str, ids: Vec<K>) -> Result<DenseIndex<K>> {
    let mut ids = ids;
    ids.sort_unstable();
    DenseIndex::new(ids).map_err(|id| OptimizerError::Integrity(format!("{what} {id} listed twice")))
}

pub fn build_schedule_model(dataset: &ScheduleDataset, params: &ScheduleParams) -> Result<ScheduleModel> {
    let sessions = index("session", dataset.sessions.clone())?;
    let rooms = index("room", dataset.rooms.iter().map(|room| room.id).collect())?;
    let assessors = index("assessor", dataset.assessors.iter().map(|a| a.id).collect())?;
    let talks = index("talk", dataset.talks.iter().map(|talk| talk.id).collect())?;
    let capacity: BTreeMap<RoomId, u32> = dataset.rooms.iter().map(|room| (room.id, room.capacity)).collect();
    let talk_by_id: BTreeMap<TalkId, &Talk> = dataset.talks.iter().map(|talk| (talk.id, talk)).collect();
    let availability: BTreeMap<FacultyId, &[SessionId]> = dataset
        .assessors
        .iter()
        .map(|assessor| (assessor.id, assessor.available.as_slice()))
        .collect();

    let mut model = Model::new("schedule", Sense::Maximise);
    let mut schedule = ScheduleModel {
        model: Model::new("schedule", Sense::Maximise),
        sessions,
        rooms,
        assessors,
        talks,
        x: BTreeMap::new(),
        y: BTreeMap::new(),
        u: BTreeMap::new(),
        assessors_per_slot: params.assessors_per_slot,
    };

    for (session, session_id) in schedule.sessions.iter() {
        for (room, _) in schedule.rooms.iter() {
            let slot = schedule.slot(session, room);
            schedule.u.insert(slot, model.binary(format!("U_{slot}")));
            for (talk_index, talk_id) in schedule.talks.iter() {
                if attends(&talk_by_id[&talk_id].available, session_id) {
                    let var = model.binary(format!("X_{talk_index}_{slot}"));
                    schedule.x.insert((talk_index, slot), var);
                }
            }
            for (assessor, faculty) in schedule.assessors.iter() {
                let available = availability.get(&faculty).copied().unwrap_or_default();
                if attends(available, session_id) {
                    let var = model.binary(format!("Y_{assessor}_{slot}"));
                    schedule.y.insert((assessor, slot), var);
                }
            }
        }
    }

    let slots = schedule.sessions.len() * schedule.rooms.len();
    for (talk_index, talk_id) in schedule.talks.iter() {
        let talk = talk_by_id[&talk_id];
        let placements: Vec<(usize, VarId)> = schedule
            .x
            .range((talk_index, 0)..=(talk_index, usize::MAX))
            .map(|((_, slot), var)| (*slot, *var))
            .collect();
        if placements.is_empty() {
            return Err(OptimizerError::Integrity(format!(
                "talk {} fits no session",
                talk.id
            )));
        }
        model.constrain(
            format!("talk_once_{talk_index}"),
            LinExpr::sum(placements.iter().map(|(_, var)| *var)),
            Relation::Equal,
            LinExpr::constant(1.0),
        )?;

        let supervisors: BTreeSet<FacultyId> = talk.supervisors.iter().copied().collect();
        let eligible: Vec<usize> = talk
            .assessors
            .iter()
            .filter(|faculty| !supervisors.contains(faculty))
            .filter_map(|faculty| schedule.assessors.index_of(*faculty))
            .collect();
        if eligible.is_empty() {
            return Err(OptimizerError::Integrity(format!(
                "talk {} has no eligible assessor",
                talk.id
            )));
        }

        for (slot, var) in placements {
            let present = LinExpr::sum(
                eligible
                    .iter()
                    .filter_map(|assessor| schedule.y.get(&(*assessor, slot)).copied()),
            );
            model.constrain(
                format!("assessed_{talk_index}_{slot}"),
                LinExpr::var(var),
                Relation::LessEqual,
                present,
            )?;
            for supervisor in &supervisors {
                let Some(assessor) = schedule.assessors.index_of(*supervisor) else {
                    continue;
                };
                if let Some(y) = schedule.y.get(&(assessor, slot)) {
                    model.constrain(
                        format!("own_talk_{talk_index}_{assessor}_{slot}"),
                        LinExpr::sum([var, *y]),
                        Relation::LessEqual,
                        LinExpr::constant(1.0),
                    )?;
                }
            }
        }
    }

    for slot in 0..slots {
        let (_, room_id) = schedule.slot_key(slot);
        let used = schedule.u[&slot];
        let talks = LinExpr::sum(
            schedule
                .x
                .iter()
                .filter(|((_, s), _)| *s == slot)
                .map(|(_, var)| *var),
        );
        let room_capacity = f64::from(capacity.get(&room_id).copied().unwrap_or(0));
        model.constrain(
            format!("room_capacity_{slot}"),
            talks.clone(),
            Relation::LessEqual,
            LinExpr::var(used).scaled(room_capacity),
        )?;
        model.constrain(format!("used_{slot}"), LinExpr::var(used), Relation::LessEqual, talks)?;
        let panel = LinExpr::sum(
            schedule
                .y
                .iter()
                .filter(|((_, s), _)| *s == slot)
                .map(|(_, var)| *var),
        );
        model.constrain(
            format!("panel_{slot}"),
            panel,
            Relation::Equal,
            LinExpr::var(used).scaled(f64::from(params.assessors_per_slot)),
        )?;
    }

    let max_load = model.continuous("loadMax", 0.0, None);
    let min_load = model.continuous("loadMin", 0.0, None);
    model.constrain(
        "load_order",
        LinExpr::var(min_load),
        Relation::LessEqual,
        LinExpr::var(max_load),
    )?;
    for (assessor, _) in schedule.assessors.iter() {
        let load = LinExpr::sum(
            schedule
                .y
                .range((assessor, 0)..=(assessor, usize::MAX))
                .map(|(_, var)| *var),
        );
        for session in 0..schedule.sessions.len() {
            let rooms = LinExpr::sum(
                (0..schedule.rooms.len())
                    .filter_map(|room| schedule.y.get(&(assessor, schedule.slot(session, room))).copied()),
            );
            model.constrain(
                format!("one_room_{assessor}_{session}"),
                rooms,
                Relation::LessEqual,
                LinExpr::constant(1.0),
            )?;
        }
        if let Some(cap) = params.max_sessions_per_assessor {
            model.constrain(
                format!("session_cap_{assessor}"),
                load.clone(),
                Relation::LessEqual,
                LinExpr::constant(f64::from(cap)),
            )?;
        }
        model.constrain(
            format!("load_max_{assessor}"),
            LinExpr::var(max_load),
            Relation::GreaterEqual,
            load.clone(),
        )?;
        model.constrain(
            format!("load_min_{assessor}"),
            LinExpr::var(min_load),
            Relation::LessEqual,
            load,
        )?;
    }

    let mut objective = LinExpr::sum(schedule.u.values().copied()).scaled(-params.slot_penalty.abs());
    let mut spread = LinExpr::var(max_load);
    spread.add(min_load, -1.0);
    objective.add_scaled(&spread, -params.levelling_bias.abs());
    model.objective = objective;

    info!(
        variables = model.variables().len(),
        constraints = model.constraints().len(),
        slots,
        "built schedule model"
    );
    schedule.model = model;
    Ok(schedule)
}

/// Read the used slots out of an optimal solution.
pub fn decode_schedule(schedule: &ScheduleModel, solution: &SolverSolution) -> Result<Vec<ScheduleSlot>> {
    if solution.values.len() != schedule.model.variables().len() {
        return Err(OptimizerError::DecodeInvariant(format!(
            "solution has {} values for {} variables",
            solution.values.len(),
            schedule.model.variables().len()
        )));
    }
    let mut placed: BTreeMap<usize, Vec<TalkId>> = BTreeMap::new();
    let mut seen = BTreeSet::new();
    for (&(talk, slot), var) in &schedule.x {
        if solution.count(*var) == 1 {
            let talk_id = schedule.talks.id(talk);
            if !seen.insert(talk_id) {
                return Err(OptimizerError::DecodeInvariant(format!(
                    "talk {talk_id} was placed twice"
                )));
            }
            placed.entry(slot).or_default().push(talk_id);
        }
    }
    if let Some((_, missing)) = schedule.talks.iter().find(|(_, id)| !seen.contains(id)) {
        return Err(OptimizerError::DecodeInvariant(format!(
            "talk {missing} was not placed"
        )));
    }

    let mut panels: BTreeMap<usize, Vec<FacultyId>> = BTreeMap::new();
    for (&(assessor, slot), var) in &schedule.y {
        if solution.count(*var) == 1 {
            panels.entry(slot).or_default().push(schedule.assessors.id(assessor));
        }
    }

    let mut slots = Vec::with_capacity(placed.len());
    for (slot, mut talks) in placed {
        let mut assessors = panels.remove(&slot).unwrap_or_default();
        if assessors.len() != schedule.assessors_per_slot as usize {
            return Err(OptimizerError::DecodeInvariant(format!(
                "slot {slot} has {} assessors instead of {}",
                assessors.len(),
                schedule.assessors_per_slot
            )));
        }
        assessors.sort_unstable();
        talks.sort_unstable();
        let (session, room) = schedule.slot_key(slot);
        slots.push(ScheduleSlot {
            session,
            room,
            occupancy: 1,
            assessors,
            talks,
        });
    }
    debug!(slots = slots.len(), "decoded schedule");
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::{build_schedule_model, decode_schedule, Room, ScheduleAssessor, ScheduleDataset, ScheduleParams, Talk};
    use crate::entities::{FacultyId, RoomId, SessionId, TalkId};
    use crate::error::OptimizerError;
    use crate::solver::{SolveStatus, SolverSolution};

    fn dataset() -> ScheduleDataset {
        ScheduleDataset {
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
                    assessors: vec![FacultyId(2)],
                    available: Vec::new(),
                },
            ],
        }
    }

    #[test]
    fn talk_without_eligible_assessor_is_rejected() {
        let mut data = dataset();
        data.talks[1].supervisors = vec![FacultyId(2)];
        assert_matches!(
            build_schedule_model(&data, &ScheduleParams::default()),
            Err(OptimizerError::Integrity(_))
        );
    }

    #[test]
    fn unavailable_presenter_gets_no_variables() {
        let schedule = build_schedule_model(&dataset(), &ScheduleParams::default()).unwrap();
        assert_eq!(schedule.x.len(), 3);
        assert!(schedule.x.contains_key(&(0, 0)));
        assert!(!schedule.x.contains_key(&(0, 1)));
    }

    #[test]
    fn hand_made_solution_decodes_into_one_slot() {
        let schedule = build_schedule_model(&dataset(), &ScheduleParams::default()).unwrap();
        let mut values = vec![0.0; schedule.model.variables().len()];
        values[schedule.u[&0].index()] = 1.0;
        values[schedule.x[&(0, 0)].index()] = 1.0;
        values[schedule.x[&(1, 0)].index()] = 1.0;
        values[schedule.y[&(1, 0)].index()] = 1.0;
        values[schedule.y[&(2, 0)].index()] = 1.0;
        let load_max = schedule.model.names()["loadMax"];
        values[load_max.index()] = 1.0;
        assert!(schedule.model.is_feasible(&values));

        let solution = SolverSolution::from_values(&schedule.model, SolveStatus::Optimal, values);
        let slots = decode_schedule(&schedule, &solution).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].session, SessionId(1));
        assert_eq!(slots[0].assessors, vec![FacultyId(2), FacultyId(3)]);
        assert_eq!(slots[0].talks, vec![TalkId(10), TalkId(11)]);
    }

    #[test]
    fn supervisor_on_the_panel_is_infeasible() {
        let schedule = build_schedule_model(&dataset(), &ScheduleParams::default()).unwrap();
        let mut values = vec![0.0; schedule.model.variables().len()];
        values[schedule.u[&0].index()] = 1.0;
        values[schedule.x[&(0, 0)].index()] = 1.0;
        values[schedule.x[&(1, 0)].index()] = 1.0;
        values[schedule.y[&(0, 0)].index()] = 1.0;
        values[schedule.y[&(1, 0)].index()] = 1.0;
        let load_max = schedule.model.names()["loadMax"];
        values[load_max.index()] = 1.0;
        assert!(!schedule.model.is_feasible(&values));
    }
}
