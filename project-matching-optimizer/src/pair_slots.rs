//! Edit script between two versions of a presentation schedule.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::entities::{FacultyId, RoomId, SessionId, TalkId};
use crate::error::{OptimizerError, Result};

/// Assessors and talks sharing a room in one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub session: SessionId,
    pub room: RoomId,
    /// tells apart slots that share a session and room
    #[serde(default = "first_occupancy")]
    pub occupancy: u32,
    pub assessors: Vec<FacultyId>,
    pub talks: Vec<TalkId>,
}

const fn first_occupancy() -> u32 {
    1
}

impl ScheduleSlot {
    #[must_use]
    pub const fn key(&self) -> (SessionId, RoomId) {
        (self.session, self.room)
    }

    fn assessor_set(&self) -> BTreeSet<FacultyId> {
        self.assessors.iter().copied().collect()
    }

    fn talk_set(&self) -> BTreeSet<TalkId> {
        self.talks.iter().copied().collect()
    }

    /// Assessors and talks as sorted lists; repeated ids count.
    fn contents(&self) -> (Vec<FacultyId>, Vec<TalkId>) {
        let mut assessors = self.assessors.clone();
        let mut talks = self.talks.clone();
        assessors.sort_unstable();
        talks.sort_unstable();
        (assessors, talks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotOperation {
    Add,
    Delete,
    Move,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotChange<'a> {
    pub operation: SlotOperation,
    pub source: Option<&'a ScheduleSlot>,
    pub target: Option<&'a ScheduleSlot>,
}

fn by_key(slots: &[ScheduleSlot]) -> Result<BTreeMap<(SessionId, RoomId), &ScheduleSlot>> {
    let mut keyed = BTreeMap::new();
    for slot in slots {
        if keyed.insert(slot.key(), slot).is_some() {
            return Err(OptimizerError::DuplicateSlot {
                session: slot.session,
                room: slot.room,
            });
        }
    }
    Ok(keyed)
}

/// One point each for the same session, the same room, every shared assessor and
/// every shared talk.
fn similarity(old: &ScheduleSlot, new: &ScheduleSlot) -> usize {
    let assessors = new.assessor_set();
    let talks = new.talk_set();
    usize::from(old.session == new.session)
        + usize::from(old.room == new.room)
        + old
            .assessor_set()
            .iter()
            .filter(|assessor| assessors.contains(assessor))
            .count()
        + old
            .talk_set()
            .iter()
            .filter(|talk| talks.contains(talk))
            .count()
}

/// Compare schedule `old` against `new`.
///
/// A slot whose key vanished is matched against the slots with a new key: the
/// candidate must score more than half the old slot's assessors plus talks, and of
/// the acceptable candidates the lowest scoring one wins, the first in key order on
/// a tie. Each new slot takes part in at most one move. Output is the moves and
/// deletes in key order, then adds, then edits. Slots sharing a key are edited when
/// their sorted assessor or talk lists differ, repeated ids included.
pub fn pair_slots<'a>(old: &'a [ScheduleSlot], new: &'a [ScheduleSlot]) -> Result<Vec<SlotChange<'a>>> {
    let old_keyed = by_key(old)?;
    let new_keyed = by_key(new)?;

    let mut candidates: Vec<(&ScheduleSlot, bool)> = new_keyed
        .iter()
        .filter(|(key, _)| !old_keyed.contains_key(*key))
        .map(|(_, slot)| (*slot, false))
        .collect();

    let mut changes = Vec::new();
    for (key, slot) in &old_keyed {
        if new_keyed.contains_key(key) {
            continue;
        }
        let threshold = slot.assessors.len() + slot.talks.len();
        let best = candidates
            .iter()
            .enumerate()
            .filter(|(_, (_, taken))| !taken)
            .map(|(position, (candidate, _))| (position, similarity(slot, candidate)))
            .filter(|(_, score)| 2 * score > threshold)
            .min_by_key(|(position, score)| (*score, *position));

        match best {
            Some((position, _)) => {
                candidates[position].1 = true;
                changes.push(SlotChange {
                    operation: SlotOperation::Move,
                    source: Some(*slot),
                    target: Some(candidates[position].0),
                });
            }
            None => changes.push(SlotChange {
                operation: SlotOperation::Delete,
                source: Some(*slot),
                target: None,
            }),
        }
    }

    changes.extend(
        candidates
            .iter()
            .filter(|(_, taken)| !taken)
            .map(|(slot, _)| SlotChange {
                operation: SlotOperation::Add,
                source: None,
                target: Some(*slot),
            }),
    );

    for (key, slot) in &old_keyed {
        let Some(counterpart) = new_keyed.get(key) else {
            continue;
        };
        if slot.contents() != counterpart.contents() {
            changes.push(SlotChange {
                operation: SlotOperation::Edit,
                source: Some(*slot),
                target: Some(*counterpart),
            });
        }
    }
    Ok(changes)
}
