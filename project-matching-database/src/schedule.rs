//! Presentation schedule attempts and their slots.

use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use itertools::Itertools;
use project_matching_optimizer::attempt::{AttemptLifecycle, Outcome};
use project_matching_optimizer::entities::{AttemptId, FacultyId, RoomId, SessionId, TalkId};
use project_matching_optimizer::job::ScheduleOutcome;
use project_matching_optimizer::pair_slots::ScheduleSlot;
use scoped_futures::ScopedFutureExt;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::matching::parse_outcome;
use crate::models::{
    from_column, to_column, FinishedSchedule, NewScheduleSlot, ScheduleAttemptRow, ScheduleSlotRow,
    SlotAssessor, SlotTalk,
};
use crate::schema::{schedule_attempts, schedule_slot_assessors, schedule_slot_talks, schedule_slots};

impl ScheduleAttemptRow {
    /// Schedules are never published or selected, only finished.
    pub fn lifecycle(&self) -> Result<AttemptLifecycle, DatabaseError> {
        Ok(AttemptLifecycle {
            finished: self.finished,
            task_finished: self.task_finished,
            outcome: parse_outcome(self.outcome.as_deref())?,
            published: false,
            selected: false,
        })
    }
}

/// Rebuild slots in row order, attaching assessors and talks in ascending id order.
pub fn assemble_slots(
    slots: Vec<ScheduleSlotRow>,
    assessors: &[SlotAssessor],
    talks: &[SlotTalk],
) -> Result<Vec<ScheduleSlot>, DatabaseError> {
    let assessors = assessors.iter().into_group_map_by(|entry| entry.slot_id);
    let talks = talks.iter().into_group_map_by(|entry| entry.slot_id);
    slots
        .into_iter()
        .map(|row| {
            Ok(ScheduleSlot {
                session: SessionId(row.session_id),
                room: RoomId(row.room_id),
                occupancy: from_column(row.occupancy)?,
                assessors: assessors
                    .get(&row.id)
                    .into_iter()
                    .flatten()
                    .map(|entry| FacultyId(entry.faculty_id))
                    .sorted()
                    .collect(),
                talks: talks
                    .get(&row.id)
                    .into_iter()
                    .flatten()
                    .map(|entry| TalkId(entry.talk_id))
                    .sorted()
                    .collect(),
            })
        })
        .collect()
}

pub async fn load_attempt(
    connection: &mut AsyncPgConnection,
    attempt: AttemptId,
) -> Result<ScheduleAttemptRow, DatabaseError> {
    Ok(schedule_attempts::table
        .find(attempt.0)
        .select(ScheduleAttemptRow::as_select())
        .first(connection)
        .await?)
}

pub async fn load_slots(
    connection: &mut AsyncPgConnection,
    attempt: AttemptId,
) -> Result<Vec<ScheduleSlot>, DatabaseError> {
    let slots = schedule_slots::table
        .filter(schedule_slots::attempt_id.eq(attempt.0))
        .order(schedule_slots::id)
        .select(ScheduleSlotRow::as_select())
        .load(connection)
        .await?;
    let assessors: Vec<SlotAssessor> = schedule_slot_assessors::table
        .inner_join(schedule_slots::table)
        .filter(schedule_slots::attempt_id.eq(attempt.0))
        .select(SlotAssessor::as_select())
        .load(connection)
        .await?;
    let talks: Vec<SlotTalk> = schedule_slot_talks::table
        .inner_join(schedule_slots::table)
        .filter(schedule_slots::attempt_id.eq(attempt.0))
        .select(SlotTalk::as_select())
        .load(connection)
        .await?;
    assemble_slots(slots, &assessors, &talks)
}

pub async fn set_progress(
    connection: &mut AsyncPgConnection,
    attempt: AttemptId,
    percent: u8,
    message: &str,
) -> Result<(), DatabaseError> {
    let percent = i16::from(percent.min(100));
    diesel::update(
        schedule_attempts::table
            .find(attempt.0)
            .filter(schedule_attempts::progress.le(percent)),
    )
    .set((
        schedule_attempts::progress.eq(percent),
        schedule_attempts::progress_message.eq(message),
    ))
    .execute(connection)
    .await?;
    Ok(())
}

pub async fn mark_failed(
    connection: &mut AsyncPgConnection,
    attempt: AttemptId,
    message: &str,
) -> Result<(), DatabaseError> {
    diesel::update(schedule_attempts::table.find(attempt.0))
        .set((
            schedule_attempts::finished.eq(true),
            schedule_attempts::task_finished.eq(true),
            schedule_attempts::outcome.eq(Outcome::Undefined.as_str()),
            schedule_attempts::progress_message.eq(message),
        ))
        .execute(connection)
        .await?;
    info!(attempt = %attempt, "marked schedule attempt as failed");
    Ok(())
}

/// Replace the attempt's slots and close it in one transaction.
pub async fn store_schedule_outcome(
    connection: &mut AsyncPgConnection,
    attempt: AttemptId,
    outcome: &ScheduleOutcome,
) -> Result<(), DatabaseError> {
    let slots = outcome
        .slots
        .iter()
        .map(|slot| {
            Ok((
                NewScheduleSlot {
                    attempt_id: attempt.0,
                    session_id: slot.session.0,
                    room_id: slot.room.0,
                    occupancy: to_column(slot.occupancy)?,
                },
                slot,
            ))
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;
    let finished = FinishedSchedule {
        finished: true,
        task_finished: true,
        outcome: Some(Outcome::from(outcome.status).as_str()),
        score: outcome.score,
        construct_time: Some(outcome.construct_time.as_secs_f64()),
        compute_time: Some(outcome.compute_time.as_secs_f64()),
        progress: 100,
        progress_message: Some("Schedule complete"),
    };

    connection
        .transaction::<_, DatabaseError, _>(|connection| {
            async move {
                let stale = schedule_slots::table
                    .filter(schedule_slots::attempt_id.eq(attempt.0))
                    .select(schedule_slots::id);
                diesel::delete(
                    schedule_slot_assessors::table
                        .filter(schedule_slot_assessors::slot_id.eq_any(stale.clone())),
                )
                .execute(connection)
                .await?;
                diesel::delete(
                    schedule_slot_talks::table.filter(schedule_slot_talks::slot_id.eq_any(stale)),
                )
                .execute(connection)
                .await?;
                diesel::delete(schedule_slots::table.filter(schedule_slots::attempt_id.eq(attempt.0)))
                    .execute(connection)
                    .await?;

                for (row, slot) in &slots {
                    let id: i32 = diesel::insert_into(schedule_slots::table)
                        .values(row)
                        .returning(schedule_slots::id)
                        .get_result(connection)
                        .await?;
                    let assessors = slot
                        .assessors
                        .iter()
                        .map(|faculty| SlotAssessor {
                            slot_id: id,
                            faculty_id: faculty.0,
                        })
                        .collect_vec();
                    if !assessors.is_empty() {
                        diesel::insert_into(schedule_slot_assessors::table)
                            .values(assessors)
                            .execute(connection)
                            .await?;
                    }
                    let talks = slot
                        .talks
                        .iter()
                        .map(|talk| SlotTalk {
                            slot_id: id,
                            talk_id: talk.0,
                        })
                        .collect_vec();
                    if !talks.is_empty() {
                        diesel::insert_into(schedule_slot_talks::table)
                            .values(talks)
                            .execute(connection)
                            .await?;
                    }
                }

                diesel::update(schedule_attempts::table.find(attempt.0))
                    .set(&finished)
                    .execute(connection)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;
    debug!(attempt = %attempt, slots = outcome.slots.len(), "stored schedule outcome");
    Ok(())
}
