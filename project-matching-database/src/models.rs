use diesel::prelude::*;
use project_matching_optimizer::decode::RoleKind;

use crate::error::DatabaseError;
use crate::schema::{
    matching_attempts, matching_records, matching_roles, schedule_attempts, schedule_slot_assessors,
    schedule_slot_talks, schedule_slots,
};

pub(crate) fn to_column<T: TryInto<i32> + Copy + core::fmt::Display>(value: T) -> Result<i32, DatabaseError> {
    value
        .try_into()
        .map_err(|_| DatabaseError::OutOfRange(value.to_string()))
}

pub(crate) fn from_column(value: i32) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| DatabaseError::OutOfRange(value.to_string()))
}

#[must_use]
pub const fn role_name(role: RoleKind) -> &'static str {
    match role {
        RoleKind::Supervisor => "supervisor",
        RoleKind::Marker => "marker",
    }
}

pub fn parse_role(name: &str) -> Result<RoleKind, DatabaseError> {
    match name {
        "supervisor" => Ok(RoleKind::Supervisor),
        "marker" => Ok(RoleKind::Marker),
        other => Err(DatabaseError::UnknownRole(other.to_owned())),
    }
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = matching_attempts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MatchingAttemptRow {
    pub id: i32,
    pub name: String,
    pub finished: bool,
    pub task_finished: bool,
    pub outcome: Option<String>,
    pub published: bool,
    pub selected: bool,
    pub score: Option<f64>,
    pub construct_time: Option<f64>,
    pub compute_time: Option<f64>,
    pub progress: i16,
    pub progress_message: Option<String>,
    pub enumeration_snapshot: Option<String>,
}

/// Terminal columns written once a matching run has an outcome.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = matching_attempts)]
#[diesel(treat_none_as_null = true)]
pub struct FinishedMatching<'a> {
    pub finished: bool,
    pub task_finished: bool,
    pub outcome: Option<&'a str>,
    pub score: Option<f64>,
    pub construct_time: Option<f64>,
    pub compute_time: Option<f64>,
    pub progress: i16,
    pub progress_message: Option<&'a str>,
    pub enumeration_snapshot: Option<String>,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = matching_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MatchingRecordRow {
    pub id: i32,
    pub attempt_id: i32,
    pub selector_id: i32,
    pub config_id: i32,
    pub submission_period: i32,
    pub project_id: i32,
    pub original_project_id: i32,
    pub rank: Option<i32>,
    pub score: f64,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = matching_records)]
pub struct NewMatchingRecord {
    pub attempt_id: i32,
    pub selector_id: i32,
    pub config_id: i32,
    pub submission_period: i32,
    pub project_id: i32,
    pub original_project_id: i32,
    pub rank: Option<i32>,
    pub score: f64,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = matching_roles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MatchingRoleRow {
    pub id: i32,
    pub record_id: i32,
    pub faculty_id: i32,
    pub role: String,
    pub original: bool,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = matching_roles)]
pub struct NewMatchingRole {
    pub record_id: i32,
    pub faculty_id: i32,
    pub role: &'static str,
    pub original: bool,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = schedule_attempts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ScheduleAttemptRow {
    pub id: i32,
    pub name: String,
    pub finished: bool,
    pub task_finished: bool,
    pub outcome: Option<String>,
    pub score: Option<f64>,
    pub construct_time: Option<f64>,
    pub compute_time: Option<f64>,
    pub progress: i16,
    pub progress_message: Option<String>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = schedule_attempts)]
#[diesel(treat_none_as_null = true)]
pub struct FinishedSchedule<'a> {
    pub finished: bool,
    pub task_finished: bool,
    pub outcome: Option<&'a str>,
    pub score: Option<f64>,
    pub construct_time: Option<f64>,
    pub compute_time: Option<f64>,
    pub progress: i16,
    pub progress_message: Option<&'a str>,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = schedule_slots)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ScheduleSlotRow {
    pub id: i32,
    pub attempt_id: i32,
    pub session_id: i32,
    pub room_id: i32,
    pub occupancy: i32,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = schedule_slots)]
pub struct NewScheduleSlot {
    pub attempt_id: i32,
    pub session_id: i32,
    pub room_id: i32,
    pub occupancy: i32,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, Copy, PartialEq, Eq)]
#[diesel(table_name = schedule_slot_assessors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SlotAssessor {
    pub slot_id: i32,
    pub faculty_id: i32,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, Copy, PartialEq, Eq)]
#[diesel(table_name = schedule_slot_talks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SlotTalk {
    pub slot_id: i32,
    pub talk_id: i32,
}
