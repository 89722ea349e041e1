//! Matching attempts, their records and faculty roles.

use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use itertools::Itertools;
use project_matching_optimizer::attempt::{AttemptLifecycle, Outcome};
use project_matching_optimizer::decode::{MatchingRecord, MatchingRole};
use project_matching_optimizer::entities::{AttemptId, ConfigId, FacultyId, ProjectId, SelectorId};
use project_matching_optimizer::enumerate::EnumerationSnapshot;
use project_matching_optimizer::job::MatchingOutcome;
use scoped_futures::ScopedFutureExt;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::models::{
    from_column, parse_role, role_name, to_column, FinishedMatching, MatchingAttemptRow,
    MatchingRecordRow, MatchingRoleRow, NewMatchingRecord, NewMatchingRole,
};
use crate::schema::{matching_attempts, matching_records, matching_roles};

pub(crate) fn parse_outcome(outcome: Option<&str>) -> Result<Option<Outcome>, DatabaseError> {
    outcome
        .map(|name| Outcome::parse(name).ok_or_else(|| DatabaseError::UnknownOutcome(name.to_owned())))
        .transpose()
}

impl MatchingAttemptRow {
    pub fn lifecycle(&self) -> Result<AttemptLifecycle, DatabaseError> {
        Ok(AttemptLifecycle {
            finished: self.finished,
            task_finished: self.task_finished,
            outcome: parse_outcome(self.outcome.as_deref())?,
            published: self.published,
            selected: self.selected,
        })
    }

    pub fn snapshot(&self) -> Result<EnumerationSnapshot, DatabaseError> {
        let stored = self
            .enumeration_snapshot
            .as_deref()
            .ok_or(DatabaseError::MissingSnapshot(self.id))?;
        Ok(serde_json::from_str(stored)?)
    }
}

impl NewMatchingRecord {
    pub fn new(attempt: AttemptId, record: &MatchingRecord) -> Result<Self, DatabaseError> {
        Ok(Self {
            attempt_id: attempt.0,
            selector_id: record.selector.0,
            config_id: record.config.0,
            submission_period: to_column(record.period)?,
            project_id: record.project.0,
            original_project_id: record.original_project.0,
            rank: record.rank.map(to_column).transpose()?,
            score: record.score,
        })
    }
}

/// Role rows for one stored record, current roles first.
#[must_use]
pub fn role_rows(record_id: i32, record: &MatchingRecord) -> Vec<NewMatchingRole> {
    let rows = |roles: &[MatchingRole], original: bool| {
        roles
            .iter()
            .map(move |role| NewMatchingRole {
                record_id,
                faculty_id: role.faculty.0,
                role: role_name(role.role),
                original,
            })
            .collect_vec()
    };
    let mut all = rows(&record.roles, false);
    all.extend(rows(&record.original_roles, true));
    all
}

/// Rebuild records from their rows; roles are attached by record id.
pub fn assemble_records(
    records: Vec<MatchingRecordRow>,
    roles: Vec<MatchingRoleRow>,
) -> Result<Vec<MatchingRecord>, DatabaseError> {
    let mut by_record = roles.into_iter().into_group_map_by(|role| role.record_id);
    records
        .into_iter()
        .map(|row| {
            let mut current = Vec::new();
            let mut original = Vec::new();
            for role in by_record.remove(&row.id).unwrap_or_default() {
                let entry = MatchingRole {
                    faculty: FacultyId(role.faculty_id),
                    role: parse_role(&role.role)?,
                };
                if role.original {
                    original.push(entry);
                } else {
                    current.push(entry);
                }
            }
            Ok(MatchingRecord {
                selector: SelectorId(row.selector_id),
                config: ConfigId(row.config_id),
                period: from_column(row.submission_period)?,
                project: ProjectId(row.project_id),
                rank: row.rank.map(from_column).transpose()?,
                score: row.score,
                roles: current,
                original_project: ProjectId(row.original_project_id),
                original_roles: original,
            })
        })
        .collect()
}

pub async fn load_attempt(
    connection: &mut AsyncPgConnection,
    attempt: AttemptId,
) -> Result<MatchingAttemptRow, DatabaseError> {
    Ok(matching_attempts::table
        .find(attempt.0)
        .select(MatchingAttemptRow::as_select())
        .first(connection)
        .await?)
}

pub async fn load_records(
    connection: &mut AsyncPgConnection,
    attempt: AttemptId,
) -> Result<Vec<MatchingRecord>, DatabaseError> {
    let records = matching_records::table
        .filter(matching_records::attempt_id.eq(attempt.0))
        .order(matching_records::id)
        .select(MatchingRecordRow::as_select())
        .load(connection)
        .await?;
    let roles = matching_roles::table
        .inner_join(matching_records::table)
        .filter(matching_records::attempt_id.eq(attempt.0))
        .order(matching_roles::id)
        .select(MatchingRoleRow::as_select())
        .load(connection)
        .await?;
    assemble_records(records, roles)
}

/// Record a progress milestone; never moves the stored progress backwards.
pub async fn set_progress(
    connection: &mut AsyncPgConnection,
    attempt: AttemptId,
    percent: u8,
    message: &str,
) -> Result<(), DatabaseError> {
    let percent = i16::from(percent.min(100));
    diesel::update(
        matching_attempts::table
            .find(attempt.0)
            .filter(matching_attempts::progress.le(percent)),
    )
    .set((
        matching_attempts::progress.eq(percent),
        matching_attempts::progress_message.eq(message),
    ))
    .execute(connection)
    .await?;
    Ok(())
}

pub async fn save_snapshot(
    connection: &mut AsyncPgConnection,
    attempt: AttemptId,
    snapshot: &EnumerationSnapshot,
) -> Result<(), DatabaseError> {
    diesel::update(matching_attempts::table.find(attempt.0))
        .set(matching_attempts::enumeration_snapshot.eq(serde_json::to_string(snapshot)?))
        .execute(connection)
        .await?;
    Ok(())
}

/// Close an attempt whose run aborted, without touching its records.
pub async fn mark_failed(
    connection: &mut AsyncPgConnection,
    attempt: AttemptId,
    message: &str,
) -> Result<(), DatabaseError> {
    let mut lifecycle = AttemptLifecycle::default();
    lifecycle.fail();
    diesel::update(matching_attempts::table.find(attempt.0))
        .set((
            matching_attempts::finished.eq(lifecycle.finished),
            matching_attempts::task_finished.eq(lifecycle.task_finished),
            matching_attempts::outcome.eq(lifecycle.outcome.map(Outcome::as_str)),
            matching_attempts::progress_message.eq(message),
        ))
        .execute(connection)
        .await?;
    info!(attempt = %attempt, "marked matching attempt as failed");
    Ok(())
}

/// Replace the attempt's records and close it, all in one transaction.
pub async fn store_matching_outcome(
    connection: &mut AsyncPgConnection,
    attempt: AttemptId,
    outcome: &MatchingOutcome,
) -> Result<(), DatabaseError> {
    let records = outcome
        .records
        .iter()
        .map(|record| Ok((NewMatchingRecord::new(attempt, record)?, record)))
        .collect::<Result<Vec<_>, DatabaseError>>()?;
    let finished = FinishedMatching {
        finished: true,
        task_finished: true,
        outcome: Some(Outcome::from(outcome.status).as_str()),
        score: outcome.score,
        construct_time: Some(outcome.construct_time.as_secs_f64()),
        compute_time: Some(outcome.compute_time.as_secs_f64()),
        progress: 100,
        progress_message: Some("Matching complete"),
        enumeration_snapshot: Some(serde_json::to_string(&outcome.snapshot)?),
    };

    connection
        .transaction::<_, DatabaseError, _>(|connection| {
            async move {
                let stale = matching_records::table
                    .filter(matching_records::attempt_id.eq(attempt.0))
                    .select(matching_records::id);
                diesel::delete(matching_roles::table.filter(matching_roles::record_id.eq_any(stale)))
                    .execute(connection)
                    .await?;
                diesel::delete(matching_records::table.filter(matching_records::attempt_id.eq(attempt.0)))
                    .execute(connection)
                    .await?;

                for (row, record) in &records {
                    let id: i32 = diesel::insert_into(matching_records::table)
                        .values(row)
                        .returning(matching_records::id)
                        .get_result(connection)
                        .await?;
                    let roles = role_rows(id, record);
                    if !roles.is_empty() {
                        diesel::insert_into(matching_roles::table)
                            .values(roles)
                            .execute(connection)
                            .await?;
                    }
                }

                diesel::update(matching_attempts::table.find(attempt.0))
                    .set(&finished)
                    .execute(connection)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;
    debug!(attempt = %attempt, records = outcome.records.len(), "stored matching outcome");
    Ok(())
}
