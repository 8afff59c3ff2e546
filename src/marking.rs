use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::attend::{AttendanceRecord, CoreError, MarkedBy};
use crate::roster;

/// Write side of the pipeline. One row per (session, student) is the
/// storage invariant; every write is an upsert on that key, so a
/// second mark converges onto the same row instead of accumulating.

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkMarkFailure {
    pub student_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkMarkOutcome {
    pub marked: Vec<AttendanceRecord>,
    pub failed: Vec<BulkMarkFailure>,
}

pub fn mark_attendance(
    conn: &Connection,
    session_id: &str,
    student_id: &str,
    is_present: bool,
    marked_by: MarkedBy,
    now: DateTime<Utc>,
) -> Result<AttendanceRecord, CoreError> {
    session_must_exist(conn, session_id)?;
    if !roster::student_exists(conn, student_id)? {
        return Err(CoreError::not_found("student not found"));
    }
    upsert_record(conn, session_id, student_id, is_present, marked_by, now)
}

/// Marks each id independently and reports per-id outcomes; an id that
/// fails does not abort the rest, and already-applied marks stay
/// applied. A missing session fails the whole call before any write.
pub fn bulk_mark_all(
    conn: &Connection,
    session_id: &str,
    student_ids: &[String],
    is_present: bool,
    marked_by: MarkedBy,
    now: DateTime<Utc>,
) -> Result<BulkMarkOutcome, CoreError> {
    session_must_exist(conn, session_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| CoreError::new("db_tx_failed", e.to_string()))?;

    let mut marked = Vec::new();
    let mut failed = Vec::new();
    for student_id in student_ids {
        let outcome = if roster::student_exists(&tx, student_id)? {
            upsert_record(&tx, session_id, student_id, is_present, marked_by, now)
        } else {
            Err(CoreError::not_found("student not found"))
        };
        match outcome {
            Ok(record) => marked.push(record),
            Err(e) => failed.push(BulkMarkFailure {
                student_id: student_id.clone(),
                code: e.code,
                message: e.message,
            }),
        }
    }

    tx.commit()
        .map_err(|e| CoreError::new("db_commit_failed", e.to_string()))?;
    Ok(BulkMarkOutcome { marked, failed })
}

fn session_must_exist(conn: &Connection, session_id: &str) -> Result<(), CoreError> {
    let found = conn
        .query_row("SELECT 1 FROM sessions WHERE id = ?", [session_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(CoreError::db_query)?
        .is_some();
    if !found {
        return Err(CoreError::not_found("session not found"));
    }
    Ok(())
}

fn upsert_record(
    conn: &Connection,
    session_id: &str,
    student_id: &str,
    is_present: bool,
    marked_by: MarkedBy,
    now: DateTime<Utc>,
) -> Result<AttendanceRecord, CoreError> {
    let marked_at = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let marked_by_self = marked_by == MarkedBy::SelfMarked;
    let marked_by_teacher = marked_by == MarkedBy::Teacher;

    // A conflicting insert keeps the existing row id, so callers see a
    // stable record identity across rewrites.
    conn.execute(
        "INSERT INTO attendance_records(
            id, session_id, student_id, is_present,
            marked_by_self, marked_by_teacher, marked_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(session_id, student_id) DO UPDATE SET
           is_present = excluded.is_present,
           marked_by_self = excluded.marked_by_self,
           marked_by_teacher = excluded.marked_by_teacher,
           marked_at = excluded.marked_at",
        (
            Uuid::new_v4().to_string(),
            session_id,
            student_id,
            is_present as i64,
            marked_by_self as i64,
            marked_by_teacher as i64,
            &marked_at,
        ),
    )
    .map_err(CoreError::db_update)?;

    conn.query_row(
        "SELECT id, session_id, student_id, is_present,
                marked_by_self, marked_by_teacher, marked_at
         FROM attendance_records
         WHERE session_id = ? AND student_id = ?",
        (session_id, student_id),
        |r| {
            Ok(AttendanceRecord {
                id: r.get(0)?,
                session_id: r.get(1)?,
                student_id: r.get(2)?,
                is_present: r.get::<_, i64>(3)? != 0,
                marked_by_self: r.get::<_, i64>(4)? != 0,
                marked_by_teacher: r.get::<_, i64>(5)? != 0,
                marked_at: r.get(6)?,
            })
        },
    )
    .map_err(CoreError::db_query)
}
