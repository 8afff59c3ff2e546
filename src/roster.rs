use rusqlite::{Connection, OptionalExtension};

use crate::attend::{AttendanceRecord, CoreError, CourseRef, LevelRef, Session, Student, UnitRef};

/// Read side of the attendance pipeline: enrollment roster plus the
/// reference-entity lookups handlers resolve before calling the pure
/// core. All functions are read-only.

pub fn course_exists(conn: &Connection, course_id: &str) -> Result<bool, CoreError> {
    conn.query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(CoreError::db_query)
}

pub fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, CoreError> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(CoreError::db_query)
}

/// Enrolled students for a course, in the enrollment store's order.
/// Callers must not read meaning into that order beyond stability.
pub fn resolve_roster(conn: &Connection, course_id: &str) -> Result<Vec<Student>, CoreError> {
    if !course_exists(conn, course_id)? {
        return Err(CoreError::not_found("course not found"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.student_no, s.last_name, s.first_name, s.email
             FROM enrollments e
             JOIN students s ON s.id = e.student_id
             WHERE e.course_id = ?
             ORDER BY e.sort_order, s.rowid",
        )
        .map_err(CoreError::db_query)?;
    stmt.query_map([course_id], |r| {
        let last: String = r.get(2)?;
        let first: String = r.get(3)?;
        Ok(Student {
            id: r.get(0)?,
            student_no: r.get(1)?,
            display_name: format!("{}, {}", last, first),
            email: r.get(4)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(CoreError::db_query)
}

pub fn load_session(conn: &Connection, session_id: &str) -> Result<Session, CoreError> {
    conn.query_row(
        "SELECT id, unit_id, starts_at, ends_at, location, active
         FROM sessions
         WHERE id = ?",
        [session_id],
        |r| {
            Ok(Session {
                id: r.get(0)?,
                unit_id: r.get(1)?,
                starts_at: r.get(2)?,
                ends_at: r.get(3)?,
                location: r.get(4)?,
                active: r.get::<_, i64>(5)? != 0,
            })
        },
    )
    .optional()
    .map_err(CoreError::db_query)?
    .ok_or_else(|| CoreError::not_found("session not found"))
}

/// The session's academic ancestry: unit, owning course, owning level.
pub fn load_session_refs(
    conn: &Connection,
    session: &Session,
) -> Result<(UnitRef, CourseRef, LevelRef), CoreError> {
    conn.query_row(
        "SELECT u.id, u.code, u.name,
                c.id, c.code, c.name,
                l.id, l.name
         FROM units u
         JOIN courses c ON c.id = u.course_id
         JOIN levels l ON l.id = c.level_id
         WHERE u.id = ?",
        [&session.unit_id],
        |r| {
            Ok((
                UnitRef {
                    id: r.get(0)?,
                    code: r.get(1)?,
                    name: r.get(2)?,
                },
                CourseRef {
                    id: r.get(3)?,
                    code: r.get(4)?,
                    name: r.get(5)?,
                },
                LevelRef {
                    id: r.get(6)?,
                    name: r.get(7)?,
                },
            ))
        },
    )
    .optional()
    .map_err(CoreError::db_query)?
    .ok_or_else(|| CoreError::not_found("unit not found for session"))
}

/// Roster for a session, resolved through its unit's course.
pub fn resolve_roster_for_session(
    conn: &Connection,
    session: &Session,
) -> Result<Vec<Student>, CoreError> {
    let course_id: Option<String> = conn
        .query_row(
            "SELECT course_id FROM units WHERE id = ?",
            [&session.unit_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(CoreError::db_query)?;
    let Some(course_id) = course_id else {
        return Err(CoreError::not_found("unit not found for session"));
    };
    resolve_roster(conn, &course_id)
}

pub fn load_attendance_records(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<AttendanceRecord>, CoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, session_id, student_id, is_present,
                    marked_by_self, marked_by_teacher, marked_at
             FROM attendance_records
             WHERE session_id = ?",
        )
        .map_err(CoreError::db_query)?;
    stmt.query_map([session_id], |r| {
        Ok(AttendanceRecord {
            id: r.get(0)?,
            session_id: r.get(1)?,
            student_id: r.get(2)?,
            is_present: r.get::<_, i64>(3)? != 0,
            marked_by_self: r.get::<_, i64>(4)? != 0,
            marked_by_teacher: r.get::<_, i64>(5)? != 0,
            marked_at: r.get(6)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(CoreError::db_query)
}
