use crate::ipc::error::{core_err, err, ok};
use crate::ipc::handlers::{db_conn, get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_no = match get_required_str(req, "studentNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let last_name = match get_required_str(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = match get_required_str(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let email = get_optional_str(req, "email");
    let sort_order = req
        .params
        .get("sortOrder")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, student_no, last_name, first_name, email, sort_order)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &student_no, &last_name, &first_name, &email, sort_order),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "studentId": id }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT id, student_no, last_name, first_name, email, sort_order
         FROM students
         ORDER BY sort_order, last_name, first_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = match stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let student_no: String = r.get(1)?;
            let last: String = r.get(2)?;
            let first: String = r.get(3)?;
            let email: Option<String> = r.get(4)?;
            let sort_order: i64 = r.get(5)?;
            Ok(json!({
                "id": id,
                "studentNo": student_no,
                "displayName": format!("{}, {}", last, first),
                "email": email,
                "sortOrder": sort_order
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "students": rows }))
}

fn handle_enrollments_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match get_required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match get_required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let sort_order = req
        .params
        .get("sortOrder")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    match roster::course_exists(conn, &course_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return core_err(&req.id, e),
    }
    match roster::student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return core_err(&req.id, e),
    }

    // Re-enrolling an existing pair just refreshes its roster position.
    if let Err(e) = conn.execute(
        "INSERT INTO enrollments(course_id, student_id, sort_order)
         VALUES(?, ?, ?)
         ON CONFLICT(course_id, student_id) DO UPDATE SET
           sort_order = excluded.sort_order",
        (&course_id, &student_id, sort_order),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_enrollments_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match get_required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match get_required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let existing = match conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE course_id = ? AND student_id = ?",
            (&course_id, &student_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !existing {
        return err(&req.id, "not_found", "enrollment not found", None);
    }

    if let Err(e) = conn.execute(
        "DELETE FROM enrollments WHERE course_id = ? AND student_id = ?",
        (&course_id, &student_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_roster_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match get_required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match roster::resolve_roster(conn, &course_id) {
        Ok(students) => {
            let count = students.len();
            ok(
                &req.id,
                json!({
                    "courseId": course_id,
                    "students": students,
                    "count": count
                }),
            )
        }
        Err(e) => core_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "enrollments.add" => Some(handle_enrollments_add(state, req)),
        "enrollments.remove" => Some(handle_enrollments_remove(state, req)),
        "roster.get" => Some(handle_roster_get(state, req)),
        _ => None,
    }
}
