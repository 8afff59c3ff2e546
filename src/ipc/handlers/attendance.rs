use serde_json::json;

use crate::attend::{self, AttendanceEntry, MarkedBy};
use crate::ipc::error::{core_err, err, ok};
use crate::ipc::handlers::sessions::{effective_now, session_with_state};
use crate::ipc::handlers::{db_conn, get_required_bool, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::marking;
use crate::roster;

fn entry_json(entry: &AttendanceEntry) -> serde_json::Value {
    json!({
        "student": entry.student(),
        "recordId": entry.record_id(),
        "isPresent": entry.is_present(),
        "markedBySelf": entry.marked_by_self(),
        "markedByTeacher": entry.marked_by_teacher(),
        "markedAt": entry.marked_at(),
    })
}

fn parse_marked_by(req: &Request) -> Result<MarkedBy, serde_json::Value> {
    let tag = get_required_str(req, "markedBy")?;
    MarkedBy::parse(&tag).map_err(|e| core_err(&req.id, e))
}

fn handle_session_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session_id = match get_required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match effective_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let session = match roster::load_session(conn, &session_id) {
        Ok(v) => v,
        Err(e) => return core_err(&req.id, e),
    };
    let students = match roster::resolve_roster_for_session(conn, &session) {
        Ok(v) => v,
        Err(e) => return core_err(&req.id, e),
    };
    let records = match roster::load_attendance_records(conn, &session_id) {
        Ok(v) => v,
        Err(e) => return core_err(&req.id, e),
    };

    let view = attend::reconcile(&students, &records, &session_id);
    let session_json = match session_with_state(&session, now) {
        Ok(v) => v,
        Err(e) => return core_err(&req.id, e),
    };
    let entries: Vec<serde_json::Value> = view.entries.iter().map(entry_json).collect();

    ok(
        &req.id,
        json!({
            "session": session_json,
            "entries": entries,
            "rosterCount": entries.len()
        }),
    )
}

fn handle_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session_id = match get_required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match get_required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let is_present = match get_required_bool(req, "isPresent") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let marked_by = match parse_marked_by(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match effective_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match marking::mark_attendance(conn, &session_id, &student_id, is_present, marked_by, now) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => core_err(&req.id, e),
    }
}

fn handle_bulk_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session_id = match get_required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw_ids) = req.params.get("studentIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing studentIds", None);
    };
    let mut student_ids: Vec<String> = Vec::with_capacity(raw_ids.len());
    for v in raw_ids {
        let Some(s) = v.as_str() else {
            return err(&req.id, "bad_params", "studentIds must be strings", None);
        };
        student_ids.push(s.to_string());
    }
    let is_present = match get_required_bool(req, "isPresent") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let marked_by = match parse_marked_by(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match effective_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match marking::bulk_mark_all(conn, &session_id, &student_ids, is_present, marked_by, now) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "marked": outcome.marked,
                "failed": outcome.failed
            }),
        ),
        Err(e) => core_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.sessionOpen" => Some(handle_session_open(state, req)),
        "attendance.mark" => Some(handle_mark(state, req)),
        "attendance.bulkMark" => Some(handle_bulk_mark(state, req)),
        _ => None,
    }
}
