use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::attend::Session;
use crate::ipc::error::{core_err, err, ok};
use crate::ipc::handlers::{db_conn, get_optional_str, get_required_bool, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use crate::schedule;

/// Callers may pin `now` (RFC 3339) so classification is reproducible;
/// absent, the wall clock is used.
pub fn effective_now(req: &Request) -> Result<chrono::DateTime<Utc>, serde_json::Value> {
    match req.params.get("now").and_then(|v| v.as_str()) {
        Some(raw) => schedule::parse_instant(raw, "now").map_err(|e| core_err(&req.id, e)),
        None => Ok(Utc::now()),
    }
}

/// Session JSON plus its computed state and signed countdowns.
pub fn session_with_state(
    session: &Session,
    now: chrono::DateTime<Utc>,
) -> Result<serde_json::Value, crate::attend::CoreError> {
    let (start, end) = schedule::session_window(session)?;
    let state = schedule::classify(start, end, now);
    let mut v = serde_json::to_value(session).unwrap_or_else(|_| json!({}));
    if let Some(obj) = v.as_object_mut() {
        obj.insert("state".to_string(), json!(state.as_str()));
        obj.insert(
            "secondsUntilStart".to_string(),
            json!(schedule::time_until_start(start, now).num_seconds()),
        );
        obj.insert(
            "secondsRemaining".to_string(),
            json!(schedule::time_remaining(end, now).num_seconds()),
        );
    }
    Ok(v)
}

fn handle_sessions_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let unit_id = match get_required_str(req, "unitId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let starts_at = match get_required_str(req, "startsAt") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ends_at = match get_required_str(req, "endsAt") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let location = get_optional_str(req, "location").unwrap_or_else(|| "TBD".to_string());

    // Window invariant holds before anything touches the store.
    let candidate = Session {
        id: String::new(),
        unit_id: unit_id.clone(),
        starts_at: starts_at.clone(),
        ends_at: ends_at.clone(),
        location: location.clone(),
        active: true,
    };
    if let Err(e) = schedule::session_window(&candidate) {
        return core_err(&req.id, e);
    }

    let unit_found = match conn.query_row(
        "SELECT 1 FROM units WHERE id = ?",
        [&unit_id],
        |r| r.get::<_, i64>(0),
    ) {
        Ok(_) => true,
        Err(rusqlite::Error::QueryReturnedNoRows) => false,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !unit_found {
        return err(&req.id, "not_found", "unit not found", None);
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO sessions(id, unit_id, starts_at, ends_at, location, active)
         VALUES(?, ?, ?, ?, ?, 1)",
        (&id, &unit_id, &starts_at, &ends_at, &location),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "sessionId": id }))
}

fn handle_sessions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match effective_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let unit_filter = get_optional_str(req, "unitId");

    let mut stmt = match conn.prepare(
        "SELECT id, unit_id, starts_at, ends_at, location, active
         FROM sessions
         WHERE (?1 IS NULL OR unit_id = ?1)
         ORDER BY starts_at, id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let sessions = match stmt
        .query_map([&unit_filter], |r| {
            Ok(Session {
                id: r.get(0)?,
                unit_id: r.get(1)?,
                starts_at: r.get(2)?,
                ends_at: r.get(3)?,
                location: r.get(4)?,
                active: r.get::<_, i64>(5)? != 0,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut rows = Vec::with_capacity(sessions.len());
    for s in &sessions {
        match session_with_state(s, now) {
            Ok(v) => rows.push(v),
            Err(e) => return core_err(&req.id, e),
        }
    }
    ok(&req.id, json!({ "sessions": rows }))
}

fn handle_sessions_set_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session_id = match get_required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let active = match get_required_bool(req, "active") {
        Ok(v) => v,
        Err(e) => return e,
    };

    if let Err(e) = roster::load_session(conn, &session_id) {
        return core_err(&req.id, e);
    }
    if let Err(e) = conn.execute(
        "UPDATE sessions SET active = ? WHERE id = ?",
        (active as i64, &session_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sessions.create" => Some(handle_sessions_create(state, req)),
        "sessions.list" => Some(handle_sessions_list(state, req)),
        "sessions.setActive" => Some(handle_sessions_set_active(state, req)),
        _ => None,
    }
}
