use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{db_conn, get_required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

/// Academic reference data: level -> course -> unit. Read-mostly; the
/// attendance core never mutates these beyond creation here.

fn handle_levels_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match get_required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let sort_order = req
        .params
        .get("sortOrder")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO levels(id, name, sort_order) VALUES(?, ?, ?)",
        (&id, &name, sort_order),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "levelId": id }))
}

fn handle_levels_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT id, name, sort_order,
                (SELECT COUNT(*) FROM courses c WHERE c.level_id = levels.id) AS course_count
         FROM levels
         ORDER BY sort_order, name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = match stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let sort_order: i64 = r.get(2)?;
            let course_count: i64 = r.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "sortOrder": sort_order,
                "courseCount": course_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "levels": rows }))
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level_id = match get_required_str(req, "levelId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let code = match get_required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match get_required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let level_found = match conn
        .query_row("SELECT 1 FROM levels WHERE id = ?", [&level_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !level_found {
        return err(&req.id, "not_found", "level not found", None);
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, level_id, code, name) VALUES(?, ?, ?, ?)",
        (&id, &level_id, &code, &name),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "courseId": id }))
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level_filter = req
        .params
        .get("levelId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let sql = "SELECT c.id, c.level_id, c.code, c.name,
                      (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS enrolled,
                      (SELECT COUNT(*) FROM units u WHERE u.course_id = c.id) AS unit_count
               FROM courses c
               WHERE (?1 IS NULL OR c.level_id = ?1)
               ORDER BY c.code";
    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = match stmt
        .query_map([&level_filter], |r| {
            let id: String = r.get(0)?;
            let level_id: String = r.get(1)?;
            let code: String = r.get(2)?;
            let name: String = r.get(3)?;
            let enrolled: i64 = r.get(4)?;
            let unit_count: i64 = r.get(5)?;
            Ok(json!({
                "id": id,
                "levelId": level_id,
                "code": code,
                "name": name,
                "enrolledCount": enrolled,
                "unitCount": unit_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "courses": rows }))
}

fn handle_units_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match get_required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let code = match get_required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match get_required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let course_found = match conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [&course_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !course_found {
        return err(&req.id, "not_found", "course not found", None);
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO units(id, course_id, code, name) VALUES(?, ?, ?, ?)",
        (&id, &course_id, &code, &name),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "unitId": id }))
}

fn handle_units_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_filter = req
        .params
        .get("courseId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let sql = "SELECT u.id, u.course_id, u.code, u.name,
                      (SELECT COUNT(*) FROM sessions s WHERE s.unit_id = u.id) AS session_count
               FROM units u
               WHERE (?1 IS NULL OR u.course_id = ?1)
               ORDER BY u.code";
    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = match stmt
        .query_map([&course_filter], |r| {
            let id: String = r.get(0)?;
            let course_id: String = r.get(1)?;
            let code: String = r.get(2)?;
            let name: String = r.get(3)?;
            let session_count: i64 = r.get(4)?;
            Ok(json!({
                "id": id,
                "courseId": course_id,
                "code": code,
                "name": name,
                "sessionCount": session_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "units": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "levels.create" => Some(handle_levels_create(state, req)),
        "levels.list" => Some(handle_levels_list(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.list" => Some(handle_courses_list(state, req)),
        "units.create" => Some(handle_units_create(state, req)),
        "units.list" => Some(handle_units_list(state, req)),
        _ => None,
    }
}
