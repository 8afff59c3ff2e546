use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::attend::{self, CoreError};
use crate::export;
use crate::ipc::error::{core_err, ok};
use crate::ipc::handlers::{db_conn, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::report::{assemble_report, ReportModel};
use crate::roster;
use crate::schedule;

/// Resolve the full pipeline for one session: roster, stored records,
/// reconciled view, reference headers, assembled model.
fn build_report(conn: &Connection, session_id: &str) -> Result<ReportModel, CoreError> {
    let session = roster::load_session(conn, session_id)?;
    let (unit, course, level) = roster::load_session_refs(conn, &session)?;
    let students = roster::resolve_roster_for_session(conn, &session)?;
    let records = roster::load_attendance_records(conn, session_id)?;
    let view = attend::reconcile(&students, &records, session_id);
    Ok(assemble_report(&view, &session, &unit, &course, &level))
}

fn generated_at(req: &Request) -> Result<DateTime<Utc>, serde_json::Value> {
    match req.params.get("generatedAt").and_then(|v| v.as_str()) {
        Some(raw) => {
            schedule::parse_instant(raw, "generatedAt").map_err(|e| core_err(&req.id, e))
        }
        None => Ok(Utc::now()),
    }
}

fn write_artifact(out_path: &str, bytes: &[u8]) -> Result<(), CoreError> {
    let path = Path::new(out_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            CoreError::export(format!(
                "failed to create directory {}: {}",
                parent.to_string_lossy(),
                e
            ))
        })?;
    }
    std::fs::write(path, bytes)
        .map_err(|e| CoreError::export(format!("failed to write {}: {}", out_path, e)))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn handle_session_attendance_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session_id = match get_required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match build_report(conn, &session_id) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => core_err(&req.id, e),
    }
}

fn handle_export(state: &mut AppState, req: &Request, document: bool) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session_id = match get_required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_path = match get_required_str(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let stamp = match generated_at(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let report = match build_report(conn, &session_id) {
        Ok(v) => v,
        Err(e) => return core_err(&req.id, e),
    };
    let (bytes, file_name) = match if document {
        export::export_document(&report, stamp)
            .and_then(|b| export::export_file_name(&report, "pdf").map(|n| (b, n)))
    } else {
        export::export_spreadsheet(&report, stamp)
            .and_then(|b| export::export_file_name(&report, "xlsx").map(|n| (b, n)))
    } {
        Ok(v) => v,
        Err(e) => return core_err(&req.id, e),
    };
    if let Err(e) = write_artifact(&out_path, &bytes) {
        return core_err(&req.id, e);
    }

    ok(
        &req.id,
        json!({
            "fileName": file_name,
            "outPath": out_path,
            "byteCount": bytes.len(),
            "sha256": sha256_hex(&bytes),
            "summary": report.summary
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.sessionAttendanceModel" => Some(handle_session_attendance_model(state, req)),
        "reports.exportSpreadsheet" => Some(handle_export(state, req, false)),
        "reports.exportDocument" => Some(handle_export(state, req, true)),
        _ => None,
    }
}
