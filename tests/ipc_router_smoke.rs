use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rollcalld");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rollcalld");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn result_str(resp: &serde_json::Value, key: &str) -> String {
    resp.get("result")
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing result.{} in {}", key, resp))
        .to_string()
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("rollcall-router-smoke");
    let xlsx_out = workspace.join("smoke-export.xlsx");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let level = request(
        &mut stdin,
        &mut reader,
        "3",
        "levels.create",
        json!({ "name": "Year 1", "sortOrder": 1 }),
    );
    let level_id = result_str(&level, "levelId");
    let _ = request(&mut stdin, &mut reader, "4", "levels.list", json!({}));

    let course = request(
        &mut stdin,
        &mut reader,
        "5",
        "courses.create",
        json!({ "levelId": level_id, "code": "CS101", "name": "Computer Science" }),
    );
    let course_id = result_str(&course, "courseId");
    let _ = request(&mut stdin, &mut reader, "6", "courses.list", json!({}));

    let unit = request(
        &mut stdin,
        &mut reader,
        "7",
        "units.create",
        json!({ "courseId": course_id, "code": "CS101.1", "name": "Intro Programming" }),
    );
    let unit_id = result_str(&unit, "unitId");
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "units.list",
        json!({ "courseId": course_id }),
    );

    let student = request(
        &mut stdin,
        &mut reader,
        "9",
        "students.create",
        json!({ "studentNo": "CT-001", "lastName": "Smoke", "firstName": "Student" }),
    );
    let student_id = result_str(&student, "studentId");
    let _ = request(&mut stdin, &mut reader, "10", "students.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "enrollments.add",
        json!({ "courseId": course_id, "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "roster.get",
        json!({ "courseId": course_id }),
    );

    let session = request(
        &mut stdin,
        &mut reader,
        "13",
        "sessions.create",
        json!({
            "unitId": unit_id,
            "startsAt": "2026-03-02T10:00:00Z",
            "endsAt": "2026-03-02T11:00:00Z",
            "location": "Lab 2"
        }),
    );
    let session_id = result_str(&session, "sessionId");
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "sessions.list",
        json!({ "unitId": unit_id, "now": "2026-03-02T10:30:00Z" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "sessions.setActive",
        json!({ "sessionId": session_id, "active": false }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "attendance.sessionOpen",
        json!({ "sessionId": session_id, "now": "2026-03-02T10:30:00Z" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "attendance.mark",
        json!({
            "sessionId": session_id,
            "studentId": student_id,
            "isPresent": true,
            "markedBy": "teacher"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "attendance.bulkMark",
        json!({
            "sessionId": session_id,
            "studentIds": [student_id],
            "isPresent": true,
            "markedBy": "teacher"
        }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "19",
        "reports.sessionAttendanceModel",
        json!({ "sessionId": session_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "reports.exportSpreadsheet",
        json!({
            "sessionId": session_id,
            "outPath": xlsx_out.to_string_lossy(),
            "generatedAt": "2026-03-02T12:00:00Z"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "21",
        "enrollments.remove",
        json!({ "courseId": course_id, "studentId": student_id }),
    );

    // Unknown methods still answer with a structured error.
    writeln!(
        stdin,
        "{}",
        json!({ "id": "22", "method": "timetable.dragDrop", "params": {} })
    )
    .expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let unknown: serde_json::Value =
        serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(unknown.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
