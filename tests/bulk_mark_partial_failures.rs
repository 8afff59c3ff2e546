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
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "request {} failed: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

fn seed_session_with_two_students(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> (String, Vec<String>) {
    let _ = request_ok(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let level = request_ok(stdin, reader, "s2", "levels.create", json!({ "name": "Year 1" }));
    let course = request_ok(
        stdin,
        reader,
        "s3",
        "courses.create",
        json!({ "levelId": level["levelId"], "code": "MAT100", "name": "Mathematics" }),
    );
    let unit = request_ok(
        stdin,
        reader,
        "s4",
        "units.create",
        json!({ "courseId": course["courseId"], "code": "MAT100.1", "name": "Calculus" }),
    );
    let mut student_ids = Vec::new();
    for (i, (last, first)) in [("Wanjiru", "Grace"), ("Otieno", "Paul")].iter().enumerate() {
        let student = request_ok(
            stdin,
            reader,
            &format!("s5-{}", i),
            "students.create",
            json!({
                "studentNo": format!("CT-{:03}", 300 + i),
                "lastName": last,
                "firstName": first
            }),
        );
        let student_id = student["studentId"].as_str().expect("studentId").to_string();
        let _ = request_ok(
            stdin,
            reader,
            &format!("s6-{}", i),
            "enrollments.add",
            json!({ "courseId": course["courseId"], "studentId": student_id, "sortOrder": i }),
        );
        student_ids.push(student_id);
    }
    let session = request_ok(
        stdin,
        reader,
        "s7",
        "sessions.create",
        json!({
            "unitId": unit["unitId"],
            "startsAt": "2026-03-04T08:00:00Z",
            "endsAt": "2026-03-04T10:00:00Z"
        }),
    );
    (
        session["sessionId"].as_str().expect("sessionId").to_string(),
        student_ids,
    )
}

#[test]
fn bulk_mark_keeps_going_past_a_bad_id() {
    let workspace = temp_dir("rollcall-bulk-partial");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (session_id, student_ids) =
        seed_session_with_two_students(&mut stdin, &mut reader, &workspace);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.bulkMark",
        json!({
            "sessionId": session_id,
            "studentIds": [student_ids[0], "ghost-student", student_ids[1]],
            "isPresent": true,
            "markedBy": "teacher",
            "now": "2026-03-04T08:05:00Z"
        }),
    );

    let marked = result["marked"].as_array().expect("marked");
    assert_eq!(marked.len(), 2);
    for record in marked {
        assert_eq!(record["isPresent"].as_bool(), Some(true));
        assert_eq!(record["markedByTeacher"].as_bool(), Some(true));
        assert_eq!(record["markedAt"].as_str(), Some("2026-03-04T08:05:00Z"));
    }

    let failed = result["failed"].as_array().expect("failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["studentId"].as_str(), Some("ghost-student"));
    assert_eq!(failed[0]["code"].as_str(), Some("not_found"));

    // The good marks landed despite the bad id.
    let open = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.sessionOpen",
        json!({ "sessionId": session_id, "now": "2026-03-04T09:00:00Z" }),
    );
    let entries = open["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e["isPresent"].as_bool() == Some(true)));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bulk_mark_with_no_ids_is_an_empty_outcome() {
    let workspace = temp_dir("rollcall-bulk-empty");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (session_id, _ids) = seed_session_with_two_students(&mut stdin, &mut reader, &workspace);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.bulkMark",
        json!({
            "sessionId": session_id,
            "studentIds": [],
            "isPresent": false,
            "markedBy": "teacher"
        }),
    );
    assert_eq!(result["marked"].as_array().map(|a| a.len()), Some(0));
    assert_eq!(result["failed"].as_array().map(|a| a.len()), Some(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bulk_mark_against_a_missing_session_writes_nothing() {
    let workspace = temp_dir("rollcall-bulk-missing");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (_session_id, student_ids) =
        seed_session_with_two_students(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.bulkMark",
        json!({
            "sessionId": "no-such-session",
            "studentIds": [student_ids[0]],
            "isPresent": true,
            "markedBy": "teacher"
        }),
    );
    assert_eq!(resp["ok"].as_bool(), Some(false));
    assert_eq!(resp["error"]["code"].as_str(), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
