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
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
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
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn seed_grade_sheets(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    let _ = request_ok(
        stdin,
        reader,
        "seed",
        "registry.import",
        json!({
            "students": [
                { "id": "s1", "studentNo": "23-001", "fullName": "Ana Santos", "status": "enrolled" },
                { "id": "s2", "studentNo": "23-002", "fullName": "Ben Reyes", "status": "enrolled" },
                { "id": "s3", "studentNo": "23-003", "fullName": "Carla Diaz", "status": "enrolled" },
                { "id": "s4", "studentNo": "23-004", "fullName": "Dario Lim", "status": "enrolled" }
            ],
            "courses": [
                { "id": "c1", "code": "CS101", "name": "Intro to Computing", "units": 3.0 },
                { "id": "c2", "code": "CS102", "name": "Data Structures", "units": 3.0 }
            ],
            "teacherAssignments": [
                { "id": "a1", "teacherName": "Prof. Cruz", "subjectId": "c1", "section": "A", "yearLevel": "1" },
                { "id": "a2", "teacherName": "Prof. Ramos", "subjectId": "c2" }
            ],
            "grades": [
                { "id": "g1", "studentId": "s1", "subjectId": "c1", "prelimGrade": 85.0,
                  "midtermGrade": 90.0, "section": "A", "yearLevel": "1st Year" },
                { "id": "g2", "studentId": "s2", "subjectId": "c1", "prelimGrade": 80.0,
                  "midtermGrade": 82.0, "finalGrade": 84.0, "isReleased": true,
                  "section": "A", "yearLevel": "1st Year" },
                { "id": "g3", "studentId": "s3", "subjectId": "c2", "prelimGrade": 75.0,
                  "midtermGrade": 78.0, "finalGrade": 81.0,
                  "section": "B", "yearLevel": "3rd Year" },
                { "id": "g4", "studentId": "s4", "subjectId": "c2",
                  "section": "B", "yearLevel": "Transferee" }
            ]
        }),
    );
}

#[test]
fn sheets_group_resolve_and_sort_deterministically() {
    let workspace = temp_dir("registrard-sheets");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_grade_sheets(&mut stdin, &mut reader);

    let result = request_ok(&mut stdin, &mut reader, "2", "grades.sheets", json!({}));
    let sheets = result
        .get("sheets")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("sheets array");
    assert_eq!(sheets.len(), 3);

    // Year ascending, then course code, with the Unknown bucket last.
    let order: Vec<(String, String, String)> = sheets
        .iter()
        .map(|s| {
            (
                s.get("yearLevel").and_then(|v| v.as_str()).unwrap().to_string(),
                s.get("courseCode").and_then(|v| v.as_str()).unwrap().to_string(),
                s.get("section").and_then(|v| v.as_str()).unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        order,
        vec![
            ("1".to_string(), "CS101".to_string(), "A".to_string()),
            ("3".to_string(), "CS102".to_string(), "B".to_string()),
            ("Unknown".to_string(), "CS102".to_string(), "B".to_string()),
        ]
    );

    let first = &sheets[0];
    // Composite (subject, section, year) hit.
    assert_eq!(first.get("teacher").and_then(|v| v.as_str()), Some("Prof. Cruz"));
    assert_eq!(
        first.get("teacherTier").and_then(|v| v.as_str()),
        Some("assigned")
    );
    assert_eq!(first.get("memberCount").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(first.get("hasIncomplete").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(first.get("allReleased").and_then(|v| v.as_bool()), Some(false));

    let members = first.get("members").and_then(|v| v.as_array()).unwrap();
    let ana = &members[0];
    assert_eq!(ana.get("studentName").and_then(|v| v.as_str()), Some("Ana Santos"));
    // Average of the two present components; the record is still incomplete.
    assert_eq!(ana.get("generalAverage").and_then(|v| v.as_f64()), Some(87.5));
    assert_eq!(ana.get("isComplete").and_then(|v| v.as_bool()), Some(false));
    let ben = &members[1];
    assert_eq!(ben.get("generalAverage").and_then(|v| v.as_f64()), Some(82.0));
    assert_eq!(ben.get("isComplete").and_then(|v| v.as_bool()), Some(true));

    // CS102 has no composite assignment; subject-only fallback applies.
    let second = &sheets[1];
    assert_eq!(second.get("teacher").and_then(|v| v.as_str()), Some("Prof. Ramos"));
    assert_eq!(
        second.get("teacherTier").and_then(|v| v.as_str()),
        Some("subjectFallback")
    );

    // All-null components mean no average at all.
    let unknown_bucket = &sheets[2];
    let dario = &unknown_bucket.get("members").and_then(|v| v.as_array()).unwrap()[0];
    assert!(dario.get("generalAverage").map(|v| v.is_null()).unwrap_or(false));

    // Grouping the same snapshot twice yields the same output.
    let result2 = request_ok(&mut stdin, &mut reader, "3", "grades.sheets", json!({}));
    assert_eq!(result, result2);
}

#[test]
fn empty_registrar_yields_empty_sheet_list() {
    let workspace = temp_dir("registrard-sheets-empty");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let result = request_ok(&mut stdin, &mut reader, "2", "grades.sheets", json!({}));
    let sheets = result
        .get("sheets")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("sheets array");
    assert!(sheets.is_empty());
}
