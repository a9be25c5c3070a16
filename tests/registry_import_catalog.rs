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

#[test]
fn import_upserts_and_catalog_filters_by_department() {
    let workspace = temp_dir("registrard-import-catalog");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let counts = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "registry.import",
        json!({
            "programs": [
                { "id": "p1", "code": "BSCS", "name": "BS Computer Science", "department": "CCS" }
            ],
            "courses": [
                { "id": "c1", "code": "CS101", "name": "Intro to Computing", "department": "CCS", "units": 3.0 },
                { "id": "c2", "code": "GE01", "name": "Purposive Communication", "department": "GE", "units": 2.0 }
            ]
        }),
    );
    assert_eq!(counts.get("courses").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(counts.get("programs").and_then(|v| v.as_u64()), Some(1));

    let ccs = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "courses.list",
        json!({ "department": "CCS" }),
    );
    let ccs_rows = ccs.get("courses").and_then(|v| v.as_array()).cloned().unwrap();
    assert_eq!(ccs_rows.len(), 1);
    assert_eq!(
        ccs_rows[0].get("code").and_then(|v| v.as_str()),
        Some("CS101")
    );

    // Re-importing the same course id with changed fields updates in place.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "registry.import",
        json!({
            "courses": [
                { "id": "c1", "code": "CS101", "name": "Introduction to Computing", "department": "CCS", "units": 4.0 }
            ]
        }),
    );
    let all = request_ok(&mut stdin, &mut reader, "5", "courses.list", json!({}));
    let rows = all.get("courses").and_then(|v| v.as_array()).cloned().unwrap();
    assert_eq!(rows.len(), 2);
    let c1 = rows
        .iter()
        .find(|r| r.get("id").and_then(|v| v.as_str()) == Some("c1"))
        .unwrap();
    assert_eq!(c1.get("units").and_then(|v| v.as_f64()), Some(4.0));
    assert_eq!(
        c1.get("name").and_then(|v| v.as_str()),
        Some("Introduction to Computing")
    );

    let programs = request_ok(&mut stdin, &mut reader, "6", "programs.list", json!({}));
    assert_eq!(
        programs
            .get("programs")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let malformed = request(
        &mut stdin,
        &mut reader,
        "7",
        "registry.import",
        json!({ "courses": [{ "code": "no-id" }] }),
    );
    assert_eq!(
        malformed
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );
}
