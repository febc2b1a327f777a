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
    let exe = env!("CARGO_BIN_EXE_eduxeld");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn eduxeld");
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

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
}

#[test]
fn health_unknown_method_and_workspace_flow() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));
    let result = resp.get("result").expect("result");
    assert!(result.get("version").and_then(|v| v.as_str()).is_some());
    assert!(result
        .get("workspacePath")
        .map(|v| v.is_null())
        .unwrap_or(false));

    let resp = request(&mut stdin, &mut reader, "2", "timetable.frobnicate", json!({}));
    assert_eq!(error_code(&resp), "not_implemented");

    // Every surface refuses to run without a workspace.
    for (i, method) in ["timetable.weekOpen", "timetable.project", "roster.commit"]
        .iter()
        .enumerate()
    {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("nw{}", i),
            method,
            json!({}),
        );
        assert_eq!(error_code(&resp), "no_workspace", "method {}", method);
    }

    let resp = request(&mut stdin, &mut reader, "3", "workspace.select", json!({}));
    assert_eq!(error_code(&resp), "bad_params");

    // A fresh workspace (no seed file) opens empty.
    let workspace = temp_dir("eduxeld-smoke");
    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        resp.pointer("/result/scheduleEntries").and_then(|v| v.as_u64()),
        Some(0)
    );

    let resp = request(&mut stdin, &mut reader, "5", "timetable.weekOpen", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        resp.pointer("/result/entries")
            .and_then(|v| v.as_array())
            .map(Vec::len),
        Some(0)
    );

    let resp = request(&mut stdin, &mut reader, "6", "health", json!({}));
    assert_eq!(
        resp.pointer("/result/workspacePath").and_then(|v| v.as_str()),
        Some(workspace.to_string_lossy().as_ref())
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_seed_fails_workspace_select() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = temp_dir("eduxeld-smoke-badseed");
    std::fs::write(workspace.join("eduxel_seed.json"), "{not json").expect("write seed");

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "seed_load_failed");

    drop(stdin);
    let _ = child.wait();
}
