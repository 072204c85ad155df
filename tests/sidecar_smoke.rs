mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn health_reports_version_and_workspace() {
    let workspace = temp_dir("analyticsd-health");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(
        health.get("version").and_then(|v| v.as_str()),
        Some(env!("CARGO_PKG_VERSION"))
    );
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected.get("cacheAvailable").and_then(|v| v.as_bool()), Some(true));
    assert!(workspace.join("analytics-cache.sqlite3").is_file());

    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(
        health.get("workspacePath").and_then(|v| v.as_str()),
        Some(workspace.to_string_lossy().as_ref())
    );
}

#[test]
fn unknown_methods_and_bad_params_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let code = request_err(&mut stdin, &mut reader, "1", "grades.open", json!({}));
    assert_eq!(code, "not_implemented");

    let code = request_err(&mut stdin, &mut reader, "2", "workspace.select", json!({}));
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "analytics.compute",
        json!({ "filters": { "schoolYear": "third" } }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "analytics.cache.delete",
        json!({}),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn malformed_line_gets_bad_json_and_the_session_continues() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_json")
    );

    let _ = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
}
