#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with(&[])
}

pub fn spawn_sidecar_with(args: &[&str]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_analyticsd");
    let mut child = Command::new(exe)
        .args(args)
        .env_remove("ANALYTICSD_WORKSPACE")
        .env_remove("ANALYTICSD_NO_PRECOMPUTE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn analyticsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
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

pub fn request_ok(
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
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

/// Returns the error code.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Two classes of the same series, eight students, grades in two quarters, some attendance and
/// a few incidents.
pub fn sample_dataset() -> serde_json::Value {
    let mut students = Vec::new();
    let mut grades = Vec::new();
    let mut attendance = Vec::new();
    for (class_id, base) in [("c1", 8.0), ("c2", 5.0)] {
        for n in 0..4 {
            let student_id = format!("{}-s{}", class_id, n);
            students.push(json!({
                "id": student_id,
                "name": format!("Aluno {} {}", class_id, n),
                "classId": class_id,
                "status": "active"
            }));
            for (quarter, delta) in [("1º Bimestre", 0.0), ("2º Bimestre", 0.5)] {
                for subject in ["Matemática", "Língua Portuguesa"] {
                    grades.push(json!({
                        "id": format!("g-{}-{}-{}", student_id, quarter, subject),
                        "studentId": student_id,
                        "classId": class_id,
                        "subject": subject,
                        "quarter": quarter,
                        "schoolYear": 1,
                        "grade": base + delta - n as f64 * 0.5,
                        "recordedAt": "2025-04-01"
                    }));
                }
            }
            attendance.push(json!({
                "id": format!("a-{}", student_id),
                "studentId": student_id,
                "classId": class_id,
                "date": "2025-03-10",
                "status": if n == 3 { "falta" } else { "presente" },
                "recordedAt": "2025-03-10"
            }));
        }
    }
    json!({
        "students": students,
        "classes": [
            { "id": "c1", "name": "1º A", "series": "1º", "startCalendarYear": 2025 },
            { "id": "c2", "name": "1º B", "series": "1º", "startCalendarYear": 2025 }
        ],
        "grades": grades,
        "attendance": attendance,
        "incidents": [
            {
                "id": "i1", "date": "2025-03-12", "classId": "c2", "studentIds": ["c2-s3"],
                "finalSeverity": "grave", "status": "aberta"
            },
            {
                "id": "i2", "date": "2025-04-02", "classId": "c2", "studentIds": ["c2-s2", "c2-s3"],
                "finalSeverity": "leve", "status": "resolvida"
            }
        ]
    })
}
