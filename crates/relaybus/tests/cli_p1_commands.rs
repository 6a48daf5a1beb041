#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::Command;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/relaybus-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn write_message_schema(dir: &Path) -> PathBuf {
    let schema_dir = dir.join("schemas");
    std::fs::create_dir_all(&schema_dir).expect("schema dir should be creatable");
    std::fs::write(
        schema_dir.join("message.schema.json"),
        r#"{
            "type": "object",
            "properties": {
                "message": { "type": "string" }
            },
            "required": ["message"]
        }"#,
    )
    .expect("schema file should be writable");
    schema_dir
}

#[test]
fn check_lists_registered_events() {
    let dir = unique_temp_dir("p1-list");
    let schema_dir = write_message_schema(&dir);

    let output = Command::new(env!("CARGO_BIN_EXE_relaybus"))
        .arg("--format")
        .arg("json")
        .arg("check")
        .arg("--schemas")
        .arg(&schema_dir)
        .output()
        .expect("check should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("schema-list.schema.json"));
    assert!(stdout.contains("\"message\""));
    assert!(stdout.contains("\"schema_count\":1"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn check_accepts_a_valid_payload() {
    let dir = unique_temp_dir("p1-valid");
    let schema_dir = write_message_schema(&dir);

    let output = Command::new(env!("CARGO_BIN_EXE_relaybus"))
        .arg("--format")
        .arg("json")
        .arg("check")
        .arg("--schemas")
        .arg(&schema_dir)
        .arg("--event")
        .arg("message")
        .arg("--payload")
        .arg(r#"{"message": "ok"}"#)
        .output()
        .expect("check should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"valid\":true"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn check_reports_violations_for_invalid_payload() {
    let dir = unique_temp_dir("p1-invalid");
    let schema_dir = write_message_schema(&dir);

    let output = Command::new(env!("CARGO_BIN_EXE_relaybus"))
        .arg("--format")
        .arg("json")
        .arg("check")
        .arg("--schemas")
        .arg(&schema_dir)
        .arg("--event")
        .arg("message")
        .arg("--payload")
        .arg(r#"{"message": 7}"#)
        .output()
        .expect("check should run");

    assert_eq!(output.status.code(), Some(60));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"valid\":false"));
    assert!(stdout.contains("/message"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn check_fails_on_unknown_event() {
    let dir = unique_temp_dir("p1-unknown");
    let schema_dir = write_message_schema(&dir);

    let output = Command::new(env!("CARGO_BIN_EXE_relaybus"))
        .arg("check")
        .arg("--schemas")
        .arg(&schema_dir)
        .arg("--event")
        .arg("ghost")
        .arg("--payload")
        .arg("{}")
        .output()
        .expect("check should run");

    assert_eq!(output.status.code(), Some(60));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn check_strict_mode_rejects_undeclared_properties() {
    let dir = unique_temp_dir("p1-strict");
    let schema_dir = write_message_schema(&dir);
    let payload = r#"{"message": "ok", "extra": 1}"#;

    let relaxed = Command::new(env!("CARGO_BIN_EXE_relaybus"))
        .arg("check")
        .arg("--schemas")
        .arg(&schema_dir)
        .arg("--event")
        .arg("message")
        .arg("--payload")
        .arg(payload)
        .output()
        .expect("check should run");
    assert!(relaxed.status.success());

    let strict = Command::new(env!("CARGO_BIN_EXE_relaybus"))
        .arg("check")
        .arg("--schemas")
        .arg(&schema_dir)
        .arg("--event")
        .arg("message")
        .arg("--payload")
        .arg(payload)
        .arg("--strict")
        .output()
        .expect("check should run");
    assert_eq!(strict.status.code(), Some(60));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_relaybus"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn version_extended_lists_features() {
    let output = Command::new(env!("CARGO_BIN_EXE_relaybus"))
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("features:"));
    assert!(stdout.contains("cli=true"));
}
