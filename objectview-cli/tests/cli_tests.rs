//! End-to-end tests for the objectview binary
//!
//! Each test writes its inputs to a temp dir, runs the binary and checks
//! the JSON it prints on stdout.

use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

fn objectview(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_objectview"))
        .args(args)
        .env_remove("RUST_LOG")
        .env("OBJECTVIEW_LOG_LEVEL", "error")
        .output()
        .expect("failed to run objectview")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "objectview failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

fn write(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, value.to_string()).unwrap();
    path
}

#[test]
fn test_replay_dump_and_changes() {
    let dir = TempDir::new().unwrap();
    let dump = write(&dir, "dump.json", &json!({"seq": 5, "a": {"x": 1}, "b": {"y": [1, 2]}}));
    let changes = write(
        &dir,
        "changes.json",
        &json!([
            {"type": "upd", "seq": 6, "_id": "a", "prop": "x", "val": 2},
            {"type": "ins", "seq": 7, "_id": "b", "prop": "y", "idx": 0, "val": 0},
            {"type": "ins", "seq": 8, "_id": "c", "prop": "z", "val": "new"}
        ]),
    );

    let output = objectview(&["replay", "--dump", dump.to_str().unwrap(), "--changes", changes.to_str().unwrap()]);
    let result = stdout_json(&output);

    assert_eq!(result["seq"], json!(8));
    assert_eq!(result["documents"]["a"], json!({"x": 2}));
    assert_eq!(result["documents"]["b"], json!({"y": [0, 1, 2]}));
    assert!(result["documents"]["c"].is_object());
}

#[test]
fn test_replay_gap_fails() {
    let dir = TempDir::new().unwrap();
    let dump = write(&dir, "dump.json", &json!({"seq": 5}));
    let changes = write(&dir, "changes.json", &json!({"type": "upd", "seq": 9, "_id": "a", "prop": "x", "val": 2}));

    let output = objectview(&["replay", "--dump", dump.to_str().unwrap(), "--changes", changes.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("received 9"));
}

#[test]
fn test_replay_skips_redelivered_change() {
    let dir = TempDir::new().unwrap();
    let dump = write(&dir, "dump.json", &json!({"seq": 1, "a": {"x": 0}}));
    let changes = write(
        &dir,
        "changes.json",
        &json!([
            {"type": "upd", "seq": 2, "_id": "a", "prop": "x", "val": 1},
            {"type": "upd", "seq": 2, "_id": "a", "prop": "x", "val": 99},
            {"type": "upd", "seq": 3, "_id": "a", "prop": "y", "val": 2}
        ]),
    );

    let output = objectview(&["replay", "--dump", dump.to_str().unwrap(), "--changes", changes.to_str().unwrap()]);
    let result = stdout_json(&output);
    assert_eq!(result["seq"], json!(3));
    assert_eq!(result["documents"]["a"], json!({"x": 1, "y": 2}));
}

#[test]
fn test_replay_merged_keeps_documents() {
    let dir = TempDir::new().unwrap();
    let dump = write(&dir, "dump.json", &json!({"seq": 1, "a": {"x": 0}}));
    let changes = write(&dir, "changes.json", &json!([]));

    let output = objectview(&[
        "replay",
        "--mode",
        "merged",
        "--dump",
        dump.to_str().unwrap(),
        "--changes",
        changes.to_str().unwrap(),
    ]);
    assert_eq!(stdout_json(&output)["documents"], json!({"a": {"x": 0}}));
}

#[test]
fn test_replay_detached_tracks_sequence_only() {
    let dir = TempDir::new().unwrap();
    let dump = write(&dir, "dump.json", &json!({"seq": 3, "a": {"x": 0}}));
    let changes = write(&dir, "changes.json", &json!({"type": "upd", "seq": 4, "_id": "a", "prop": "x", "val": 1}));

    let output = objectview(&[
        "replay",
        "--mode",
        "detached",
        "--dump",
        dump.to_str().unwrap(),
        "--changes",
        changes.to_str().unwrap(),
    ]);
    let result = stdout_json(&output);
    assert_eq!(result["seq"], json!(4));
    assert!(result["documents"].is_null());
}

#[test]
fn test_diff_commands() {
    let dir = TempDir::new().unwrap();
    let field_map = write(
        &dir,
        "map.json",
        &json!({"name": ["Name", [2], [3]], "groups": ["Member", [2], [3], [1]]}),
    );
    let old = write(&dir, "old.json", &json!({"name": "Bob", "groups": ["a", "b"]}));
    let new = write(&dir, "new.json", &json!({"name": "Bob", "groups": ["b", "c"]}));

    let result = stdout_json(&objectview(&[
        "diff",
        "--field-map",
        field_map.to_str().unwrap(),
        "--id",
        "t1",
        "--new",
        new.to_str().unwrap(),
        "--old",
        old.to_str().unwrap(),
    ]));

    assert_eq!(
        result,
        json!([
            {"property": "Member", "args": ["t1", "a"], "value": null},
            {"property": "Member", "args": ["t1", "c"], "value": true}
        ])
    );
}

#[test]
fn test_diff_without_old_sets_everything() {
    let dir = TempDir::new().unwrap();
    let field_map = write(&dir, "map.json", &json!({"name": ["Name", [2], [3]]}));
    let new = write(&dir, "new.json", &json!({"name": "Alice"}));

    let result = stdout_json(&objectview(&[
        "diff",
        "--field-map",
        field_map.to_str().unwrap(),
        "--id",
        "t1",
        "--new",
        new.to_str().unwrap(),
    ]));
    assert_eq!(result, json!([{"property": "Name", "args": ["t1"], "value": "Alice"}]));
}

#[test]
fn test_new_ids() {
    let result = stdout_json(&objectview(&["new-id", "UserDataModel::[Custom]Product", "-n", "3"]));
    let ids = result.as_array().unwrap();
    assert_eq!(ids.len(), 3);
    for id in ids {
        let id = id.as_str().unwrap();
        let (raw, type_name) = id.split_once(':').unwrap();
        assert_eq!(raw.len(), 27);
        assert_eq!(type_name, "UserDataModel::[Custom]Product");
    }
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn test_show_config_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("objectview.toml");
    std::fs::write(
        &path,
        r#"
[hub]
address = "http://hub.local:5000"
anonymous = true

[logging]
level = "error"
"#,
    )
    .unwrap();

    let result = stdout_json(&objectview(&["--config", path.to_str().unwrap(), "show-config"]));
    assert_eq!(result["hub"]["address"], json!("http://hub.local:5000"));
    assert_eq!(result["hub"]["anonymous"], json!(true));
    assert_eq!(result["sync"]["command_capacity"], json!(64));
}

#[test]
fn test_missing_input_fails() {
    let output = objectview(&["replay", "--dump", "/nonexistent/dump.json", "--changes", "/nonexistent/changes.json"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("reading"));
}
