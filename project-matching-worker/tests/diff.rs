use std::fs;
use std::path::Path;

use assert_matches::assert_matches;
use project_matching_database::get_database_connection;
use project_matching_worker::cli::{DiffArgs, SlotSource};
use project_matching_worker::error::WorkerError;
use project_matching_worker::tasks::run_diff;
use serde_json::{json, Value};

fn write(dir: &Path, name: &str, slots: &Value) -> SlotSource {
    let path = dir.join(name);
    fs::write(&path, slots.to_string()).unwrap();
    SlotSource::File(path)
}

// files never touch the pool, so it only has to be constructible
fn unused_pool() -> project_matching_database::DatabasePool {
    get_database_connection("postgres://localhost/unused").unwrap()
}

#[tokio::test]
async fn edited_slot_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let args = DiffArgs {
        old: write(
            dir.path(),
            "old.json",
            &json!([{ "session": 1, "room": 2, "assessors": [5], "talks": [7, 8] }]),
        ),
        new: write(
            dir.path(),
            "new.json",
            &json!([{ "session": 1, "room": 2, "assessors": [5, 6], "talks": [8, 7] }]),
        ),
    };

    let mut out = Vec::new();
    let changes = run_diff(&unused_pool(), &args, &mut out).await.unwrap();
    assert_eq!(changes, 1);

    let printed: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(printed[0]["operation"], "edit");
    assert_eq!(printed[0]["target"]["assessors"], json!([5, 6]));
}

#[tokio::test]
async fn identical_schedules_print_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let slots = json!([
        { "session": 1, "room": 2, "assessors": [5], "talks": [7] },
        { "session": 2, "room": 2, "assessors": [6], "talks": [9] },
    ]);
    let args = DiffArgs {
        old: write(dir.path(), "old.json", &slots),
        new: write(dir.path(), "new.json", &slots),
    };

    let mut out = Vec::new();
    assert_eq!(run_diff(&unused_pool(), &args, &mut out).await.unwrap(), 0);
    assert_eq!(String::from_utf8(out).unwrap().trim(), "[]");
}

#[tokio::test]
async fn unreadable_inputs_name_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let args = DiffArgs {
        old: write(dir.path(), "old.json", &json!({ "not": "slots" })),
        new: SlotSource::File(dir.path().join("missing.json")),
    };
    let error = run_diff(&unused_pool(), &args, &mut Vec::new()).await.unwrap_err();
    assert_matches!(&error, WorkerError::Parse { path, .. } if path.ends_with("old.json"));
    assert!(!error.is_retryable());

    let args = DiffArgs {
        old: write(dir.path(), "empty.json", &json!([])),
        new: SlotSource::File(dir.path().join("missing.json")),
    };
    let error = run_diff(&unused_pool(), &args, &mut Vec::new()).await.unwrap_err();
    assert_matches!(error, WorkerError::Read { .. });
}

#[tokio::test]
async fn duplicate_slots_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let slot = json!({ "session": 1, "room": 2, "assessors": [5], "talks": [7] });
    let args = DiffArgs {
        old: write(dir.path(), "old.json", &json!([slot.clone(), slot])),
        new: write(dir.path(), "new.json", &json!([])),
    };
    let error = run_diff(&unused_pool(), &args, &mut Vec::new()).await.unwrap_err();
    assert_matches!(error, WorkerError::Optimizer(_));
}
