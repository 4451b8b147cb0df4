//! End-to-end store scenarios.
//!
//! Each test drives the store exactly as the application does: create an
//! account, log in, register the clinical models, and work the collection
//! APIs against a real (temporary) data directory.

use std::time::Duration;

use serde_json::{json, Value};
use ward_store::{StoreError, StoreEvent};
use ward_tests::{init_tracing, TestStore};

fn ada_client_file() -> Value {
    json!({
        "clientName": {"first": "Ada", "middle": "", "last": "Lovelace"},
        "recordId": "R-1",
        "plan": {"sections": []},
    })
}

/// Collects the plain files (revision blobs) inside an object directory.
fn revision_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().unwrap().is_file())
        .map(|e| e.path())
        .collect()
}

#[tokio::test]
async fn test_create_and_list_client_file() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");

    let created = client_files.create(ada_client_file()).await.unwrap();
    assert!(created["id"].is_string());
    assert!(created["revisionId"].is_string());
    assert!(created["timestamp"].is_string());
    assert_eq!(created["author"], json!("admin"));

    let entries = client_files.list(&[]).await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.id.to_base64url(), created["id"].as_str().unwrap());
    assert_eq!(entry.field("clientName.first"), Some(&json!("Ada")));
    assert_eq!(entry.field("clientName.last"), Some(&json!("Lovelace")));
    assert_eq!(entry.field("recordId"), Some(&json!("R-1")));
}

#[tokio::test]
async fn test_create_rejects_preset_metadata() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");

    let mut payload = ada_client_file();
    payload["id"] = json!("preset");
    let err = client_files.create(payload).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn test_revision_changes_index_and_renames_directory() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");

    let created = client_files.create(ada_client_file()).await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    let old_dir = client_files.list(&[]).await.unwrap()[0].dir_path.clone();

    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut updated = created.clone();
    updated["clientName"]["last"] = json!("Byron");
    let revised = client_files.create_revision(updated).await.unwrap();
    assert_eq!(revised["id"].as_str().unwrap(), id);
    assert_ne!(revised["revisionId"], created["revisionId"]);

    // the object directory was renamed to its new canonical name
    let entries = client_files.list(&[]).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].field("clientName.last"), Some(&json!("Byron")));
    assert_ne!(entries[0].dir_path, old_dir);
    assert!(!old_dir.exists());

    // two revisions, ascending, the newest being the one just written
    let revisions = client_files.list_revisions(&[], &id).await.unwrap();
    assert_eq!(revisions.len(), 2);
    assert!(revisions[0].timestamp < revisions[1].timestamp);
    assert_eq!(
        revisions[1].revision_id.to_base64url(),
        revised["revisionId"].as_str().unwrap()
    );

    // and the latest payload reads back as the revised object
    let latest = client_files
        .read_latest_revisions(&[], &id, 1)
        .await
        .unwrap();
    assert_eq!(latest, vec![revised]);
}

#[tokio::test]
async fn test_child_prog_note_nests_inside_client_file() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");
    let prog_notes = ts.collection("progNote");

    let chart = client_files.create(ada_client_file()).await.unwrap();
    let chart_id = chart["id"].as_str().unwrap().to_string();
    let chart_dir = client_files.list(&[]).await.unwrap()[0].dir_path.clone();

    let note = prog_notes
        .create(json!({
            "clientFileId": chart_id,
            "type": "basic",
            "status": "default",
            "notes": "hello",
            "backdate": "",
        }))
        .await
        .unwrap();

    // the note lives physically under the chart's progNotes subdirectory
    let entries = prog_notes.list(&[&chart_id]).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].id.to_base64url(),
        note["id"].as_str().unwrap()
    );
    assert!(entries[0].dir_path.starts_with(chart_dir.join("progNotes")));

    // round trip through the latest-revision reader
    let read_back = prog_notes
        .read_latest_revisions(&[&chart_id], note["id"].as_str().unwrap(), 1)
        .await
        .unwrap();
    assert_eq!(read_back, vec![note]);
}

#[tokio::test]
async fn test_prog_note_validation_requires_status() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");
    let prog_notes = ts.collection("progNote");

    let chart = client_files.create(ada_client_file()).await.unwrap();
    let err = prog_notes
        .create(json!({
            "clientFileId": chart["id"].as_str().unwrap(),
            "type": "basic",
            "notes": "hello",
            "backdate": "",
        }))
        .await
        .unwrap_err();
    match err {
        StoreError::Validation(message) => assert!(message.contains("status"), "{message}"),
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_immutable_prog_event_read_and_restrictions() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");
    let prog_events = ts.collection("progEvent");

    let chart = client_files.create(ada_client_file()).await.unwrap();
    let chart_id = chart["id"].as_str().unwrap().to_string();

    let event = prog_events
        .create(json!({
            "clientFileId": chart_id,
            "title": "Intake meeting",
            "startTimestamp": "2024-03-01T09:00:00.000Z",
            "endTimestamp": "2024-03-01T10:00:00.000Z",
        }))
        .await
        .unwrap();

    let read_back = prog_events
        .read(&[&chart_id], event["id"].as_str().unwrap())
        .await
        .unwrap();
    assert_eq!(read_back, event);

    // immutable collections do not take revisions
    let err = prog_events.create_revision(event.clone()).await.unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedOperation(_)));

    // mutable collections do not expose single-revision read
    let err = client_files.read(&[], &chart_id).await.unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedOperation(_)));
}

#[tokio::test]
async fn test_moved_ciphertext_is_detected() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");

    let a = client_files.create(ada_client_file()).await.unwrap();
    let b = client_files
        .create(json!({
            "clientName": {"first": "George", "middle": "", "last": "Byron"},
            "recordId": "R-2",
            "plan": {"sections": []},
        }))
        .await
        .unwrap();

    let entries = client_files.list(&[]).await.unwrap();
    let dir_of = |id: &Value| {
        entries
            .iter()
            .find(|e| e.id.to_base64url() == id.as_str().unwrap())
            .unwrap()
            .dir_path
            .clone()
    };
    let a_dir = dir_of(&a["id"]);
    let b_dir = dir_of(&b["id"]);

    // an attacker copies one of A's encrypted revisions into B's directory
    let stolen = revision_files(&a_dir).pop().unwrap();
    std::fs::copy(&stolen, b_dir.join(stolen.file_name().unwrap())).unwrap();

    let err = client_files
        .read_revisions(&[], b["id"].as_str().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)), "got {err:?}");
}

#[tokio::test]
async fn test_extra_revision_in_immutable_object_is_fatal() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");
    let prog_events = ts.collection("progEvent");

    let chart = client_files.create(ada_client_file()).await.unwrap();
    let chart_id = chart["id"].as_str().unwrap().to_string();

    let make_event = |title: &str| {
        json!({
            "clientFileId": chart_id,
            "title": title,
            "startTimestamp": "2024-03-01T09:00:00.000Z",
            "endTimestamp": "2024-03-01T10:00:00.000Z",
        })
    };
    let x = prog_events.create(make_event("X")).await.unwrap();
    let y = prog_events.create(make_event("Y")).await.unwrap();

    let entries = prog_events.list(&[&chart_id]).await.unwrap();
    let dir_of = |id: &Value| {
        entries
            .iter()
            .find(|e| e.id.to_base64url() == id.as_str().unwrap())
            .unwrap()
            .dir_path
            .clone()
    };
    let stolen = revision_files(&dir_of(&x["id"])).pop().unwrap();
    let y_dir = dir_of(&y["id"]);
    std::fs::copy(&stolen, y_dir.join(stolen.file_name().unwrap())).unwrap();

    let err = prog_events
        .read(&[&chart_id], y["id"].as_str().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)), "got {err:?}");
}

#[tokio::test]
async fn test_read_latest_revisions_zero_still_resolves() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");

    let chart = client_files.create(ada_client_file()).await.unwrap();
    let id = chart["id"].as_str().unwrap();

    // k = 0 on an existing object: empty result, no decryption needed
    let none = client_files.read_latest_revisions(&[], id, 0).await.unwrap();
    assert!(none.is_empty());

    // but a nonexistent object still errors, because the directory is
    // always resolved
    let err = client_files
        .read_latest_revisions(&[], "AAAAAAAAAAAAAAAAAAAAAA", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ObjectNotFound { .. }));
}

#[tokio::test]
async fn test_revision_history_accumulates() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");

    let mut current = client_files.create(ada_client_file()).await.unwrap();
    let id = current["id"].as_str().unwrap().to_string();

    for middle in ["Augusta", "King", "Noel"] {
        tokio::time::sleep(Duration::from_millis(5)).await;
        current["clientName"]["middle"] = json!(middle);
        current = client_files.create_revision(current).await.unwrap();
    }

    let revisions = client_files.list_revisions(&[], &id).await.unwrap();
    assert_eq!(revisions.len(), 4);
    for pair in revisions.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }

    let all = client_files.read_revisions(&[], &id).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all.last().unwrap(), &current);
    assert_eq!(all[0]["clientName"]["middle"], json!(""));

    let last_two = client_files
        .read_latest_revisions(&[], &id, 2)
        .await
        .unwrap();
    assert_eq!(last_two.len(), 2);
    assert_eq!(last_two[1], current);
}

#[tokio::test]
async fn test_events_are_emitted() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");
    let mut events = ts.session.bus().subscribe();

    let created = client_files.create(ada_client_file()).await.unwrap();
    match events.recv().await.unwrap() {
        StoreEvent::Created { model, object } => {
            assert_eq!(model, "clientFile");
            assert_eq!(object, created);
        }
        other => panic!("expected Created, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(5)).await;
    let mut updated = created.clone();
    updated["recordId"] = json!("R-9");
    let revised = client_files.create_revision(updated).await.unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(event.topic(), "createRevision:clientFile");
    match event {
        StoreEvent::RevisionCreated { object, .. } => assert_eq!(object, revised),
        other => panic!("expected RevisionCreated, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_does_not_require_payload_decryption() {
    init_tracing();
    let ts = TestStore::new().await.unwrap();
    let client_files = ts.collection("clientFile");

    let created = client_files.create(ada_client_file()).await.unwrap();
    let dir = client_files.list(&[]).await.unwrap()[0].dir_path.clone();

    // corrupt every revision payload; list still answers from names alone
    for file in revision_files(&dir) {
        std::fs::write(&file, b"garbage").unwrap();
    }
    let entries = client_files.list(&[]).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id.to_base64url(), created["id"].as_str().unwrap());

    // while any read path now fails authentication
    let err = client_files
        .read_revisions(&[], created["id"].as_str().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));
}
