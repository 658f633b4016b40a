//! Integration tests for enrollment.

use std::path::Path;

use visionq::enroll::{discover, enroll};
use visionq::error::Error;
use visionq::event::{NullObserver, RecordingObserver, RunEvent};
use visionq::storage::Storage;

fn exts() -> Vec<String> {
    vec!["jpg".to_string(), "jpeg".to_string()]
}

fn touch(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), b"x").unwrap();
}

#[test]
fn discover_matches_extensions_case_insensitively() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.JPG", "a.jpeg", "c.png", "notes.txt", "noext"] {
        touch(dir.path(), name);
    }
    std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();
    touch(&dir.path().join("nested.jpg"), "inner.jpg");

    let files = discover(dir.path(), &exts()).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap())
        .collect();

    assert_eq!(names, vec!["a.jpeg", "b.JPG"]);
}

#[test]
fn discover_accepts_dotted_extensions() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "photo.PNG");

    let files = discover(dir.path(), &[".png".to_string()]).unwrap();
    assert_eq!(files.len(), 1);
}

#[test]
fn discover_missing_directory_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = discover(&dir.path().join("missing"), &exts()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn enroll_adds_one_row_per_file() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["photo1.jpg", "photo2.jpg", "photo3.jpeg", "skip.gif"] {
        touch(dir.path(), name);
    }
    let storage = Storage::in_memory().await.unwrap();
    let observer = RecordingObserver::new();

    let report = enroll(dir.path(), &exts(), &storage, &observer).await.unwrap();

    assert_eq!(report.discovered, 3);
    assert_eq!(report.enrolled, 3);
    assert!(!report.skipped_gate);
    let pending = storage.fetch_pending().await.unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending[0].source_path.ends_with("photo1.jpg"));
    assert_eq!(
        observer.events(),
        vec![RunEvent::Enrolled {
            discovered: 3,
            enrolled: 3
        }]
    );
}

#[tokio::test]
async fn pending_items_close_the_gate() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "photo1.jpg");
    touch(dir.path(), "photo2.jpg");
    let storage = Storage::in_memory().await.unwrap();
    enroll(dir.path(), &exts(), &storage, &NullObserver)
        .await
        .unwrap();

    // New files arrive while the queue is still draining.
    touch(dir.path(), "photo3.jpg");
    let observer = RecordingObserver::new();
    let report = enroll(dir.path(), &exts(), &storage, &observer).await.unwrap();

    assert!(report.skipped_gate);
    assert_eq!(report.enrolled, 0);
    assert_eq!(storage.count_pending().await.unwrap(), 2);
    assert_eq!(
        observer.events(),
        vec![RunEvent::EnrollmentSkipped { pending: 2 }]
    );
}

#[tokio::test]
async fn gate_holds_with_single_pending_item() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "photo1.jpg");
    touch(dir.path(), "photo2.jpg");
    let storage = Storage::in_memory().await.unwrap();
    let ids: Vec<_> = {
        enroll(dir.path(), &exts(), &storage, &NullObserver)
            .await
            .unwrap();
        storage
            .fetch_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect()
    };
    storage.mark_succeeded(ids[0]).await.unwrap();

    let report = enroll(dir.path(), &exts(), &storage, &NullObserver)
        .await
        .unwrap();

    assert!(report.skipped_gate);
    assert_eq!(storage.status_counts().await.unwrap().total(), 2);
}

#[tokio::test]
async fn drained_queue_reenrolls_directory_contents() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "photo1.jpg");
    let storage = Storage::in_memory().await.unwrap();
    enroll(dir.path(), &exts(), &storage, &NullObserver)
        .await
        .unwrap();
    let first = storage.fetch_pending().await.unwrap();
    storage.mark_succeeded(first[0].id).await.unwrap();

    // No duplicate detection against terminal rows: the gate is the only guard.
    let report = enroll(dir.path(), &exts(), &storage, &NullObserver)
        .await
        .unwrap();

    assert_eq!(report.enrolled, 1);
    let counts = storage.status_counts().await.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.succeeded, 1);
}
