//! Filesystem storage tests against the listener's storage seam

use dimse::PayloadStore;
use radgate::storage::FilesystemStorage;
use tempfile::TempDir;

#[tokio::test]
async fn payload_store_writes_under_root() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage = FilesystemStorage::new(temp_dir.path()).expect("Failed to create storage");

    let path = storage
        .store("1.2.840.1.1.dcm", b"\x00payload")
        .await
        .expect("store payload");

    assert!(path.starts_with(temp_dir.path()));
    assert_eq!(std::fs::read(&path).unwrap(), b"\x00payload");
}

#[tokio::test]
async fn concurrent_stores_do_not_interfere() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage =
        std::sync::Arc::new(FilesystemStorage::new(temp_dir.path()).expect("create storage"));

    let mut handles = Vec::new();
    for i in 0..8 {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            let name = format!("1.2.{i}.dcm");
            storage.store(&name, name.as_bytes()).await.unwrap()
        }));
    }
    for handle in handles {
        let path = handle.await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(std::fs::read(&path).unwrap(), name.as_bytes());
    }
}
