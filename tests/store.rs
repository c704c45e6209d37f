use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::json;

use daily_read::domain::ProjectRecord;
use daily_read::error::DailyReadError;
use daily_read::store::VersionedStore;

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("daily_read")).unwrap();
    (temp, root)
}

fn project(node: &str, id: &str) -> ProjectRecord {
    ProjectRecord::new(
        format!("{node}/2023/{id}.json"),
        Some(json!({"orderer": "dummy@dummy.se", "portal_id": id})),
    )
    .unwrap()
}

#[test]
fn init_is_idempotent() {
    let (_temp, root) = temp_root();
    VersionedStore::init(&root).unwrap();
    let store = VersionedStore::init(&root).unwrap();
    assert!(!store.has_changes().unwrap());
    assert!(store.pending_paths().unwrap().is_empty());
}

#[test]
fn dirty_repository_without_commits_is_refused() {
    let (_temp, root) = temp_root();
    fs::create_dir_all(root.as_std_path()).unwrap();
    git2::Repository::init(root.as_std_path()).unwrap();
    fs::write(root.join("stray.txt").as_std_path(), "left behind").unwrap();

    let err = VersionedStore::init(&root).err().unwrap();
    assert_matches!(err, DailyReadError::Consistency(_));
}

#[test]
fn data_location_that_is_a_file() {
    let (_temp, root) = temp_root();
    fs::write(root.as_std_path(), "not a directory").unwrap();
    let err = VersionedStore::init(&root).err().unwrap();
    assert_matches!(err, DailyReadError::Configuration(_));
}

#[test]
fn file_in_place_of_node_directory() {
    let (_temp, root) = temp_root();
    let store = VersionedStore::init(&root).unwrap();
    fs::create_dir_all(root.join("NGIS").as_std_path()).unwrap();
    fs::write(root.join("NGIS/2023").as_std_path(), "").unwrap();

    let err = store.write(&project("NGIS", "NGI1")).unwrap_err();
    assert_matches!(err, DailyReadError::Consistency(_));
}

#[test]
fn record_without_data_is_not_written() {
    let (_temp, root) = temp_root();
    let store = VersionedStore::init(&root).unwrap();
    let stub = ProjectRecord::from_path("NGIS/2023/NGI1.json").unwrap();
    assert_matches!(store.write(&stub), Err(DailyReadError::Validation(_)));
}

#[test]
fn new_projects_are_untracked_until_committed() {
    let (_temp, root) = temp_root();
    let store = VersionedStore::init(&root).unwrap();
    let records = [
        project("NGIS", "NGI1"),
        project("NGIS", "NGI2"),
        project("UGC", "UGC1"),
    ];
    for record in &records {
        store.write(record).unwrap();
    }
    assert_eq!(store.untracked_files().unwrap().len(), 3);
    assert!(store.staged_changes().unwrap().is_empty());

    for record in &records {
        store.stage(record).unwrap();
    }
    assert_eq!(store.staged_changes().unwrap().len(), 3);
    assert!(store.untracked_files().unwrap().is_empty());

    store.commit("three projects").unwrap();
    assert!(!store.has_changes().unwrap());
}

#[test]
fn written_json_is_stable() {
    let (_temp, root) = temp_root();
    let store = VersionedStore::init(&root).unwrap();
    let record = ProjectRecord::new(
        "NGIS/2023/NGI1.json",
        Some(json!({"zeta": 1, "orderer": "dummy@dummy.se", "alpha": [1, 2]})),
    )
    .unwrap();
    store.write(&record).unwrap();
    let first = fs::read_to_string(root.join("NGIS/2023/NGI1.json").as_std_path()).unwrap();
    store.write(&record).unwrap();
    let second = fs::read_to_string(root.join("NGIS/2023/NGI1.json").as_std_path()).unwrap();
    assert_eq!(first, second);
    assert!(first.find("alpha").unwrap() < first.find("zeta").unwrap());
}
