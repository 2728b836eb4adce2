#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use deepcheck_storage::accounts::{AccountError, AccountStore};
use deepcheck_storage::repo::AccountRepo;
use deepcheck_storage::snapshot::{FileSnapshot, MemorySnapshot, SnapshotBackend};

fn temp_base(name: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    std::env::temp_dir().join(format!("deepcheck-dbw-accounts-{name}-{suffix}"))
}

fn open_file_store(path: &PathBuf) -> AccountStore {
    let snap = FileSnapshot::open_or_init(path, b"{}").unwrap();
    AccountStore::open(Box::new(snap)).unwrap()
}

#[test]
fn at_accounts_db_01_file_roundtrip_preserves_accounts() {
    let base = temp_base("roundtrip");
    let path = base.join("results").join("users.json");

    let mut store = open_file_store(&path);
    store.create_account("alice", "pw1").unwrap();
    store.create_account("bob", "pw2").unwrap();
    drop(store);

    let reopened = open_file_store(&path);
    assert_eq!(reopened.len(), 2);
    assert!(reopened.authenticate("alice", "pw1"));
    assert!(reopened.authenticate("bob", "pw2"));
    assert!(!reopened.authenticate("alice", "pw2"));
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_accounts_db_02_snapshot_is_pretty_json_object_without_cleartext() {
    let base = temp_base("format");
    let path = base.join("users.json");
    let mut store = open_file_store(&path);
    store.create_account("alice", "TOP_SECRET_SENTINEL").unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.starts_with("{\n  \"alice\": \"sha256$"));
    assert!(!raw.contains("TOP_SECRET_SENTINEL"));
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(parsed.as_object().unwrap().contains_key("alice"));
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_accounts_db_03_duplicate_does_not_touch_persisted_snapshot() {
    let base = temp_base("duplicate");
    let path = base.join("users.json");
    let mut store = open_file_store(&path);
    store.create_account("alice", "pw1").unwrap();
    let before = fs::read(&path).unwrap();

    let err = store.create_account("alice", "other").unwrap_err();
    assert!(matches!(err, AccountError::DuplicateUsername(_)));
    assert_eq!(fs::read(&path).unwrap(), before);
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_accounts_db_04_repo_trait_create_then_authenticate_for_many_users() {
    let mut repo: Box<dyn AccountRepo> = Box::new(AccountStore::new_in_memory());
    for i in 0..20 {
        let name = format!("user_{i}");
        let pw = format!("pw-{i}");
        assert!(!repo.account_row_exists(&name));
        repo.insert_account_row(&name, &pw).unwrap();
        assert!(repo.authenticate_account_row(&name, &pw));
    }
    assert_eq!(repo.account_row_count(), 20);
}

#[test]
fn at_accounts_db_05_memory_backend_roundtrip() {
    let mut store = AccountStore::open(Box::new(MemorySnapshot::new())).unwrap();
    store.create_account("alice", "pw1").unwrap();
    let backend = store.into_backend();
    let bytes = backend.load().unwrap().unwrap();

    let reopened = AccountStore::open(Box::new(MemorySnapshot::with_bytes(bytes))).unwrap();
    assert_eq!(reopened.len(), 1);
    assert!(reopened.authenticate("alice", "pw1"));
}

#[test]
fn at_accounts_db_06_prototype_users_file_loads() {
    let base = temp_base("prototype");
    fs::create_dir_all(&base).unwrap();
    let path = base.join("users.json");
    fs::write(&path, "{\n  \"alice\": \"pw1\",\n  \"bob\": \"pw2\"\n}").unwrap();

    let mut store = open_file_store(&path);
    assert!(store.authenticate("alice", "pw1"));
    assert!(!store.authenticate("alice", "wrong"));

    store.create_account("carol", "pw3").unwrap();
    let reopened = open_file_store(&path);
    assert!(reopened.authenticate("bob", "pw2"));
    assert!(reopened.authenticate("carol", "pw3"));
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_accounts_db_07_corrupt_snapshot_fails_open() {
    let base = temp_base("corrupt");
    fs::create_dir_all(&base).unwrap();
    let path = base.join("users.json");
    fs::write(&path, "{ not json").unwrap();
    let snap = FileSnapshot::new(&path);
    assert!(AccountStore::open(Box::new(snap)).is_err());
    fs::remove_dir_all(base).unwrap();
}
