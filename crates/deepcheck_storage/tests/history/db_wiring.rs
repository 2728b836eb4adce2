#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use deepcheck_kernel_contracts::account::Username;
use deepcheck_kernel_contracts::history::{
    Confidence, HistoryRecord, Prediction, UploadFilename, VerificationTimestamp,
};
use deepcheck_storage::history::HistoryLog;
use deepcheck_storage::repo::HistoryRepo;
use deepcheck_storage::snapshot::FileSnapshot;

fn temp_base(name: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    std::env::temp_dir().join(format!("deepcheck-dbw-history-{name}-{suffix}"))
}

fn user(name: &str) -> Username {
    Username::new(name).unwrap()
}

fn record(owner: &str, file: &str, prediction: Prediction, confidence: f64, minute: u32) -> HistoryRecord {
    HistoryRecord::v1(
        user(owner),
        UploadFilename::new(file).unwrap(),
        prediction,
        Confidence::new(confidence).unwrap(),
        VerificationTimestamp::parse(format!("2024-06-02 12:{minute:02}:00")).unwrap(),
    )
    .unwrap()
}

fn open_file_log(path: &PathBuf) -> HistoryLog {
    let snap = FileSnapshot::open_or_init(path, b"[]").unwrap();
    HistoryLog::open(Box::new(snap)).unwrap()
}

#[test]
fn at_history_db_01_file_roundtrip_preserves_sequence() {
    let base = temp_base("roundtrip");
    let path = base.join("results").join("history.json");

    let mut log = open_file_log(&path);
    let written = vec![
        record("alice", "cat.png", Prediction::Real, 0.92, 1),
        record("bob", "dog.jpg", Prediction::Fake, 0.61, 2),
        record("alice", "face.jpeg", Prediction::Fake, 0.99, 3),
    ];
    for r in &written {
        log.append(r.clone()).unwrap();
    }
    drop(log);

    let reopened = open_file_log(&path);
    assert_eq!(reopened.all(), written.as_slice());
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_history_db_02_appended_row_visible_once_and_only_to_owner() {
    let mut repo: Box<dyn HistoryRepo> = Box::new(HistoryLog::new_in_memory());
    let users = ["alice", "bob", "carol"];
    for i in 0..30u32 {
        let owner = users[(i % 3) as usize];
        repo.append_history_row(record(owner, &format!("f{i}.png"), Prediction::Real, 0.5, i))
            .unwrap();
    }

    for (idx, owner) in users.iter().enumerate() {
        let rows = repo.history_rows_for_user(&user(owner));
        assert_eq!(rows.len(), 10);
        let expected: Vec<String> = (0..30u32)
            .filter(|i| (*i as usize) % 3 == idx)
            .map(|i| format!("f{i}.png"))
            .collect();
        let got: Vec<String> = rows.iter().map(|r| r.filename.as_str().to_string()).collect();
        assert_eq!(got, expected);
        assert!(rows.iter().all(|r| r.user.as_str() == *owner));
    }
}

#[test]
fn at_history_db_03_clear_keeps_other_users_in_relative_order_on_disk() {
    let base = temp_base("clear");
    let path = base.join("history.json");
    let mut log = open_file_log(&path);
    log.append(record("bob", "b1.png", Prediction::Real, 0.7, 1)).unwrap();
    log.append(record("alice", "a1.png", Prediction::Fake, 0.8, 2)).unwrap();
    log.append(record("carol", "c1.png", Prediction::Real, 0.9, 3)).unwrap();
    log.append(record("bob", "b2.png", Prediction::Fake, 0.6, 4)).unwrap();

    assert_eq!(log.clear_history_rows_for_user(&user("alice")).unwrap(), 1);
    drop(log);

    let reopened = open_file_log(&path);
    let files: Vec<&str> = reopened.all().iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(files, vec!["b1.png", "c1.png", "b2.png"]);
    assert!(reopened.list_for(&user("alice")).is_empty());
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_history_db_04_prototype_history_file_loads() {
    let base = temp_base("prototype");
    fs::create_dir_all(&base).unwrap();
    let path = base.join("history.json");
    fs::write(
        &path,
        r#"[
  {
    "user": "alice",
    "filename": "cat.png",
    "prediction": "Real",
    "confidence": 0.92,
    "timestamp": "2024-05-01 09:30:00"
  }
]"#,
    )
    .unwrap();

    let log = open_file_log(&path);
    let rows = log.list_for(&user("alice"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].prediction, Prediction::Real);
    assert_eq!(rows[0].confidence.value(), 0.92);
    assert_eq!(rows[0].timestamp.as_str(), "2024-05-01 09:30:00");
    fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_history_db_05_recent_view_over_six_rows() {
    let mut log = HistoryLog::new_in_memory();
    for i in 1..=6u32 {
        log.append(record("alice", &format!("img{i}.png"), Prediction::Fake, 0.5, i))
            .unwrap();
    }
    let recent: Vec<&str> = log
        .recent_history_rows_for_user(&user("alice"), 5)
        .iter()
        .map(|r| r.filename.as_str())
        .collect();
    assert_eq!(
        recent,
        vec!["img6.png", "img5.png", "img4.png", "img3.png", "img2.png"]
    );
}
