#![forbid(unsafe_code)]

use deepcheck_kernel_contracts::account::Username;
use deepcheck_kernel_contracts::history::HistoryRecord;
use deepcheck_kernel_contracts::Validate;
use log::info;

use crate::snapshot::{
    decode_snapshot, encode_snapshot, MemorySnapshot, SnapshotBackend, StorageError,
};

const TABLE: &str = "history";

/// Append-only verification log. Records are never mutated; they leave the
/// log only through a per-user clear.
pub struct HistoryLog {
    backend: Box<dyn SnapshotBackend>,
    records: Vec<HistoryRecord>,
}

impl HistoryLog {
    pub fn open(backend: Box<dyn SnapshotBackend>) -> Result<Self, StorageError> {
        let records: Vec<HistoryRecord> = decode_snapshot(TABLE, backend.load()?)?;
        info!(
            "history log opened from {} with {} records",
            backend.describe(),
            records.len()
        );
        Ok(Self { backend, records })
    }

    pub fn new_in_memory() -> Self {
        Self {
            backend: Box::new(MemorySnapshot::new()),
            records: Vec::new(),
        }
    }

    pub fn append(&mut self, record: HistoryRecord) -> Result<(), StorageError> {
        record.validate()?;
        let mut next = self.records.clone();
        next.push(record);
        self.persist(&next)?;
        self.records = next;
        Ok(())
    }

    /// All records owned by `user`, in insertion order.
    pub fn list_for(&self, user: &Username) -> Vec<&HistoryRecord> {
        self.records.iter().filter(|r| r.is_owned_by(user)).collect()
    }

    /// The last `limit` records owned by `user`, most recent first.
    pub fn recent_for(&self, user: &Username, limit: usize) -> Vec<&HistoryRecord> {
        self.records
            .iter()
            .rev()
            .filter(|r| r.is_owned_by(user))
            .take(limit)
            .collect()
    }

    /// Removes every record owned by `user` and returns how many were removed.
    pub fn clear_for(&mut self, user: &Username) -> Result<usize, StorageError> {
        let next: Vec<HistoryRecord> = self
            .records
            .iter()
            .filter(|r| !r.is_owned_by(user))
            .cloned()
            .collect();
        let removed = self.records.len() - next.len();
        if removed == 0 {
            return Ok(0);
        }
        self.persist(&next)?;
        self.records = next;
        info!("cleared {removed} history records for {user}");
        Ok(removed)
    }

    pub fn all(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_backend(self) -> Box<dyn SnapshotBackend> {
        self.backend
    }

    fn persist(&mut self, records: &[HistoryRecord]) -> Result<(), StorageError> {
        let bytes = encode_snapshot(TABLE, records)?;
        self.backend.commit(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepcheck_kernel_contracts::history::{
        Confidence, Prediction, UploadFilename, VerificationTimestamp,
    };

    fn user(name: &str) -> Username {
        Username::new(name).unwrap()
    }

    fn record(owner: &str, file: &str, second: u32) -> HistoryRecord {
        HistoryRecord::v1(
            user(owner),
            UploadFilename::new(file).unwrap(),
            Prediction::Fake,
            Confidence::new(0.5).unwrap(),
            VerificationTimestamp::parse(format!("2024-05-01 10:00:{second:02}")).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn at_history_01_list_for_is_scoped_and_ordered() {
        let mut log = HistoryLog::new_in_memory();
        log.append(record("alice", "a1.png", 1)).unwrap();
        log.append(record("bob", "b1.png", 2)).unwrap();
        log.append(record("alice", "a2.png", 3)).unwrap();

        let alice: Vec<&str> = log
            .list_for(&user("alice"))
            .iter()
            .map(|r| r.filename.as_str())
            .collect();
        assert_eq!(alice, vec!["a1.png", "a2.png"]);
        assert_eq!(log.list_for(&user("bob")).len(), 1);
        assert!(log.list_for(&user("carol")).is_empty());
    }

    #[test]
    fn at_history_02_recent_for_returns_last_n_most_recent_first() {
        let mut log = HistoryLog::new_in_memory();
        for i in 1..=6 {
            log.append(record("alice", &format!("img{i}.png"), i)).unwrap();
            log.append(record("bob", &format!("bob{i}.png"), i)).unwrap();
        }
        let recent: Vec<&str> = log
            .recent_for(&user("alice"), 5)
            .iter()
            .map(|r| r.filename.as_str())
            .collect();
        assert_eq!(
            recent,
            vec!["img6.png", "img5.png", "img4.png", "img3.png", "img2.png"]
        );
    }

    #[test]
    fn at_history_03_clear_for_removes_only_owner_rows() {
        let mut log = HistoryLog::new_in_memory();
        log.append(record("bob", "b1.png", 1)).unwrap();
        log.append(record("alice", "a1.png", 2)).unwrap();
        log.append(record("bob", "b2.png", 3)).unwrap();
        log.append(record("alice", "a2.png", 4)).unwrap();

        assert_eq!(log.clear_for(&user("alice")).unwrap(), 2);
        assert!(log.list_for(&user("alice")).is_empty());
        let rest: Vec<&str> = log.all().iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(rest, vec!["b1.png", "b2.png"]);
        assert_eq!(log.clear_for(&user("alice")).unwrap(), 0);
    }
}
