#![forbid(unsafe_code)]

use deepcheck_kernel_contracts::account::Username;
use deepcheck_kernel_contracts::history::HistoryRecord;

use crate::accounts::{AccountError, AccountStore};
use crate::history::HistoryLog;
use crate::snapshot::StorageError;

/// Typed repository interface for account persistence wiring.
pub trait AccountRepo: Send {
    fn insert_account_row(&mut self, username: &str, password: &str) -> Result<(), AccountError>;
    fn authenticate_account_row(&self, username: &str, password: &str) -> bool;
    fn account_row_exists(&self, username: &str) -> bool;
    fn account_row_count(&self) -> usize;
}

/// Typed repository interface for append-only verification history wiring.
pub trait HistoryRepo: Send {
    fn append_history_row(&mut self, record: HistoryRecord) -> Result<(), StorageError>;
    fn history_rows_for_user(&self, user: &Username) -> Vec<&HistoryRecord>;
    fn recent_history_rows_for_user(&self, user: &Username, limit: usize) -> Vec<&HistoryRecord>;
    fn clear_history_rows_for_user(&mut self, user: &Username) -> Result<usize, StorageError>;
    fn history_rows(&self) -> &[HistoryRecord];
}

impl AccountRepo for AccountStore {
    fn insert_account_row(&mut self, username: &str, password: &str) -> Result<(), AccountError> {
        self.create_account(username, password)
    }

    fn authenticate_account_row(&self, username: &str, password: &str) -> bool {
        self.authenticate(username, password)
    }

    fn account_row_exists(&self, username: &str) -> bool {
        self.contains(username)
    }

    fn account_row_count(&self) -> usize {
        self.len()
    }
}

impl HistoryRepo for HistoryLog {
    fn append_history_row(&mut self, record: HistoryRecord) -> Result<(), StorageError> {
        self.append(record)
    }

    fn history_rows_for_user(&self, user: &Username) -> Vec<&HistoryRecord> {
        self.list_for(user)
    }

    fn recent_history_rows_for_user(&self, user: &Username, limit: usize) -> Vec<&HistoryRecord> {
        self.recent_for(user, limit)
    }

    fn clear_history_rows_for_user(&mut self, user: &Username) -> Result<usize, StorageError> {
        self.clear_for(user)
    }

    fn history_rows(&self) -> &[HistoryRecord] {
        self.all()
    }
}
