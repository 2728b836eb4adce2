#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use deepcheck_kernel_contracts::account::{Password, StoredCredential, Username};
use deepcheck_kernel_contracts::ContractViolation;
use log::{info, warn};

use crate::credential::{seal_password, verify_password};
use crate::snapshot::{
    decode_snapshot, encode_snapshot, MemorySnapshot, SnapshotBackend, StorageError,
};

const TABLE: &str = "accounts";

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("invalid input: {0}")]
    InvalidInput(ContractViolation),
    #[error("username already exists: {0}")]
    DuplicateUsername(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

type AccountDocument = BTreeMap<Username, StoredCredential>;

/// Username → credential record set, rewritten in full on every mutation.
pub struct AccountStore {
    backend: Box<dyn SnapshotBackend>,
    accounts: AccountDocument,
}

impl AccountStore {
    pub fn open(backend: Box<dyn SnapshotBackend>) -> Result<Self, StorageError> {
        let accounts: AccountDocument = decode_snapshot(TABLE, backend.load()?)?;
        info!(
            "account store opened from {} with {} accounts",
            backend.describe(),
            accounts.len()
        );
        Ok(Self { backend, accounts })
    }

    pub fn new_in_memory() -> Self {
        Self {
            backend: Box::new(MemorySnapshot::new()),
            accounts: AccountDocument::new(),
        }
    }

    /// Duplicate check runs before the emptiness check, so an existing name
    /// is always reported as a duplicate.
    pub fn create_account(&mut self, username: &str, password: &str) -> Result<(), AccountError> {
        if self
            .accounts
            .keys()
            .any(|existing| existing.as_str() == username)
        {
            warn!("sign-up rejected: duplicate username");
            return Err(AccountError::DuplicateUsername(username.to_string()));
        }
        let username = Username::new(username).map_err(AccountError::InvalidInput)?;
        let password = Password::new(password).map_err(AccountError::InvalidInput)?;
        let credential = seal_password(&password).map_err(AccountError::InvalidInput)?;

        let mut next = self.accounts.clone();
        next.insert(username.clone(), credential);
        self.persist(&next)?;
        self.accounts = next;
        info!("account created for {username}");
        Ok(())
    }

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.accounts
            .iter()
            .find(|(name, _)| name.as_str() == username)
            .map(|(_, credential)| verify_password(credential, password))
            .unwrap_or(false)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.accounts.keys().any(|name| name.as_str() == username)
    }

    pub fn credential(&self, username: &Username) -> Option<&StoredCredential> {
        self.accounts.get(username)
    }

    pub fn usernames(&self) -> Vec<&Username> {
        self.accounts.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn into_backend(self) -> Box<dyn SnapshotBackend> {
        self.backend
    }

    fn persist(&mut self, doc: &AccountDocument) -> Result<(), StorageError> {
        let bytes = encode_snapshot(TABLE, doc)?;
        self.backend.commit(&bytes)
    }
}
