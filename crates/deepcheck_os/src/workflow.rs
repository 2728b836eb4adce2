#![forbid(unsafe_code)]

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use deepcheck_engines::Classifier;
use deepcheck_kernel_contracts::account::Username;
use deepcheck_kernel_contracts::classify::BackboneId;
use deepcheck_kernel_contracts::history::{HistoryRecord, UploadFilename, VerificationTimestamp};
use deepcheck_kernel_contracts::session::SessionPhase;
use deepcheck_storage::repo::{AccountRepo, HistoryRepo};
use deepcheck_storage::{AccountStore, FileSnapshot, HistoryLog};
use log::{info, warn};

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::session::SessionContext;
use crate::views::VerificationResult;

pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Owns the account store, the history log and the mounted classifier.
/// Sessions are held by callers and passed in explicitly.
pub struct VerificationService {
    config: WorkflowConfig,
    accounts: Mutex<Box<dyn AccountRepo>>,
    history: Mutex<Box<dyn HistoryRepo>>,
    classifier: Arc<dyn Classifier>,
    upload_seq: AtomicU64,
}

impl VerificationService {
    pub fn new(
        config: WorkflowConfig,
        accounts: Box<dyn AccountRepo>,
        history: Box<dyn HistoryRepo>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            config,
            accounts: Mutex::new(accounts),
            history: Mutex::new(history),
            classifier,
            upload_seq: AtomicU64::new(0),
        }
    }

    /// Opens (or creates) the JSON stores and the uploads directory under
    /// the configured data dir.
    pub fn open_data_dir(
        config: WorkflowConfig,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, WorkflowError> {
        let uploads = config.uploads_dir();
        fs::create_dir_all(&uploads).map_err(|source| WorkflowError::UploadIo {
            path: uploads.display().to_string(),
            source,
        })?;
        let accounts = AccountStore::open(Box::new(FileSnapshot::open_or_init(
            config.users_path(),
            b"{}",
        )?))?;
        let history = HistoryLog::open(Box::new(FileSnapshot::open_or_init(
            config.history_path(),
            b"[]",
        )?))?;
        info!(
            "opened data dir {} accounts={} history_rows={} backbone={}",
            config.data_dir().display(),
            accounts.len(),
            history.len(),
            classifier.backbone().as_str()
        );
        Ok(Self::new(
            config,
            Box::new(accounts),
            Box::new(history),
            classifier,
        ))
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn backbone(&self) -> BackboneId {
        self.classifier.backbone()
    }

    pub fn sign_up(
        &self,
        ctx: &mut SessionContext,
        username: &str,
        password: &str,
    ) -> Result<(), WorkflowError> {
        ctx.require_logged_out()?;
        self.lock_accounts()?
            .insert_account_row(username, password)?;
        let user = Username::new(username).map_err(WorkflowError::InvalidInput)?;
        ctx.enter_loading(user)
    }

    pub fn log_in(
        &self,
        ctx: &mut SessionContext,
        username: &str,
        password: &str,
    ) -> Result<(), WorkflowError> {
        ctx.require_logged_out()?;
        if !self
            .lock_accounts()?
            .authenticate_account_row(username, password)
        {
            warn!("login rejected");
            return Err(WorkflowError::AuthenticationFailure);
        }
        let user = Username::new(username).map_err(WorkflowError::InvalidInput)?;
        info!("login user={}", user.as_str());
        ctx.enter_loading(user)
    }

    /// Loading step: warms the classifier up and holds the session in
    /// `Loading` for at least the configured delay. On warm-up failure the
    /// session stays in `Loading` so the step can be retried.
    pub fn complete_loading(&self, ctx: &mut SessionContext) -> Result<(), WorkflowError> {
        ctx.require_phase(SessionPhase::Loading)?;
        let started = Instant::now();
        self.classifier.warm_up().map_err(|e| {
            warn!("classifier warm-up failed: {e}");
            WorkflowError::ClassifierFailure(e)
        })?;
        let remaining = self.config.loading_delay.saturating_sub(started.elapsed());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
        ctx.enter_ready()
    }

    /// Ends the session from `Loading` or `Ready`. Already logged out is a no-op.
    pub fn log_out(&self, ctx: &mut SessionContext) -> Result<(), WorkflowError> {
        if ctx.phase() == SessionPhase::LoggedOut {
            return Ok(());
        }
        if let Some(user) = ctx.current_user() {
            info!("logout user={}", user.as_str());
        }
        ctx.reset()
    }

    pub fn verify(
        &self,
        ctx: &SessionContext,
        filename: &str,
        image: &[u8],
        now: VerificationTimestamp,
    ) -> Result<VerificationResult, WorkflowError> {
        let user = ctx.require_ready()?.clone();
        let filename =
            UploadFilename::new(filename).map_err(|e| WorkflowError::InvalidUpload(e.to_string()))?;
        if image.is_empty() {
            return Err(WorkflowError::InvalidUpload(
                "image payload is empty".to_string(),
            ));
        }
        if image.len() > MAX_UPLOAD_BYTES {
            return Err(WorkflowError::InvalidUpload(format!(
                "image payload exceeds {MAX_UPLOAD_BYTES} bytes"
            )));
        }

        let path = self.store_upload(&filename, image)?;
        let outcome = self.classifier.predict(&path).map_err(|e| {
            warn!(
                "classification failed user={} file={}: {e}",
                user.as_str(),
                filename.as_str()
            );
            WorkflowError::ClassifierFailure(e)
        })?;

        let record = HistoryRecord::v1(user, filename, outcome.prediction, outcome.confidence, now)
            .map_err(WorkflowError::InvalidInput)?;
        self.lock_history()?.append_history_row(record.clone())?;
        info!(
            "verified user={} file={} prediction={} confidence={:.4}",
            record.user.as_str(),
            record.filename.as_str(),
            record.prediction,
            record.confidence.value()
        );
        Ok(VerificationResult::from_record(record))
    }

    /// Every record of the signed-in user, oldest first.
    pub fn history(&self, ctx: &SessionContext) -> Result<Vec<HistoryRecord>, WorkflowError> {
        let user = ctx.require_ready()?;
        let guard = self.lock_history()?;
        Ok(guard
            .history_rows_for_user(user)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Sidebar view: the configured number of most recent records, newest first.
    pub fn recent_history(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<HistoryRecord>, WorkflowError> {
        let user = ctx.require_ready()?;
        let guard = self.lock_history()?;
        Ok(guard
            .recent_history_rows_for_user(user, self.config.sidebar_limit)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn clear_history(&self, ctx: &SessionContext) -> Result<usize, WorkflowError> {
        let user = ctx.require_ready()?;
        let removed = self.lock_history()?.clear_history_rows_for_user(user)?;
        info!("history cleared user={} removed={removed}", user.as_str());
        Ok(removed)
    }

    pub fn account_count(&self) -> Result<usize, WorkflowError> {
        Ok(self.lock_accounts()?.account_row_count())
    }

    /// Writes the upload to a file no other request shares, so concurrent
    /// verifications of the same file name each classify their own bytes.
    /// The stored name is `<pid>-<seq>-<filename>`.
    fn store_upload(
        &self,
        filename: &UploadFilename,
        image: &[u8],
    ) -> Result<PathBuf, WorkflowError> {
        let dir = self.config.uploads_dir();
        fs::create_dir_all(&dir).map_err(|source| WorkflowError::UploadIo {
            path: dir.display().to_string(),
            source,
        })?;
        loop {
            let seq = self.upload_seq.fetch_add(1, Ordering::Relaxed);
            let path = dir.join(format!("{}-{seq}-{}", process::id(), filename.as_str()));
            let io_err = |source| WorkflowError::UploadIo {
                path: path.display().to_string(),
                source,
            };
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(image).map_err(io_err)?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(io_err(e)),
            }
        }
    }

    fn lock_accounts(&self) -> Result<MutexGuard<'_, Box<dyn AccountRepo>>, WorkflowError> {
        self.accounts
            .lock()
            .map_err(|_| WorkflowError::LockPoisoned("account store"))
    }

    fn lock_history(&self) -> Result<MutexGuard<'_, Box<dyn HistoryRepo>>, WorkflowError> {
        self.history
            .lock()
            .map_err(|_| WorkflowError::LockPoisoned("history log"))
    }
}
