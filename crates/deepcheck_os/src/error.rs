#![forbid(unsafe_code)]

use deepcheck_engines::ClassifierError;
use deepcheck_kernel_contracts::session::SessionPhase;
use deepcheck_kernel_contracts::ContractViolation;
use deepcheck_storage::{AccountError, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("invalid input: {0}")]
    InvalidInput(ContractViolation),
    #[error("username already exists: {0}")]
    DuplicateUsername(String),
    #[error("invalid username or password")]
    AuthenticationFailure,
    #[error("classification failed: {0}")]
    ClassifierFailure(#[from] ClassifierError),
    #[error("storage failure: {0}")]
    StorageIo(#[from] StorageError),
    #[error("upload could not be written to {path}: {source}")]
    UploadIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("operation not available while session is {}", .phase.as_str())]
    NotReady { phase: SessionPhase },
    #[error("a user is already signed in on this session")]
    AlreadyAuthenticated,
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

impl WorkflowError {
    /// Stable machine-readable reason code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::DuplicateUsername(_) => "DUPLICATE_USERNAME",
            Self::AuthenticationFailure => "AUTHENTICATION_FAILURE",
            Self::ClassifierFailure(_) => "CLASSIFIER_FAILURE",
            Self::StorageIo(_) | Self::UploadIo { .. } | Self::LockPoisoned(_) => "STORAGE_IO",
            Self::NotReady { .. } => "NOT_READY",
            Self::AlreadyAuthenticated => "ALREADY_AUTHENTICATED",
            Self::InvalidUpload(_) => "INVALID_UPLOAD",
        }
    }

    /// True when the caller can fix the request and retry in the same session.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::DuplicateUsername(_)
                | Self::AuthenticationFailure
                | Self::NotReady { .. }
                | Self::AlreadyAuthenticated
                | Self::InvalidUpload(_)
        )
    }
}

impl From<AccountError> for WorkflowError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::InvalidInput(v) => Self::InvalidInput(v),
            AccountError::DuplicateUsername(name) => Self::DuplicateUsername(name),
            AccountError::Storage(s) => Self::StorageIo(s),
        }
    }
}
