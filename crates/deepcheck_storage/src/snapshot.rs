#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use deepcheck_kernel_contracts::ContractViolation;
use log::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot {what} is not a valid record set: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot {what}: {source}")]
    Encode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Whole-record-set persistence: a snapshot is read in full and replaced in full.
pub trait SnapshotBackend: Send {
    fn describe(&self) -> String;

    /// Returns `None` when nothing has been committed yet.
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replaces the snapshot. Either the new bytes become visible entirely or
    /// the previous snapshot stays in place.
    fn commit(&mut self, bytes: &[u8]) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    bytes: Option<Vec<u8>>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Some(bytes.into()),
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }
}

impl SnapshotBackend for MemorySnapshot {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.bytes.clone())
    }

    fn commit(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        self.bytes = Some(bytes.to_vec());
        Ok(())
    }
}

/// Flat JSON file, replaced through a sibling temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Opens `path`, writing `empty` first if the file does not exist yet.
    pub fn open_or_init(path: impl Into<PathBuf>, empty: &[u8]) -> Result<Self, StorageError> {
        let mut snap = Self::new(path);
        if !snap.path.exists() {
            snap.commit(empty)?;
        }
        Ok(snap)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotBackend for FileSnapshot {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        fs::read(&self.path)
            .map(Some)
            .map_err(|e| StorageError::io(&self.path, e))
    }

    fn commit(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }
        }
        let tmp = self.temp_path();
        let write_tmp = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp);
            error!("snapshot write failed for {}: {e}", tmp.display());
            return Err(StorageError::io(&tmp, e));
        }
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            error!("snapshot replace failed for {}: {e}", self.path.display());
            StorageError::io(&self.path, e)
        })?;
        debug!(
            "committed snapshot {} ({} bytes)",
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }
}

/// Decodes a JSON snapshot; a missing or blank snapshot yields `T::default()`.
pub(crate) fn decode_snapshot<T>(what: &str, raw: Option<Vec<u8>>) -> Result<T, StorageError>
where
    T: serde::de::DeserializeOwned + Default,
{
    let Some(raw) = raw else {
        return Ok(T::default());
    };
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    serde_json::from_slice(&raw).map_err(|source| StorageError::Decode {
        what: what.to_string(),
        source,
    })
}

pub(crate) fn encode_snapshot<T: serde::Serialize + ?Sized>(
    what: &str,
    doc: &T,
) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec_pretty(doc).map_err(|source| StorageError::Encode {
        what: what.to_string(),
        source,
    })
}
