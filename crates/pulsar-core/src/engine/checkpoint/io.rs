use crate::core::error::{CoreException, ErrorKind};
use crate::core::serialize::{Serializable, SerializeError, from_bytes, to_bytes};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Checkpoint store '{store}' is corrupt: {source}")]
    Corrupt {
        store: String,
        #[source]
        source: SerializeError,
    },
    #[error("Failed to encode cache record '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: SerializeError,
    },
}

impl CheckpointError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::CheckpointIO
    }
}

impl From<CheckpointError> for CoreException {
    fn from(err: CheckpointError) -> Self {
        let ex = CoreException::new(err.kind(), err.to_string());
        match &err {
            CheckpointError::Io { path, .. } => ex.with("path", path.display()),
            CheckpointError::Corrupt { store, .. } => ex.with("store", store),
            CheckpointError::Encode { key, .. } => ex.with("key", key),
        }
    }
}

/// The record blobs of one checkpoint store, keyed by composed cache key.
pub type RecordBlobs = BTreeMap<String, Vec<u8>>;

/// Storage backing a checkpoint.
///
/// A store holds opaque byte blobs keyed by composed cache key. Writing replaces the
/// whole content of the store.
pub trait CheckpointIO: Send + Sync + Debug {
    /// Human-readable location, used in logs and errors.
    fn describe(&self) -> String;
    fn write_all(&self, records: RecordBlobs) -> Result<(), CheckpointError>;
    /// Returns the stored blobs. A store that was never written is empty.
    fn read_all(&self) -> Result<RecordBlobs, CheckpointError>;
}

/// A checkpoint store kept in memory, mainly for tests and single-run hosts.
#[derive(Debug, Default)]
pub struct MemoryCheckpointIO {
    name: String,
    blobs: Mutex<RecordBlobs>,
}

impl MemoryCheckpointIO {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blobs: Mutex::new(RecordBlobs::new()),
        }
    }
}

impl CheckpointIO for MemoryCheckpointIO {
    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn write_all(&self, records: RecordBlobs) -> Result<(), CheckpointError> {
        *self.blobs.lock() = records;
        Ok(())
    }

    fn read_all(&self) -> Result<RecordBlobs, CheckpointError> {
        Ok(self.blobs.lock().clone())
    }
}

#[derive(Serialize, Deserialize)]
struct CheckpointImage {
    records: RecordBlobs,
}

impl Serializable for CheckpointImage {
    const TYPE_TAG: &'static str = "CheckpointImage";
}

/// A checkpoint store kept in one file.
///
/// Writes go to a sibling temporary file that is renamed over the target, so a crash
/// mid-write leaves the previous checkpoint intact.
#[derive(Debug, Clone)]
pub struct FileCheckpointIO {
    path: PathBuf,
}

impl FileCheckpointIO {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The rank-local store `pulsar_local.<rank>.chk` in `dir`.
    pub fn local(dir: &Path, rank: usize) -> Self {
        Self::new(dir.join(format!("pulsar_local.{rank}.chk")))
    }

    /// The shared store `pulsar_global.chk` in `dir`.
    pub fn global(dir: &Path) -> Self {
        Self::new(dir.join("pulsar_global.chk"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CheckpointIO for FileCheckpointIO {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn write_all(&self, records: RecordBlobs) -> Result<(), CheckpointError> {
        let bytes = to_bytes(&CheckpointImage { records }).map_err(|source| {
            CheckpointError::Corrupt {
                store: self.describe(),
                source,
            }
        })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let tmp = self.path.with_extension("chk.tmp");
        fs::write(&tmp, bytes).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn read_all(&self) -> Result<RecordBlobs, CheckpointError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RecordBlobs::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        let image: CheckpointImage = from_bytes(&bytes).map_err(|source| {
            CheckpointError::Corrupt {
                store: self.describe(),
                source,
            }
        })?;
        Ok(image.records)
    }
}
