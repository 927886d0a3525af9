use super::io::{CheckpointError, CheckpointIO, FileCheckpointIO, MemoryCheckpointIO, RecordBlobs};
use crate::core::error::CoreResult;
use crate::core::serialize::{from_bytes, to_bytes};
use crate::engine::cache::{CachePolicy, CacheRecord, CacheRegistry, RestoreOutcome};
use crate::modules::manager::ModuleManager;
use rayon::prelude::*;
use std::path::Path;
use tracing::{info, instrument, warn};

/// Counts of a checkpoint load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub restored: usize,
    /// Entries dropped because no live key with the same options exists.
    pub stale: usize,
}

/// Saves and restores the persistent part of a manager's caches.
///
/// Entries flagged [`CachePolicy::CHECKPOINT_LOCAL`] go to the local store and entries
/// flagged [`CachePolicy::CHECKPOINT_GLOBAL`] to the global store. Restoring only keeps
/// entries whose module key exists in the target manager with the same option hash.
#[derive(Debug)]
pub struct Checkpoint {
    local: Box<dyn CheckpointIO>,
    global: Box<dyn CheckpointIO>,
}

impl Checkpoint {
    pub fn new(local: Box<dyn CheckpointIO>, global: Box<dyn CheckpointIO>) -> Self {
        Self { local, global }
    }

    /// File-backed stores in `dir`: `pulsar_local.<rank>.chk` and `pulsar_global.chk`.
    pub fn in_directory(dir: &Path, rank: usize) -> Self {
        Self::new(
            Box::new(FileCheckpointIO::local(dir, rank)),
            Box::new(FileCheckpointIO::global(dir)),
        )
    }

    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemoryCheckpointIO::new("local")),
            Box::new(MemoryCheckpointIO::new("global")),
        )
    }

    /// Writes every `CHECKPOINT_LOCAL` entry of `mm` to the local store.
    ///
    /// # Return
    ///
    /// The number of entries written.
    pub fn save_local_cache(&self, mm: &ModuleManager) -> CoreResult<usize> {
        save(&mm.caches(), self.local.as_ref(), CachePolicy::CHECKPOINT_LOCAL)
    }

    pub fn save_global_cache(&self, mm: &ModuleManager) -> CoreResult<usize> {
        save(&mm.caches(), self.global.as_ref(), CachePolicy::CHECKPOINT_GLOBAL)
    }

    /// Restores the local store into `mm`. Stale entries are logged and skipped.
    pub fn load_local_cache(&self, mm: &ModuleManager) -> CoreResult<LoadReport> {
        load(&mm.caches(), self.local.as_ref())
    }

    pub fn load_global_cache(&self, mm: &ModuleManager) -> CoreResult<LoadReport> {
        load(&mm.caches(), self.global.as_ref())
    }
}

#[instrument(skip_all, name = "checkpoint_save", fields(store = %io.describe(), %filter))]
pub(crate) fn save(
    registry: &CacheRegistry,
    io: &dyn CheckpointIO,
    filter: CachePolicy,
) -> CoreResult<usize> {
    let caches = registry.all();
    let blobs: RecordBlobs = caches
        .par_iter()
        .flat_map_iter(|cache| cache.records(filter))
        .map(|record| {
            to_bytes(&record)
                .map(|bytes| (record.composed_key.clone(), bytes))
                .map_err(|source| CheckpointError::Encode {
                    key: record.composed_key.clone(),
                    source,
                })
        })
        .collect::<Result<_, _>>()?;
    let written = blobs.len();
    io.write_all(blobs)?;
    info!(entries = written, "Checkpoint saved.");
    Ok(written)
}

#[instrument(skip_all, name = "checkpoint_load", fields(store = %io.describe()))]
pub(crate) fn load(registry: &CacheRegistry, io: &dyn CheckpointIO) -> CoreResult<LoadReport> {
    let blobs = io.read_all()?;
    let mut report = LoadReport::default();
    for (key, bytes) in blobs {
        let record: CacheRecord = match from_bytes(&bytes) {
            Ok(record) => record,
            Err(e) => {
                return Err(CheckpointError::Corrupt {
                    store: io.describe(),
                    source: e,
                }
                .into());
            }
        };
        if record.composed_key != key {
            warn!(key = %key, stored = %record.composed_key, "Checkpoint key does not match its record.");
        }
        match registry.restore(record) {
            RestoreOutcome::Restored => report.restored += 1,
            RestoreOutcome::Stale => report.stale += 1,
        }
    }
    info!(restored = report.restored, stale = report.stale, "Checkpoint loaded.");
    Ok(report)
}
