//! # Checkpoints
//!
//! Persistence of cache entries across runs through pluggable [`CheckpointIO`] stores.

#[allow(clippy::module_inception)]
pub mod checkpoint;
pub mod io;

pub use checkpoint::{Checkpoint, LoadReport};
pub use io::{CheckpointError, CheckpointIO, FileCheckpointIO, MemoryCheckpointIO, RecordBlobs};
