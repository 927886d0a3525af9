//! # Module Caches
//!
//! Per-module-key stores of serialized values with persistence and distribution
//! policies, plus the background worker that exchanges distributed entries between
//! ranks.

pub mod data;
pub mod messenger;
pub mod policy;
pub mod record;
pub mod store;
pub mod sync;

pub use data::CacheData;
pub use messenger::{CacheMessage, LocalNetwork, Messenger, SingleProcess};
pub use policy::CachePolicy;
pub use record::{CacheRecord, KEY_SEPARATOR, compose_key, split_key};
pub use store::{CacheRegistry, ModuleCache, RestoreOutcome};
pub use sync::{CacheSync, SyncLink, SyncStats, sync_round};
