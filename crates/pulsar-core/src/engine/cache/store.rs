use super::policy::CachePolicy;
use super::record::{CacheRecord, compose_key, split_key};
use crate::core::hash::Hash128;
use crate::core::serialize::FORMAT_VERSION;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    pub policy: CachePolicy,
}

#[derive(Debug, Default)]
struct CacheState {
    option_hash: Hash128,
    /// Keyed by the composed key.
    entries: BTreeMap<String, CacheEntry>,
    /// Composed keys set with `DISTRIBUTE_GLOBAL` since the last sync round.
    outbox: Vec<String>,
}

/// Outcome of offering a foreign record to a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// The record was computed under different options or an older format.
    Stale,
}

/// The entries of one module key, shared by every instance created under it.
///
/// All access goes through one mutex; a condition variable wakes readers waiting for an
/// entry to arrive from a peer rank.
#[derive(Debug)]
pub struct ModuleCache {
    module_key: String,
    state: Mutex<CacheState>,
    arrived: Condvar,
}

impl ModuleCache {
    pub fn new(module_key: impl Into<String>, option_hash: Hash128) -> Self {
        Self {
            module_key: module_key.into(),
            state: Mutex::new(CacheState {
                option_hash,
                ..CacheState::default()
            }),
            arrived: Condvar::new(),
        }
    }

    pub fn module_key(&self) -> &str {
        &self.module_key
    }

    pub fn option_hash(&self) -> Hash128 {
        self.state.lock().option_hash
    }

    /// Rebinds the cache to a new option snapshot. Entries computed under the old one
    /// are discarded.
    pub fn rebind(&self, option_hash: Hash128) {
        let mut state = self.state.lock();
        if state.option_hash != option_hash {
            let dropped = state.entries.len();
            state.entries.clear();
            state.outbox.clear();
            state.option_hash = option_hash;
            if dropped > 0 {
                debug!(module_key = %self.module_key, dropped, "Cache discarded after option change.");
            }
        }
    }

    pub fn set(&self, user_key: &str, value: Vec<u8>, policy: CachePolicy) {
        let key = compose_key(&self.module_key, user_key);
        let mut state = self.state.lock();
        if policy.contains(CachePolicy::DISTRIBUTE_GLOBAL) && !state.outbox.contains(&key) {
            state.outbox.push(key.clone());
        }
        state.entries.insert(key, CacheEntry { value, policy });
    }

    pub fn get(&self, user_key: &str) -> Option<CacheEntry> {
        let key = compose_key(&self.module_key, user_key);
        self.state.lock().entries.get(&key).cloned()
    }

    /// Waits up to `timeout` for `user_key` to appear.
    pub fn wait_for(&self, user_key: &str, timeout: Duration) -> Option<CacheEntry> {
        let key = compose_key(&self.module_key, user_key);
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(entry) = state.entries.get(&key) {
                return Some(entry.clone());
            }
            if self.arrived.wait_until(&mut state, deadline).timed_out() {
                return state.entries.get(&key).cloned();
            }
        }
    }

    pub fn erase(&self, user_key: &str) -> bool {
        let key = compose_key(&self.module_key, user_key);
        let mut state = self.state.lock();
        state.outbox.retain(|k| k != &key);
        state.entries.remove(&key).is_some()
    }

    pub fn count(&self, user_key: &str) -> bool {
        let key = compose_key(&self.module_key, user_key);
        self.state.lock().entries.contains_key(&key)
    }

    /// User keys currently stored, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .keys()
            .filter_map(|k| split_key(k).map(|(_, u)| u.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.outbox.clear();
    }

    /// Snapshot of the entries whose policy shares a flag with `filter`.
    pub fn records(&self, filter: CachePolicy) -> Vec<CacheRecord> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .filter(|(_, e)| e.policy.intersects(filter))
            .map(|(k, e)| CacheRecord::new(k.clone(), e.value.clone(), e.policy, state.option_hash))
            .collect()
    }

    pub(crate) fn record(&self, composed_key: &str) -> Option<CacheRecord> {
        let state = self.state.lock();
        state.entries.get(composed_key).map(|e| {
            CacheRecord::new(composed_key.to_string(), e.value.clone(), e.policy, state.option_hash)
        })
    }

    /// Drains the keys set for distribution since the last call.
    pub(crate) fn take_outbox(&self) -> Vec<CacheRecord> {
        let mut state = self.state.lock();
        let keys = std::mem::take(&mut state.outbox);
        keys.into_iter()
            .filter_map(|k| {
                state.entries.get(&k).map(|e| {
                    CacheRecord::new(k.clone(), e.value.clone(), e.policy, state.option_hash)
                })
            })
            .collect()
    }

    /// Stores a record produced elsewhere if it was computed under this cache's options.
    ///
    /// Stale records are logged and dropped, never raised.
    pub fn restore(&self, record: CacheRecord) -> RestoreOutcome {
        let policy = record.policy();
        let mut state = self.state.lock();
        let belongs = record.module_key() == Some(self.module_key.as_str());
        match policy {
            Some(policy)
                if belongs
                    && record.option_hash == state.option_hash
                    && record.version == FORMAT_VERSION =>
            {
                state.entries.insert(
                    record.composed_key,
                    CacheEntry {
                        value: record.value,
                        policy,
                    },
                );
                drop(state);
                self.arrived.notify_all();
                RestoreOutcome::Restored
            }
            _ => {
                info!(
                    key = %record.composed_key,
                    record_hash = %record.option_hash,
                    live_hash = %state.option_hash,
                    "Discarding stale cache entry."
                );
                RestoreOutcome::Stale
            }
        }
    }
}

/// Every module cache of one manager, keyed by module key.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    caches: RwLock<BTreeMap<String, Arc<ModuleCache>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache of `module_key`, creating it bound to `option_hash` if needed.
    pub fn get_or_create(&self, module_key: &str, option_hash: Hash128) -> Arc<ModuleCache> {
        if let Some(cache) = self.caches.read().get(module_key) {
            return Arc::clone(cache);
        }
        let mut caches = self.caches.write();
        Arc::clone(
            caches
                .entry(module_key.to_string())
                .or_insert_with(|| Arc::new(ModuleCache::new(module_key, option_hash))),
        )
    }

    pub fn get(&self, module_key: &str) -> Option<Arc<ModuleCache>> {
        self.caches.read().get(module_key).cloned()
    }

    pub fn remove(&self, module_key: &str) -> Option<Arc<ModuleCache>> {
        self.caches.write().remove(module_key)
    }

    pub fn all(&self) -> Vec<Arc<ModuleCache>> {
        self.caches.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Routes a foreign record to the cache named by its module key.
    ///
    /// Records for keys this registry does not know are stale.
    pub fn restore(&self, record: CacheRecord) -> RestoreOutcome {
        let cache = record.module_key().and_then(|m| self.get(m));
        match cache {
            Some(cache) => cache.restore(record),
            None => {
                info!(key = %record.composed_key, "Discarding cache entry for an unknown module key.");
                RestoreOutcome::Stale
            }
        }
    }
}
