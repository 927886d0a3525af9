use super::policy::CachePolicy;
use super::record::compose_key;
use super::store::ModuleCache;
use super::sync::SyncLink;
use crate::core::error::CoreResult;
use crate::core::serialize::{Serializable, from_bytes, to_bytes};
use std::sync::Arc;
use tracing::trace;

/// A module's view of the cache of its module key.
///
/// Every instance created under the same key receives a handle to the same store, so
/// values set by one instance are visible to the others. Values are stored in their
/// serialized form; a `get` therefore always returns a fresh, byte-identical copy.
#[derive(Debug, Clone)]
pub struct CacheData {
    store: Arc<ModuleCache>,
    link: Arc<SyncLink>,
}

impl CacheData {
    pub fn new(store: Arc<ModuleCache>, link: Arc<SyncLink>) -> Self {
        Self { store, link }
    }

    /// A handle with no distribution, for modules used outside a manager.
    pub fn detached(module_key: &str) -> Self {
        Self::new(
            Arc::new(ModuleCache::new(module_key, Default::default())),
            Arc::new(SyncLink::new()),
        )
    }

    pub fn module_key(&self) -> &str {
        self.store.module_key()
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn set<T: Serializable>(&self, key: &str, value: &T, policy: CachePolicy) -> CoreResult<()> {
        let bytes = to_bytes(value)?;
        trace!(module_key = self.module_key(), key, %policy, "Cache set.");
        self.store.set(key, bytes, policy);
        Ok(())
    }

    /// Looks `key` up and decodes it as `T`.
    ///
    /// With `use_distcache` and a running sync worker, a local miss asks the peer ranks
    /// for the entry and waits at most one sync interval for it to arrive.
    ///
    /// # Errors
    ///
    /// Fails with a `Serialization` error if the stored entry is not a `T`.
    pub fn get<T: Serializable>(&self, key: &str, use_distcache: bool) -> CoreResult<Option<T>> {
        let entry = match self.store.get(key) {
            Some(entry) => Some(entry),
            None if use_distcache => self
                .link
                .request(&compose_key(self.module_key(), key))
                .and_then(|wait| self.store.wait_for(key, wait)),
            None => None,
        };
        match entry {
            Some(entry) => Ok(Some(from_bytes(&entry.value)?)),
            None => Ok(None),
        }
    }

    /// The raw envelope bytes and policy of `key`.
    pub fn get_raw(&self, key: &str) -> Option<(Vec<u8>, CachePolicy)> {
        self.store.get(key).map(|e| (e.value, e.policy))
    }

    pub fn policy(&self, key: &str) -> Option<CachePolicy> {
        self.store.get(key).map(|e| e.policy)
    }

    pub fn count(&self, key: &str) -> bool {
        self.store.count(key)
    }

    pub fn erase(&self, key: &str) -> bool {
        self.store.erase(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn set_then_get_returns_the_value() {
        let cache = CacheData::detached("K1");
        let v = vec![1.0_f64, 2.0, 3.0];
        cache.set("Vector 1", &v, CachePolicy::CHECKPOINT_LOCAL).unwrap();
        assert_eq!(cache.get::<Vec<f64>>("Vector 1", false).unwrap(), Some(v));
        assert_eq!(cache.policy("Vector 1"), Some(CachePolicy::CHECKPOINT_LOCAL));
    }

    #[test]
    fn erased_entry_is_not_present() {
        let cache = CacheData::detached("K1");
        cache.set("x", &3_i64, CachePolicy::NO_POLICY).unwrap();
        assert!(cache.erase("x"));
        assert_eq!(cache.get::<i64>("x", false).unwrap(), None);
        assert_eq!(cache.get::<i64>("x", true).unwrap(), None);
    }

    #[test]
    fn reading_as_the_wrong_type_is_an_error() {
        let cache = CacheData::detached("K1");
        cache.set("x", &"text".to_string(), CachePolicy::NO_POLICY).unwrap();
        let err = cache.get::<f64>("x", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn handles_share_one_store() {
        let a = CacheData::detached("K1");
        let b = a.clone();
        a.set("flag", &true, CachePolicy::NO_POLICY).unwrap();
        assert_eq!(b.get::<bool>("flag", false).unwrap(), Some(true));
        assert_eq!(b.keys(), vec!["flag"]);
    }
}
