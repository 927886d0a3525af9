use super::base::{ModuleBase, ModulePtr};
use super::creation::ModuleFactory;
use super::info::{LANGUAGE_LAMBDA, ModuleInfo};
use super::kinds::BaseKind;
use super::loader::{NativeLoader, SupermoduleHandle, SupermoduleId, SupermoduleLoader};
use super::manifest::{MANIFEST_FILE, Manifest, ManifestError};
use super::tree::{ModuleTree, ROOT_ID};
use crate::core::error::{CoreException, CoreResult, ErrorKind};
use crate::core::hash::StableHash;
use crate::core::options::OptionValue;
use crate::engine::cache::{
    CacheData, CacheRegistry, CacheSync, Messenger, SingleProcess, SyncLink, SyncStats, sync_round,
};
use crate::engine::config::RuntimeConfig;
use crate::engine::output::Output;
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use slotmap::SlotMap;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// One node of [`ModuleManager::flat_tree`].
#[derive(Debug, Clone)]
pub struct FlatTreeEntry {
    pub id: u64,
    pub parent_id: u64,
    pub key: String,
    pub info: Arc<ModuleInfo>,
    pub live: bool,
}

#[derive(Clone)]
enum ModuleSource {
    Supermodule(SupermoduleId),
    Lambda(ModuleFactory),
}

struct KeyEntry {
    info: Arc<ModuleInfo>,
    source: ModuleSource,
    locked: bool,
    debug: Arc<AtomicBool>,
    last_instance: u64,
}

struct ManagerState {
    search_paths: Vec<PathBuf>,
    loaders: BTreeMap<String, Arc<dyn SupermoduleLoader>>,
    keys: BTreeMap<String, KeyEntry>,
    supermodules: SlotMap<SupermoduleId, Arc<SupermoduleHandle>>,
    /// Attached images by `language|path|modpath`.
    image_index: BTreeMap<String, SupermoduleId>,
    load_order: Vec<SupermoduleId>,
    tree: ModuleTree,
    debug_all: bool,
    sync_interval: Duration,
}

impl ManagerState {
    fn entry(&self, key: &str) -> CoreResult<&KeyEntry> {
        self.keys.get(key).ok_or_else(|| no_such_key(key))
    }

    fn entry_mut(&mut self, key: &str) -> CoreResult<&mut KeyEntry> {
        self.keys.get_mut(key).ok_or_else(|| no_such_key(key))
    }

    fn ensure_free(&self, key: &str) -> CoreResult<()> {
        if self.keys.contains_key(key) {
            return Err(CoreException::new(ErrorKind::DuplicateKey, "Module key already in use")
                .with("key", key));
        }
        Ok(())
    }
}

fn no_such_key(key: &str) -> CoreException {
    CoreException::new(ErrorKind::NoSuchKey, "No module is loaded under this key").with("key", key)
}

fn image_identity(info: &ModuleInfo) -> String {
    format!("{}|{}|{}", info.language, info.path, info.modpath)
}

/// State shared between a manager and the instances it created.
pub(crate) struct Shared {
    state: RwLock<ManagerState>,
    caches: Arc<CacheRegistry>,
    sync_link: Arc<SyncLink>,
    sync: Mutex<Option<CacheSync>>,
    messenger: Arc<dyn Messenger>,
    native: Arc<NativeLoader>,
    next_id: AtomicU64,
    next_key: AtomicU64,
}

impl Shared {
    /// Builds an instance of `key` under `parent_id`.
    ///
    /// The factory runs without the state lock held so that it may create children of
    /// its own. `lock` marks the key's options as final once the instance exists.
    pub(crate) fn create(self: &Arc<Self>, key: &str, parent_id: u64, lock: bool) -> CoreResult<ModulePtr> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (factory, image, info, debug_flag) = {
            let mut state = self.state.write();
            let entry = state.entry(key)?;
            let missing = entry.info.options.missing_required();
            if !missing.is_empty() {
                let ex = CoreException::new(
                    ErrorKind::UnmetRequiredOption,
                    "Required options are not set",
                )
                .with("key", key);
                return Err(missing.iter().fold(ex, |ex, name| ex.with("option", name)));
            }
            if !state.tree.is_live(parent_id) {
                return Err(CoreException::new(ErrorKind::BadParent, "Parent is not a live module instance")
                    .with("key", key)
                    .with("parent_id", parent_id));
            }
            let info = Arc::clone(&entry.info);
            let debug_flag = Arc::clone(&entry.debug);
            let (factory, image) = match &entry.source {
                ModuleSource::Lambda(factory) => (Arc::clone(factory), None),
                ModuleSource::Supermodule(sid) => {
                    let handle = state.supermodules.get(*sid).cloned().ok_or_else(|| {
                        CoreException::new(ErrorKind::Internal, "Supermodule of key was unloaded")
                            .with("key", key)
                    })?;
                    let factory = handle.funcs().get(&info.name).ok_or_else(|| {
                        CoreException::new(ErrorKind::FactoryFailure, "Supermodule has no creator for module")
                            .with("key", key)
                            .with("name", &info.name)
                            .with("supermodule", handle.name())
                    })?;
                    (factory, Some(handle))
                }
            };
            state.tree.insert(id, parent_id, key);
            state.entry_mut(key)?.last_instance = id;
            (factory, image, info, debug_flag)
        };

        let store = self.caches.get_or_create(key, info.options.content_hash());
        let base = ModuleBase::new(
            id,
            key,
            Arc::clone(&info),
            CacheData::new(store, Arc::clone(&self.sync_link)),
            Output::new(key, id, debug_flag),
            Arc::downgrade(self),
        );
        let built = factory(base).and_then(|mut module| {
            let found = module.kind_mut().base_kind();
            if found == info.base {
                Ok(module)
            } else {
                Err(CoreException::new(ErrorKind::FactoryFailure, "Module does not implement its declared base")
                    .with("expected", info.base)
                    .with("found", found))
            }
        });
        let module = match built {
            Ok(module) => module,
            Err(e) => {
                self.state.write().tree.remove(id);
                let e = if e.kind() == ErrorKind::FactoryFailure {
                    e
                } else {
                    e.rewrap(ErrorKind::FactoryFailure, "Module factory failed")
                };
                return Err(e.with("key", key).with("id", id));
            }
        };

        if lock {
            if let Some(entry) = self.state.write().keys.get_mut(key) {
                entry.locked = true;
            }
        }
        debug!(key, id, parent_id, name = %info.name, "Module instance created.");
        Ok(ModulePtr::new(module, image, Arc::downgrade(self)))
    }

    pub(crate) fn retire_instance(&self, id: u64) {
        self.state.write().tree.retire(id);
        debug!(id, "Module instance released.");
    }
}

/// Registry of module keys and lifecycle controller of their instances.
///
/// A key names a module together with its own copy of the module's options. Keys are
/// filled from supermodule manifests ([`load_module`](Self::load_module)) or from
/// closures ([`load_lambda_module`](Self::load_lambda_module)). The first instance
/// built from a key locks its options; every later instance shares that snapshot and
/// the cache bound to it.
pub struct ModuleManager {
    shared: Arc<Shared>,
}

impl fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("ModuleManager")
            .field("keys", &state.keys.keys().collect::<Vec<_>>())
            .field("supermodules", &state.supermodules.len())
            .field("instances", &state.tree.len())
            .finish()
    }
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleManager {
    /// A single-process manager with default settings and the built-in native loader.
    pub fn new() -> Self {
        Self::build(&RuntimeConfig::default(), Arc::new(SingleProcess))
    }

    pub fn with_config(config: &RuntimeConfig) -> CoreResult<Self> {
        Self::with_messenger(config, Arc::new(SingleProcess))
    }

    /// A manager exchanging distributed cache entries through `messenger`.
    pub fn with_messenger(config: &RuntimeConfig, messenger: Arc<dyn Messenger>) -> CoreResult<Self> {
        let mm = Self::build(config, messenger);
        if config.auto_start_sync {
            mm.start_cache_sync(config.cache_sync_interval.as_millis() as u64)?;
        }
        Ok(mm)
    }

    fn build(config: &RuntimeConfig, messenger: Arc<dyn Messenger>) -> Self {
        let native = Arc::new(NativeLoader::with_builtins());
        let mut loaders: BTreeMap<String, Arc<dyn SupermoduleLoader>> = BTreeMap::new();
        loaders.insert(native.language().to_string(), native.clone());
        let state = ManagerState {
            search_paths: config.search_paths.clone(),
            loaders,
            keys: BTreeMap::new(),
            supermodules: SlotMap::with_key(),
            image_index: BTreeMap::new(),
            load_order: Vec::new(),
            tree: ModuleTree::new(),
            debug_all: config.debug_all,
            sync_interval: config.cache_sync_interval,
        };
        info!(rank = messenger.rank(), size = messenger.size(), "Module manager created.");
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(state),
                caches: Arc::new(CacheRegistry::new()),
                sync_link: Arc::new(SyncLink::new()),
                sync: Mutex::new(None),
                messenger,
                native,
                next_id: AtomicU64::new(ROOT_ID + 1),
                next_key: AtomicU64::new(0),
            }),
        }
    }

    pub fn add_search_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(path = %path.display(), "Search path added.");
        self.shared.state.write().search_paths.push(path);
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.shared.state.read().search_paths.clone()
    }

    /// Registers the loader of one language, replacing any previous one.
    pub fn register_loader(&self, loader: Arc<dyn SupermoduleLoader>) {
        let language = loader.language().to_string();
        info!(%language, "Supermodule loader registered.");
        self.shared.state.write().loaders.insert(language, loader);
    }

    /// The loader of native supermodules, for registering images linked into the host.
    pub fn native_loader(&self) -> Arc<NativeLoader> {
        Arc::clone(&self.shared.native)
    }

    /// Locates the manifest of `supermodule`.
    ///
    /// Each search path is tried in order for `<path>/<supermodule>/manifest.toml`; a
    /// directory given directly as `supermodule` is also accepted. Failing that, every
    /// registered loader is asked for an embedded manifest.
    pub fn find_manifest(&self, supermodule: &str) -> CoreResult<Manifest> {
        let (paths, loaders) = {
            let state = self.shared.state.read();
            (
                state.search_paths.clone(),
                state.loaders.values().cloned().collect::<Vec<_>>(),
            )
        };
        let direct = Path::new(supermodule);
        let candidates = paths
            .iter()
            .map(|p| p.join(supermodule))
            .chain(direct.is_absolute().then(|| direct.to_path_buf()));
        for dir in candidates {
            if dir.join(MANIFEST_FILE).is_file() {
                debug!(supermodule, dir = %dir.display(), "Manifest found.");
                return Ok(Manifest::from_dir(supermodule, &dir)?);
            }
        }
        for loader in loaders {
            if let Some(manifest) = loader.embedded_manifest(supermodule) {
                return Ok(manifest?);
            }
        }
        Err(ManifestError::NotFound {
            supermodule: supermodule.to_string(),
            searched: paths,
        }
        .into())
    }

    /// Loads module `name` of `supermodule` under `key`.
    #[instrument(skip(self), name = "load_module")]
    pub fn load_module(&self, supermodule: &str, name: &str, key: &str) -> CoreResult<()> {
        self.shared.state.read().ensure_free(key)?;
        let manifest = self.find_manifest(supermodule)?;
        let info = manifest.module(name)?.clone();
        self.load_module_from_info(info, key)
    }

    /// Stores `info` under `key`, attaching its supermodule if this is its first use.
    ///
    /// # Errors
    ///
    /// `InvalidInfo` for incomplete information, `DuplicateKey`, `LoaderUnavailable`
    /// when no loader serves the language, and `SupermoduleLoad` when attaching fails.
    pub fn load_module_from_info(&self, info: ModuleInfo, key: &str) -> CoreResult<()> {
        let info = info.with_base_options();
        info.validate().map_err(|e| e.with("key", key))?;
        if info.language == LANGUAGE_LAMBDA {
            return Err(CoreException::new(
                ErrorKind::InvalidInfo,
                "Lambda modules are registered from a factory",
            )
            .with("key", key)
            .with("name", &info.name));
        }
        let (loader, attached) = {
            let state = self.shared.state.read();
            state.ensure_free(key)?;
            let loader = state.loaders.get(&info.language).cloned().ok_or_else(|| {
                CoreException::new(ErrorKind::LoaderUnavailable, "No loader for module language")
                    .with("key", key)
                    .with("language", &info.language)
            })?;
            (loader, state.image_index.get(&image_identity(&info)).copied())
        };
        let sid = match attached {
            Some(sid) => sid,
            None => self.attach(loader.as_ref(), &info, key)?,
        };

        let funcs_ok = self
            .shared
            .state
            .read()
            .supermodules
            .get(sid)
            .is_some_and(|h| h.funcs().has_creator(&info.name));
        if !funcs_ok {
            return Err(CoreException::new(ErrorKind::SupermoduleLoad, "Supermodule does not export the module")
                .with("key", key)
                .with("name", &info.name)
                .with("path", &info.path));
        }
        self.insert_key(key, info, ModuleSource::Supermodule(sid))
    }

    fn attach(&self, loader: &dyn SupermoduleLoader, info: &ModuleInfo, key: &str) -> CoreResult<SupermoduleId> {
        let image = loader.load(info).map_err(|e| e.with("key", key))?;
        let (handle, initialize) = SupermoduleHandle::new(info.path.clone(), info.path.clone(), image);
        if let Some(initialize) = initialize {
            if let Err(e) = initialize(self) {
                handle.disarm();
                return Err(e
                    .rewrap(ErrorKind::SupermoduleLoad, "Supermodule initialization failed")
                    .with("path", &info.path));
            }
        }
        let identity = image_identity(info);
        let mut state = self.shared.state.write();
        if let Some(sid) = state.image_index.get(&identity) {
            return Ok(*sid);
        }
        let sid = state.supermodules.insert(Arc::new(handle));
        state.image_index.insert(identity, sid);
        state.load_order.push(sid);
        info!(path = %info.path, language = %info.language, "Supermodule loaded.");
        Ok(sid)
    }

    /// Registers a module built by `factory` as a `TestModule` named `name`.
    pub fn load_lambda_module<F>(&self, factory: F, name: &str, key: &str) -> CoreResult<()>
    where
        F: Fn(ModuleBase) -> CoreResult<Box<dyn super::base::Module>> + Send + Sync + 'static,
    {
        let info = ModuleInfo::new(name, LANGUAGE_LAMBDA, BaseKind::TestModule, "<lambda>");
        self.load_lambda_module_with_info(factory, info, key)
    }

    /// Registers a module built by `factory` with explicit information.
    pub fn load_lambda_module_with_info<F>(&self, factory: F, info: ModuleInfo, key: &str) -> CoreResult<()>
    where
        F: Fn(ModuleBase) -> CoreResult<Box<dyn super::base::Module>> + Send + Sync + 'static,
    {
        let info = ModuleInfo {
            language: LANGUAGE_LAMBDA.to_string(),
            ..info
        }
        .with_base_options();
        info.validate().map_err(|e| e.with("key", key))?;
        self.insert_key(key, info, ModuleSource::Lambda(Arc::new(factory)))
    }

    fn insert_key(&self, key: &str, info: ModuleInfo, source: ModuleSource) -> CoreResult<()> {
        let hash = info.options.content_hash();
        {
            let mut state = self.shared.state.write();
            state.ensure_free(key)?;
            let debug = Arc::new(AtomicBool::new(state.debug_all));
            debug!(key, name = %info.name, language = %info.language, "Module key registered.");
            state.keys.insert(
                key.to_string(),
                KeyEntry {
                    info: Arc::new(info),
                    source,
                    locked: false,
                    debug,
                    last_instance: 0,
                },
            );
        }
        self.shared.caches.get_or_create(key, hash).rebind(hash);
        Ok(())
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.shared.state.read().keys.contains_key(key)
    }

    /// Number of registered keys.
    pub fn size(&self) -> usize {
        self.shared.state.read().keys.len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.shared.state.read().keys.keys().cloned().collect()
    }

    pub fn module_key_info(&self, key: &str) -> CoreResult<ModuleInfo> {
        Ok((*self.shared.state.read().entry(key)?.info).clone())
    }

    pub fn is_locked(&self, key: &str) -> CoreResult<bool> {
        Ok(self.shared.state.read().entry(key)?.locked)
    }

    /// Changes an option of a key that has not produced an instance yet.
    ///
    /// The key's cache is discarded when the new value changes the options' content hash.
    pub fn change_option(&self, key: &str, option: &str, value: impl Into<OptionValue>) -> CoreResult<()> {
        let hash = {
            let mut state = self.shared.state.write();
            let entry = state.entry_mut(key)?;
            if entry.locked {
                return Err(CoreException::new(
                    ErrorKind::OptionLocked,
                    "Options of a key are final once it has produced an instance",
                )
                .with("key", key)
                .with("option", option));
            }
            let info = Arc::make_mut(&mut entry.info);
            info.options
                .change(option, value)
                .map_err(|e| CoreException::from(e).with("key", key))?;
            info.options.content_hash()
        };
        if let Some(cache) = self.shared.caches.get(key) {
            cache.rebind(hash);
        }
        debug!(key, option, "Option changed.");
        Ok(())
    }

    /// Registers `dst` with a copy of the information and unlocked options of `src`.
    pub fn duplicate_key(&self, src: &str, dst: &str) -> CoreResult<()> {
        let (info, source) = {
            let state = self.shared.state.read();
            let entry = state.entry(src)?;
            ((*entry.info).clone(), entry.source.clone())
        };
        self.insert_key(dst, info, source)
    }

    /// A key that is not in use at the time of the call.
    pub fn generate_unique_key(&self) -> String {
        loop {
            let n = self.shared.next_key.fetch_add(1, Ordering::Relaxed);
            let key = format!("__pulsar_key_{n}");
            if !self.has_key(&key) {
                return key;
            }
        }
    }

    /// Builds a new instance of `key` whose parent is `parent_id` (`ROOT_ID` for none).
    ///
    /// The first successful call locks the key's options.
    #[instrument(skip(self), name = "get_module")]
    pub fn get_module(&self, key: &str, parent_id: u64) -> CoreResult<ModulePtr> {
        self.shared.create(key, parent_id, true)
    }

    /// Builds and self-tests one instance of every key, without locking any of them.
    ///
    /// # Return
    ///
    /// The number of keys tested.
    #[instrument(skip_all, name = "test_all")]
    pub fn test_all(&self) -> CoreResult<usize> {
        let keys = self.keys();
        for key in &keys {
            let mut module = self.shared.create(key, ROOT_ID, false)?;
            module.run_test()?;
            info!(key = %key, "Module test passed.");
        }
        Ok(keys.len())
    }

    pub fn enable_debug(&self, key: &str, enabled: bool) -> CoreResult<()> {
        self.shared
            .state
            .read()
            .entry(key)?
            .debug
            .store(enabled, Ordering::Relaxed);
        Ok(())
    }

    pub fn enable_debug_all(&self, enabled: bool) {
        let mut state = self.shared.state.write();
        state.debug_all = enabled;
        for entry in state.keys.values() {
            entry.debug.store(enabled, Ordering::Relaxed);
        }
    }

    /// Every instance ever created, in creation order, with the information of its key.
    pub fn flat_tree(&self) -> Vec<FlatTreeEntry> {
        let state = self.shared.state.read();
        state
            .tree
            .iter()
            .filter_map(|node| {
                let entry = state.keys.get(&node.key)?;
                Some(FlatTreeEntry {
                    id: node.id,
                    parent_id: node.parent_id,
                    key: node.key.clone(),
                    info: Arc::clone(&entry.info),
                    live: node.live,
                })
            })
            .collect()
    }

    pub fn caches(&self) -> Arc<CacheRegistry> {
        Arc::clone(&self.shared.caches)
    }

    /// The cache handle of `key`, as its instances see it.
    pub fn cache(&self, key: &str) -> Option<CacheData> {
        self.shared
            .caches
            .get(key)
            .map(|store| CacheData::new(store, Arc::clone(&self.shared.sync_link)))
    }

    pub fn messenger(&self) -> Arc<dyn Messenger> {
        Arc::clone(&self.shared.messenger)
    }

    /// Starts (or restarts) the background distribution of `DISTRIBUTE_GLOBAL` entries.
    pub fn start_cache_sync(&self, interval_ms: u64) -> CoreResult<()> {
        if interval_ms == 0 {
            return Err(CoreException::new(ErrorKind::OutOfRange, "Sync interval must be positive")
                .with("interval_ms", interval_ms));
        }
        let interval = Duration::from_millis(interval_ms);
        let mut sync = self.shared.sync.lock();
        if let Some(running) = sync.take() {
            running.stop();
        }
        *sync = Some(CacheSync::start(
            Arc::clone(&self.shared.caches),
            Arc::clone(&self.shared.messenger),
            Arc::clone(&self.shared.sync_link),
            interval,
        )?);
        self.shared.state.write().sync_interval = interval;
        Ok(())
    }

    pub fn stop_cache_sync(&self) {
        if let Some(running) = self.shared.sync.lock().take() {
            running.stop();
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.shared.sync.lock().is_some()
    }

    pub fn sync_interval(&self) -> Duration {
        self.shared.state.read().sync_interval
    }

    /// Runs one distribution round on the calling thread.
    pub fn sync_cache_now(&self) -> SyncStats {
        sync_round(&self.shared.caches, self.shared.messenger.as_ref(), &[])
    }
}

impl Drop for ModuleManager {
    fn drop(&mut self) {
        self.stop_cache_sync();

        let (order, live, images) = {
            let mut state = self.shared.state.write();
            let order: Vec<String> = state
                .keys
                .iter()
                .sorted_by(|a, b| b.1.last_instance.cmp(&a.1.last_instance))
                .map(|(k, _)| k.clone())
                .collect();
            let live: Vec<(u64, String)> = state.tree.live().map(|n| (n.id, n.key.clone())).collect();
            let load_order = std::mem::take(&mut state.load_order);
            let images: Vec<Arc<SupermoduleHandle>> = load_order
                .into_iter()
                .rev()
                .filter_map(|sid| state.supermodules.remove(sid))
                .collect();
            state.image_index.clear();
            (order, live, images)
        };

        for key in &order {
            if let Some(cache) = self.shared.caches.get(key) {
                cache.clear();
            }
        }
        if !live.is_empty() {
            warn!(
                count = live.len(),
                instances = %live.iter().map(|(id, key)| format!("{key}#{id}")).join(", "),
                "Module instances outlive their manager; their supermodules stay loaded until they drop."
            );
        }
        for image in images {
            if Arc::strong_count(&image) > 1 {
                debug!(supermodule = %image.name(), "Supermodule unload deferred to its last instance.");
            }
            drop(image);
        }
        self.shared.state.write().keys.clear();
        info!("Module manager destroyed.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::base::Module;
    use crate::engine::cache::CachePolicy;
    use crate::modules::creation::ModuleCreationFuncs;
    use crate::modules::kinds::{KindMut, TestModule};
    use crate::modules::loader::SupermoduleImage;

    struct Blank(ModuleBase);

    impl Module for Blank {
        fn base(&self) -> &ModuleBase {
            &self.0
        }
        fn kind_mut(&mut self) -> KindMut<'_> {
            KindMut::TestModule(self)
        }
    }

    impl TestModule for Blank {}

    fn blank(base: ModuleBase) -> CoreResult<Box<dyn Module>> {
        Ok(Box::new(Blank(base)))
    }

    #[test]
    fn lambda_keys_are_unique() {
        let mm = ModuleManager::new();
        mm.load_lambda_module(blank, "Blank", "P").unwrap();
        let err = mm.load_lambda_module(blank, "Blank", "P").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        assert!(mm.has_key("P"));
        assert_eq!(mm.size(), 1);
        assert_eq!(mm.module_key_info("P").unwrap().base, BaseKind::TestModule);
    }

    #[test]
    fn first_instance_locks_options() {
        let mm = ModuleManager::new();
        let mut info = ModuleInfo::new("Blank", LANGUAGE_LAMBDA, BaseKind::TestModule, "<t>");
        info.options
            .add_option("N", crate::core::options::OptionType::INT, false, None, "", Some(1_i64.into()))
            .unwrap();
        mm.load_lambda_module_with_info(blank, info, "P").unwrap();
        mm.change_option("P", "N", 2_i64).unwrap();

        let module = mm.get_module("P", ROOT_ID).unwrap();
        assert_eq!(module.base().options().get_int("N"), Ok(2));
        let err = mm.change_option("P", "N", 3_i64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OptionLocked);
        assert!(mm.is_locked("P").unwrap());
    }

    #[test]
    fn ids_increase_and_tree_records_parents() {
        let mm = ModuleManager::new();
        mm.load_lambda_module(blank, "Blank", "P").unwrap();
        let parent = mm.get_module("P", ROOT_ID).unwrap();
        let child = parent.base().create_child("P").unwrap();
        assert!(child.id() > parent.id());
        let tree = mm.flat_tree();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[1].parent_id, parent.id());

        let dead = parent.id();
        drop(child);
        drop(parent);
        let err = mm.get_module("P", dead).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParent);
        assert!(mm.flat_tree().iter().all(|n| !n.live));
    }

    #[test]
    fn factory_errors_become_factory_failures() {
        let mm = ModuleManager::new();
        mm.load_lambda_module(|_| Err(CoreException::kernel("no")), "Broken", "B")
            .unwrap();
        let err = mm.get_module("B", ROOT_ID).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FactoryFailure);
        assert_eq!(err.info_value("cause"), Some("no"));
        assert!(!mm.is_locked("B").unwrap());
        assert!(mm.flat_tree().is_empty());
    }

    #[test]
    fn duplicate_and_unique_keys() {
        let mm = ModuleManager::new();
        mm.load_lambda_module(blank, "Blank", "P").unwrap();
        mm.duplicate_key("P", "Q").unwrap();
        assert_eq!(mm.duplicate_key("X", "Y").unwrap_err().kind(), ErrorKind::NoSuchKey);
        assert_eq!(mm.duplicate_key("P", "Q").unwrap_err().kind(), ErrorKind::DuplicateKey);
        let key = mm.generate_unique_key();
        assert!(!mm.has_key(&key));
    }

    #[test]
    fn change_option_discards_the_cache() {
        let mut info = ModuleInfo::new("Blank", LANGUAGE_LAMBDA, BaseKind::TestModule, "<t>");
        info.options
            .add_option("X", crate::core::options::OptionType::FLOAT, false, None, "", Some(1.0.into()))
            .unwrap();
        let mm = ModuleManager::new();
        mm.load_lambda_module_with_info(blank, info, "P").unwrap();
        let cache = mm.cache("P").unwrap();
        cache
            .set("v", &1_i64, crate::engine::cache::CachePolicy::NO_POLICY)
            .unwrap();
        mm.change_option("P", "X", 1.0).unwrap();
        assert!(cache.count("v"));
        mm.change_option("P", "X", 2.0).unwrap();
        assert!(!cache.count("v"));
    }

    #[test]
    fn python_modules_need_a_registered_loader() {
        let mm = ModuleManager::new();
        let info = ModuleInfo::new("Py", "python_module", BaseKind::TestModule, "/opt/py");
        let err = mm.load_module_from_info(info, "PY").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoaderUnavailable);
    }

    #[test]
    fn missing_supermodule_lists_search_paths() {
        let mm = ModuleManager::new();
        mm.add_search_path("/nonexistent/a");
        let err = mm.load_module("nothing_here", "X", "K").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SupermoduleNotFound);
        assert_eq!(err.info_value("searched"), Some("/nonexistent/a"));
    }

    type Events = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        base: ModuleBase,
        events: Events,
    }

    impl Module for Recorder {
        fn base(&self) -> &ModuleBase {
            &self.base
        }
        fn kind_mut(&mut self) -> KindMut<'_> {
            KindMut::TestModule(self)
        }
    }

    impl TestModule for Recorder {}

    impl Drop for Recorder {
        fn drop(&mut self) {
            self.events.lock().push("instance dropped".to_string());
        }
    }

    /// Serves images exporting `Recorder`; finalize reports how many entries the watched
    /// cache still held when it ran.
    #[derive(Debug, Default)]
    struct RecordingLoader {
        events: Events,
        watched: Arc<Mutex<Option<CacheData>>>,
        refuse_initialize: bool,
    }

    impl SupermoduleLoader for RecordingLoader {
        fn language(&self) -> &str {
            "recording"
        }

        fn load(&self, _info: &ModuleInfo) -> CoreResult<SupermoduleImage> {
            let mut funcs = ModuleCreationFuncs::new();
            let events = Arc::clone(&self.events);
            funcs.add_creator("Recorder", move |base: ModuleBase| {
                base.cache().set("energy", &-1.5_f64, CachePolicy::CHECKPOINT_LOCAL)?;
                Ok(Box::new(Recorder {
                    base,
                    events: Arc::clone(&events),
                }) as Box<dyn Module>)
            });
            let refuse = self.refuse_initialize;
            let (events, watched) = (Arc::clone(&self.events), Arc::clone(&self.watched));
            Ok(SupermoduleImage {
                funcs,
                initialize: Some(Box::new(move |_: &ModuleManager| {
                    if refuse {
                        Err(CoreException::kernel("initialization refused"))
                    } else {
                        Ok(())
                    }
                })),
                finalize: Some(Box::new(move || {
                    let cached = watched.lock().take().map_or(0, |c| c.len());
                    events.lock().push(format!("finalize with {cached} cached"));
                })),
            })
        }
    }

    fn recording_manager(loader: &Arc<RecordingLoader>) -> ModuleManager {
        let mm = ModuleManager::new();
        mm.register_loader(Arc::clone(loader) as Arc<dyn SupermoduleLoader>);
        mm
    }

    fn recorder_info() -> ModuleInfo {
        ModuleInfo::new("Recorder", "recording", BaseKind::TestModule, "/opt/recorder")
    }

    #[test]
    fn teardown_clears_caches_and_instances_before_finalize() {
        let loader = Arc::new(RecordingLoader::default());
        let mm = recording_manager(&loader);
        mm.load_module_from_info(recorder_info(), "R").unwrap();
        *loader.watched.lock() = mm.cache("R");

        let instance = mm.get_module("R", ROOT_ID).unwrap();
        assert_eq!(mm.cache("R").unwrap().len(), 1);
        drop(instance);
        assert_eq!(*loader.events.lock(), vec!["instance dropped"]);

        drop(mm);
        assert_eq!(
            *loader.events.lock(),
            vec!["instance dropped", "finalize with 0 cached"]
        );
    }

    #[test]
    fn live_instance_defers_finalize_past_the_manager() {
        let loader = Arc::new(RecordingLoader::default());
        let mm = recording_manager(&loader);
        mm.load_module_from_info(recorder_info(), "R").unwrap();
        let instance = mm.get_module("R", ROOT_ID).unwrap();

        drop(mm);
        assert!(loader.events.lock().is_empty());
        assert_eq!(instance.supermodule(), Some("/opt/recorder"));
        drop(instance);
        assert_eq!(
            *loader.events.lock(),
            vec!["instance dropped", "finalize with 0 cached"]
        );
    }

    #[test]
    fn failed_initialize_does_not_finalize() {
        let loader = Arc::new(RecordingLoader {
            refuse_initialize: true,
            ..RecordingLoader::default()
        });
        let mm = recording_manager(&loader);
        let err = mm.load_module_from_info(recorder_info(), "R").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SupermoduleLoad);
        assert!(!mm.has_key("R"));
        drop(mm);
        assert!(loader.events.lock().is_empty());
    }
}
