use super::creation::ModuleCreationFuncs;
use super::info::{LANGUAGE_NATIVE, ModuleInfo};
use super::manager::ModuleManager;
use super::manifest::{Manifest, ManifestError};
use crate::core::error::{CoreException, CoreResult, ErrorKind};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

slotmap::new_key_type! {
    /// Handle of an attached supermodule inside a manager.
    pub struct SupermoduleId;
}

pub type InitializeHook = Box<dyn FnOnce(&ModuleManager) -> CoreResult<()> + Send>;
pub type FinalizeHook = Box<dyn FnOnce() + Send>;

/// What a loader hands back after attaching a supermodule.
pub struct SupermoduleImage {
    pub funcs: ModuleCreationFuncs,
    /// Run once by the manager before any factory of the image is used.
    pub initialize: Option<InitializeHook>,
    /// Run when the last reference to the attached image is dropped.
    pub finalize: Option<FinalizeHook>,
}

impl SupermoduleImage {
    pub fn new(funcs: ModuleCreationFuncs) -> Self {
        Self {
            funcs,
            initialize: None,
            finalize: None,
        }
    }
}

impl fmt::Debug for SupermoduleImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupermoduleImage")
            .field("funcs", &self.funcs)
            .field("initialize", &self.initialize.is_some())
            .field("finalize", &self.finalize.is_some())
            .finish()
    }
}

/// An attached supermodule, shared by the manager and every instance it produced.
pub struct SupermoduleHandle {
    name: String,
    path: String,
    funcs: ModuleCreationFuncs,
    finalize: Mutex<Option<FinalizeHook>>,
}

impl SupermoduleHandle {
    pub fn new(name: impl Into<String>, path: impl Into<String>, image: SupermoduleImage) -> (Self, Option<InitializeHook>) {
        let handle = Self {
            name: name.into(),
            path: path.into(),
            funcs: image.funcs,
            finalize: Mutex::new(image.finalize),
        };
        (handle, image.initialize)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn funcs(&self) -> &ModuleCreationFuncs {
        &self.funcs
    }

    /// Drops the finalize hook without running it.
    pub(crate) fn disarm(&self) {
        if self.finalize.lock().take().is_some() {
            debug!(supermodule = %self.name, "Finalize hook discarded.");
        }
    }
}

impl fmt::Debug for SupermoduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupermoduleHandle")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("funcs", &self.funcs)
            .finish()
    }
}

impl Drop for SupermoduleHandle {
    fn drop(&mut self) {
        if let Some(finalize) = self.finalize.get_mut().take() {
            finalize();
        }
        info!(supermodule = %self.name, path = %self.path, "Supermodule unloaded.");
    }
}

/// Attaches supermodules of one language.
pub trait SupermoduleLoader: Send + Sync + fmt::Debug {
    /// Language tag served, as it appears in `ModuleInfo::language`.
    fn language(&self) -> &str;

    /// A compiled-in manifest for `supermodule`, consulted when no search path has one.
    fn embedded_manifest(&self, _supermodule: &str) -> Option<Result<Manifest, ManifestError>> {
        None
    }

    fn load(&self, info: &ModuleInfo) -> CoreResult<SupermoduleImage>;
}

/// A native supermodule linked into the host.
#[derive(Clone, Copy)]
pub struct NativeEntry {
    pub insert_supermodule: fn() -> ModuleCreationFuncs,
    pub initialize: Option<fn(&ModuleManager) -> CoreResult<()>>,
    pub finalize: Option<fn()>,
    /// Manifest text, for supermodules that ship no directory.
    pub manifest: Option<&'static str>,
}

impl NativeEntry {
    pub fn new(insert_supermodule: fn() -> ModuleCreationFuncs) -> Self {
        Self {
            insert_supermodule,
            initialize: None,
            finalize: None,
            manifest: None,
        }
    }
}

impl fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEntry")
            .field("initialize", &self.initialize.is_some())
            .field("finalize", &self.finalize.is_some())
            .field("embedded", &self.manifest.is_some())
            .finish()
    }
}

/// Loader of `c_module` supermodules.
///
/// Entries are registered under the stem of their `modpath`: `libscf.so`, `scf.dylib`
/// and `scf.dll` all resolve to the entry `scf`.
#[derive(Debug, Default)]
pub struct NativeLoader {
    entries: RwLock<BTreeMap<String, NativeEntry>>,
}

impl NativeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader that already knows the built-in supermodule.
    pub fn with_builtins() -> Self {
        let loader = Self::new();
        loader.register(super::builtin::SUPERMODULE, super::builtin::entry());
        loader
    }

    pub fn register(&self, name: impl Into<String>, entry: NativeEntry) {
        let name = name.into();
        debug!(entry = %name, "Native supermodule registered.");
        self.entries.write().insert(name, entry);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn entry_name(modpath: &str) -> String {
        let stem = Path::new(modpath)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(modpath);
        stem.strip_prefix("lib").unwrap_or(stem).to_string()
    }
}

impl SupermoduleLoader for NativeLoader {
    fn language(&self) -> &str {
        LANGUAGE_NATIVE
    }

    fn embedded_manifest(&self, supermodule: &str) -> Option<Result<Manifest, ManifestError>> {
        let text = self.entries.read().get(supermodule)?.manifest?;
        Some(Manifest::parse(supermodule, Path::new(supermodule), text))
    }

    fn load(&self, info: &ModuleInfo) -> CoreResult<SupermoduleImage> {
        let name = Self::entry_name(&info.modpath);
        let entry = self.entries.read().get(&name).copied().ok_or_else(|| {
            CoreException::new(ErrorKind::SupermoduleLoad, "No native supermodule with this name is linked")
                .with("path", &info.path)
                .with("modpath", &info.modpath)
        })?;
        let funcs = (entry.insert_supermodule)();
        debug!(entry = %name, creators = funcs.len(), "Native supermodule attached.");
        Ok(SupermoduleImage {
            funcs,
            initialize: entry
                .initialize
                .map(|f| Box::new(move |mm: &ModuleManager| f(mm)) as InitializeHook),
            finalize: entry.finalize.map(|f| Box::new(f) as FinalizeHook),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::kinds::BaseKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn entry_names_strip_prefix_and_extension() {
        assert_eq!(NativeLoader::entry_name("libscf.so"), "scf");
        assert_eq!(NativeLoader::entry_name("scf.dll"), "scf");
        assert_eq!(NativeLoader::entry_name("sub/libints.dylib"), "ints");
    }

    #[test]
    fn unknown_native_image_fails_to_load() {
        let loader = NativeLoader::new();
        let info = ModuleInfo::new("X", LANGUAGE_NATIVE, BaseKind::TestModule, "/opt/x")
            .with_modpath("libx.so");
        let err = loader.load(&info).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::SupermoduleLoad);
    }

    #[test]
    fn finalize_runs_when_the_handle_drops() {
        static FINALIZED: AtomicUsize = AtomicUsize::new(0);
        let image = SupermoduleImage {
            funcs: ModuleCreationFuncs::new(),
            initialize: None,
            finalize: Some(Box::new(|| {
                FINALIZED.fetch_add(1, Ordering::SeqCst);
            })),
        };
        let (handle, init) = SupermoduleHandle::new("x", "/x", image);
        assert!(init.is_none());
        drop(handle);
        assert_eq!(FINALIZED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disarmed_handle_skips_finalize() {
        static FINALIZED: AtomicUsize = AtomicUsize::new(0);
        let image = SupermoduleImage {
            funcs: ModuleCreationFuncs::new(),
            initialize: None,
            finalize: Some(Box::new(|| {
                FINALIZED.fetch_add(1, Ordering::SeqCst);
            })),
        };
        let (handle, _) = SupermoduleHandle::new("x", "/x", image);
        handle.disarm();
        drop(handle);
        assert_eq!(FINALIZED.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn builtins_expose_an_embedded_manifest() {
        let loader = NativeLoader::with_builtins();
        let manifest = loader
            .embedded_manifest(crate::modules::builtin::SUPERMODULE)
            .unwrap()
            .unwrap();
        assert!(manifest.modules.contains_key("NullFragmenter"));
        assert!(loader.embedded_manifest("other").is_none());
    }
}
