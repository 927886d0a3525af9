use super::base::{Module, ModuleBase, ModulePtr};
use super::info::ModuleInfo;
use super::manager::ModuleManager;
use super::tree::ROOT_ID;
use crate::core::error::{CoreException, CoreResult, ErrorKind};
use crate::core::options::OptionValue;
use crate::engine::cache::{Messenger, SyncStats};
use crate::engine::checkpoint::{Checkpoint, LoadReport};
use crate::engine::config::RuntimeConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

/// The user-facing entry point of the runtime.
///
/// Owns a [`ModuleManager`] and, when configured, the [`Checkpoint`] its caches are saved
/// to. Launchers, scripts and the C bridge all drive the runtime through this type.
#[derive(Debug)]
pub struct ModuleAdministrator {
    mm: ModuleManager,
    checkpoint: Option<Checkpoint>,
}

impl Default for ModuleAdministrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleAdministrator {
    pub fn new() -> Self {
        Self {
            mm: ModuleManager::new(),
            checkpoint: None,
        }
    }

    pub fn with_config(config: &RuntimeConfig) -> CoreResult<Self> {
        Ok(Self {
            mm: ModuleManager::with_config(config)?,
            checkpoint: Self::checkpoint_from(config),
        })
    }

    pub fn with_messenger(config: &RuntimeConfig, messenger: Arc<dyn Messenger>) -> CoreResult<Self> {
        Ok(Self {
            mm: ModuleManager::with_messenger(config, messenger)?,
            checkpoint: Self::checkpoint_from(config),
        })
    }

    fn checkpoint_from(config: &RuntimeConfig) -> Option<Checkpoint> {
        config
            .checkpoint_dir
            .as_deref()
            .map(|dir| Checkpoint::in_directory(dir, config.rank))
    }

    pub fn manager(&self) -> &ModuleManager {
        &self.mm
    }

    pub fn add_path(&self, path: impl Into<PathBuf>) {
        self.mm.add_search_path(path);
    }

    pub fn load_module(&self, supermodule: &str, name: &str, key: &str) -> CoreResult<()> {
        self.mm.load_module(supermodule, name, key)
    }

    pub fn load_module_from_info(&self, info: ModuleInfo, key: &str) -> CoreResult<()> {
        self.mm.load_module_from_info(info, key)
    }

    pub fn load_lambda_module<F>(&self, factory: F, name: &str, key: &str) -> CoreResult<()>
    where
        F: Fn(ModuleBase) -> CoreResult<Box<dyn Module>> + Send + Sync + 'static,
    {
        self.mm.load_lambda_module(factory, name, key)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.mm.has_key(key)
    }

    pub fn size(&self) -> usize {
        self.mm.size()
    }

    pub fn change_option(&self, key: &str, option: &str, value: impl Into<OptionValue>) -> CoreResult<()> {
        self.mm.change_option(key, option, value)
    }

    pub fn duplicate_key(&self, src: &str, dst: &str) -> CoreResult<()> {
        self.mm.duplicate_key(src, dst)
    }

    pub fn generate_unique_key(&self) -> String {
        self.mm.generate_unique_key()
    }

    /// A top-level instance of `key`.
    pub fn get_module(&self, key: &str) -> CoreResult<ModulePtr> {
        self.mm.get_module(key, ROOT_ID)
    }

    /// Builds a top-level instance of `key` and runs its self-test.
    #[instrument(skip(self), name = "run_test")]
    pub fn run_test(&self, key: &str) -> CoreResult<()> {
        let mut module = self.get_module(key)?;
        module.run_test()?;
        info!(key, "Module test passed.");
        Ok(())
    }

    pub fn test_all(&self) -> CoreResult<usize> {
        self.mm.test_all()
    }

    pub fn module_key_info(&self, key: &str) -> CoreResult<ModuleInfo> {
        self.mm.module_key_info(key)
    }

    pub fn enable_debug(&self, key: &str, enabled: bool) -> CoreResult<()> {
        self.mm.enable_debug(key, enabled)
    }

    pub fn enable_debug_all(&self, enabled: bool) {
        self.mm.enable_debug_all(enabled);
    }

    pub fn start_cache_sync(&self, interval_ms: u64) -> CoreResult<()> {
        self.mm.start_cache_sync(interval_ms)
    }

    pub fn stop_cache_sync(&self) {
        self.mm.stop_cache_sync();
    }

    pub fn sync_cache_now(&self) -> SyncStats {
        self.mm.sync_cache_now()
    }

    pub fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoint = Some(checkpoint);
    }

    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    fn require_checkpoint(&self) -> CoreResult<&Checkpoint> {
        self.checkpoint.as_ref().ok_or_else(|| {
            CoreException::new(ErrorKind::CheckpointIO, "No checkpoint is configured")
        })
    }

    /// Saves the local and global stores.
    ///
    /// # Return
    ///
    /// The numbers of local and global entries written.
    pub fn save_checkpoint(&self) -> CoreResult<(usize, usize)> {
        let checkpoint = self.require_checkpoint()?;
        Ok((
            checkpoint.save_local_cache(&self.mm)?,
            checkpoint.save_global_cache(&self.mm)?,
        ))
    }

    pub fn load_checkpoint(&self) -> CoreResult<(LoadReport, LoadReport)> {
        let checkpoint = self.require_checkpoint()?;
        Ok((
            checkpoint.load_local_cache(&self.mm)?,
            checkpoint.load_global_cache(&self.mm)?,
        ))
    }

    /// Human-readable summary of every key, its information and the instance tree.
    pub fn print_info(&self) -> String {
        let mut out = String::new();
        for key in self.mm.keys() {
            if let Ok(info) = self.mm.module_key_info(&key) {
                let locked = self.mm.is_locked(&key).unwrap_or(false);
                out.push_str(&format!("=== {key}{} ===\n", if locked { " (locked)" } else { "" }));
                out.push_str(&info.to_string());
            }
        }
        let tree = self.mm.flat_tree();
        if !tree.is_empty() {
            out.push_str("=== Instances ===\n");
            for node in tree {
                out.push_str(&format!(
                    "{:>6} <- {:<6} {:<20} {}{}\n",
                    node.id,
                    node.parent_id,
                    node.key,
                    node.info.name,
                    if node.live { "" } else { " (released)" }
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cache::CachePolicy;
    use crate::modules::kinds::{KindMut, TestModule};

    struct Writer(ModuleBase);

    impl Module for Writer {
        fn base(&self) -> &ModuleBase {
            &self.0
        }
        fn run_test(&mut self) -> CoreResult<()> {
            self.0
                .cache()
                .set("answer", &42_i64, CachePolicy::CHECKPOINT_LOCAL)
        }
        fn kind_mut(&mut self) -> KindMut<'_> {
            KindMut::TestModule(self)
        }
    }

    impl TestModule for Writer {}

    fn writer(base: ModuleBase) -> CoreResult<Box<dyn Module>> {
        Ok(Box::new(Writer(base)))
    }

    #[test]
    fn checkpoint_requires_configuration() {
        let admin = ModuleAdministrator::new();
        assert_eq!(admin.save_checkpoint().unwrap_err().kind(), ErrorKind::CheckpointIO);
    }

    #[test]
    fn run_test_then_checkpoint_round_trip() {
        let mut admin = ModuleAdministrator::new();
        admin.set_checkpoint(Checkpoint::in_memory());
        admin.load_lambda_module(writer, "Writer", "W").unwrap();
        admin.run_test("W").unwrap();
        assert_eq!(admin.save_checkpoint().unwrap(), (1, 0));

        admin.manager().cache("W").unwrap().erase("answer");
        let (local, _) = admin.load_checkpoint().unwrap();
        assert_eq!(local.restored, 1);
        let value = admin.manager().cache("W").unwrap().get::<i64>("answer", false).unwrap();
        assert_eq!(value, Some(42));
    }

    #[test]
    fn print_info_lists_keys_and_instances() {
        let admin = ModuleAdministrator::new();
        admin.load_lambda_module(writer, "Writer", "W").unwrap();
        admin.run_test("W").unwrap();
        let text = admin.print_info();
        assert!(text.contains("=== W (locked) ==="));
        assert!(text.contains("(released)"));
    }
}
