use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Output sink of one module instance.
///
/// Every message becomes a `tracing` event tagged with the module key and instance id.
/// The debug channel is silent unless debugging is enabled for the key; the flag is
/// shared with the manager so it can be toggled after the instance exists.
#[derive(Debug, Clone)]
pub struct Output {
    module_key: Arc<str>,
    module_id: u64,
    debug_enabled: Arc<AtomicBool>,
}

impl Output {
    pub fn new(module_key: &str, module_id: u64, debug_enabled: Arc<AtomicBool>) -> Self {
        Self {
            module_key: Arc::from(module_key),
            module_id,
            debug_enabled,
        }
    }

    /// A sink with its own debug flag, for modules built outside a manager.
    pub fn detached(module_key: &str) -> Self {
        Self::new(module_key, 0, Arc::new(AtomicBool::new(false)))
    }

    pub fn module_key(&self) -> &str {
        &self.module_key
    }

    pub fn module_id(&self) -> u64 {
        self.module_id
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug_enabled.load(Ordering::Relaxed)
    }

    pub fn output(&self, message: impl AsRef<str>) {
        info!(module_key = %self.module_key, module_id = self.module_id, "{}", message.as_ref());
    }

    /// Reports a value that differs from its default or from a previous run.
    pub fn changed(&self, message: impl AsRef<str>) {
        info!(module_key = %self.module_key, module_id = self.module_id, changed = true, "{}", message.as_ref());
    }

    pub fn success(&self, message: impl AsRef<str>) {
        info!(module_key = %self.module_key, module_id = self.module_id, success = true, "{}", message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        warn!(module_key = %self.module_key, module_id = self.module_id, "{}", message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        error!(module_key = %self.module_key, module_id = self.module_id, "{}", message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        if self.debug_enabled() {
            debug!(module_key = %self.module_key, module_id = self.module_id, "{}", message.as_ref());
        }
    }
}
