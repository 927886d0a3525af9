use super::info::ModuleInfo;
use super::kinds::{
    EnergyMethod, FourCenterIntegral, KindMut, MatrixBuilder, SystemFragmenter, TestModule,
    ThreeCenterIntegral, TwoCenterIntegral,
};
use super::loader::SupermoduleHandle;
use super::manager::Shared;
use crate::core::error::{CoreException, CoreResult, ErrorKind};
use crate::core::models::Wavefunction;
use crate::core::options::OptionMap;
use crate::engine::cache::CacheData;
use crate::engine::output::Output;
use std::fmt;
use std::sync::{Arc, Weak};

/// State the manager hands to every module instance.
pub struct ModuleBase {
    id: u64,
    key: String,
    info: Arc<ModuleInfo>,
    options: Arc<OptionMap>,
    cache: CacheData,
    out: Output,
    manager: Weak<Shared>,
}

impl ModuleBase {
    pub(crate) fn new(
        id: u64,
        key: &str,
        info: Arc<ModuleInfo>,
        cache: CacheData,
        out: Output,
        manager: Weak<Shared>,
    ) -> Self {
        Self {
            id,
            key: key.to_string(),
            options: Arc::new(info.options.clone()),
            info,
            cache,
            out,
            manager,
        }
    }

    /// A base with a private cache and no manager, for using a module standalone.
    /// `create_child` fails on such a base.
    pub fn detached(key: &str, info: ModuleInfo) -> Self {
        Self::new(
            0,
            key,
            Arc::new(info),
            CacheData::detached(key),
            Output::detached(key),
            Weak::new(),
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    /// The option snapshot the instance was built with.
    pub fn options(&self) -> &OptionMap {
        &self.options
    }

    #[cfg(test)]
    pub(crate) fn options_mut(&mut self) -> &mut OptionMap {
        Arc::make_mut(&mut self.options)
    }

    pub fn cache(&self) -> &CacheData {
        &self.cache
    }

    pub fn out(&self) -> &Output {
        &self.out
    }

    /// Creates an instance of `key` whose parent is this instance.
    pub fn create_child(&self, key: &str) -> CoreResult<ModulePtr> {
        let shared = self.manager.upgrade().ok_or_else(|| {
            CoreException::new(ErrorKind::Internal, "Module is not attached to a live manager")
                .with("key", &self.key)
                .with("id", self.id)
        })?;
        shared.create(key, self.id, true)
    }

    /// Creates a child from the module key stored in the String option `option`.
    pub fn create_child_from_option(&self, option: &str) -> CoreResult<ModulePtr> {
        let key = self
            .options
            .get_string(option)
            .map_err(|e| CoreException::from(e).with("key", &self.key))?;
        self.create_child(&key)
    }
}

impl fmt::Debug for ModuleBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBase")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("name", &self.info.name)
            .finish()
    }
}

/// The surface shared by every module.
pub trait Module: Send {
    fn base(&self) -> &ModuleBase;

    /// Self-check run by `test_all` and the launcher.
    fn run_test(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// The module viewed through the trait of its base kind.
    fn kind_mut(&mut self) -> KindMut<'_>;
}

/// Owning handle of a module instance.
///
/// Holds the instance's supermodule so the image outlives the instance, and tells the
/// manager when the instance is dropped.
pub struct ModulePtr {
    // Drop order matters: the instance goes before the image that produced it.
    module: Box<dyn Module>,
    image: Option<Arc<SupermoduleHandle>>,
    registry: Weak<Shared>,
}

macro_rules! kind_accessor {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $trait:ident) => {
        $(#[$doc])*
        pub fn $name(&mut self) -> CoreResult<&mut dyn $trait> {
            let (key, id) = (self.key().to_string(), self.id());
            match self.module.kind_mut() {
                KindMut::$variant(m) => Ok(m),
                other => Err(CoreException::new(
                    ErrorKind::TypeMismatch,
                    concat!("Module is not a ", stringify!($variant)),
                )
                .with("key", key)
                .with("id", id)
                .with("base", other.base_kind())),
            }
        }
    };
}

impl ModulePtr {
    pub(crate) fn new(
        module: Box<dyn Module>,
        image: Option<Arc<SupermoduleHandle>>,
        registry: Weak<Shared>,
    ) -> Self {
        Self {
            module,
            image,
            registry,
        }
    }

    pub fn id(&self) -> u64 {
        self.module.base().id()
    }

    pub fn key(&self) -> &str {
        self.module.base().key()
    }

    pub fn base(&self) -> &ModuleBase {
        self.module.base()
    }

    pub fn supermodule(&self) -> Option<&str> {
        self.image.as_deref().map(SupermoduleHandle::name)
    }

    pub fn run_test(&mut self) -> CoreResult<()> {
        let (key, id) = (self.key().to_string(), self.id());
        self.module
            .run_test()
            .map_err(|e| e.with("key", key).with("id", id))
    }

    /// Runs `f` on the instance, annotating any error with the key and id.
    pub fn call<R>(&mut self, f: impl FnOnce(&mut dyn Module) -> CoreResult<R>) -> CoreResult<R> {
        let (key, id) = (self.key().to_string(), self.id());
        f(self.module.as_mut()).map_err(|e| e.with("key", key).with("id", id))
    }

    kind_accessor!(as_energy_method, EnergyMethod, EnergyMethod);
    kind_accessor!(as_matrix_builder, MatrixBuilder, MatrixBuilder);
    kind_accessor!(as_two_center_integral, TwoCenterIntegral, TwoCenterIntegral);
    kind_accessor!(as_three_center_integral, ThreeCenterIntegral, ThreeCenterIntegral);
    kind_accessor!(as_four_center_integral, FourCenterIntegral, FourCenterIntegral);
    kind_accessor!(as_system_fragmenter, SystemFragmenter, SystemFragmenter);
    kind_accessor!(as_test_module, TestModule, TestModule);

    /// `deriv` of an energy method, with errors annotated by key and id.
    pub fn deriv(&mut self, order: usize, wfn: &Wavefunction) -> CoreResult<(Wavefunction, Vec<f64>)> {
        let (key, id) = (self.key().to_string(), self.id());
        self.as_energy_method()?
            .deriv(order, wfn)
            .map_err(|e| e.with("key", key).with("id", id))
    }
}

impl fmt::Debug for ModulePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModulePtr")
            .field("base", self.module.base())
            .field("supermodule", &self.supermodule())
            .finish()
    }
}

impl Drop for ModulePtr {
    fn drop(&mut self) {
        if let Some(shared) = self.registry.upgrade() {
            shared.retire_instance(self.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::info::LANGUAGE_LAMBDA;
    use crate::modules::kinds::BaseKind;

    struct Failing(ModuleBase);

    impl Module for Failing {
        fn base(&self) -> &ModuleBase {
            &self.0
        }
        fn run_test(&mut self) -> CoreResult<()> {
            Err(CoreException::kernel("always fails"))
        }
        fn kind_mut(&mut self) -> KindMut<'_> {
            KindMut::TestModule(self)
        }
    }

    impl TestModule for Failing {}

    fn failing() -> ModulePtr {
        let info = ModuleInfo::new("Failing", LANGUAGE_LAMBDA, BaseKind::TestModule, "<t>");
        ModulePtr::new(Box::new(Failing(ModuleBase::detached("F", info))), None, Weak::new())
    }

    #[test]
    fn errors_are_annotated_with_key_and_id() {
        let mut ptr = failing();
        let err = ptr.run_test().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Kernel);
        assert_eq!(err.info_value("key"), Some("F"));
        assert_eq!(err.info_value("id"), Some("0"));
    }

    #[test]
    fn wrong_kind_accessor_is_a_type_mismatch() {
        let mut ptr = failing();
        assert!(ptr.as_test_module().is_ok());
        let err = ptr.as_energy_method().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(err.info_value("base"), Some("TestModule"));
    }

    #[test]
    fn detached_base_cannot_create_children() {
        let ptr = failing();
        let err = ptr.base().create_child("other").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
