use super::base::{Module, ModuleBase};
use crate::core::error::{CoreException, CoreResult, ErrorKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds one module instance from its prepared [`ModuleBase`].
pub type ModuleFactory = Arc<dyn Fn(ModuleBase) -> CoreResult<Box<dyn Module>> + Send + Sync>;

/// Name-to-factory table exported by a supermodule.
#[derive(Clone, Default)]
pub struct ModuleCreationFuncs {
    creators: BTreeMap<String, ModuleFactory>,
}

impl ModuleCreationFuncs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous one.
    pub fn add_creator<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(ModuleBase) -> CoreResult<Box<dyn Module>> + Send + Sync + 'static,
    {
        self.creators.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn has_creator(&self, name: &str) -> bool {
        self.creators.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<ModuleFactory> {
        self.creators.get(name).cloned()
    }

    pub fn create(&self, name: &str, base: ModuleBase) -> CoreResult<Box<dyn Module>> {
        let factory = self.creators.get(name).ok_or_else(|| {
            CoreException::new(ErrorKind::FactoryFailure, "Supermodule has no creator for module")
                .with("name", name)
        })?;
        factory(base)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.creators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.creators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creators.is_empty()
    }
}

impl fmt::Debug for ModuleCreationFuncs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.creators.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::info::{LANGUAGE_LAMBDA, ModuleInfo};
    use crate::modules::kinds::{BaseKind, KindMut, TestModule};

    struct Nothing(ModuleBase);

    impl Module for Nothing {
        fn base(&self) -> &ModuleBase {
            &self.0
        }
        fn kind_mut(&mut self) -> KindMut<'_> {
            KindMut::TestModule(self)
        }
    }

    impl TestModule for Nothing {}

    fn base() -> ModuleBase {
        ModuleBase::detached("K", ModuleInfo::new("Nothing", LANGUAGE_LAMBDA, BaseKind::TestModule, "<t>"))
    }

    #[test]
    fn creates_by_name() {
        let mut funcs = ModuleCreationFuncs::new();
        funcs.add_creator("Nothing", |b| Ok(Box::new(Nothing(b)) as Box<dyn Module>));
        assert!(funcs.has_creator("Nothing"));
        assert_eq!(funcs.names().collect::<Vec<_>>(), vec!["Nothing"]);
        let module = funcs.create("Nothing", base()).unwrap();
        assert_eq!(module.base().key(), "K");
    }

    #[test]
    fn unknown_name_is_a_factory_failure() {
        let funcs = ModuleCreationFuncs::new();
        let err = funcs.create("Missing", base()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::FactoryFailure);
        assert_eq!(err.info_value("name"), Some("Missing"));
    }
}
