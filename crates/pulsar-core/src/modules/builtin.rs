//! The supermodule compiled into every manager.

use super::base::{Module, ModuleBase};
use super::creation::ModuleCreationFuncs;
use super::kinds::{KindMut, NMerInfo, NMerSet, SystemFragmenter, TestModule};
use super::loader::NativeEntry;
use crate::core::error::{CoreException, CoreResult};
use crate::core::models::System;
use crate::core::serialize::to_bytes;
use crate::engine::cache::CachePolicy;
use std::collections::BTreeSet;

pub const SUPERMODULE: &str = "pulsar_builtin";

const MANIFEST: &str = r#"
[modules.NullFragmenter]
language = "c_module"
base = "SystemFragmenter"
modpath = "libpulsar_builtin.so"
version = "1.0"
description = "Returns the whole system as a single fragment"

[modules.AtomFragmenter]
language = "c_module"
base = "SystemFragmenter"
modpath = "libpulsar_builtin.so"
version = "1.0"
description = "Returns one fragment per atom"

[modules.ChildTestRunner]
language = "c_module"
base = "TestModule"
modpath = "libpulsar_builtin.so"
version = "1.0"
description = "Creates another module as a child and runs its test"

[modules.ChildTestRunner.options.OTHER_MODULE]
type = "String"
required = true
help = "Key of the module to test"

[modules.CacheRoundTripTest]
language = "c_module"
base = "TestModule"
modpath = "libpulsar_builtin.so"
version = "1.0"
description = "Checks that cached values read back unchanged under every policy"
"#;

pub fn entry() -> NativeEntry {
    NativeEntry {
        manifest: Some(MANIFEST),
        ..NativeEntry::new(insert_supermodule)
    }
}

pub fn insert_supermodule() -> ModuleCreationFuncs {
    let mut funcs = ModuleCreationFuncs::new();
    funcs
        .add_creator("NullFragmenter", |base| Ok(Box::new(NullFragmenter(base)) as Box<dyn Module>))
        .add_creator("AtomFragmenter", |base| Ok(Box::new(AtomFragmenter(base)) as Box<dyn Module>))
        .add_creator("ChildTestRunner", |base| Ok(Box::new(ChildTestRunner(base)) as Box<dyn Module>))
        .add_creator("CacheRoundTripTest", |base| {
            Ok(Box::new(CacheRoundTripTest(base)) as Box<dyn Module>)
        });
    funcs
}

struct NullFragmenter(ModuleBase);

impl Module for NullFragmenter {
    fn base(&self) -> &ModuleBase {
        &self.0
    }

    fn run_test(&mut self) -> CoreResult<()> {
        let frags = self.fragmentize(&System::from_atoms(Vec::new()))?;
        check(frags.len() == 1, "NullFragmenter must return exactly one fragment")
    }

    fn kind_mut(&mut self) -> KindMut<'_> {
        KindMut::SystemFragmenter(self)
    }
}

impl SystemFragmenter for NullFragmenter {
    fn fragmentize(&mut self, system: &System) -> CoreResult<NMerSet> {
        let sn = BTreeSet::from([0]);
        Ok(NMerSet::from([(
            sn.clone(),
            NMerInfo {
                sn,
                nmer: system.clone(),
                weight: 1.0,
            },
        )]))
    }
}

struct AtomFragmenter(ModuleBase);

impl Module for AtomFragmenter {
    fn base(&self) -> &ModuleBase {
        &self.0
    }

    fn kind_mut(&mut self) -> KindMut<'_> {
        KindMut::SystemFragmenter(self)
    }
}

impl SystemFragmenter for AtomFragmenter {
    fn fragmentize(&mut self, system: &System) -> CoreResult<NMerSet> {
        let mut frags = NMerSet::new();
        for (serial, idx) in system.atoms().indices().enumerate() {
            let mut nmer = System::new(system.universe().clone(), false).with_space(*system.space());
            nmer.insert_idx(idx)?;
            let sn = BTreeSet::from([serial]);
            frags.insert(
                sn.clone(),
                NMerInfo {
                    sn,
                    nmer,
                    weight: 1.0,
                },
            );
        }
        self.0
            .out()
            .debug(format!("Split {} atoms into {} fragments", system.len(), frags.len()));
        Ok(frags)
    }
}

struct ChildTestRunner(ModuleBase);

impl Module for ChildTestRunner {
    fn base(&self) -> &ModuleBase {
        &self.0
    }

    fn run_test(&mut self) -> CoreResult<()> {
        let mut child = self.0.create_child_from_option("OTHER_MODULE")?;
        self.0
            .out()
            .output(format!("Testing child '{}' (id {})", child.key(), child.id()));
        child.run_test()?;
        self.0.out().success("Child test passed");
        Ok(())
    }

    fn kind_mut(&mut self) -> KindMut<'_> {
        KindMut::TestModule(self)
    }
}

impl TestModule for ChildTestRunner {}

struct CacheRoundTripTest(ModuleBase);

impl Module for CacheRoundTripTest {
    fn base(&self) -> &ModuleBase {
        &self.0
    }

    fn run_test(&mut self) -> CoreResult<()> {
        let cache = self.0.cache();
        let value = vec![1.0_f64, 2.0, 3.0, 4.0];
        let expected = to_bytes(&value)?;
        let policies = [
            CachePolicy::NO_POLICY,
            CachePolicy::CHECKPOINT_LOCAL,
            CachePolicy::CHECKPOINT_GLOBAL,
            CachePolicy::DISTRIBUTE_GLOBAL,
            CachePolicy::CHECKPOINT_LOCAL | CachePolicy::DISTRIBUTE_GLOBAL,
        ];
        for policy in policies {
            let key = format!("roundtrip {policy}");
            cache.set(&key, &value, policy)?;
            let raw = cache.get_raw(&key);
            check(
                raw.as_ref().is_some_and(|(bytes, p)| *bytes == expected && *p == policy),
                "Cached bytes differ from the stored value",
            )?;
            check(cache.get::<Vec<f64>>(&key, false)?.as_ref() == Some(&value), "Cached value differs")?;
            check(cache.erase(&key) && !cache.count(&key), "Erased entry is still present")?;
        }
        self.0.out().success("Cache round trip passed");
        Ok(())
    }

    fn kind_mut(&mut self) -> KindMut<'_> {
        KindMut::TestModule(self)
    }
}

impl TestModule for CacheRoundTripTest {}

fn check(condition: bool, what: &str) -> CoreResult<()> {
    if condition {
        Ok(())
    } else {
        Err(CoreException::kernel(what))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Atom, Point};
    use crate::modules::loader::{NativeLoader, SupermoduleLoader};
    use crate::modules::manager::ModuleManager;
    use crate::modules::tree::ROOT_ID;

    fn water() -> System {
        System::from_atoms([
            Atom::new(8, Point::new(0.0, 0.0, 0.0)),
            Atom::new(1, Point::new(0.0, 0.76, 0.59)),
            Atom::new(1, Point::new(0.0, -0.76, 0.59)),
        ])
    }

    #[test]
    fn every_creator_matches_the_manifest() {
        let funcs = insert_supermodule();
        let manifest = NativeLoader::with_builtins()
            .embedded_manifest(SUPERMODULE)
            .unwrap()
            .unwrap();
        for name in manifest.modules.keys() {
            assert!(funcs.has_creator(name), "{name}");
        }
        assert_eq!(funcs.len(), manifest.modules.len());
    }

    #[test]
    fn atom_fragmenter_stays_in_the_universe() {
        let mm = ModuleManager::new();
        mm.load_module(SUPERMODULE, "AtomFragmenter", "FRAG").unwrap();
        let mut module = mm.get_module("FRAG", ROOT_ID).unwrap();
        let system = water();
        let frags = module.as_system_fragmenter().unwrap().fragmentize(&system).unwrap();
        assert_eq!(frags.len(), 3);
        for frag in frags.values() {
            assert_eq!(frag.nmer.len(), 1);
            assert!(frag.nmer.universe().ptr_eq(system.universe()));
            assert!(frag.nmer.is_subset_of(&system).unwrap());
        }
    }

    #[test]
    fn child_runner_requires_its_option() {
        let mm = ModuleManager::new();
        mm.load_module(SUPERMODULE, "ChildTestRunner", "RUN").unwrap();
        mm.load_module(SUPERMODULE, "CacheRoundTripTest", "CACHE").unwrap();
        let err = mm.get_module("RUN", ROOT_ID).unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::UnmetRequiredOption);

        mm.change_option("RUN", "OTHER_MODULE", "CACHE").unwrap();
        let mut runner = mm.get_module("RUN", ROOT_ID).unwrap();
        runner.run_test().unwrap();
        let tree = mm.flat_tree();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[1].parent_id, runner.id());
        assert_eq!(tree[1].key, "CACHE");
    }

    #[test]
    fn null_fragmenter_passes_its_test() {
        let mm = ModuleManager::new();
        mm.load_module(SUPERMODULE, "NullFragmenter", "NULL").unwrap();
        assert_eq!(mm.test_all().unwrap(), 1);
        assert!(!mm.is_locked("NULL").unwrap());
    }
}
