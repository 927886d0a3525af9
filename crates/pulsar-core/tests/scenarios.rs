use pulsar::core::math::{MathSet, MathSetError, Universe};
use pulsar::core::models::basis::{BasisCapacity, BasisInfo, BasisSet, BasisShellInfo, ShellType};
use pulsar::core::models::{Atom, Point, System};
use pulsar::core::options::OptionType;
use pulsar::engine::cache::CachePolicy;
use pulsar::engine::checkpoint::Checkpoint;
use pulsar::modules::{
    BaseKind, KindMut, LANGUAGE_LAMBDA, LANGUAGE_PYTHON, Module, ModuleBase, ModuleCreationFuncs,
    ModuleInfo, NativeEntry, ROOT_ID, SupermoduleImage, SupermoduleLoader, TestModule,
};
use pulsar::{CoreException, CoreResult, ErrorKind, ModuleManager};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

const TESTMODULES_MANIFEST: &str = r#"
[modules.TestPyModule1]
language = "python_module"
base = "TestModule"
version = "0.1"
description = "Scripted test module"

[modules.TestCppModule1]
language = "c_module"
base = "TestModule"
modpath = "libtestmodules.so"
version = "0.1"
description = "Native test module"
"#;

struct Echo(ModuleBase);

impl Module for Echo {
    fn base(&self) -> &ModuleBase {
        &self.0
    }

    fn run_test(&mut self) -> CoreResult<()> {
        self.0.out().output(format!("{} says hello", self.0.info().name));
        Ok(())
    }

    fn kind_mut(&mut self) -> KindMut<'_> {
        KindMut::TestModule(self)
    }
}

impl TestModule for Echo {}

fn echo(base: ModuleBase) -> CoreResult<Box<dyn Module>> {
    Ok(Box::new(Echo(base)))
}

fn native_testmodules() -> ModuleCreationFuncs {
    let mut funcs = ModuleCreationFuncs::new();
    funcs.add_creator("TestCppModule1", echo);
    funcs
}

/// Stands in for an embedded interpreter.
#[derive(Debug)]
struct ScriptLoader;

impl SupermoduleLoader for ScriptLoader {
    fn language(&self) -> &str {
        LANGUAGE_PYTHON
    }

    fn load(&self, _info: &ModuleInfo) -> CoreResult<SupermoduleImage> {
        let mut funcs = ModuleCreationFuncs::new();
        funcs.add_creator("TestPyModule1", echo);
        Ok(SupermoduleImage::new(funcs))
    }
}

fn testmodules_manager() -> (ModuleManager, TempDir) {
    let dir = tempdir().unwrap();
    let supermodule = dir.path().join("testmodules");
    std::fs::create_dir(&supermodule).unwrap();
    std::fs::write(supermodule.join("manifest.toml"), TESTMODULES_MANIFEST).unwrap();

    let mm = ModuleManager::new();
    mm.add_search_path(dir.path());
    mm.native_loader()
        .register("testmodules", NativeEntry::new(native_testmodules));
    mm.register_loader(Arc::new(ScriptLoader));
    (mm, dir)
}

#[test]
fn load_instantiate_and_call() {
    let (mm, _dir) = testmodules_manager();
    mm.load_module("testmodules", "TestPyModule1", "K1").unwrap();
    mm.load_module("testmodules", "TestCppModule1", "K2").unwrap();

    mm.get_module("K1", ROOT_ID).unwrap().run_test().unwrap();
    let mut k2 = mm.get_module("K2", ROOT_ID).unwrap();
    k2.run_test().unwrap();
    assert_eq!(k2.supermodule(), Some(mm.module_key_info("K2").unwrap().path.as_str()));

    assert!(mm.has_key("K1"));
    assert_eq!(mm.size(), 2);
    let err = mm.load_module("testmodules", "TestPyModule1", "K1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateKey);
}

fn child_runner_manager() -> (ModuleManager, TempDir) {
    let (mm, dir) = testmodules_manager();
    mm.load_module("testmodules", "TestCppModule1", "K1").unwrap();
    mm.load_module("pulsar_builtin", "ChildTestRunner", "K3").unwrap();
    (mm, dir)
}

#[test]
fn option_lifecycle() {
    let (mm, _dir) = child_runner_manager();
    let err = mm.get_module("K3", ROOT_ID).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnmetRequiredOption);
    assert_eq!(err.info_value("option"), Some("OTHER_MODULE"));

    mm.change_option("K3", "OTHER_MODULE", "K1").unwrap();
    let _module = mm.get_module("K3", ROOT_ID).unwrap();
    let err = mm.change_option("K3", "OTHER_MODULE", "K2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OptionLocked);
}

#[test]
fn nested_construction_records_the_parent() {
    let (mm, _dir) = child_runner_manager();
    mm.change_option("K3", "OTHER_MODULE", "K1").unwrap();
    let mut runner = mm.get_module("K3", ROOT_ID).unwrap();
    runner.run_test().unwrap();

    let tree: Vec<(u64, u64, String)> = mm
        .flat_tree()
        .into_iter()
        .map(|n| (n.id, n.parent_id, n.key))
        .collect();
    assert_eq!(tree.len(), 2);
    assert_eq!(tree[0], (runner.id(), ROOT_ID, "K3".to_string()));
    assert_eq!(tree[1].1, runner.id());
    assert_eq!(tree[1].2, "K1");
    assert!(tree[1].0 > runner.id());
}

#[test]
fn mathset_algebra_over_the_alphabet() {
    let universe: Universe<String> = ('a'..='z').map(String::from).collect();
    assert_eq!(universe.len(), 26);
    let mut s1 = MathSet::new(universe.clone(), false);
    for c in 'a'..='g' {
        s1.insert(&c.to_string()).unwrap();
    }
    let s9 = s1.complement();
    assert_eq!(s1.len() + s9.len(), 26);
    assert!(s9.count(&"h".to_string()) && s9.count(&"z".to_string()));
    assert_eq!(s1.union(&s9).unwrap().len(), 26);
    assert_eq!(s1.intersection(&s9).unwrap().len(), 0);
    assert_eq!(s1.complement().complement(), s1);
    assert!(matches!(
        s1.insert(&"Z".to_string()),
        Err(MathSetError::NotInUniverse(_))
    ));
    assert!(matches!(s1.insert_idx(26), Err(MathSetError::OutOfRange { .. })));
}

struct VectorWriter(ModuleBase);

impl Module for VectorWriter {
    fn base(&self) -> &ModuleBase {
        &self.0
    }

    fn run_test(&mut self) -> CoreResult<()> {
        self.0
            .cache()
            .set("Vector 1", &vec![1.0_f64, 2.0, 3.0], CachePolicy::CHECKPOINT_LOCAL)
    }

    fn kind_mut(&mut self) -> KindMut<'_> {
        KindMut::TestModule(self)
    }
}

impl TestModule for VectorWriter {}

fn writer_manager(scale: f64) -> ModuleManager {
    let mut info = ModuleInfo::new("VectorWriter", LANGUAGE_LAMBDA, BaseKind::TestModule, "<test>");
    info.options
        .add_option("SCALE", OptionType::FLOAT, false, None, "", Some(1.0.into()))
        .unwrap();
    let mm = ModuleManager::new();
    mm.load_lambda_module_with_info(|b| Ok(Box::new(VectorWriter(b)) as Box<dyn Module>), info, "M")
        .unwrap();
    if scale != 1.0 {
        mm.change_option("M", "SCALE", scale).unwrap();
    }
    mm
}

#[test]
fn cache_round_trip_through_a_checkpoint() {
    let dir = tempdir().unwrap();
    let checkpoint = Checkpoint::in_directory(dir.path(), 0);
    {
        let mm = writer_manager(1.0);
        mm.get_module("M", ROOT_ID).unwrap().run_test().unwrap();
        assert_eq!(checkpoint.save_local_cache(&mm).unwrap(), 1);
    }
    assert!(dir.path().join("pulsar_local.0.chk").is_file());

    let mm = writer_manager(1.0);
    let report = checkpoint.load_local_cache(&mm).unwrap();
    assert_eq!(report.restored, 1);
    let value = mm.cache("M").unwrap().get::<Vec<f64>>("Vector 1", false).unwrap();
    assert_eq!(value, Some(vec![1.0, 2.0, 3.0]));

    let other = writer_manager(2.0);
    let report = checkpoint.load_local_cache(&other).unwrap();
    assert_eq!((report.restored, report.stale), (0, 1));
    let value = other.cache("M").unwrap().get::<Vec<f64>>("Vector 1", false).unwrap();
    assert_eq!(value, None);
}

fn sto3g_hydrogen(x: f64, y: f64) -> Atom {
    let shell = BasisShellInfo::from_parts(
        ShellType::SphericalGaussian,
        0,
        vec![3.42525091, 0.62391373, 0.16885540],
        vec![vec![0.15432897, 0.53532814, 0.44463454]],
    )
    .unwrap();
    Atom::new(1, Point::new(x, y, 0.0)).with_basis("primary", BasisInfo::new("STO-3G", vec![shell]))
}

#[test]
fn basis_set_reshape() {
    let system = System::from_atoms([
        sto3g_hydrogen(0.0, 0.0),
        sto3g_hydrogen(1.0, 0.0),
        sto3g_hydrogen(0.0, 1.0),
    ]);
    let fresh = BasisSet::from_system(&system, "primary").unwrap();
    assert_eq!((fresh.n_shell(), fresh.n_primitives(), fresh.n_functions()), (3, 9, 3));

    let mut oversized = BasisSet::with_capacity(BasisCapacity {
        n_atoms_hint: 8,
        n_shells: 8,
        n_primitives: 64,
        n_coefs: 64,
    });
    for shell in fresh.iter() {
        oversized.add_shell(shell.info, *shell.center).unwrap();
    }
    assert_ne!(oversized.capacity(), fresh.capacity());
    assert_eq!(oversized.shrink_fit(), fresh);
}

#[test]
fn factory_failures_keep_the_manager_usable() {
    let mm = ModuleManager::new();
    mm.load_lambda_module(|_| Err(CoreException::kernel("boom")), "Broken", "BAD")
        .unwrap();
    mm.load_lambda_module(echo, "Echo", "GOOD").unwrap();
    let err = mm.test_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FactoryFailure);
    assert_eq!(err.info_value("key"), Some("BAD"));
    mm.get_module("GOOD", ROOT_ID).unwrap().run_test().unwrap();
}
