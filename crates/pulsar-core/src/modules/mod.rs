//! # Modules Module
//!
//! The public runtime: how modules are described, found, attached, built and torn down.
//!
//! - **Metadata** ([`info`], [`manifest`]) - `ModuleInfo` and the TOML manifests of supermodules
//! - **Kinds** ([`kinds`]) - The fixed interface families a module can implement
//! - **Instances** ([`base`], [`creation`], [`tree`]) - Module state, factories and parent/child records
//! - **Loading** ([`loader`], [`builtin`]) - Per-language supermodule loaders and the compiled-in supermodule
//! - **Registry** ([`manager`], [`administrator`]) - The `ModuleManager` and its user-facing facade

pub mod administrator;
pub mod base;
pub mod builtin;
pub mod creation;
pub mod info;
pub mod kinds;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod tree;

pub use administrator::ModuleAdministrator;
pub use base::{Module, ModuleBase, ModulePtr};
pub use creation::{ModuleCreationFuncs, ModuleFactory};
pub use info::{LANGUAGE_LAMBDA, LANGUAGE_NATIVE, LANGUAGE_PYTHON, ModuleInfo};
pub use kinds::{
    BaseKind, EnergyMethod, FourCenterIntegral, KindMut, MatrixBuilder, NMerInfo, NMerSet,
    SystemFragmenter, TestModule, ThreeCenterIntegral, TwoCenterIntegral,
};
pub use loader::{NativeEntry, NativeLoader, SupermoduleImage, SupermoduleLoader};
pub use manager::{FlatTreeEntry, ModuleManager};
pub use manifest::{Manifest, ManifestError};
pub use tree::ROOT_ID;
