//! # Pulsar Core Library
//!
//! The module runtime of a plug-in based quantum-chemistry framework. Pulsar does not
//! perform quantum chemistry itself; it discovers, configures, instantiates, composes and
//! checkpoints computational modules (SCF drivers, integral engines, fragmenters, ...) so
//! that heterogeneous kernels behave as one introspectable computation graph.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless building blocks: the structured
//!   [`CoreException`](core::error::CoreException), the stable content hasher, the versioned
//!   serializer, the option system, the generic `Universe`/`MathSet` containers and the data
//!   model (`Atom`, `System`, `BasisSet`, `Wavefunction`).
//!
//! - **[`engine`]: The Stateful Services.** Per-module caches with persistence policies, the
//!   background distribution worker, checkpoint storage and runtime configuration.
//!
//! - **[`modules`]: The Public Runtime.** Module metadata, supermodule loading, the
//!   `ModuleManager` registry and its user-facing `ModuleAdministrator` facade.

pub mod core;
pub mod engine;
pub mod modules;

pub use crate::core::error::{CoreException, CoreResult, ErrorKind};
pub use crate::modules::administrator::ModuleAdministrator;
pub use crate::modules::manager::ModuleManager;
