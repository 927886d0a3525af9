//! # Data Model
//!
//! The values modules exchange: atoms and the systems built from them, Gaussian basis
//! sets anchored to a system, and block-structured wavefunctions.

pub mod atom;
pub mod basis;
pub mod elements;
pub mod space;
pub mod system;
pub mod wavefunction;

/// A point in Cartesian space, in bohr.
pub type Point = nalgebra::Point3<f64>;

pub use atom::{Atom, AtomKind};
pub use space::Space;
pub use system::{AtomSetUniverse, System};
pub use wavefunction::{Irrep, IrrepSpin, Spin, Wavefunction};
