//! # Universe and MathSet
//!
//! A [`Universe`] is a monotone, shared, duplicate-free sequence. A [`MathSet`] selects a
//! subset of one universe by index and supports the usual set algebra between sets of
//! the same universe.

pub mod error;
pub mod mathset;
pub mod universe;

pub use error::MathSetError;
pub use mathset::MathSet;
pub use universe::{Universe, UniverseElement};
