//! # Core Module
//!
//! Stateless foundation shared by every other layer of Pulsar.
//!
//! - **Error Reporting** ([`error`]) - The accreting `what + (key, value)*` exception
//! - **Content Hashing** ([`hash`]) - Stable 128-bit digests over canonical encodings
//! - **Serialization** ([`serialize`]) - Versioned, type-tagged byte envelopes
//! - **Configuration Values** ([`options`]) - Typed, validated, hashable module options
//! - **Set Algebra** ([`math`]) - Shared universes and index-set subsets
//! - **Data Model** ([`models`]) - Atoms, systems, basis sets and wavefunctions

pub mod error;
pub mod hash;
pub mod math;
pub mod models;
pub mod options;
pub mod serialize;
