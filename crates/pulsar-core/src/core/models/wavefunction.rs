use super::system::System;
use crate::core::error::{CoreException, ErrorKind};
use crate::core::hash::{ContentHasher, StableHash};
use crate::core::serialize::Serializable;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Irreducible representation labels of the supported point groups.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Irrep {
    A,
    Ap,
    App,
    A1,
    A2,
    Ag,
    Au,
    A1g,
    A2g,
    A1u,
    A2u,
    B,
    B1,
    B2,
    B3,
    Bg,
    Bu,
    B1g,
    B2g,
    B3g,
    B1u,
    B2u,
    B3u,
    E,
    E1,
    E2,
    Eg,
    Eu,
    T,
    T1,
    T2,
    Tg,
    Tu,
}

impl fmt::Display for Irrep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ap => f.write_str("A'"),
            Self::App => f.write_str("A''"),
            other => write!(f, "{:?}", other),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Spin {
    Alpha,
    Beta,
}

impl fmt::Display for Spin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alpha => "alpha",
            Self::Beta => "beta",
        })
    }
}

impl StableHash for Irrep {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_u8(*self as u8);
    }
}

impl StableHash for Spin {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_u8(*self as u8);
    }
}

/// A block-structured payload: one `T` per (irrep, spin) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrepSpin<T> {
    blocks: BTreeMap<(Irrep, Spin), T>,
}

impl<T> Default for IrrepSpin<T> {
    fn default() -> Self {
        Self {
            blocks: BTreeMap::new(),
        }
    }
}

impl<T> IrrepSpin<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, irrep: Irrep, spin: Spin) -> Option<&T> {
        self.blocks.get(&(irrep, spin))
    }

    pub fn get_mut(&mut self, irrep: Irrep, spin: Spin) -> Option<&mut T> {
        self.blocks.get_mut(&(irrep, spin))
    }

    /// Stores `value`, returning the block it replaced.
    pub fn set(&mut self, irrep: Irrep, spin: Spin, value: T) -> Option<T> {
        self.blocks.insert((irrep, spin), value)
    }

    pub fn erase(&mut self, irrep: Irrep, spin: Spin) -> Option<T> {
        self.blocks.remove(&(irrep, spin))
    }

    pub fn has(&self, irrep: Irrep, spin: Spin) -> bool {
        self.blocks.contains_key(&(irrep, spin))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = (Irrep, Spin)> + '_ {
        self.blocks.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = ((Irrep, Spin), &T)> + '_ {
        self.blocks.iter().map(|(k, v)| (*k, v))
    }

    /// True when both maps hold exactly the same set of blocks.
    pub fn same_structure<U>(&self, other: &IrrepSpin<U>) -> bool {
        self.blocks.len() == other.blocks.len()
            && self.blocks.keys().eq(other.blocks.keys())
    }
}

impl<T> FromIterator<((Irrep, Spin), T)> for IrrepSpin<T> {
    fn from_iter<I: IntoIterator<Item = ((Irrep, Spin), T)>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}

impl<T: StableHash> StableHash for IrrepSpin<T> {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        self.blocks.stable_hash(hasher);
    }
}

pub type BlockedMatrix = IrrepSpin<DMatrix<f64>>;
pub type BlockedVector = IrrepSpin<DVector<f64>>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WavefunctionError {
    #[error("{payload} blocks do not match the coefficient blocks")]
    BlockMismatch { payload: &'static str },
    #[error("{payload} block ({irrep}, {spin}) has shape {found}, expected {expected}")]
    ShapeMismatch {
        payload: &'static str,
        irrep: Irrep,
        spin: Spin,
        expected: String,
        found: String,
    },
}

impl WavefunctionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InconsistentWavefunction
    }
}

impl From<WavefunctionError> for CoreException {
    fn from(err: WavefunctionError) -> Self {
        let ex = CoreException::new(err.kind(), err.to_string());
        match &err {
            WavefunctionError::BlockMismatch { payload } => ex.with("payload", *payload),
            WavefunctionError::ShapeMismatch {
                payload,
                irrep,
                spin,
                ..
            } => ex
                .with("payload", *payload)
                .with("irrep", irrep.to_string())
                .with("spin", spin.to_string()),
        }
    }
}

/// A system plus its block-structured orbital data.
///
/// Every payload is optional; [`Wavefunction::valid_check`] verifies that the
/// present ones agree with each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wavefunction {
    pub system: Option<System>,
    /// MO coefficients, AO rows by MO columns.
    pub cmat: Option<BlockedMatrix>,
    /// One-particle density in the AO basis.
    pub opdm: Option<BlockedMatrix>,
    pub epsilon: Option<BlockedVector>,
    pub occupations: Option<BlockedVector>,
}

impl Wavefunction {
    pub fn new(system: System) -> Self {
        Self {
            system: Some(system),
            ..Self::default()
        }
    }

    /// Checks the consistency of the payloads that are present.
    ///
    /// With C present, ρ, ε and n must carry exactly C's blocks; ρ is square with C's
    /// row count and ε, n have one entry per column of C. Without C, ε and n must
    /// still agree with each other.
    ///
    /// # Return
    ///
    /// The first inconsistency found, in payload order.
    pub fn valid_check(&self) -> Result<(), WavefunctionError> {
        if let Some(cmat) = &self.cmat {
            if let Some(opdm) = &self.opdm {
                check_blocks("density", cmat, opdm, |c, d| {
                    let n = c.nrows();
                    ((n, n), d.shape())
                })?;
            }
            if let Some(eps) = &self.epsilon {
                check_blocks("orbital energies", cmat, eps, |c, e| {
                    ((c.ncols(), 1), (e.len(), 1))
                })?;
            }
            if let Some(occ) = &self.occupations {
                check_blocks("occupations", cmat, occ, |c, o| {
                    ((c.ncols(), 1), (o.len(), 1))
                })?;
            }
        }
        if let (Some(eps), Some(occ)) = (&self.epsilon, &self.occupations) {
            check_blocks("occupations", eps, occ, |e, o| {
                ((e.len(), 1), (o.len(), 1))
            })?;
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.valid_check().is_ok()
    }
}

fn check_blocks<A, B>(
    payload: &'static str,
    reference: &IrrepSpin<A>,
    candidate: &IrrepSpin<B>,
    shapes: impl Fn(&A, &B) -> ((usize, usize), (usize, usize)),
) -> Result<(), WavefunctionError> {
    if !reference.same_structure(candidate) {
        return Err(WavefunctionError::BlockMismatch { payload });
    }
    for ((irrep, spin), a) in reference.iter() {
        let Some(b) = candidate.get(irrep, spin) else {
            return Err(WavefunctionError::BlockMismatch { payload });
        };
        let (expected, found) = shapes(a, b);
        if expected != found {
            return Err(WavefunctionError::ShapeMismatch {
                payload,
                irrep,
                spin,
                expected: format!("{}x{}", expected.0, expected.1),
                found: format!("{}x{}", found.0, found.1),
            });
        }
    }
    Ok(())
}

impl StableHash for Wavefunction {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        self.system.stable_hash(hasher);
        self.cmat.stable_hash(hasher);
        self.opdm.stable_hash(hasher);
        self.epsilon.stable_hash(hasher);
        self.occupations.stable_hash(hasher);
    }
}

impl Serializable for Wavefunction {
    const TYPE_TAG: &'static str = "Wavefunction";
}
