use super::Point;
use super::basis::BasisInfo;
use super::elements;
use crate::core::hash::{ContentHasher, StableHash, canonical_f64_bits};
use crate::core::serialize::Serializable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Coordinates closer than this are treated as identical for equality and hashing.
pub const COORDINATE_TOLERANCE: f64 = 1e-10;

/// What kind of center an [`Atom`] represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum AtomKind {
    /// A nucleus with its electrons.
    #[default]
    Regular,
    /// Zero nuclear charge and no electrons; keeps its basis functions.
    Ghost,
    /// A bare scalar charge with no basis functions.
    PointCharge,
    /// A coordinate marker with no Z.
    Dummy,
}

/// A located nucleus, ghost, point charge or dummy center.
///
/// Equality and hashing round coordinates to [`COORDINATE_TOLERANCE`] so that atoms
/// produced by slightly different arithmetic still deduplicate in a universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    z: u32,
    isotope: u32,
    position: Point,
    charge: f64,
    kind: AtomKind,
    basis_sets: BTreeMap<String, BasisInfo>,
}

impl Atom {
    /// A regular atom with the natural isotope mix and no formal charge.
    pub fn new(z: u32, position: Point) -> Self {
        Self {
            z,
            isotope: 0,
            position,
            charge: 0.0,
            kind: AtomKind::Regular,
            basis_sets: BTreeMap::new(),
        }
    }

    pub fn from_symbol(symbol: &str, position: Point) -> Option<Self> {
        elements::z_from_symbol(symbol).map(|z| Self::new(z, position))
    }

    pub fn ghost(z: u32, position: Point) -> Self {
        Self {
            kind: AtomKind::Ghost,
            ..Self::new(z, position)
        }
    }

    pub fn point_charge(charge: f64, position: Point) -> Self {
        Self {
            charge,
            kind: AtomKind::PointCharge,
            ..Self::new(0, position)
        }
    }

    pub fn dummy(position: Point) -> Self {
        Self {
            kind: AtomKind::Dummy,
            ..Self::new(0, position)
        }
    }

    pub fn with_isotope(mut self, isotope: u32) -> Self {
        self.isotope = isotope;
        self
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_basis(mut self, label: impl Into<String>, info: BasisInfo) -> Self {
        self.basis_sets.insert(label.into(), info);
        self
    }

    pub fn z(&self) -> u32 {
        self.z
    }

    pub fn isotope(&self) -> u32 {
        self.isotope
    }

    pub fn position(&self) -> &Point {
        &self.position
    }

    pub fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn kind(&self) -> AtomKind {
        self.kind
    }

    pub fn basis_info(&self, label: &str) -> Option<&BasisInfo> {
        self.basis_sets.get(label)
    }

    pub fn basis_sets(&self) -> &BTreeMap<String, BasisInfo> {
        &self.basis_sets
    }

    pub fn insert_basis(&mut self, label: impl Into<String>, info: BasisInfo) {
        self.basis_sets.insert(label.into(), info);
    }

    pub fn symbol(&self) -> &'static str {
        match self.kind {
            AtomKind::PointCharge => "Q",
            AtomKind::Dummy => "X",
            _ => elements::element(self.z).map_or("?", |e| e.symbol),
        }
    }

    /// Mass in Dalton. Ghosts, point charges and dummies are massless.
    ///
    /// Uses the standard atomic weight for the natural mix, the tabulated isotope mass
    /// when known, and the mass number otherwise.
    pub fn mass(&self) -> f64 {
        if self.kind != AtomKind::Regular {
            return 0.0;
        }
        match self.isotope {
            0 => elements::element(self.z).map_or(0.0, |e| e.mass),
            iso => elements::isotope_mass(self.z, iso).unwrap_or(iso as f64),
        }
    }

    pub fn nuclear_charge(&self) -> f64 {
        match self.kind {
            AtomKind::Regular => self.z as f64,
            AtomKind::PointCharge => self.charge,
            AtomKind::Ghost | AtomKind::Dummy => 0.0,
        }
    }

    /// `Z - charge` for regular atoms, zero for every other kind.
    pub fn n_electrons(&self) -> f64 {
        match self.kind {
            AtomKind::Regular => self.z as f64 - self.charge,
            _ => 0.0,
        }
    }

    fn rounded_position(&self) -> [i64; 3] {
        let r = |x: f64| (x / COORDINATE_TOLERANCE).round() as i64;
        [r(self.position.x), r(self.position.y), r(self.position.z)]
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.z == other.z
            && self.isotope == other.isotope
            && self.kind == other.kind
            && self.rounded_position() == other.rounded_position()
            && canonical_f64_bits(self.charge) == canonical_f64_bits(other.charge)
            && self.basis_sets == other.basis_sets
    }
}

impl StableHash for Atom {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_u32(self.z);
        hasher.write_u32(self.isotope);
        hasher.write_u8(self.kind as u8);
        for c in self.rounded_position() {
            hasher.write_i64(c);
        }
        hasher.write_f64(self.charge);
        self.basis_sets.stable_hash(hasher);
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<3} {:>14.8} {:>14.8} {:>14.8}",
            self.symbol(),
            self.position.x,
            self.position.y,
            self.position.z
        )
    }
}

impl Serializable for Atom {
    const TYPE_TAG: &'static str = "Atom";
}
