use super::Point;
use super::atom::Atom;
use super::space::Space;
use crate::core::hash::{ContentHasher, StableHash};
use crate::core::math::{MathSet, MathSetError, Universe};
use crate::core::serialize::Serializable;
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub type AtomSetUniverse = Universe<Atom>;

/// A set of atoms drawn from a shared [`AtomSetUniverse`], plus the space they live in.
///
/// Every derived quantity is computed from the member atoms on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    atoms: MathSet<Atom>,
    space: Space,
}

impl System {
    /// Creates a system over `universe`, either empty or holding every atom.
    pub fn new(universe: AtomSetUniverse, fill: bool) -> Self {
        Self {
            atoms: MathSet::new(universe, fill),
            space: Space::default(),
        }
    }

    /// A system holding exactly `atoms`, over a freshly built universe.
    pub fn from_atoms(atoms: impl IntoIterator<Item = Atom>) -> Self {
        Self::new(atoms.into_iter().collect(), true)
    }

    pub fn from_set(atoms: MathSet<Atom>, space: Space) -> Self {
        Self { atoms, space }
    }

    pub fn with_space(mut self, space: Space) -> Self {
        self.space = space;
        self
    }

    pub fn universe(&self) -> &AtomSetUniverse {
        self.atoms.universe()
    }

    pub fn atoms(&self) -> &MathSet<Atom> {
        &self.atoms
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<Atom>> + '_ {
        self.atoms.iter()
    }

    pub fn insert(&mut self, atom: &Atom) -> Result<(), MathSetError> {
        self.atoms.insert(atom)
    }

    pub fn insert_idx(&mut self, idx: usize) -> Result<(), MathSetError> {
        self.atoms.insert_idx(idx)
    }

    pub fn count(&self, atom: &Atom) -> bool {
        self.atoms.count(atom)
    }

    pub fn sum_mass(&self) -> f64 {
        self.iter().map(|a| a.mass()).sum()
    }

    /// Sum of the formal charges of the regular atoms.
    pub fn sum_charge(&self) -> f64 {
        self.iter()
            .filter(|a| a.kind() == super::AtomKind::Regular)
            .map(|a| a.charge())
            .sum()
    }

    pub fn sum_nuclear_charge(&self) -> f64 {
        self.iter().map(|a| a.nuclear_charge()).sum()
    }

    pub fn sum_n_electrons(&self) -> f64 {
        self.iter().map(|a| a.n_electrons()).sum()
    }

    /// Lowest spin multiplicity compatible with the electron count: 1 when even, 2 when odd.
    pub fn multiplicity(&self) -> u32 {
        let n = self.sum_n_electrons().round() as i64;
        (n.rem_euclid(2) + 1) as u32
    }

    fn weighted_center(&self, weight: impl Fn(&Atom) -> f64) -> Point {
        let mut total = 0.0;
        let mut acc = Vector3::zeros();
        for atom in self.iter() {
            let w = weight(&atom);
            total += w;
            acc += atom.position().coords * w;
        }
        if total == 0.0 {
            Point::origin()
        } else {
            Point::from(acc / total)
        }
    }

    pub fn center_of_mass(&self) -> Point {
        self.weighted_center(Atom::mass)
    }

    pub fn center_of_nuclear_charge(&self) -> Point {
        self.weighted_center(Atom::nuclear_charge)
    }

    /// Moment of inertia tensor about the center of mass.
    pub fn inertia_tensor(&self) -> Matrix3<f64> {
        let com = self.center_of_mass();
        let mut tensor = Matrix3::zeros();
        for atom in self.iter() {
            let r = atom.position() - com;
            let m = atom.mass();
            tensor += (Matrix3::identity() * r.norm_squared() - r * r.transpose()) * m;
        }
        tensor
    }

    /// Distance between the i-th and j-th atoms in iteration order.
    pub fn distance(&self, i: usize, j: usize) -> Result<f64, MathSetError> {
        let atoms = self.atoms.elements();
        let pick = |k: usize| {
            atoms.get(k).ok_or(MathSetError::OutOfRange {
                index: k,
                size: atoms.len(),
            })
        };
        Ok(nalgebra::distance(pick(i)?.position(), pick(j)?.position()))
    }

    /// Applies `f` to every atom. The result lives in a new universe.
    pub fn transform(&self, f: impl Fn(&Atom) -> Atom) -> System {
        Self {
            atoms: self.atoms.transform(f),
            space: self.space,
        }
    }

    pub fn translate(&self, shift: Vector3<f64>) -> System {
        self.transform(|a| {
            let mut moved = a.clone();
            moved.set_position(a.position() + shift);
            moved
        })
    }

    /// Rotates every atom about the origin.
    pub fn rotate(&self, rotation: &Rotation3<f64>) -> System {
        self.transform(|a| {
            let mut moved = a.clone();
            moved.set_position(rotation * a.position());
            moved
        })
    }

    /// The atoms satisfying `pred`, over the same universe.
    pub fn partition(&self, pred: impl Fn(&Atom) -> bool) -> System {
        Self {
            atoms: self.atoms.partition(pred),
            space: self.space,
        }
    }

    pub fn union(&self, other: &System) -> Result<System, MathSetError> {
        Ok(Self {
            atoms: self.atoms.union(&other.atoms)?,
            space: self.space,
        })
    }

    pub fn intersection(&self, other: &System) -> Result<System, MathSetError> {
        Ok(Self {
            atoms: self.atoms.intersection(&other.atoms)?,
            space: self.space,
        })
    }

    pub fn difference(&self, other: &System) -> Result<System, MathSetError> {
        Ok(Self {
            atoms: self.atoms.difference(&other.atoms)?,
            space: self.space,
        })
    }

    pub fn complement(&self) -> System {
        Self {
            atoms: self.atoms.complement(),
            space: self.space,
        }
    }

    pub fn is_subset_of(&self, other: &System) -> Result<bool, MathSetError> {
        self.atoms.is_subset_of(&other.atoms)
    }
}

impl StableHash for System {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        self.atoms.stable_hash(hasher);
        self.space.stable_hash(hasher);
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "System: {} atoms, charge {}, multiplicity {}",
            self.len(),
            self.sum_charge(),
            self.multiplicity()
        )?;
        for atom in self.iter() {
            writeln!(f, "{}", atom)?;
        }
        Ok(())
    }
}

impl Serializable for System {
    const TYPE_TAG: &'static str = "System";
}

impl Serializable for AtomSetUniverse {
    const TYPE_TAG: &'static str = "AtomSetUniverse";
}

impl Serializable for MathSet<Atom> {
    const TYPE_TAG: &'static str = "AtomSet";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::AtomKind;
    use crate::core::serialize::{from_bytes, to_bytes};

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn water() -> System {
        System::from_atoms([
            Atom::new(8, Point::new(0.0, 0.0, 0.0)),
            Atom::new(1, Point::new(0.0, 1.43, 1.11)),
            Atom::new(1, Point::new(0.0, -1.43, 1.11)),
        ])
    }

    #[test]
    fn electron_count_is_z_minus_charge() {
        let ion = System::from_atoms([
            Atom::new(8, Point::origin()).with_charge(-1.0),
            Atom::new(1, Point::new(0.0, 0.0, 1.8)),
            Atom::ghost(1, Point::new(5.0, 0.0, 0.0)),
            Atom::dummy(Point::new(9.0, 0.0, 0.0)),
        ]);
        let sum_z: f64 = ion
            .iter()
            .filter(|a| a.kind() == AtomKind::Regular)
            .map(|a| a.z() as f64)
            .sum();
        assert_eq!(ion.sum_n_electrons(), sum_z - ion.sum_charge());
        assert_eq!(ion.sum_n_electrons(), 10.0);
        assert_eq!(ion.multiplicity(), 1);
    }

    #[test]
    fn odd_electron_count_gives_doublet() {
        let oh = System::from_atoms([
            Atom::new(8, Point::origin()),
            Atom::new(1, Point::new(0.0, 0.0, 1.8)),
        ]);
        assert_eq!(oh.multiplicity(), 2);
    }

    #[test]
    fn center_of_mass_lies_on_symmetry_axis() {
        let com = water().center_of_mass();
        assert!(f64_approx_equal(com.x, 0.0));
        assert!(f64_approx_equal(com.y, 0.0));
        assert!(com.z > 0.0 && com.z < 1.11);
    }

    #[test]
    fn inertia_tensor_is_symmetric_and_diagonal_for_planar_water() {
        let tensor = water().inertia_tensor();
        assert!(f64_approx_equal(tensor[(0, 1)], tensor[(1, 0)]));
        assert!(f64_approx_equal(tensor[(0, 1)], 0.0));
        assert!(f64_approx_equal(tensor[(1, 2)], 0.0));
        // Planar in yz: Ixx = Iyy + Izz.
        assert!(f64_approx_equal(tensor[(0, 0)], tensor[(1, 1)] + tensor[(2, 2)]));
    }

    #[test]
    fn transform_breaks_universe_identity() {
        let sys = water();
        let moved = sys.translate(Vector3::new(1.0, 0.0, 0.0));
        assert!(!moved.universe().ptr_eq(sys.universe()));
        assert_eq!(moved.len(), 3);
        assert!(f64_approx_equal(moved.center_of_mass().x, 1.0));
        assert!(sys.union(&moved).is_err());
    }

    #[test]
    fn rotation_preserves_distances() {
        let sys = water();
        let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.7);
        let turned = sys.rotate(&rot);
        assert!(f64_approx_equal(
            sys.distance(1, 2).unwrap(),
            turned.distance(1, 2).unwrap()
        ));
        assert!(sys.distance(0, 3).is_err());
    }

    #[test]
    fn partition_and_complement_split_the_system() {
        let sys = water();
        let hydrogens = sys.partition(|a| a.z() == 1);
        let oxygen = hydrogens.complement();
        assert_eq!(hydrogens.len(), 2);
        assert_eq!(oxygen.len(), 1);
        assert_eq!(hydrogens.union(&oxygen).unwrap(), sys);
        assert!(hydrogens.is_subset_of(&sys).unwrap());
    }

    #[test]
    fn serialization_round_trip_preserves_system() {
        let sys = water().partition(|a| a.z() == 1);
        let back: System = from_bytes(&to_bytes(&sys).unwrap()).unwrap();
        assert_eq!(back, sys);
        assert_eq!(back.universe().len(), 3);
        assert_eq!(back.len(), 2);
    }
}
