use super::error::BasisError;
use super::ordering::AoOrdering;
use super::shell::{BasisShellInfo, ShellType};
use crate::core::hash::{ContentHasher, StableHash};
use crate::core::models::Point;
use crate::core::models::system::System;
use crate::core::serialize::Serializable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Upper bounds declared when a [`BasisSet`] is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BasisCapacity {
    pub n_atoms_hint: usize,
    pub n_shells: usize,
    pub n_primitives: usize,
    pub n_coefs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ShellRecord {
    center: Point,
    unique: usize,
}

/// Borrowed view of one shell of a [`BasisSet`].
#[derive(Debug, Clone, Copy)]
pub struct BasisSetShell<'a> {
    pub center: &'a Point,
    pub info: &'a BasisShellInfo,
    pub start: usize,
}

/// The flattened, System-anchored table of shells.
///
/// Shells with identical primitives and contractions share one entry of the unique-shell
/// table. Each shell records its center and the index of its first basis function, so
/// `shell_start(i) + n_functions(i) == shell_start(i + 1)` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "BasisSetRepr")]
pub struct BasisSet {
    capacity: BasisCapacity,
    unique: Vec<BasisShellInfo>,
    shells: Vec<ShellRecord>,
    starts: Vec<usize>,
    n_functions: usize,
    n_primitives: usize,
    n_coefs: usize,
}

impl BasisSet {
    pub fn with_capacity(capacity: BasisCapacity) -> Self {
        Self {
            capacity,
            unique: Vec::new(),
            shells: Vec::with_capacity(capacity.n_shells),
            starts: Vec::with_capacity(capacity.n_shells),
            n_functions: 0,
            n_primitives: 0,
            n_coefs: 0,
        }
    }

    /// Builds the basis set for `label` from the atoms of `system`, in system order.
    ///
    /// Atoms without a basis under `label` contribute no shells. The capacity of the
    /// result fits its content exactly.
    pub fn from_system(system: &System, label: &str) -> Result<Self, BasisError> {
        let mut capacity = BasisCapacity::default();
        for atom in system.iter() {
            if let Some(info) = atom.basis_info(label) {
                capacity.n_atoms_hint += 1;
                capacity.n_shells += info.shells.len();
                capacity.n_primitives += info.n_primitives();
                capacity.n_coefs += info.n_coefficients();
            }
        }

        let mut basis = Self::with_capacity(capacity);
        for atom in system.iter() {
            if let Some(info) = atom.basis_info(label) {
                for shell in &info.shells {
                    basis.add_shell(shell, *atom.position())?;
                }
            }
        }
        Ok(basis)
    }

    /// Appends a shell centered at `center`.
    ///
    /// # Errors
    ///
    /// Returns [`BasisError::Capacity`] if the shell would exceed any declared bound.
    pub fn add_shell(&mut self, info: &BasisShellInfo, center: Point) -> Result<(), BasisError> {
        let check = |what, requested, capacity| {
            if requested > capacity {
                Err(BasisError::Capacity {
                    what,
                    requested,
                    capacity,
                })
            } else {
                Ok(())
            }
        };
        check("shells", self.shells.len() + 1, self.capacity.n_shells)?;
        check(
            "primitives",
            self.n_primitives + info.n_primitives(),
            self.capacity.n_primitives,
        )?;
        check(
            "coefficients",
            self.n_coefs + info.n_coefficients(),
            self.capacity.n_coefs,
        )?;

        let unique = match self.unique.iter().position(|u| u == info) {
            Some(idx) => idx,
            None => {
                self.unique.push(info.clone());
                self.unique.len() - 1
            }
        };
        self.starts.push(self.n_functions);
        self.shells.push(ShellRecord { center, unique });
        self.n_functions += info.n_functions();
        self.n_primitives += info.n_primitives();
        self.n_coefs += info.n_coefficients();
        Ok(())
    }

    /// A copy whose capacity equals its current content.
    pub fn shrink_fit(&self) -> Self {
        let centers: Vec<&Point> = self.shells.iter().map(|s| &s.center).collect();
        let mut distinct: Vec<&Point> = Vec::new();
        for c in centers {
            if !distinct.contains(&c) {
                distinct.push(c);
            }
        }
        let mut fitted = self.clone();
        fitted.capacity = BasisCapacity {
            n_atoms_hint: distinct.len(),
            n_shells: self.shells.len(),
            n_primitives: self.n_primitives,
            n_coefs: self.n_coefs,
        };
        fitted.shells.shrink_to_fit();
        fitted.starts.shrink_to_fit();
        fitted.unique.shrink_to_fit();
        fitted
    }

    pub fn capacity(&self) -> BasisCapacity {
        self.capacity
    }

    pub fn n_shell(&self) -> usize {
        self.shells.len()
    }

    pub fn n_unique_shell(&self) -> usize {
        self.unique.len()
    }

    pub fn n_primitives(&self) -> usize {
        self.n_primitives
    }

    pub fn n_coefficients(&self) -> usize {
        self.n_coefs
    }

    pub fn n_functions(&self) -> usize {
        self.n_functions
    }

    pub fn shell(&self, i: usize) -> Result<BasisSetShell<'_>, BasisError> {
        let record = self.shells.get(i).ok_or(BasisError::OutOfRange {
            index: i,
            size: self.shells.len(),
        })?;
        Ok(BasisSetShell {
            center: &record.center,
            info: &self.unique[record.unique],
            start: self.starts[i],
        })
    }

    pub fn shell_start(&self, i: usize) -> Result<usize, BasisError> {
        Ok(self.shell(i)?.start)
    }

    pub fn shell_center(&self, i: usize) -> Result<Point, BasisError> {
        Ok(*self.shell(i)?.center)
    }

    pub fn iter(&self) -> impl Iterator<Item = BasisSetShell<'_>> {
        self.shells
            .iter()
            .zip(self.starts.iter())
            .map(|(record, start)| BasisSetShell {
                center: &record.center,
                info: &self.unique[record.unique],
                start: *start,
            })
    }

    pub fn unique_shells(&self) -> &[BasisShellInfo] {
        &self.unique
    }

    pub fn max_am(&self) -> Option<u32> {
        self.unique.iter().map(BasisShellInfo::max_am).max()
    }

    /// Every angular momentum present, with combined shells expanded.
    pub fn all_am(&self) -> BTreeSet<u32> {
        self.unique
            .iter()
            .flat_map(|s| (0..s.n_general_contractions()).filter_map(move |g| s.general_am(g).ok()))
            .collect()
    }

    pub fn max_n_functions(&self) -> usize {
        self.unique.iter().map(BasisShellInfo::n_functions).max().unwrap_or(0)
    }

    pub fn max_n_primitives(&self) -> usize {
        self.unique.iter().map(BasisShellInfo::n_primitives).max().unwrap_or(0)
    }

    /// Permutes per-function data from one spherical ordering convention to another.
    ///
    /// Cartesian shells are copied unchanged.
    pub fn reorder_functions(
        &self,
        data: &[f64],
        from: AoOrdering,
        to: AoOrdering,
    ) -> Result<Vec<f64>, BasisError> {
        if data.len() != self.n_functions {
            return Err(BasisError::LengthMismatch {
                expected: self.n_functions,
                found: data.len(),
            });
        }
        let mut out = data.to_vec();
        for shell in self.iter() {
            let mut offset = shell.start;
            for g in 0..shell.info.n_general_contractions() {
                let l = shell.info.general_am(g)?;
                let width = shell.info.general_n_functions(g)?;
                if shell.info.shell_type() == ShellType::SphericalGaussian {
                    for m in from.m_values(l) {
                        let (Some(src), Some(dst)) = (from.position(l, m), to.position(l, m))
                        else {
                            continue;
                        };
                        out[offset + dst] = data[offset + src];
                    }
                }
                offset += width;
            }
        }
        Ok(out)
    }
}

impl PartialEq for BasisSet {
    /// Structural equality: same shells on the same centers in the same order.
    fn eq(&self, other: &Self) -> bool {
        self.shells.len() == other.shells.len()
            && self.iter().zip(other.iter()).all(|(a, b)| {
                a.center == b.center && a.info == b.info && a.start == b.start
            })
    }
}

impl StableHash for BasisSet {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_usize(self.shells.len());
        for shell in self.iter() {
            shell.center.stable_hash(hasher);
            shell.info.stable_hash(hasher);
        }
    }
}

impl fmt::Display for BasisSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Basis set: {} shells, {} primitives, {} functions",
            self.n_shell(),
            self.n_primitives,
            self.n_functions
        )?;
        for (i, shell) in self.iter().enumerate() {
            write!(
                f,
                "Shell {:>4} start {:>5} center ({:>10.6}, {:>10.6}, {:>10.6}) ",
                i, shell.start, shell.center.x, shell.center.y, shell.center.z
            )?;
            write!(f, "{}", shell.info)?;
        }
        Ok(())
    }
}

impl Serializable for BasisSet {
    const TYPE_TAG: &'static str = "BasisSet";
}

/// Wire layout of [`BasisSet`], checked before it becomes one.
#[derive(Deserialize)]
struct BasisSetRepr {
    capacity: BasisCapacity,
    unique: Vec<BasisShellInfo>,
    shells: Vec<ShellRecord>,
    starts: Vec<usize>,
    n_functions: usize,
    n_primitives: usize,
    n_coefs: usize,
}

impl TryFrom<BasisSetRepr> for BasisSet {
    type Error = BasisError;

    fn try_from(repr: BasisSetRepr) -> Result<Self, Self::Error> {
        if repr.starts.len() != repr.shells.len() {
            return Err(BasisError::InconsistentShell(format!(
                "{} shell starts for {} shells",
                repr.starts.len(),
                repr.shells.len()
            )));
        }
        let (mut n_functions, mut n_primitives, mut n_coefs) = (0, 0, 0);
        for (i, (record, &start)) in repr.shells.iter().zip(&repr.starts).enumerate() {
            let info = repr.unique.get(record.unique).ok_or(BasisError::OutOfRange {
                index: record.unique,
                size: repr.unique.len(),
            })?;
            if start != n_functions {
                return Err(BasisError::InconsistentShell(format!(
                    "shell {i} starts at function {start}, expected {n_functions}"
                )));
            }
            n_functions += info.n_functions();
            n_primitives += info.n_primitives();
            n_coefs += info.n_coefficients();
        }
        let totals = [
            ("functions", repr.n_functions, n_functions),
            ("primitives", repr.n_primitives, n_primitives),
            ("coefficients", repr.n_coefs, n_coefs),
        ];
        for (what, stored, counted) in totals {
            if stored != counted {
                return Err(BasisError::InconsistentShell(format!(
                    "{stored} {what} recorded, shells hold {counted}"
                )));
            }
        }
        let bounds = [
            ("shells", repr.shells.len(), repr.capacity.n_shells),
            ("primitives", n_primitives, repr.capacity.n_primitives),
            ("coefficients", n_coefs, repr.capacity.n_coefs),
        ];
        for (what, requested, capacity) in bounds {
            if requested > capacity {
                return Err(BasisError::Capacity {
                    what,
                    requested,
                    capacity,
                });
            }
        }
        Ok(Self {
            capacity: repr.capacity,
            unique: repr.unique,
            shells: repr.shells,
            starts: repr.starts,
            n_functions,
            n_primitives,
            n_coefs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::basis::info::BasisInfo;

    fn sto3g_h() -> BasisShellInfo {
        BasisShellInfo::from_parts(
            ShellType::SphericalGaussian,
            0,
            vec![3.42525091, 0.62391373, 0.16885540],
            vec![vec![0.15432897, 0.53532814, 0.44463454]],
        )
        .unwrap()
    }

    fn p_shell() -> BasisShellInfo {
        BasisShellInfo::from_parts(
            ShellType::SphericalGaussian,
            1,
            vec![1.0],
            vec![vec![1.0]],
        )
        .unwrap()
    }

    fn hydrogen(x: f64, y: f64) -> Atom {
        Atom::new(1, Point::new(x, y, 0.0))
            .with_basis("primary", BasisInfo::new("STO-3G", vec![sto3g_h()]))
    }

    #[test]
    fn from_system_builds_one_shell_per_hydrogen() {
        let system = System::from_atoms([
            hydrogen(0.0, 0.0),
            hydrogen(1.0, 0.0),
            hydrogen(0.0, 1.0),
        ]);
        let bs = BasisSet::from_system(&system, "primary").unwrap();
        assert_eq!(bs.n_shell(), 3);
        assert_eq!(bs.n_primitives(), 9);
        assert_eq!(bs.n_functions(), 3);
        assert_eq!(bs.n_unique_shell(), 1);
        assert_eq!(bs.shell_center(1).unwrap(), Point::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn atoms_without_the_label_are_skipped() {
        let system = System::from_atoms([hydrogen(0.0, 0.0), Atom::new(2, Point::origin())]);
        let bs = BasisSet::from_system(&system, "primary").unwrap();
        assert_eq!(bs.n_shell(), 1);
        let other = BasisSet::from_system(&system, "fitting").unwrap();
        assert_eq!(other.n_shell(), 0);
    }

    #[test]
    fn shell_starts_are_prefix_sums() {
        let cap = BasisCapacity {
            n_atoms_hint: 2,
            n_shells: 4,
            n_primitives: 10,
            n_coefs: 10,
        };
        let mut bs = BasisSet::with_capacity(cap);
        bs.add_shell(&sto3g_h(), Point::origin()).unwrap();
        bs.add_shell(&p_shell(), Point::origin()).unwrap();
        bs.add_shell(&sto3g_h(), Point::new(1.0, 0.0, 0.0)).unwrap();
        let total: usize = bs.iter().map(|s| s.info.n_functions()).sum();
        assert_eq!(total, bs.n_functions());
        for i in 0..bs.n_shell() - 1 {
            let width = bs.shell(i).unwrap().info.n_functions();
            assert_eq!(bs.shell_start(i + 1).unwrap() - bs.shell_start(i).unwrap(), width);
        }
        assert_eq!(bs.max_am(), Some(1));
        assert_eq!(bs.all_am().into_iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn exceeding_capacity_fails() {
        let cap = BasisCapacity {
            n_atoms_hint: 1,
            n_shells: 1,
            n_primitives: 3,
            n_coefs: 3,
        };
        let mut bs = BasisSet::with_capacity(cap);
        bs.add_shell(&sto3g_h(), Point::origin()).unwrap();
        let err = bs.add_shell(&p_shell(), Point::origin()).unwrap_err();
        assert!(matches!(err, BasisError::Capacity { what: "shells", .. }));
    }

    #[test]
    fn shrink_fit_equals_fresh_capacity_fit_set() {
        let cap = BasisCapacity {
            n_atoms_hint: 10,
            n_shells: 10,
            n_primitives: 100,
            n_coefs: 100,
        };
        let mut oversized = BasisSet::with_capacity(cap);
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
            oversized.add_shell(&sto3g_h(), Point::new(x, y, 0.0)).unwrap();
        }
        let system = System::from_atoms([
            hydrogen(0.0, 0.0),
            hydrogen(1.0, 0.0),
            hydrogen(0.0, 1.0),
        ]);
        let fresh = BasisSet::from_system(&system, "primary").unwrap();
        let fitted = oversized.shrink_fit();
        assert_eq!(fitted, fresh);
        assert_eq!(fitted.capacity(), fresh.capacity());
    }

    #[test]
    fn reorder_functions_permutes_spherical_blocks() {
        let cap = BasisCapacity {
            n_atoms_hint: 1,
            n_shells: 2,
            n_primitives: 4,
            n_coefs: 4,
        };
        let mut bs = BasisSet::with_capacity(cap);
        bs.add_shell(&sto3g_h(), Point::origin()).unwrap();
        bs.add_shell(&p_shell(), Point::origin()).unwrap();
        // s, then p in increasing order: m = -1, 0, +1
        let data = [10.0, -1.0, 0.0, 1.0];
        let interleaved = bs
            .reorder_functions(&data, AoOrdering::Increasing, AoOrdering::Interleaved)
            .unwrap();
        assert_eq!(interleaved, vec![10.0, 0.0, 1.0, -1.0]);
        let back = bs
            .reorder_functions(&interleaved, AoOrdering::Interleaved, AoOrdering::Increasing)
            .unwrap();
        assert_eq!(back, data.to_vec());
        assert!(bs.reorder_functions(&data[..2], AoOrdering::Increasing, AoOrdering::Interleaved).is_err());
    }

    #[test]
    fn corrupt_wire_data_is_rejected_on_decode() {
        use crate::core::serialize::{from_bytes, to_bytes};

        let dangling = BasisSet {
            capacity: BasisCapacity::default(),
            unique: vec![],
            shells: vec![ShellRecord {
                center: Point::origin(),
                unique: 5,
            }],
            starts: vec![],
            n_functions: 0,
            n_primitives: 0,
            n_coefs: 0,
        };
        let bytes = to_bytes(&dangling).unwrap();
        assert!(from_bytes::<BasisSet>(&bytes).is_err());

        let cap = BasisCapacity {
            n_atoms_hint: 1,
            n_shells: 2,
            n_primitives: 4,
            n_coefs: 4,
        };
        let mut good = BasisSet::with_capacity(cap);
        good.add_shell(&sto3g_h(), Point::origin()).unwrap();
        good.add_shell(&p_shell(), Point::origin()).unwrap();
        let decoded: BasisSet = from_bytes(&to_bytes(&good).unwrap()).unwrap();
        assert_eq!(decoded, good);

        let mut bad_index = good.clone();
        bad_index.shells[1].unique = 7;
        assert!(from_bytes::<BasisSet>(&to_bytes(&bad_index).unwrap()).is_err());

        let mut bad_start = good.clone();
        bad_start.starts[1] = 3;
        assert!(from_bytes::<BasisSet>(&to_bytes(&bad_start).unwrap()).is_err());

        let mut bad_count = good.clone();
        bad_count.n_functions = 9;
        assert!(from_bytes::<BasisSet>(&to_bytes(&bad_count).unwrap()).is_err());

        let mut over_capacity = good;
        over_capacity.capacity.n_shells = 1;
        assert!(from_bytes::<BasisSet>(&to_bytes(&over_capacity).unwrap()).is_err());
    }
}
