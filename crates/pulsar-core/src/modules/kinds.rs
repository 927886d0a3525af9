use super::base::Module;
use crate::core::error::{CoreException, CoreResult, ErrorKind};
use crate::core::models::basis::BasisSet;
use crate::core::models::{Atom, System, Wavefunction};
use crate::core::options::{GreaterThan, InList, OptionMap, OptionType};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

pub const FDIFF_DISPLACEMENT: &str = "FDIFF_DISPLACEMENT";
pub const FDIFF_STENCIL_SIZE: &str = "FDIFF_STENCIL_SIZE";
pub const DEFAULT_FDIFF_DISPLACEMENT: f64 = 0.005;
pub const DEFAULT_FDIFF_STENCIL_SIZE: i64 = 3;

/// The fixed interface family a module belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum BaseKind {
    EnergyMethod,
    MatrixBuilder,
    FourCenterIntegral,
    ThreeCenterIntegral,
    TwoCenterIntegral,
    SystemFragmenter,
    TestModule,
}

impl BaseKind {
    pub const ALL: [BaseKind; 7] = [
        Self::EnergyMethod,
        Self::MatrixBuilder,
        Self::FourCenterIntegral,
        Self::ThreeCenterIntegral,
        Self::TwoCenterIntegral,
        Self::SystemFragmenter,
        Self::TestModule,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::EnergyMethod => "EnergyMethod",
            Self::MatrixBuilder => "MatrixBuilder",
            Self::FourCenterIntegral => "FourCenterIntegral",
            Self::ThreeCenterIntegral => "ThreeCenterIntegral",
            Self::TwoCenterIntegral => "TwoCenterIntegral",
            Self::SystemFragmenter => "SystemFragmenter",
            Self::TestModule => "TestModule",
        }
    }

    /// Options every module of this kind declares in addition to its own.
    pub fn default_options(self) -> OptionMap {
        let mut options = OptionMap::new();
        if self == Self::EnergyMethod {
            let displacement = options.add_option(
                FDIFF_DISPLACEMENT,
                OptionType::FLOAT,
                false,
                Some(Arc::new(GreaterThan::new(0.0, false))),
                "Coordinate step of finite-difference derivatives, in bohr",
                Some(DEFAULT_FDIFF_DISPLACEMENT.into()),
            );
            debug_assert!(displacement.is_ok(), "{displacement:?}");
            let stencil = options.add_option(
                FDIFF_STENCIL_SIZE,
                OptionType::INT,
                false,
                Some(Arc::new(InList::new([3_i64, 5]))),
                "Number of points of the central-difference stencil",
                Some(DEFAULT_FDIFF_STENCIL_SIZE.into()),
            );
            debug_assert!(stencil.is_ok(), "{stencil:?}");
        }
        options
    }
}

impl fmt::Display for BaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown module base kind: '{0}'")]
pub struct ParseBaseKindError(pub String);

impl FromStr for BaseKind {
    type Err = ParseBaseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseBaseKindError(s.to_string()))
    }
}

/// A module viewed through the interface of its base kind.
pub enum KindMut<'a> {
    EnergyMethod(&'a mut dyn EnergyMethod),
    MatrixBuilder(&'a mut dyn MatrixBuilder),
    FourCenterIntegral(&'a mut dyn FourCenterIntegral),
    ThreeCenterIntegral(&'a mut dyn ThreeCenterIntegral),
    TwoCenterIntegral(&'a mut dyn TwoCenterIntegral),
    SystemFragmenter(&'a mut dyn SystemFragmenter),
    TestModule(&'a mut dyn TestModule),
}

impl KindMut<'_> {
    pub fn base_kind(&self) -> BaseKind {
        match self {
            Self::EnergyMethod(_) => BaseKind::EnergyMethod,
            Self::MatrixBuilder(_) => BaseKind::MatrixBuilder,
            Self::FourCenterIntegral(_) => BaseKind::FourCenterIntegral,
            Self::ThreeCenterIntegral(_) => BaseKind::ThreeCenterIntegral,
            Self::TwoCenterIntegral(_) => BaseKind::TwoCenterIntegral,
            Self::SystemFragmenter(_) => BaseKind::SystemFragmenter,
            Self::TestModule(_) => BaseKind::TestModule,
        }
    }
}

/// A module whose only surface is `run_test`.
pub trait TestModule: Module {}

/// Derivatives of the energy with respect to nuclear coordinates.
pub trait EnergyMethod: Module {
    /// Computes the `order`-th derivative analytically.
    ///
    /// Returns `Ok(None)` when this order has no analytic implementation; orders of one
    /// and above then fall back to finite differences of the order below.
    fn deriv_impl(
        &mut self,
        order: usize,
        wfn: &Wavefunction,
    ) -> CoreResult<Option<(Wavefunction, Vec<f64>)>>;
}

impl dyn EnergyMethod + '_ {
    /// The `order`-th derivative as a flattened tensor of length `(3N)^order`.
    ///
    /// Orders without an analytic implementation are computed by central differences
    /// over every Cartesian coordinate of every atom, using the `FDIFF_DISPLACEMENT`
    /// step and the 3- or 5-point `FDIFF_STENCIL_SIZE` stencil. The coordinate being
    /// displaced is the slowest-varying index of the result.
    pub fn deriv(&mut self, order: usize, wfn: &Wavefunction) -> CoreResult<(Wavefunction, Vec<f64>)> {
        if let Some(result) = self.deriv_impl(order, wfn)? {
            return Ok(result);
        }
        if order == 0 {
            return Err(CoreException::kernel("Energy method does not implement the energy")
                .with("order", order));
        }
        let system = wfn.system.as_ref().ok_or_else(|| {
            CoreException::kernel("Finite differences need a wavefunction with a system")
                .with("order", order)
        })?;
        let (step, stencil) = finite_difference_parameters(self.base().options())?;
        debug!(order, step, stencil, "Falling back to finite differences.");

        let atoms: Vec<Atom> = system.iter().map(|a| (*a).clone()).collect();
        let weights = stencil_weights(stencil);
        let mut result = Vec::new();
        for coord in 0..3 * atoms.len() {
            let mut acc: Option<Vec<f64>> = None;
            for &(multiple, weight) in weights {
                let displaced = displace(system, &atoms, coord, multiple * step);
                let (_, lower) = self.deriv(order - 1, &Wavefunction::new(displaced))?;
                let acc = acc.get_or_insert_with(|| vec![0.0; lower.len()]);
                if acc.len() != lower.len() {
                    return Err(CoreException::kernel(
                        "Lower-order derivative changed length between displacements",
                    )
                    .with("order", order - 1));
                }
                for (a, v) in acc.iter_mut().zip(&lower) {
                    *a += weight * v / step;
                }
            }
            result.extend(acc.unwrap_or_default());
        }
        Ok((wfn.clone(), result))
    }

    pub fn energy(&mut self, wfn: &Wavefunction) -> CoreResult<(Wavefunction, f64)> {
        let (wfn, values) = self.deriv(0, wfn)?;
        let energy = values
            .first()
            .copied()
            .ok_or_else(|| CoreException::kernel("Energy method returned no energy"))?;
        Ok((wfn, energy))
    }

    pub fn gradient(&mut self, wfn: &Wavefunction) -> CoreResult<(Wavefunction, Vec<f64>)> {
        self.deriv(1, wfn)
    }

    pub fn hessian(&mut self, wfn: &Wavefunction) -> CoreResult<(Wavefunction, Vec<f64>)> {
        self.deriv(2, wfn)
    }
}

fn finite_difference_parameters(options: &OptionMap) -> CoreResult<(f64, i64)> {
    let step = if options.has_key(FDIFF_DISPLACEMENT) {
        options.get_float(FDIFF_DISPLACEMENT)?
    } else {
        DEFAULT_FDIFF_DISPLACEMENT
    };
    let stencil = if options.has_key(FDIFF_STENCIL_SIZE) {
        options.get_int(FDIFF_STENCIL_SIZE)?
    } else {
        DEFAULT_FDIFF_STENCIL_SIZE
    };
    if stencil != 3 && stencil != 5 {
        return Err(CoreException::new(
            ErrorKind::OptionValidation,
            "Unsupported finite-difference stencil",
        )
        .with("option", FDIFF_STENCIL_SIZE)
        .with("value", stencil));
    }
    Ok((step, stencil))
}

/// `(multiple of the step, weight)` pairs; the weighted sum is divided by the step.
fn stencil_weights(stencil: i64) -> &'static [(f64, f64)] {
    const THREE: [(f64, f64); 2] = [(1.0, 0.5), (-1.0, -0.5)];
    const FIVE: [(f64, f64); 4] = [
        (2.0, -1.0 / 12.0),
        (1.0, 8.0 / 12.0),
        (-1.0, -8.0 / 12.0),
        (-2.0, 1.0 / 12.0),
    ];
    if stencil == 5 { &FIVE } else { &THREE }
}

fn displace(system: &System, atoms: &[Atom], coord: usize, delta: f64) -> System {
    let moved = atoms.iter().enumerate().map(|(i, atom)| {
        let mut atom = atom.clone();
        if i == coord / 3 {
            let mut position = *atom.position();
            position[coord % 3] += delta;
            atom.set_position(position);
        }
        atom
    });
    System::from_atoms(moved).with_space(*system.space())
}

/// Builds matrices (Fock, overlap, ...) over a pair of basis sets.
pub trait MatrixBuilder: Module {
    fn calculate(
        &mut self,
        key: &str,
        deriv: usize,
        wfn: &Wavefunction,
        bs1: &BasisSet,
        bs2: &BasisSet,
    ) -> CoreResult<Vec<DMatrix<f64>>>;
}

pub trait TwoCenterIntegral: Module {
    fn initialize(&mut self, deriv: usize, wfn: &Wavefunction, bs1: &BasisSet, bs2: &BasisSet) -> CoreResult<()>;

    /// Number of integral components per shell pair (1 for overlap, 3 for dipole, ...).
    fn n_components(&self) -> usize {
        1
    }

    /// Integrals of one shell pair, component-major.
    fn calculate(&mut self, shell1: usize, shell2: usize) -> CoreResult<Vec<f64>>;
}

pub trait ThreeCenterIntegral: Module {
    fn initialize(
        &mut self,
        deriv: usize,
        wfn: &Wavefunction,
        bs1: &BasisSet,
        bs2: &BasisSet,
        bs3: &BasisSet,
    ) -> CoreResult<()>;

    fn n_components(&self) -> usize {
        1
    }

    fn calculate(&mut self, shell1: usize, shell2: usize, shell3: usize) -> CoreResult<Vec<f64>>;
}

pub trait FourCenterIntegral: Module {
    fn initialize(
        &mut self,
        deriv: usize,
        wfn: &Wavefunction,
        bs1: &BasisSet,
        bs2: &BasisSet,
        bs3: &BasisSet,
        bs4: &BasisSet,
    ) -> CoreResult<()>;

    fn n_components(&self) -> usize {
        1
    }

    fn calculate(
        &mut self,
        shell1: usize,
        shell2: usize,
        shell3: usize,
        shell4: usize,
    ) -> CoreResult<Vec<f64>>;
}

/// One fragment produced by a [`SystemFragmenter`].
#[derive(Debug, Clone, PartialEq)]
pub struct NMerInfo {
    /// Serial numbers of the monomers the fragment is made of.
    pub sn: BTreeSet<usize>,
    /// The fragment, drawn from the same universe as the input system.
    pub nmer: System,
    /// Coefficient of the fragment in a many-body expansion.
    pub weight: f64,
}

pub type NMerSet = BTreeMap<BTreeSet<usize>, NMerInfo>;

/// Splits a system into weighted fragments.
pub trait SystemFragmenter: Module {
    fn fragmentize(&mut self, system: &System) -> CoreResult<NMerSet>;
}
