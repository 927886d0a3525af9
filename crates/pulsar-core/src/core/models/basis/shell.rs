use super::error::BasisError;
use crate::core::hash::{ContentHasher, StableHash};
use crate::core::serialize::Serializable;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShellType {
    CartesianGaussian,
    SphericalGaussian,
}

impl ShellType {
    /// Number of functions of one angular momentum in this shell type.
    pub fn n_functions(self, am: u32) -> usize {
        let l = am as usize;
        match self {
            Self::CartesianGaussian => (l + 1) * (l + 2) / 2,
            Self::SphericalGaussian => 2 * l + 1,
        }
    }
}

/// A contracted Gaussian shell: exponents plus one coefficient row per general contraction.
///
/// A negative angular momentum denotes a combined shell: `-1` is an sp shell, `-2` an spd
/// shell. Combined shells hold exactly `|am| + 1` general contractions, the g-th of
/// which has angular momentum g.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisShellInfo {
    shell_type: ShellType,
    am: i32,
    n_prim: usize,
    n_general: usize,
    alphas: Vec<f64>,
    /// Row-major `n_general x n_prim`.
    coefs: Vec<f64>,
}

impl BasisShellInfo {
    /// Creates a zero-filled shell.
    pub fn new(
        shell_type: ShellType,
        am: i32,
        n_prim: usize,
        n_general: usize,
    ) -> Result<Self, BasisError> {
        if n_prim == 0 || n_general == 0 {
            return Err(BasisError::InconsistentShell(
                "a shell needs at least one primitive and one contraction".to_string(),
            ));
        }
        if am < 0 && n_general as i32 != -am + 1 {
            return Err(BasisError::InconsistentShell(format!(
                "combined shell with am {} needs {} general contractions, got {}",
                am,
                -am + 1,
                n_general
            )));
        }
        Ok(Self {
            shell_type,
            am,
            n_prim,
            n_general,
            alphas: vec![0.0; n_prim],
            coefs: vec![0.0; n_prim * n_general],
        })
    }

    /// Builds a shell from its exponents and one coefficient row per general contraction.
    pub fn from_parts(
        shell_type: ShellType,
        am: i32,
        alphas: Vec<f64>,
        coefs: Vec<Vec<f64>>,
    ) -> Result<Self, BasisError> {
        let mut shell = Self::new(shell_type, am, alphas.len(), coefs.len())?;
        for (g, row) in coefs.iter().enumerate() {
            if row.len() != alphas.len() {
                return Err(BasisError::InconsistentShell(format!(
                    "contraction {} has {} coefficients for {} primitives",
                    g,
                    row.len(),
                    alphas.len()
                )));
            }
            shell.coefs[g * shell.n_prim..(g + 1) * shell.n_prim].copy_from_slice(row);
        }
        shell.alphas = alphas;
        Ok(shell)
    }

    pub fn shell_type(&self) -> ShellType {
        self.shell_type
    }

    pub fn am(&self) -> i32 {
        self.am
    }

    pub fn is_combined_am(&self) -> bool {
        self.am < 0
    }

    /// Angular momentum of the g-th general contraction.
    pub fn general_am(&self, g: usize) -> Result<u32, BasisError> {
        self.check_general(g)?;
        Ok(if self.am < 0 { g as u32 } else { self.am as u32 })
    }

    /// Highest angular momentum carried by any contraction.
    pub fn max_am(&self) -> u32 {
        if self.am < 0 {
            (-self.am) as u32
        } else {
            self.am as u32
        }
    }

    pub fn n_primitives(&self) -> usize {
        self.n_prim
    }

    pub fn n_general_contractions(&self) -> usize {
        self.n_general
    }

    pub fn n_coefficients(&self) -> usize {
        self.n_prim * self.n_general
    }

    pub fn general_n_functions(&self, g: usize) -> Result<usize, BasisError> {
        Ok(self.shell_type.n_functions(self.general_am(g)?))
    }

    pub fn n_functions(&self) -> usize {
        (0..self.n_general)
            .map(|g| {
                let l = if self.am < 0 { g as u32 } else { self.am as u32 };
                self.shell_type.n_functions(l)
            })
            .sum()
    }

    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    pub fn alpha(&self, i: usize) -> Option<f64> {
        self.alphas.get(i).copied()
    }

    pub fn coefs(&self, g: usize) -> Result<&[f64], BasisError> {
        self.check_general(g)?;
        Ok(&self.coefs[g * self.n_prim..(g + 1) * self.n_prim])
    }

    pub fn coef(&self, g: usize, i: usize) -> Option<f64> {
        self.coefs(g).ok()?.get(i).copied()
    }

    /// Sets the exponent and every contraction coefficient of primitive `i`.
    pub fn set_primitive(&mut self, i: usize, alpha: f64, coefs: &[f64]) -> Result<(), BasisError> {
        if i >= self.n_prim {
            return Err(BasisError::InconsistentShell(format!(
                "primitive {} out of range for {} primitives",
                i, self.n_prim
            )));
        }
        if coefs.len() != self.n_general {
            return Err(BasisError::InconsistentShell(format!(
                "expected {} coefficients, got {}",
                self.n_general,
                coefs.len()
            )));
        }
        self.alphas[i] = alpha;
        for (g, c) in coefs.iter().enumerate() {
            self.coefs[g * self.n_prim + i] = *c;
        }
        Ok(())
    }

    fn check_general(&self, g: usize) -> Result<(), BasisError> {
        if g < self.n_general {
            Ok(())
        } else {
            Err(BasisError::InconsistentShell(format!(
                "general contraction {} out of range for {}",
                g, self.n_general
            )))
        }
    }
}

impl StableHash for BasisShellInfo {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_u8(self.shell_type as u8);
        hasher.write_i64(self.am as i64);
        hasher.write_usize(self.n_prim);
        hasher.write_usize(self.n_general);
        self.alphas.stable_hash(hasher);
        self.coefs.stable_hash(hasher);
    }
}

impl fmt::Display for BasisShellInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.shell_type {
            ShellType::CartesianGaussian => "cart",
            ShellType::SphericalGaussian => "sph",
        };
        writeln!(
            f,
            "am={} {} nprim={} ngen={}",
            self.am, kind, self.n_prim, self.n_general
        )?;
        for i in 0..self.n_prim {
            write!(f, "  {:>16.8e}", self.alphas[i])?;
            for g in 0..self.n_general {
                write!(f, " {:>16.8e}", self.coefs[g * self.n_prim + i])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Serializable for BasisShellInfo {
    const TYPE_TAG: &'static str = "BasisShellInfo";
}
