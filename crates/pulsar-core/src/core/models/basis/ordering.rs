use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Highest angular momentum with precomputed transformation tables.
pub const MAX_AM: usize = 7;

/// Ordering convention for the `2l + 1` functions of a spherical shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AoOrdering {
    /// `m = -l, -l+1, ..., l`.
    #[default]
    Increasing,
    /// `m = 0, +1, -1, +2, -2, ..., +l, -l`.
    Interleaved,
}

impl AoOrdering {
    /// The `m` values of a shell of angular momentum `l` in this order.
    pub fn m_values(self, l: u32) -> Vec<i32> {
        let l = l as i32;
        match self {
            Self::Increasing => (-l..=l).collect(),
            Self::Interleaved => std::iter::once(0)
                .chain((1..=l).flat_map(|m| [m, -m]))
                .collect(),
        }
    }

    /// Position of `m` within a shell of angular momentum `l`.
    pub fn position(self, l: u32, m: i32) -> Option<usize> {
        if m.unsigned_abs() > l {
            return None;
        }
        Some(match self {
            Self::Increasing => (m + l as i32) as usize,
            Self::Interleaved if m == 0 => 0,
            Self::Interleaved if m > 0 => 2 * m as usize - 1,
            Self::Interleaved => 2 * m.unsigned_abs() as usize,
        })
    }
}

/// Exponents `(lx, ly, lz)` of the cartesian functions of angular momentum `l` in
/// canonical order (xx, xy, xz, yy, yz, zz for d).
pub fn cartesian_ordering(l: u32) -> Vec<[u32; 3]> {
    let mut out = Vec::with_capacity(((l + 1) * (l + 2) / 2) as usize);
    for lx in (0..=l).rev() {
        for ly in (0..=l - lx).rev() {
            out.push([lx, ly, l - lx - ly]);
        }
    }
    out
}

/// Position of `x^lx y^ly z^lz` within its shell in canonical cartesian order.
pub fn cartesian_index(lx: u32, _ly: u32, lz: u32, l: u32) -> usize {
    let a = (l - lx) as usize;
    a * (a + 1) / 2 + lz as usize
}

fn factorial(n: u32) -> f64 {
    (1..=n).map(f64::from).product()
}

fn binomial(n: u32, k: u32) -> f64 {
    if k > n {
        0.0
    } else {
        factorial(n) / (factorial(k) * factorial(n - k))
    }
}

/// Cartesian expansion of every real solid harmonic of one angular momentum.
///
/// Row `m + l` lists `(cartesian index, coefficient)` pairs of `S_lm`, in
/// [`AoOrdering::Increasing`] order.
pub type SphericalTransform = Vec<Vec<(usize, f64)>>;

fn build_spherical_transform(l: u32) -> SphericalTransform {
    let li = l as i32;
    (-li..=li)
        .map(|m| {
            let am = m.unsigned_abs();
            let v2m = if m < 0 { 1 } else { 0 };
            let delta = if m == 0 { 2.0 } else { 1.0 };
            let norm = (2.0 * factorial(l + am) * factorial(l - am) / delta).sqrt()
                / (2f64.powi(am as i32) * factorial(l));

            let mut terms = vec![0.0; ((l + 1) * (l + 2) / 2) as usize];
            for t in 0..=(l - am) / 2 {
                for u in 0..=t {
                    let mut v2 = v2m;
                    while v2 <= am {
                        let sign = if (t + (v2 - v2m) / 2) % 2 == 0 { 1.0 } else { -1.0 };
                        let c = sign
                            * 0.25f64.powi(t as i32)
                            * binomial(l, t)
                            * binomial(l - t, am + t)
                            * binomial(t, u)
                            * binomial(am, v2);
                        let lx = 2 * t + am - 2 * u - v2;
                        let ly = 2 * u + v2;
                        let lz = l - 2 * t - am;
                        terms[cartesian_index(lx, ly, lz, l)] += norm * c;
                        v2 += 2;
                    }
                }
            }
            terms
                .into_iter()
                .enumerate()
                .filter(|(_, c)| *c != 0.0)
                .collect()
        })
        .collect()
}

static SPHERICAL_TABLES: [OnceLock<SphericalTransform>; MAX_AM + 1] =
    [const { OnceLock::new() }; MAX_AM + 1];

/// Cartesian-to-spherical table for angular momentum `l`, built on first use.
pub fn spherical_transform(l: u32) -> Option<&'static SphericalTransform> {
    let cell = SPHERICAL_TABLES.get(l as usize)?;
    Some(cell.get_or_init(|| build_spherical_transform(l)))
}
