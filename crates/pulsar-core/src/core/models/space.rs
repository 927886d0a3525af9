use crate::core::hash::{ContentHasher, StableHash};
use serde::{Deserialize, Serialize};

/// Periodicity of a [`System`](super::system::System).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Space {
    #[default]
    InfiniteVacuum,
    /// Lattice side lengths and angles (degrees).
    Periodic { sides: [f64; 3], angles: [f64; 3] },
}

impl Space {
    pub fn is_periodic(&self) -> bool {
        matches!(self, Self::Periodic { .. })
    }
}

impl StableHash for Space {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        match self {
            Self::InfiniteVacuum => hasher.write_u8(0),
            Self::Periodic { sides, angles } => {
                hasher.write_u8(1);
                sides.stable_hash(hasher);
                angles.stable_hash(hasher);
            }
        }
    }
}
