use super::shell::BasisShellInfo;
use crate::core::hash::{ContentHasher, StableHash};
use crate::core::serialize::Serializable;
use serde::{Deserialize, Serialize};

/// The shells assigned to one atom under one basis label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasisInfo {
    pub description: String,
    pub shells: Vec<BasisShellInfo>,
}

impl BasisInfo {
    pub fn new(description: impl Into<String>, shells: Vec<BasisShellInfo>) -> Self {
        Self {
            description: description.into(),
            shells,
        }
    }

    pub fn n_primitives(&self) -> usize {
        self.shells.iter().map(BasisShellInfo::n_primitives).sum()
    }

    pub fn n_coefficients(&self) -> usize {
        self.shells.iter().map(BasisShellInfo::n_coefficients).sum()
    }

    pub fn n_functions(&self) -> usize {
        self.shells.iter().map(BasisShellInfo::n_functions).sum()
    }
}

impl StableHash for BasisInfo {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_str(&self.description);
        self.shells.stable_hash(hasher);
    }
}

impl Serializable for BasisInfo {
    const TYPE_TAG: &'static str = "BasisInfo";
}
