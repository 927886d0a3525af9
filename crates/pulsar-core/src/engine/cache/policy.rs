use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Persistence and distribution flags of a cache entry.
///
/// Policies combine with `|`. The empty set is [`CachePolicy::NO_POLICY`]: the entry lives
/// in memory only and is dropped with the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CachePolicy(u32);

impl CachePolicy {
    pub const NO_POLICY: Self = Self(0);
    /// Saved to and restored from the rank-local checkpoint store.
    pub const CHECKPOINT_LOCAL: Self = Self(1 << 0);
    /// Saved to and restored from the shared checkpoint store.
    pub const CHECKPOINT_GLOBAL: Self = Self(1 << 1);
    /// Published to peer ranks by the cache-sync worker.
    pub const DISTRIBUTE_GLOBAL: Self = Self(1 << 2);

    const ALL_BITS: u32 = 0b111;

    const NAMES: [(Self, &'static str); 3] = [
        (Self::CHECKPOINT_LOCAL, "CheckpointLocal"),
        (Self::CHECKPOINT_GLOBAL, "CheckpointGlobal"),
        (Self::DISTRIBUTE_GLOBAL, "DistributeGlobal"),
    ];

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Rebuilds a policy from raw bits, rejecting unknown flags.
    pub fn from_bits(bits: u32) -> Option<Self> {
        (bits & !Self::ALL_BITS == 0).then_some(Self(bits))
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when the two policies share at least one flag.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for CachePolicy {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CachePolicy {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NoPolicy");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown cache policy flag: '{0}'")]
pub struct ParseCachePolicyError(pub String);

impl FromStr for CachePolicy {
    type Err = ParseCachePolicyError;

    /// Parses `"NoPolicy"` or flag names joined by `|`, ignoring case and whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut policy = Self::NO_POLICY;
        for part in s.split('|').map(str::trim) {
            if part.eq_ignore_ascii_case("NoPolicy") {
                continue;
            }
            let (flag, _) = Self::NAMES
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(part))
                .ok_or_else(|| ParseCachePolicyError(part.to_string()))?;
            policy |= *flag;
        }
        Ok(policy)
    }
}
