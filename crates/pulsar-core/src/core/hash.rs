use nalgebra::{DMatrix, DVector, Point3};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A stable 128-bit content digest.
///
/// Digests are reproducible across processes, platforms and releases of the crate as long
/// as the canonical encoding of the hashed value does not change. They identify option
/// snapshots in cache records and therefore end up on disk.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Hash128(pub u128);

impl Hash128 {
    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for Hash128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Maps a float onto its canonical bit pattern: `-0.0` becomes `+0.0` and every NaN
/// becomes the canonical quiet NaN.
pub fn canonical_f64_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

/// Incremental builder of a [`Hash128`].
pub struct ContentHasher {
    digest: Sha256,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            digest: Sha256::new(),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.digest.update([value]);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.digest.update(value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.digest.update(value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.digest.update(value.to_le_bytes());
    }

    pub fn write_usize(&mut self, value: usize) {
        self.write_u64(value as u64);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(canonical_f64_bits(value));
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    /// Length-prefixed so that `("ab", "c")` and `("a", "bc")` hash differently.
    pub fn write_str(&mut self, value: &str) {
        self.write_usize(value.len());
        self.write_bytes(value.as_bytes());
    }

    pub fn finish(self) -> Hash128 {
        let digest = self.digest.finalize();
        let mut head = [0u8; 16];
        head.copy_from_slice(&digest[..16]);
        Hash128(u128::from_be_bytes(head))
    }
}

/// Types with a canonical, platform-independent byte encoding for hashing.
pub trait StableHash {
    fn stable_hash(&self, hasher: &mut ContentHasher);

    fn content_hash(&self) -> Hash128 {
        let mut hasher = ContentHasher::new();
        self.stable_hash(&mut hasher);
        hasher.finish()
    }
}

impl<T: StableHash + ?Sized> StableHash for &T {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        (**self).stable_hash(hasher);
    }
}

impl StableHash for bool {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_bool(*self);
    }
}

impl StableHash for u8 {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_u8(*self);
    }
}

impl StableHash for u32 {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_u32(*self);
    }
}

impl StableHash for i32 {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_i64(*self as i64);
    }
}

impl StableHash for u64 {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_u64(*self);
    }
}

impl StableHash for i64 {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_i64(*self);
    }
}

impl StableHash for usize {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_usize(*self);
    }
}

impl StableHash for f64 {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_f64(*self);
    }
}

impl StableHash for str {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_str(self);
    }
}

impl StableHash for String {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_str(self);
    }
}

impl StableHash for Hash128 {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_bytes(&self.0.to_le_bytes());
    }
}

impl<T: StableHash> StableHash for [T] {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_usize(self.len());
        for item in self {
            item.stable_hash(hasher);
        }
    }
}

impl<T: StableHash> StableHash for Vec<T> {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        self.as_slice().stable_hash(hasher);
    }
}

impl<T: StableHash, const N: usize> StableHash for [T; N] {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        self.as_slice().stable_hash(hasher);
    }
}

impl<T: StableHash> StableHash for Option<T> {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        match self {
            Some(value) => {
                hasher.write_u8(1);
                value.stable_hash(hasher);
            }
            None => hasher.write_u8(0),
        }
    }
}

impl<A: StableHash, B: StableHash> StableHash for (A, B) {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        self.0.stable_hash(hasher);
        self.1.stable_hash(hasher);
    }
}

impl<T: StableHash> StableHash for BTreeSet<T> {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_usize(self.len());
        for item in self {
            item.stable_hash(hasher);
        }
    }
}

impl<K: StableHash, V: StableHash> StableHash for BTreeMap<K, V> {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_usize(self.len());
        for (key, value) in self {
            key.stable_hash(hasher);
            value.stable_hash(hasher);
        }
    }
}

impl StableHash for Point3<f64> {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_f64(self.x);
        hasher.write_f64(self.y);
        hasher.write_f64(self.z);
    }
}

impl StableHash for DMatrix<f64> {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_usize(self.nrows());
        hasher.write_usize(self.ncols());
        for value in self.iter() {
            hasher.write_f64(*value);
        }
    }
}

impl StableHash for DVector<f64> {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_usize(self.len());
        for value in self.iter() {
            hasher.write_f64(*value);
        }
    }
}
