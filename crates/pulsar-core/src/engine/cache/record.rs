use super::policy::CachePolicy;
use crate::core::hash::Hash128;
use crate::core::serialize::{FORMAT_VERSION, Serializable};
use serde::{Deserialize, Serialize};

/// Separator between the module key and the user key of a stored cache key.
pub const KEY_SEPARATOR: &str = "%%";

/// Builds the stored form `"<module_key>%%<user_key>"`.
pub fn compose_key(module_key: &str, user_key: &str) -> String {
    format!("{module_key}{KEY_SEPARATOR}{user_key}")
}

/// Splits a stored key at its first separator into `(module_key, user_key)`.
pub fn split_key(composed: &str) -> Option<(&str, &str)> {
    composed.split_once(KEY_SEPARATOR)
}

/// One cache entry as it travels to disk or to a peer rank.
///
/// `value` holds the serializer envelope of the cached object, so the record can be
/// moved around without knowing the payload type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub composed_key: String,
    pub value: Vec<u8>,
    pub policy_bits: u32,
    /// Hash of the option snapshot the value was computed under.
    pub option_hash: Hash128,
    pub version: u16,
}

impl CacheRecord {
    pub fn new(composed_key: String, value: Vec<u8>, policy: CachePolicy, option_hash: Hash128) -> Self {
        Self {
            composed_key,
            value,
            policy_bits: policy.bits(),
            option_hash,
            version: FORMAT_VERSION,
        }
    }

    pub fn module_key(&self) -> Option<&str> {
        split_key(&self.composed_key).map(|(m, _)| m)
    }

    pub fn user_key(&self) -> Option<&str> {
        split_key(&self.composed_key).map(|(_, u)| u)
    }

    /// The stored policy, or `None` if the bits contain flags this build does not know.
    pub fn policy(&self) -> Option<CachePolicy> {
        CachePolicy::from_bits(self.policy_bits)
    }
}

impl Serializable for CacheRecord {
    const TYPE_TAG: &'static str = "CacheRecord";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composed_key_splits_at_first_separator() {
        let key = compose_key("SCF", "density%%alpha");
        assert_eq!(key, "SCF%%density%%alpha");
        assert_eq!(split_key(&key), Some(("SCF", "density%%alpha")));
        assert_eq!(split_key("no separator"), None);
    }

    #[test]
    fn record_exposes_its_parts() {
        let rec = CacheRecord::new(
            compose_key("K1", "Vector 1"),
            vec![1, 2, 3],
            CachePolicy::CHECKPOINT_LOCAL,
            Hash128(42),
        );
        assert_eq!(rec.module_key(), Some("K1"));
        assert_eq!(rec.user_key(), Some("Vector 1"));
        assert_eq!(rec.policy(), Some(CachePolicy::CHECKPOINT_LOCAL));
        assert_eq!(rec.version, FORMAT_VERSION);
    }
}
