use super::error::OptionError;
use super::validators::{OptionValidator, ValidatorSpec};
use super::value::{FromOptionValue, OptionType, OptionValue};
use crate::core::hash::{ContentHasher, Hash128, StableHash};
use crate::core::serialize::Serializable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Schema and current state of one option.
#[derive(Debug, Clone)]
pub struct OptionEntry {
    ty: OptionType,
    value: Option<OptionValue>,
    default: Option<OptionValue>,
    required: bool,
    validator: Option<Arc<dyn OptionValidator>>,
    help: String,
}

impl OptionEntry {
    pub fn option_type(&self) -> OptionType {
        self.ty
    }

    pub fn value(&self) -> Option<&OptionValue> {
        self.value.as_ref()
    }

    pub fn default_value(&self) -> Option<&OptionValue> {
        self.default.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn validator(&self) -> Option<&Arc<dyn OptionValidator>> {
        self.validator.as_ref()
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    fn same_state(&self, other: &Self) -> bool {
        self.ty == other.ty && self.value == other.value
    }
}

/// A named, validated and hashable bag of option values.
///
/// Two maps are equal when they declare the same names with the same types and hold the
/// same current values. Help text, validators and the required flag do not take part in
/// equality or hashing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "OptionMapRepr", into = "OptionMapRepr")]
pub struct OptionMap {
    entries: BTreeMap<String, OptionEntry>,
}

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a new option.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique option name within this map.
    /// * `ty` - Declared type; every assigned value is coerced to it.
    /// * `required` - Whether a value must be supplied before the owning module is built.
    /// * `validator` - Optional check run on every assignment, including the default.
    /// * `help` - Free-form description.
    /// * `default` - Initial value. Forbidden for required options.
    ///
    /// # Errors
    ///
    /// Fails with `Duplicate`, `RequiredWithDefault`, `IllFormedType`, `TypeMismatch` or
    /// `Validation`.
    pub fn add_option(
        &mut self,
        name: impl Into<String>,
        ty: OptionType,
        required: bool,
        validator: Option<Arc<dyn OptionValidator>>,
        help: impl Into<String>,
        default: Option<OptionValue>,
    ) -> Result<(), OptionError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(OptionError::Duplicate(name));
        }
        if !ty.is_well_formed() {
            return Err(OptionError::IllFormedType(name));
        }
        if required && default.is_some() {
            return Err(OptionError::RequiredWithDefault(name));
        }
        let default = match default {
            Some(raw) => Some(Self::checked_value(&name, ty, validator.as_deref(), &raw)?),
            None => None,
        };
        self.entries.insert(
            name,
            OptionEntry {
                ty,
                value: default.clone(),
                default,
                required,
                validator,
                help: help.into(),
            },
        );
        Ok(())
    }

    fn checked_value(
        name: &str,
        ty: OptionType,
        validator: Option<&dyn OptionValidator>,
        raw: &OptionValue,
    ) -> Result<OptionValue, OptionError> {
        let value = raw.coerce_to(ty).ok_or_else(|| OptionError::TypeMismatch {
            name: name.to_string(),
            expected: ty.to_string(),
            found: raw.describe_type(),
        })?;
        if let Some(validator) = validator {
            validator
                .validate(&value)
                .map_err(|problems| OptionError::Validation {
                    name: name.to_string(),
                    problems,
                })?;
        }
        Ok(value)
    }

    /// Assigns a new value, coercing it to the declared type and running the validator.
    pub fn change(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<(), OptionError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| OptionError::Unknown(name.to_string()))?;
        let value = Self::checked_value(name, entry.ty, entry.validator.as_deref(), &value.into())?;
        entry.value = Some(value);
        Ok(())
    }

    /// Returns the option to its default, or to unset if it has none.
    pub fn reset(&mut self, name: &str) -> Result<(), OptionError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| OptionError::Unknown(name.to_string()))?;
        entry.value = entry.default.clone();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&OptionValue, OptionError> {
        self.entries
            .get(name)
            .ok_or_else(|| OptionError::Unknown(name.to_string()))?
            .value
            .as_ref()
            .ok_or_else(|| OptionError::NotSet(name.to_string()))
    }

    pub fn get_as<T: FromOptionValue>(&self, name: &str) -> Result<T, OptionError> {
        let value = self.get(name)?;
        T::from_option_value(value).ok_or_else(|| OptionError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            found: value.describe_type(),
        })
    }

    pub fn get_int(&self, name: &str) -> Result<i64, OptionError> {
        self.get_as(name)
    }

    pub fn get_float(&self, name: &str) -> Result<f64, OptionError> {
        self.get_as(name)
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, OptionError> {
        self.get_as(name)
    }

    pub fn get_string(&self, name: &str) -> Result<String, OptionError> {
        self.get_as(name)
    }

    pub fn get_list_int(&self, name: &str) -> Result<Vec<i64>, OptionError> {
        self.get_as(name)
    }

    pub fn get_list_float(&self, name: &str) -> Result<Vec<f64>, OptionError> {
        self.get_as(name)
    }

    pub fn get_list_string(&self, name: &str) -> Result<Vec<String>, OptionError> {
        self.get_as(name)
    }

    pub fn get_set_int(&self, name: &str) -> Result<BTreeSet<i64>, OptionError> {
        self.get_as(name)
    }

    pub fn get_set_string(&self, name: &str) -> Result<BTreeSet<String>, OptionError> {
        self.get_as(name)
    }

    pub fn has_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.value.is_some())
    }

    pub fn entry(&self, name: &str) -> Option<&OptionEntry> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all_required_set(&self) -> bool {
        self.entries
            .values()
            .all(|e| !e.required || e.value.is_some())
    }

    /// Names of required options that still have no value, in sorted order.
    pub fn missing_required(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.required && e.value.is_none())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Compares only the listed options. A name absent from both maps compares equal.
    pub fn compare_select(&self, other: &OptionMap, keys: &[&str]) -> bool {
        keys.iter()
            .all(|key| match (self.entries.get(*key), other.entries.get(*key)) {
                (Some(a), Some(b)) => a.same_state(b),
                (None, None) => true,
                _ => false,
            })
    }

    /// Digest of the listed options only, in sorted name order.
    pub fn hash_select(&self, keys: &[&str]) -> Hash128 {
        let selected: BTreeSet<&str> = keys.iter().copied().collect();
        let mut hasher = ContentHasher::new();
        for name in selected {
            hasher.write_str(name);
            match self.entries.get(name) {
                Some(entry) => {
                    hasher.write_u8(1);
                    entry.ty.stable_hash(&mut hasher);
                    entry.value.stable_hash(&mut hasher);
                }
                None => hasher.write_u8(0),
            }
        }
        hasher.finish()
    }

    /// Adds every option of `base` that this map does not already declare.
    pub fn merge_missing(&mut self, base: &OptionMap) {
        for (name, entry) in &base.entries {
            self.entries
                .entry(name.clone())
                .or_insert_with(|| entry.clone());
        }
    }

    /// Re-runs the type and validator checks on every stored value.
    pub fn validate_all(&self) -> Result<(), OptionError> {
        for (name, entry) in &self.entries {
            if entry.required && entry.default.is_some() {
                return Err(OptionError::RequiredWithDefault(name.clone()));
            }
            if let Some(value) = &entry.value {
                Self::checked_value(name, entry.ty, entry.validator.as_deref(), value)?;
            }
        }
        Ok(())
    }
}

impl PartialEq for OptionMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((ka, a), (kb, b))| ka == kb && a.same_state(b))
    }
}

impl StableHash for OptionMap {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_usize(self.entries.len());
        for (name, entry) in &self.entries {
            hasher.write_str(name);
            entry.ty.stable_hash(hasher);
            entry.value.stable_hash(hasher);
        }
    }
}

impl fmt::Display for OptionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, entry) in &self.entries {
            let value = entry
                .value
                .as_ref()
                .map_or_else(|| "(unset)".to_string(), |v| v.to_string());
            write!(f, "{:<24} {:<16} {}", name, entry.ty.to_string(), value)?;
            if entry.required {
                write!(f, " [required]")?;
            }
            if !entry.help.is_empty() {
                write!(f, "  # {}", entry.help)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Serializable for OptionMap {
    const TYPE_TAG: &'static str = "OptionMap";
}

#[derive(Serialize, Deserialize)]
struct OptionEntryRepr {
    name: String,
    ty: OptionType,
    value: Option<OptionValue>,
    default: Option<OptionValue>,
    required: bool,
    help: String,
    validator: Option<ValidatorSpec>,
}

#[derive(Serialize, Deserialize)]
struct OptionMapRepr {
    entries: Vec<OptionEntryRepr>,
}

impl From<OptionMap> for OptionMapRepr {
    fn from(map: OptionMap) -> Self {
        let entries = map
            .entries
            .into_iter()
            .map(|(name, e)| OptionEntryRepr {
                name,
                ty: e.ty,
                value: e.value,
                default: e.default,
                required: e.required,
                help: e.help,
                validator: e.validator.and_then(|v| v.spec()),
            })
            .collect();
        Self { entries }
    }
}

impl TryFrom<OptionMapRepr> for OptionMap {
    type Error = OptionError;

    fn try_from(repr: OptionMapRepr) -> Result<Self, Self::Error> {
        let mut entries = BTreeMap::new();
        for e in repr.entries {
            if entries.contains_key(&e.name) {
                return Err(OptionError::Duplicate(e.name));
            }
            entries.insert(
                e.name,
                OptionEntry {
                    ty: e.ty,
                    value: e.value,
                    default: e.default,
                    required: e.required,
                    validator: e.validator.map(|spec| spec.build()),
                    help: e.help,
                },
            );
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::validators::{GreaterThan, InList, RangeCheck};
    use crate::core::options::value::ScalarKind;
    use crate::core::serialize::{from_bytes, to_bytes};

    fn scf_options() -> OptionMap {
        let mut map = OptionMap::new();
        map.add_option(
            "MAX_ITER",
            OptionType::INT,
            false,
            Some(Arc::new(GreaterThan::new(0.0, false))),
            "Maximum number of iterations",
            Some(50i64.into()),
        )
        .unwrap();
        map.add_option(
            "E_TOLERANCE",
            OptionType::FLOAT,
            false,
            Some(Arc::new(RangeCheck::new(0.0, 1.0, false, true))),
            "Energy convergence",
            Some(1e-8_f64.into()),
        )
        .unwrap();
        map.add_option(
            "REFERENCE",
            OptionType::STRING,
            false,
            Some(Arc::new(InList::new(["RHF", "UHF"]))),
            "",
            Some("RHF".into()),
        )
        .unwrap();
        map.add_option("OTHER_MODULE", OptionType::STRING, true, None, "", None)
            .unwrap();
        map
    }

    #[test]
    fn required_option_with_default_is_rejected() {
        let mut map = OptionMap::new();
        let err = map
            .add_option("X", OptionType::INT, true, None, "", Some(1i64.into()))
            .unwrap_err();
        assert_eq!(err, OptionError::RequiredWithDefault("X".to_string()));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut map = scf_options();
        let err = map
            .add_option("MAX_ITER", OptionType::INT, false, None, "", None)
            .unwrap_err();
        assert!(matches!(err, OptionError::Duplicate(_)));
    }

    #[test]
    fn default_is_validated_on_declaration() {
        let mut map = OptionMap::new();
        let err = map
            .add_option(
                "N",
                OptionType::INT,
                false,
                Some(Arc::new(GreaterThan::new(0.0, false))),
                "",
                Some((-1i64).into()),
            )
            .unwrap_err();
        assert!(matches!(err, OptionError::Validation { .. }));
    }

    #[test]
    fn change_unknown_option_fails() {
        let mut map = scf_options();
        assert_eq!(
            map.change("NOPE", 1i64),
            Err(OptionError::Unknown("NOPE".to_string()))
        );
    }

    #[test]
    fn change_runs_validator_and_coercion() {
        let mut map = scf_options();
        assert!(matches!(
            map.change("MAX_ITER", 0i64),
            Err(OptionError::Validation { .. })
        ));
        assert!(matches!(
            map.change("MAX_ITER", 3.14),
            Err(OptionError::TypeMismatch { .. })
        ));
        map.change("MAX_ITER", 100.0).unwrap();
        assert_eq!(map.get_int("MAX_ITER").unwrap(), 100);
        map.change("E_TOLERANCE", 1i64).unwrap();
        assert_eq!(map.get_float("E_TOLERANCE").unwrap(), 1.0);
    }

    #[test]
    fn int_two_to_the_63_is_accepted_as_float() {
        let mut map = OptionMap::new();
        map.add_option("F", OptionType::FLOAT, false, None, "", None)
            .unwrap();
        map.change("F", i64::MAX).unwrap();
        assert_eq!(map.get_float("F").unwrap(), 9_223_372_036_854_775_808.0);
    }

    #[test]
    fn required_tracking() {
        let mut map = scf_options();
        assert!(!map.all_required_set());
        assert_eq!(map.missing_required(), vec!["OTHER_MODULE".to_string()]);
        map.change("OTHER_MODULE", "K1").unwrap();
        assert!(map.all_required_set());
        assert!(map.missing_required().is_empty());
    }

    #[test]
    fn get_unset_option_reports_not_set() {
        let map = scf_options();
        assert_eq!(
            map.get("OTHER_MODULE"),
            Err(OptionError::NotSet("OTHER_MODULE".to_string()))
        );
    }

    #[test]
    fn reset_restores_default() {
        let mut map = scf_options();
        map.change("MAX_ITER", 7i64).unwrap();
        map.reset("MAX_ITER").unwrap();
        assert_eq!(map.get_int("MAX_ITER").unwrap(), 50);
    }

    #[test]
    fn equal_maps_hash_equally_and_clone_preserves_hash() {
        let a = scf_options();
        let b = scf_options();
        assert_eq!(a, b);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash(), a.clone().content_hash());
    }

    #[test]
    fn repeated_assignment_is_idempotent_for_hash() {
        let mut once = scf_options();
        once.change("REFERENCE", "UHF").unwrap();
        let mut twice = scf_options();
        twice.change("REFERENCE", "UHF").unwrap();
        twice.change("REFERENCE", "UHF").unwrap();
        assert_eq!(once.content_hash(), twice.content_hash());
    }

    #[test]
    fn changed_value_changes_hash() {
        let a = scf_options();
        let mut b = scf_options();
        b.change("MAX_ITER", 51i64).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn compare_and_hash_select_ignore_other_keys() {
        let a = scf_options();
        let mut b = scf_options();
        b.change("MAX_ITER", 51i64).unwrap();
        assert!(a.compare_select(&b, &["REFERENCE", "E_TOLERANCE"]));
        assert!(!a.compare_select(&b, &["MAX_ITER"]));
        assert_eq!(
            a.hash_select(&["REFERENCE", "E_TOLERANCE"]),
            b.hash_select(&["E_TOLERANCE", "REFERENCE"])
        );
        assert_ne!(a.hash_select(&["MAX_ITER"]), b.hash_select(&["MAX_ITER"]));
    }

    #[test]
    fn compound_options_coerce_elementwise() {
        let mut map = OptionMap::new();
        map.add_option(
            "WEIGHTS",
            OptionType::List(ScalarKind::Float),
            false,
            None,
            "",
            Some(OptionValue::list([1i64, 2])),
        )
        .unwrap();
        assert_eq!(map.get_list_float("WEIGHTS").unwrap(), vec![1.0, 2.0]);
        map.add_option(
            "ATOMS",
            OptionType::Set(ScalarKind::Int),
            false,
            None,
            "",
            Some(OptionValue::set([3i64, 1])),
        )
        .unwrap();
        assert_eq!(
            map.get_set_int("ATOMS").unwrap().into_iter().collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn serialization_round_trip_keeps_builtin_validators() {
        let mut map = scf_options();
        map.change("OTHER_MODULE", "K1").unwrap();
        let back: OptionMap = from_bytes(&to_bytes(&map).unwrap()).unwrap();
        assert_eq!(back, map);
        assert_eq!(back.content_hash(), map.content_hash());
        let mut back = back;
        assert!(back.change("REFERENCE", "ROHF").is_err());
        assert_eq!(back.entry("MAX_ITER").unwrap().help(), "Maximum number of iterations");
    }

    #[test]
    fn merge_missing_keeps_existing_declarations() {
        let mut derived = OptionMap::new();
        derived
            .add_option("MAX_ITER", OptionType::INT, false, None, "", Some(5i64.into()))
            .unwrap();
        derived.merge_missing(&scf_options());
        assert_eq!(derived.get_int("MAX_ITER").unwrap(), 5);
        assert!(derived.has_key("REFERENCE"));
        assert_eq!(derived.len(), 4);
    }
}
