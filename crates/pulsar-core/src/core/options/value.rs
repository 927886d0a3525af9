use crate::core::hash::{ContentHasher, StableHash, canonical_f64_bits};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The four base kinds an option payload is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarKind {
    Int,
    Float,
    Bool,
    String,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Bool => "Bool",
            Self::String => "String",
        }
    }

    fn parse_prefix(s: &str) -> Option<(Self, &str)> {
        [
            ("string", Self::String),
            ("float", Self::Float),
            ("bool", Self::Bool),
            ("int", Self::Int),
        ]
        .into_iter()
        .find_map(|(name, kind)| s.strip_prefix(name).map(|rest| (kind, rest)))
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The declared type of an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Scalar(ScalarKind),
    List(ScalarKind),
    Set(ScalarKind),
    /// Dictionary keyed by `Int` or `String`.
    Dict(ScalarKind, ScalarKind),
}

impl OptionType {
    pub const INT: Self = Self::Scalar(ScalarKind::Int);
    pub const FLOAT: Self = Self::Scalar(ScalarKind::Float);
    pub const BOOL: Self = Self::Scalar(ScalarKind::Bool);
    pub const STRING: Self = Self::Scalar(ScalarKind::String);

    pub fn is_well_formed(self) -> bool {
        match self {
            Self::Dict(key, _) => matches!(key, ScalarKind::Int | ScalarKind::String),
            _ => true,
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(k) => write!(f, "{}", k),
            Self::List(k) => write!(f, "List{}", k),
            Self::Set(k) => write!(f, "Set{}", k),
            Self::Dict(k, v) => write!(f, "Dict{}{}", k, v),
        }
    }
}

impl StableHash for OptionType {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        hasher.write_str(&self.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid option type name '{0}'")]
pub struct ParseOptionTypeError(pub String);

impl FromStr for OptionType {
    type Err = ParseOptionTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let err = || ParseOptionTypeError(s.to_string());
        let single = |rest: &str| match ScalarKind::parse_prefix(rest) {
            Some((kind, "")) => Ok(kind),
            _ => Err(err()),
        };

        let ty = if let Some(rest) = lower.strip_prefix("list") {
            Self::List(single(rest)?)
        } else if let Some(rest) = lower.strip_prefix("set") {
            Self::Set(single(rest)?)
        } else if let Some(rest) = lower.strip_prefix("dict") {
            let (key, rest) = ScalarKind::parse_prefix(rest).ok_or_else(err)?;
            Self::Dict(key, single(rest)?)
        } else {
            Self::Scalar(single(&lower)?)
        };

        if ty.is_well_formed() { Ok(ty) } else { Err(err()) }
    }
}

/// A single scalar payload.
///
/// Floats compare and hash by their canonical bit pattern, so `-0.0 == 0.0` and all
/// NaNs are equal to each other. This makes scalars usable as set members and map keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Int(_) => ScalarKind::Int,
            Self::Float(_) => ScalarKind::Float,
            Self::Bool(_) => ScalarKind::Bool,
            Self::String(_) => ScalarKind::String,
        }
    }

    /// Numeric view used by the range validators.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Applies the scalar row of the coercion table.
    ///
    /// `Int -> Float` yields the nearest double. `Float -> Int` succeeds only when the
    /// float has no fractional part and fits in an `i64`.
    pub fn coerce_to(&self, kind: ScalarKind) -> Option<Scalar> {
        match (self, kind) {
            (Self::Int(i), ScalarKind::Float) => Some(Self::Float(*i as f64)),
            (Self::Float(x), ScalarKind::Int) => {
                // 2^63 is exactly representable; anything at or beyond it is not an i64.
                const LIMIT: f64 = 9_223_372_036_854_775_808.0;
                if x.is_finite() && x.fract() == 0.0 && *x >= -LIMIT && *x < LIMIT {
                    Some(Self::Int(*x as i64))
                } else {
                    None
                }
            }
            (s, k) if s.kind() == k => Some(s.clone()),
            _ => None,
        }
    }

    fn canonical_float(x: f64) -> f64 {
        f64::from_bits(canonical_f64_bits(x))
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => {
                Self::canonical_float(*a).total_cmp(&Self::canonical_float(*b))
            }
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (a, b) => a.kind().cmp(&b.kind()),
        }
    }
}

impl StableHash for Scalar {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        match self {
            Self::Int(i) => {
                hasher.write_u8(0);
                hasher.write_i64(*i);
            }
            Self::Float(x) => {
                hasher.write_u8(1);
                hasher.write_f64(*x);
            }
            Self::Bool(b) => {
                hasher.write_u8(2);
                hasher.write_bool(*b);
            }
            Self::String(s) => {
                hasher.write_u8(3);
                hasher.write_str(s);
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Bool(b) => write!(f, "{}", b),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

/// A tagged option payload: a scalar or a homogeneous compound of scalars.
///
/// Compound payloads do not carry their element kind; the declared [`OptionType`] of
/// the owning option is authoritative and is enforced by [`OptionValue::coerce_to`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Set(BTreeSet<Scalar>),
    Dict(BTreeMap<Scalar, Scalar>),
}

impl OptionValue {
    /// A short description of the payload shape, used in type-mismatch messages.
    pub fn describe_type(&self) -> String {
        fn element_kinds<'a>(items: impl Iterator<Item = &'a Scalar>) -> String {
            let kinds: Vec<ScalarKind> = items.map(Scalar::kind).unique().collect();
            match kinds.as_slice() {
                [] => "Empty".to_string(),
                [k] => k.name().to_string(),
                _ => "Mixed".to_string(),
            }
        }
        match self {
            Self::Scalar(s) => s.kind().name().to_string(),
            Self::List(v) => format!("List{}", element_kinds(v.iter())),
            Self::Set(v) => format!("Set{}", element_kinds(v.iter())),
            Self::Dict(m) => format!(
                "Dict{}{}",
                element_kinds(m.keys()),
                element_kinds(m.values())
            ),
        }
    }

    /// Converts the payload to the declared type, or returns `None` if the coercion
    /// table forbids it.
    pub fn coerce_to(&self, ty: OptionType) -> Option<OptionValue> {
        match (self, ty) {
            (Self::Scalar(s), OptionType::Scalar(k)) => s.coerce_to(k).map(Self::Scalar),
            (Self::List(items), OptionType::List(k)) => items
                .iter()
                .map(|s| s.coerce_to(k))
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            (Self::Set(items), OptionType::Set(k)) => items
                .iter()
                .map(|s| s.coerce_to(k))
                .collect::<Option<BTreeSet<_>>>()
                .map(Self::Set),
            (Self::Dict(items), OptionType::Dict(kk, kv)) => items
                .iter()
                .map(|(key, value)| Some((key.coerce_to(kk)?, value.coerce_to(kv)?)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(Self::Dict),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Every scalar the payload holds: list and set elements, dictionary values.
    pub fn scalars(&self) -> Box<dyn Iterator<Item = &Scalar> + '_> {
        match self {
            Self::Scalar(s) => Box::new(std::iter::once(s)),
            Self::List(v) => Box::new(v.iter()),
            Self::Set(v) => Box::new(v.iter()),
            Self::Dict(m) => Box::new(m.values()),
        }
    }

    /// Builds a payload for `ty` from a TOML value, as found in manifests and run plans.
    ///
    /// Arrays become lists, or sets when `ty` is a set type. Tables become dictionaries;
    /// their keys are parsed as integers when `ty` declares integer keys.
    pub fn from_toml(value: &toml::Value, ty: OptionType) -> Option<OptionValue> {
        fn scalar(value: &toml::Value) -> Option<Scalar> {
            match value {
                toml::Value::Integer(i) => Some(Scalar::Int(*i)),
                toml::Value::Float(x) => Some(Scalar::Float(*x)),
                toml::Value::Boolean(b) => Some(Scalar::Bool(*b)),
                toml::Value::String(s) => Some(Scalar::String(s.clone())),
                _ => None,
            }
        }

        let raw = match (value, ty) {
            (toml::Value::Array(items), OptionType::Set(_)) => {
                Self::Set(items.iter().map(scalar).collect::<Option<_>>()?)
            }
            (toml::Value::Array(items), _) => {
                Self::List(items.iter().map(scalar).collect::<Option<_>>()?)
            }
            (toml::Value::Table(table), OptionType::Dict(key_kind, _)) => Self::Dict(
                table
                    .iter()
                    .map(|(k, v)| {
                        let key = match key_kind {
                            ScalarKind::Int => Scalar::Int(k.parse().ok()?),
                            _ => Scalar::String(k.clone()),
                        };
                        Some((key, scalar(v)?))
                    })
                    .collect::<Option<_>>()?,
            ),
            (other, _) => Self::Scalar(scalar(other)?),
        };
        raw.coerce_to(ty)
    }
}

impl StableHash for OptionValue {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        match self {
            Self::Scalar(s) => {
                hasher.write_u8(0);
                s.stable_hash(hasher);
            }
            Self::List(v) => {
                hasher.write_u8(1);
                v.stable_hash(hasher);
            }
            Self::Set(v) => {
                hasher.write_u8(2);
                v.stable_hash(hasher);
            }
            Self::Dict(m) => {
                hasher.write_u8(3);
                m.stable_hash(hasher);
            }
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{}", s),
            Self::List(v) => write!(f, "[{}]", v.iter().join(", ")),
            Self::Set(v) => write!(f, "{{{}}}", v.iter().join(", ")),
            Self::Dict(m) => write!(
                f,
                "{{{}}}",
                m.iter().map(|(k, v)| format!("{}: {}", k, v)).join(", ")
            ),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<Scalar>> From<T> for OptionValue {
    fn from(v: T) -> Self {
        Self::Scalar(v.into())
    }
}

impl OptionValue {
    pub fn list<T: Into<Scalar>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn set<T: Into<Scalar>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn dict<K: Into<Scalar>, V: Into<Scalar>>(items: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Dict(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Extraction of a concrete Rust value from a payload that already matches its declared type.
pub trait FromOptionValue: Sized {
    fn from_option_value(value: &OptionValue) -> Option<Self>;
}

/// Scalar extraction, shared by the scalar and compound impls.
pub trait FromScalar: Sized {
    fn from_scalar(value: &Scalar) -> Option<Self>;
}

impl FromScalar for i64 {
    fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromScalar for f64 {
    fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Float(x) => Some(*x),
            Scalar::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromScalar for bool {
    fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromScalar for String {
    fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

macro_rules! scalar_from_option_value {
    ($($t:ty),*) => {
        $(
            impl FromOptionValue for $t {
                fn from_option_value(value: &OptionValue) -> Option<Self> {
                    value.as_scalar().and_then(<$t>::from_scalar)
                }
            }
        )*
    };
}

scalar_from_option_value!(i64, f64, bool, String);

impl<T: FromScalar> FromOptionValue for Vec<T> {
    fn from_option_value(value: &OptionValue) -> Option<Self> {
        match value {
            OptionValue::List(items) => items.iter().map(T::from_scalar).collect(),
            _ => None,
        }
    }
}

impl<T: FromScalar + Ord> FromOptionValue for BTreeSet<T> {
    fn from_option_value(value: &OptionValue) -> Option<Self> {
        match value {
            OptionValue::Set(items) => items.iter().map(T::from_scalar).collect(),
            _ => None,
        }
    }
}

impl<K: FromScalar + Ord, V: FromScalar> FromOptionValue for BTreeMap<K, V> {
    fn from_option_value(value: &OptionValue) -> Option<Self> {
        match value {
            OptionValue::Dict(items) => items
                .iter()
                .map(|(k, v)| Some((K::from_scalar(k)?, V::from_scalar(v)?)))
                .collect(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_parse_case_insensitively() {
        assert_eq!("int".parse::<OptionType>().unwrap(), OptionType::INT);
        assert_eq!(
            "ListFloat".parse::<OptionType>().unwrap(),
            OptionType::List(ScalarKind::Float)
        );
        assert_eq!(
            "SETSTRING".parse::<OptionType>().unwrap(),
            OptionType::Set(ScalarKind::String)
        );
        assert_eq!(
            "DictStringInt".parse::<OptionType>().unwrap(),
            OptionType::Dict(ScalarKind::String, ScalarKind::Int)
        );
    }

    #[test]
    fn dict_with_float_keys_is_rejected() {
        assert!("DictFloatInt".parse::<OptionType>().is_err());
        assert!("ListNumber".parse::<OptionType>().is_err());
        assert!("Intx".parse::<OptionType>().is_err());
        let err = "ListNumber".parse::<OptionType>().unwrap_err();
        assert_eq!(err, ParseOptionTypeError("ListNumber".to_string()));
        assert_eq!(err.to_string(), "Invalid option type name 'ListNumber'");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn type_display_round_trips_through_parse() {
        for ty in [
            OptionType::BOOL,
            OptionType::List(ScalarKind::Int),
            OptionType::Set(ScalarKind::Float),
            OptionType::Dict(ScalarKind::Int, ScalarKind::String),
        ] {
            assert_eq!(ty.to_string().parse::<OptionType>().unwrap(), ty);
        }
    }

    #[test]
    fn int_at_two_to_the_63_coerces_to_nearest_float() {
        let big = OptionValue::from(i64::MAX);
        let coerced = big.coerce_to(OptionType::FLOAT).unwrap();
        assert_eq!(coerced, OptionValue::from(9_223_372_036_854_775_808.0));
    }

    #[test]
    fn fractional_float_does_not_coerce_to_int() {
        assert!(OptionValue::from(3.14).coerce_to(OptionType::INT).is_none());
        assert_eq!(
            OptionValue::from(3.0).coerce_to(OptionType::INT),
            Some(OptionValue::from(3i64))
        );
        assert!(
            OptionValue::from(9_223_372_036_854_775_808.0)
                .coerce_to(OptionType::INT)
                .is_none()
        );
    }

    #[test]
    fn bool_and_string_never_coerce_across_kinds() {
        assert!(OptionValue::from(true).coerce_to(OptionType::INT).is_none());
        assert!(OptionValue::from("1").coerce_to(OptionType::INT).is_none());
        assert!(OptionValue::from(1i64).coerce_to(OptionType::BOOL).is_none());
    }

    #[test]
    fn empty_compound_values_coerce_to_any_element_kind() {
        let empty = OptionValue::List(Vec::new());
        assert!(empty.coerce_to(OptionType::List(ScalarKind::Bool)).is_some());
        let empty_set = OptionValue::Set(BTreeSet::new());
        assert!(empty_set.coerce_to(OptionType::Set(ScalarKind::String)).is_some());
    }

    #[test]
    fn list_coerces_elementwise() {
        let v = OptionValue::list([1i64, 2, 3]);
        assert_eq!(
            v.coerce_to(OptionType::List(ScalarKind::Float)),
            Some(OptionValue::list([1.0, 2.0, 3.0]))
        );
        let mixed = OptionValue::List(vec![Scalar::Int(1), Scalar::from("x")]);
        assert!(mixed.coerce_to(OptionType::List(ScalarKind::Int)).is_none());
        assert_eq!(mixed.describe_type(), "ListMixed");
    }

    #[test]
    fn list_does_not_coerce_to_set() {
        let v = OptionValue::list([1i64]);
        assert!(v.coerce_to(OptionType::Set(ScalarKind::Int)).is_none());
    }

    #[test]
    fn negative_zero_equals_positive_zero() {
        assert_eq!(Scalar::Float(-0.0), Scalar::Float(0.0));
        assert_eq!(Scalar::Float(f64::NAN), Scalar::Float(f64::NAN));
        assert_eq!(
            Scalar::Float(-0.0).content_hash(),
            Scalar::Float(0.0).content_hash()
        );
    }

    #[test]
    fn set_iteration_is_sorted() {
        let v = OptionValue::set([3i64, 1, 2, 1]);
        assert_eq!(v.to_string(), "{1, 2, 3}");
    }

    #[test]
    fn toml_array_becomes_set_when_declared() {
        let value: toml::Value = toml::Value::Array(vec![
            toml::Value::Integer(2),
            toml::Value::Integer(1),
        ]);
        let ty = OptionType::Set(ScalarKind::Int);
        assert_eq!(
            OptionValue::from_toml(&value, ty),
            Some(OptionValue::set([1i64, 2]))
        );
    }

    #[test]
    fn toml_table_with_integer_keys_builds_dict() {
        let mut table = toml::value::Table::new();
        table.insert("1".to_string(), toml::Value::Float(0.5));
        table.insert("2".to_string(), toml::Value::Integer(2));
        let ty = OptionType::Dict(ScalarKind::Int, ScalarKind::Float);
        let v = OptionValue::from_toml(&toml::Value::Table(table), ty).unwrap();
        assert_eq!(v, OptionValue::dict([(1i64, 0.5), (2i64, 2.0)]));
    }

    #[test]
    fn typed_extraction_checks_shape() {
        let v = OptionValue::list([1.0, 2.0]);
        assert_eq!(Vec::<f64>::from_option_value(&v), Some(vec![1.0, 2.0]));
        assert_eq!(f64::from_option_value(&v), None);
        assert_eq!(
            String::from_option_value(&OptionValue::from("abc")),
            Some("abc".to_string())
        );
    }
}
