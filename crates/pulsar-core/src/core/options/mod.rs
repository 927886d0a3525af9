//! # Option System
//!
//! Dynamically typed, validated configuration for modules.
//!
//! An [`OptionMap`] declares each option with a type, an optional default, a required
//! flag, an optional validator and help text. Assignments are coerced to the declared
//! type (see [`OptionValue::coerce_to`]) and validated before they are stored. Maps are
//! comparable and hash to a stable [`Hash128`](crate::core::hash::Hash128) that
//! identifies the option snapshot behind every cache entry.

pub mod error;
pub mod map;
pub mod validators;
pub mod value;

pub use error::OptionError;
pub use map::{OptionEntry, OptionMap};
pub use validators::{
    FnValidator, GreaterThan, InList, LessThan, OptionValidator, RangeCheck, ValidatorSpec,
};
pub use value::{FromOptionValue, OptionType, Scalar, ScalarKind, OptionValue};
