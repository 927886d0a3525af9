use super::value::{OptionValue, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Capability invoked on every assignment to an option that declares it.
///
/// On failure the validator returns one message per offending element.
pub trait OptionValidator: Send + Sync + fmt::Debug {
    fn validate(&self, value: &OptionValue) -> Result<(), Vec<String>>;

    fn describe(&self) -> String;

    /// The serializable form of a built-in validator. User validators return `None`
    /// and are dropped when an option map is serialized.
    fn spec(&self) -> Option<ValidatorSpec> {
        None
    }
}

/// Serializable description of the built-in validators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidatorSpec {
    RangeCheck {
        min: f64,
        max: f64,
        inc_min: bool,
        inc_max: bool,
    },
    GreaterThan {
        min: f64,
        inclusive: bool,
    },
    LessThan {
        max: f64,
        inclusive: bool,
    },
    InList {
        values: Vec<Scalar>,
    },
}

impl ValidatorSpec {
    pub fn build(&self) -> Arc<dyn OptionValidator> {
        match self.clone() {
            Self::RangeCheck {
                min,
                max,
                inc_min,
                inc_max,
            } => Arc::new(RangeCheck {
                min,
                max,
                inc_min,
                inc_max,
            }),
            Self::GreaterThan { min, inclusive } => Arc::new(GreaterThan { min, inclusive }),
            Self::LessThan { max, inclusive } => Arc::new(LessThan { max, inclusive }),
            Self::InList { values } => Arc::new(InList { values }),
        }
    }
}

fn check_numeric(
    value: &OptionValue,
    accept: impl Fn(f64) -> bool,
    describe: impl Fn() -> String,
) -> Result<(), Vec<String>> {
    let problems: Vec<String> = value
        .scalars()
        .filter_map(|s| match s.as_f64() {
            Some(x) if accept(x) => None,
            Some(_) => Some(format!("{} is not {}", s, describe())),
            None => Some(format!("'{}' is not numeric", s)),
        })
        .collect();
    if problems.is_empty() { Ok(()) } else { Err(problems) }
}

fn bound_text(op_open: &str, op_closed: &str, inclusive: bool, bound: f64) -> String {
    format!("{} {}", if inclusive { op_closed } else { op_open }, bound)
}

/// Numeric interval, open or closed at each end.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeCheck {
    pub min: f64,
    pub max: f64,
    pub inc_min: bool,
    pub inc_max: bool,
}

impl RangeCheck {
    pub fn new(min: f64, max: f64, inc_min: bool, inc_max: bool) -> Self {
        Self {
            min,
            max,
            inc_min,
            inc_max,
        }
    }

    /// Closed interval `[min, max]`.
    pub fn closed(min: f64, max: f64) -> Self {
        Self::new(min, max, true, true)
    }

    fn contains(&self, x: f64) -> bool {
        let above = if self.inc_min { x >= self.min } else { x > self.min };
        let below = if self.inc_max { x <= self.max } else { x < self.max };
        above && below
    }
}

impl OptionValidator for RangeCheck {
    fn validate(&self, value: &OptionValue) -> Result<(), Vec<String>> {
        check_numeric(value, |x| self.contains(x), || self.describe())
    }

    fn describe(&self) -> String {
        format!(
            "in {}{}, {}{}",
            if self.inc_min { '[' } else { '(' },
            self.min,
            self.max,
            if self.inc_max { ']' } else { ')' }
        )
    }

    fn spec(&self) -> Option<ValidatorSpec> {
        Some(ValidatorSpec::RangeCheck {
            min: self.min,
            max: self.max,
            inc_min: self.inc_min,
            inc_max: self.inc_max,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GreaterThan {
    pub min: f64,
    pub inclusive: bool,
}

impl GreaterThan {
    pub fn new(min: f64, inclusive: bool) -> Self {
        Self { min, inclusive }
    }
}

impl OptionValidator for GreaterThan {
    fn validate(&self, value: &OptionValue) -> Result<(), Vec<String>> {
        check_numeric(
            value,
            |x| if self.inclusive { x >= self.min } else { x > self.min },
            || self.describe(),
        )
    }

    fn describe(&self) -> String {
        bound_text(">", ">=", self.inclusive, self.min)
    }

    fn spec(&self) -> Option<ValidatorSpec> {
        Some(ValidatorSpec::GreaterThan {
            min: self.min,
            inclusive: self.inclusive,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LessThan {
    pub max: f64,
    pub inclusive: bool,
}

impl LessThan {
    pub fn new(max: f64, inclusive: bool) -> Self {
        Self { max, inclusive }
    }
}

impl OptionValidator for LessThan {
    fn validate(&self, value: &OptionValue) -> Result<(), Vec<String>> {
        check_numeric(
            value,
            |x| if self.inclusive { x <= self.max } else { x < self.max },
            || self.describe(),
        )
    }

    fn describe(&self) -> String {
        bound_text("<", "<=", self.inclusive, self.max)
    }

    fn spec(&self) -> Option<ValidatorSpec> {
        Some(ValidatorSpec::LessThan {
            max: self.max,
            inclusive: self.inclusive,
        })
    }
}

/// Discrete allow-list. Strings match case-insensitively; numbers match by value.
#[derive(Debug, Clone, PartialEq)]
pub struct InList {
    pub values: Vec<Scalar>,
}

impl InList {
    pub fn new<T: Into<Scalar>>(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(allowed: &Scalar, candidate: &Scalar) -> bool {
        match (allowed, candidate) {
            (Scalar::String(a), Scalar::String(b)) => a.eq_ignore_ascii_case(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
        }
    }
}

impl OptionValidator for InList {
    fn validate(&self, value: &OptionValue) -> Result<(), Vec<String>> {
        let problems: Vec<String> = value
            .scalars()
            .filter(|s| !self.values.iter().any(|allowed| Self::matches(allowed, s)))
            .map(|s| format!("'{}' is not {}", s, self.describe()))
            .collect();
        if problems.is_empty() { Ok(()) } else { Err(problems) }
    }

    fn describe(&self) -> String {
        let names: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        format!("one of [{}]", names.join(", "))
    }

    fn spec(&self) -> Option<ValidatorSpec> {
        Some(ValidatorSpec::InList {
            values: self.values.clone(),
        })
    }
}

type ValidateFn = dyn Fn(&OptionValue) -> Result<(), Vec<String>> + Send + Sync;

/// Adapter turning a closure into a validator.
pub struct FnValidator {
    description: String,
    check: Box<ValidateFn>,
}

impl FnValidator {
    pub fn new(
        description: impl Into<String>,
        check: impl Fn(&OptionValue) -> Result<(), Vec<String>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            check: Box::new(check),
        }
    }
}

impl fmt::Debug for FnValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl OptionValidator for FnValidator {
    fn validate(&self, value: &OptionValue) -> Result<(), Vec<String>> {
        (self.check)(value)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
