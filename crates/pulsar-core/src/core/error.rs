use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of every failure the runtime can report.
///
/// The kind is what callers match on; the human-readable description and the
/// structured annotations live in [`CoreException`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    // --- Module manager ---
    InvalidInfo,
    DuplicateKey,
    NoSuchKey,
    BadParent,
    UnmetRequiredOption,

    // --- Option system ---
    OptionValidation,
    UnknownOption,
    OptionLocked,
    TypeMismatch,

    // --- Loader ---
    SupermoduleNotFound,
    SupermoduleLoad,
    LoaderUnavailable,
    FactoryFailure,

    // --- Set algebra and data model ---
    MismatchedUniverse,
    NotInUniverse,
    OutOfRange,
    BasisCapacity,
    InconsistentShell,
    InconsistentWavefunction,

    // --- Persistence ---
    CheckpointIO,
    StaleCache,
    Serialization,

    // --- Passthrough and internal ---
    Kernel,
    Internal,
}

impl ErrorKind {
    /// Stable positive integer identifying the kind across language boundaries.
    pub fn code(self) -> i32 {
        match self {
            Self::InvalidInfo => 1,
            Self::DuplicateKey => 2,
            Self::NoSuchKey => 3,
            Self::BadParent => 4,
            Self::UnmetRequiredOption => 5,
            Self::OptionValidation => 6,
            Self::UnknownOption => 7,
            Self::OptionLocked => 8,
            Self::TypeMismatch => 9,
            Self::SupermoduleNotFound => 10,
            Self::SupermoduleLoad => 11,
            Self::LoaderUnavailable => 12,
            Self::FactoryFailure => 13,
            Self::MismatchedUniverse => 14,
            Self::NotInUniverse => 15,
            Self::OutOfRange => 16,
            Self::BasisCapacity => 17,
            Self::InconsistentShell => 18,
            Self::InconsistentWavefunction => 19,
            Self::CheckpointIO => 20,
            Self::StaleCache => 21,
            Self::Serialization => 22,
            Self::Kernel => 23,
            Self::Internal => 24,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The single exception object surfaced by every public entry point.
///
/// A `CoreException` carries a short description (`what`) plus an ordered list of
/// `(key, value)` annotations. Layers that propagate an error append their own context
/// with [`CoreException::with`], so a failure raised deep inside a module kernel arrives
/// at the caller annotated with the module key and instance id it came from. Repeated
/// keys are kept; annotations are never merged or reordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreException {
    kind: ErrorKind,
    what: String,
    info: Vec<(String, String)>,
}

pub type CoreResult<T> = Result<T, CoreException>;

impl CoreException {
    pub fn new(kind: ErrorKind, what: impl Into<String>) -> Self {
        Self {
            kind,
            what: what.into(),
            info: Vec::new(),
        }
    }

    /// Shorthand for errors raised by module code.
    pub fn kernel(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::Kernel, what)
    }

    /// Appends an annotation and returns the exception, for use in `map_err` chains.
    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.append_info(key, value);
        self
    }

    pub fn append_info(&mut self, key: impl Into<String>, value: impl fmt::Display) {
        self.info.push((key.into(), value.to_string()));
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn what(&self) -> &str {
        &self.what
    }

    pub fn info(&self) -> &[(String, String)] {
        &self.info
    }

    /// Returns the first annotation recorded under `key`.
    pub fn info_value(&self, key: &str) -> Option<&str> {
        self.info
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Re-labels the exception while keeping the original description as an annotation.
    pub(crate) fn rewrap(self, kind: ErrorKind, what: impl Into<String>) -> Self {
        let mut wrapped = CoreException::new(kind, what).with("cause", &self.what);
        wrapped.info.extend(self.info);
        wrapped
    }
}

impl fmt::Display for CoreException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "what() = {}", self.what)?;
        for (key, value) in &self.info {
            write!(f, "\n  {} : {}", key, value)?;
        }
        Ok(())
    }
}

impl std::error::Error for CoreException {}
