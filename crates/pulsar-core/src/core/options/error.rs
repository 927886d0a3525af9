use crate::core::error::{CoreException, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptionError {
    #[error("Option '{name}' failed validation: {}", .problems.join("; "))]
    Validation { name: String, problems: Vec<String> },
    #[error("Unknown option '{0}'")]
    Unknown(String),
    #[error("Type mismatch for option '{name}': declared {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },
    #[error("Option '{0}' is declared more than once")]
    Duplicate(String),
    #[error("Required option '{0}' may not carry a default")]
    RequiredWithDefault(String),
    #[error("Option '{0}' has an ill-formed type")]
    IllFormedType(String),
    #[error("Option '{0}' has no value")]
    NotSet(String),
}

impl OptionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::OptionValidation,
            Self::Unknown(_) => ErrorKind::UnknownOption,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::Duplicate(_) | Self::RequiredWithDefault(_) | Self::IllFormedType(_) => {
                ErrorKind::InvalidInfo
            }
            Self::NotSet(_) => ErrorKind::UnmetRequiredOption,
        }
    }

    pub fn option_name(&self) -> &str {
        match self {
            Self::Validation { name, .. } | Self::TypeMismatch { name, .. } => name,
            Self::Unknown(name)
            | Self::Duplicate(name)
            | Self::RequiredWithDefault(name)
            | Self::IllFormedType(name)
            | Self::NotSet(name) => name,
        }
    }
}

impl From<OptionError> for CoreException {
    fn from(err: OptionError) -> Self {
        let mut ex = CoreException::new(err.kind(), err.to_string()).with("option", err.option_name());
        match &err {
            OptionError::Validation { problems, .. } => {
                for problem in problems {
                    ex.append_info("problem", problem);
                }
            }
            OptionError::TypeMismatch {
                expected, found, ..
            } => {
                ex.append_info("expected", expected);
                ex.append_info("found", found);
            }
            _ => {}
        }
        ex
    }
}
