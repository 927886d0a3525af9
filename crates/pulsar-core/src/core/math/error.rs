use crate::core::error::{CoreException, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MathSetError {
    #[error("Set operation between sets drawn from different universes")]
    MismatchedUniverse,
    #[error("Element is not in the universe: {0}")]
    NotInUniverse(String),
    #[error("Index {index} is out of range for a universe of size {size}")]
    OutOfRange { index: usize, size: usize },
}

impl MathSetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MismatchedUniverse => ErrorKind::MismatchedUniverse,
            Self::NotInUniverse(_) => ErrorKind::NotInUniverse,
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
        }
    }
}

impl From<MathSetError> for CoreException {
    fn from(err: MathSetError) -> Self {
        let ex = CoreException::new(err.kind(), err.to_string());
        match err {
            MathSetError::NotInUniverse(element) => ex.with("element", element),
            MathSetError::OutOfRange { index, size } => {
                ex.with("index", index).with("size", size)
            }
            MathSetError::MismatchedUniverse => ex,
        }
    }
}
