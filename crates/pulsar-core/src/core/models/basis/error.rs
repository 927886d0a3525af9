use crate::core::error::{CoreException, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BasisError {
    #[error("Basis set capacity exceeded for {what}: requested {requested}, capacity {capacity}")]
    Capacity {
        what: &'static str,
        requested: usize,
        capacity: usize,
    },
    #[error("Inconsistent shell: {0}")]
    InconsistentShell(String),
    #[error("Shell index {index} out of range for {size} shells")]
    OutOfRange { index: usize, size: usize },
    #[error("Data of length {found} does not match {expected} basis functions")]
    LengthMismatch { expected: usize, found: usize },
}

impl BasisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Capacity { .. } => ErrorKind::BasisCapacity,
            Self::InconsistentShell(_) | Self::LengthMismatch { .. } => {
                ErrorKind::InconsistentShell
            }
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
        }
    }
}

impl From<BasisError> for CoreException {
    fn from(err: BasisError) -> Self {
        let ex = CoreException::new(err.kind(), err.to_string());
        match err {
            BasisError::Capacity {
                what,
                requested,
                capacity,
            } => ex
                .with("quantity", what)
                .with("requested", requested)
                .with("capacity", capacity),
            BasisError::OutOfRange { index, size } => {
                ex.with("index", index).with("size", size)
            }
            _ => ex,
        }
    }
}
