pub mod error;
pub mod info;
pub mod ordering;
pub mod set;
pub mod shell;

pub use error::BasisError;
pub use info::BasisInfo;
pub use ordering::{AoOrdering, MAX_AM, spherical_transform};
pub use set::{BasisCapacity, BasisSet, BasisSetShell};
pub use shell::{BasisShellInfo, ShellType};
