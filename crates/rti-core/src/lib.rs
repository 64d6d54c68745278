//! Core types for the RTI solver framework.
//!
//! Defines the vocabulary shared by every other crate in the workspace:
//! problem dimensions, the closed identifier sets of each pluggable role,
//! status codes, error types, and the string-keyed option machinery.
//! The only internal dependency is `rti-arena`, for its error type.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod dims;
pub mod error;
pub mod kind;
pub mod option;
pub mod status;

pub use dims::{OcpDims, QpDims, StageDims};
pub use error::{ConfigError, ModelError};
pub use kind::{
    ConstraintKind, CostKind, DynamicsKind, ModelRole, QpSolverKind, RegularizationKind,
};
pub use option::{OptionRegistry, OptionValue, Setter};
pub use status::Status;
