//! Error types shared across the RTI workspace.
//!
//! Configuration problems are reported by [`ConfigError`] at setup time and
//! never abort the process. Model evaluation problems surface as
//! [`ModelError`] and are wrapped by the engine with stage and role.

use std::error::Error;
use std::fmt;

use rti_arena::ArenaError;

use crate::kind::ModelRole;

/// Errors detected while building, configuring or preparing a solver.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// An identifier does not name any variant of its role.
    UnknownBackend {
        /// Role being resolved (e.g. `"qp_solver"`).
        role: &'static str,
        /// The unrecognised identifier.
        name: String,
    },
    /// The identifier is valid but its implementation was compiled out.
    BackendUnavailable {
        /// Backend name.
        backend: &'static str,
        /// Cargo feature that enables it.
        feature: &'static str,
    },
    /// A setter received a field name outside its vocabulary.
    UnknownOption {
        /// The rejected field name.
        field: String,
        /// Accepted field names, in registration order.
        accepted: Vec<&'static str>,
    },
    /// A setter received a value of the wrong type.
    OptionType {
        /// Field name.
        field: String,
        /// Expected value type.
        expected: &'static str,
    },
    /// A setter received a value outside the permitted range.
    OptionRange {
        /// Field name.
        field: String,
        /// Description of the violated range.
        reason: String,
    },
    /// The option changes memory layout and cannot be set on a built solver.
    OptionRequiresRebuild {
        /// Field name.
        field: String,
    },
    /// Backend-specific options belong to a different backend.
    OptionsMismatch {
        /// Backend the options were handed to.
        expected: &'static str,
        /// Backend the options were built for.
        found: &'static str,
    },
    /// Problem dimensions violate a structural invariant.
    InvalidDims {
        /// Description of the violation.
        reason: String,
    },
    /// An object's dimensions disagree with the solver's.
    DimensionMismatch {
        /// What was compared.
        what: String,
        /// Expected size.
        expected: usize,
        /// Size found.
        found: usize,
    },
    /// A per-stage setter addressed a stage that does not exist.
    StageOutOfRange {
        /// Requested stage.
        stage: usize,
        /// Number of stages carrying this role.
        stages: usize,
    },
    /// No model was supplied for a stage.
    MissingModel {
        /// Model role.
        role: ModelRole,
        /// Stage index.
        stage: usize,
    },
    /// The supplied model's variant differs from the plan.
    ModelKindMismatch {
        /// Model role.
        role: ModelRole,
        /// Stage index.
        stage: usize,
        /// Variant named by the plan.
        expected: &'static str,
        /// Variant of the supplied model.
        found: &'static str,
    },
    /// The supplied model is structurally invalid.
    InvalidModel {
        /// Model role.
        role: ModelRole,
        /// Stage index.
        stage: usize,
        /// Description of the problem.
        reason: String,
    },
    /// `step` was called before `precompute`.
    NotPrecomputed,
    /// A linearization worker thread could not be started.
    WorkerSpawn {
        /// The operating system's error.
        reason: String,
    },
    /// Arena sizing or allocation failed.
    Arena(ArenaError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownBackend { role, name } => {
                write!(f, "unknown {role} backend '{name}'")
            }
            Self::BackendUnavailable { backend, feature } => {
                write!(
                    f,
                    "backend '{backend}' is not available in this build (enable feature '{feature}')"
                )
            }
            Self::UnknownOption { field, accepted } => {
                write!(
                    f,
                    "unknown option '{field}'; accepted: {}",
                    accepted.join(", ")
                )
            }
            Self::OptionType { field, expected } => {
                write!(f, "option '{field}' expects a {expected} value")
            }
            Self::OptionRange { field, reason } => {
                write!(f, "option '{field}' out of range: {reason}")
            }
            Self::OptionRequiresRebuild { field } => {
                write!(f, "option '{field}' changes memory layout; rebuild the solver")
            }
            Self::OptionsMismatch { expected, found } => {
                write!(f, "options built for '{found}' handed to backend '{expected}'")
            }
            Self::InvalidDims { reason } => write!(f, "invalid dimensions: {reason}"),
            Self::DimensionMismatch {
                what,
                expected,
                found,
            } => {
                write!(f, "{what}: expected {expected}, found {found}")
            }
            Self::StageOutOfRange { stage, stages } => {
                write!(f, "stage {stage} out of range (0..{stages})")
            }
            Self::MissingModel { role, stage } => {
                write!(f, "no {role} model set for stage {stage}")
            }
            Self::ModelKindMismatch {
                role,
                stage,
                expected,
                found,
            } => {
                write!(
                    f,
                    "stage {stage} {role} model is '{found}' but the plan names '{expected}'"
                )
            }
            Self::InvalidModel {
                role,
                stage,
                reason,
            } => {
                write!(f, "stage {stage} {role} model is invalid: {reason}")
            }
            Self::NotPrecomputed => write!(f, "solver used before precompute"),
            Self::WorkerSpawn { reason } => {
                write!(f, "failed to start linearization worker: {reason}")
            }
            Self::Arena(e) => write!(f, "arena: {e}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for ConfigError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

/// Errors from evaluating a stage model.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelError {
    /// The model's evaluation routine failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// An input or output buffer has the wrong length.
    DimensionMismatch {
        /// Which buffer.
        what: &'static str,
        /// Expected length.
        expected: usize,
        /// Length found.
        found: usize,
    },
    /// The model's structure is inconsistent (indices, shapes, weights).
    InvalidStructure {
        /// Description of the problem.
        reason: String,
    },
    /// The model does not implement the requested operation.
    Unsupported {
        /// Name of the operation.
        operation: &'static str,
    },
    /// A non-finite value was produced.
    NanDetected {
        /// Which output.
        what: &'static str,
        /// Index of the first non-finite entry.
        index: usize,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::DimensionMismatch {
                what,
                expected,
                found,
            } => {
                write!(f, "{what} has length {found}, expected {expected}")
            }
            Self::InvalidStructure { reason } => write!(f, "invalid model structure: {reason}"),
            Self::Unsupported { operation } => write!(f, "operation not supported: {operation}"),
            Self::NanDetected { what, index } => {
                write!(f, "non-finite value in {what} at index {index}")
            }
        }
    }
}

impl Error for ModelError {}

impl ModelError {
    /// Check that `buf` has exactly `expected` entries.
    pub fn check_len(what: &'static str, buf: &[f64], expected: usize) -> Result<(), ModelError> {
        if buf.len() == expected {
            Ok(())
        } else {
            Err(ModelError::DimensionMismatch {
                what,
                expected,
                found: buf.len(),
            })
        }
    }

    /// Check that every entry of `buf` is finite.
    pub fn check_finite(what: &'static str, buf: &[f64]) -> Result<(), ModelError> {
        match buf.iter().position(|v| !v.is_finite()) {
            None => Ok(()),
            Some(index) => Err(ModelError::NanDetected { what, index }),
        }
    }
}
