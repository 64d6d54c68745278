//! Solver status codes.
//!
//! [`Status`] is a `repr(i32)` enum whose discriminants are ABI-stable:
//! `0` is success and every positive code names one failure class.

use std::fmt;

use crate::error::{ConfigError, ModelError};

/// Outcome of a solve or real-time-iteration call.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// Converged to the requested tolerances.
    #[default]
    Success = 0,
    /// Generic failure (configuration or model evaluation).
    Failure = 1,
    /// Iteration limit reached before convergence.
    MaxIter = 2,
    /// The QP was detected to be infeasible.
    Infeasible = 3,
    /// A factorization broke down or produced non-finite values.
    NumericalFailure = 4,
}

impl Status {
    /// Integer code of this status.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Decode an integer code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Failure),
            2 => Some(Self::MaxIter),
            3 => Some(Self::Infeasible),
            4 => Some(Self::NumericalFailure),
            _ => None,
        }
    }

    /// `true` for [`Status::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::MaxIter => "iteration limit reached",
            Self::Infeasible => "infeasible",
            Self::NumericalFailure => "numerical failure",
        })
    }
}

impl From<&ConfigError> for Status {
    fn from(_e: &ConfigError) -> Self {
        Status::Failure
    }
}

impl From<&ModelError> for Status {
    fn from(_e: &ModelError) -> Self {
        Status::Failure
    }
}
