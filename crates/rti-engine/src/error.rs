//! Errors returned by [`SqpRti::step`](crate::SqpRti::step).

use std::error::Error;
use std::fmt;

use rti_core::{ConfigError, ModelError, ModelRole, Status};
use rti_qp::QpStatus;

/// Failure of one real-time iteration.
///
/// Every variant leaves the iterate in `NlpOut` exactly as it was before
/// the call.
#[derive(Clone, Debug, PartialEq)]
pub enum RtiError {
    /// The solver or its inputs are misconfigured.
    Config(ConfigError),
    /// A stage model failed during linearization.
    ModelFailed {
        /// Stage index.
        stage: usize,
        /// Which model of the stage failed.
        role: ModelRole,
        /// The model's error.
        reason: ModelError,
    },
    /// The QP backend returned a non-success status.
    QpFailed {
        /// Backend outcome.
        status: QpStatus,
        /// Iterations the backend performed.
        iterations: usize,
    },
    /// A linearization worker panicked.
    WorkerPanicked,
}

impl fmt::Display for RtiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::ModelFailed {
                stage,
                role,
                reason,
            } => write!(f, "{role} model failed at stage {stage}: {reason}"),
            Self::QpFailed { status, iterations } => {
                write!(f, "QP solve failed with {status} after {iterations} iterations")
            }
            Self::WorkerPanicked => write!(f, "linearization worker panicked"),
        }
    }
}

impl Error for RtiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::ModelFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<ConfigError> for RtiError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<&RtiError> for Status {
    fn from(e: &RtiError) -> Self {
        match e {
            RtiError::Config(c) => Status::from(c),
            RtiError::ModelFailed {
                reason: ModelError::NanDetected { .. },
                ..
            } => Status::NumericalFailure,
            RtiError::ModelFailed { reason, .. } => Status::from(reason),
            RtiError::QpFailed { status, .. } => Status::from(*status),
            RtiError::WorkerPanicked => Status::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_failure() {
        let qp = RtiError::QpFailed {
            status: QpStatus::Infeasible,
            iterations: 3,
        };
        assert_eq!(Status::from(&qp), Status::Infeasible);
        assert_eq!(Status::from(&RtiError::WorkerPanicked), Status::Failure);
        let nan = RtiError::ModelFailed {
            stage: 2,
            role: ModelRole::Dynamics,
            reason: ModelError::NanDetected {
                what: "phi",
                index: 0,
            },
        };
        assert_eq!(Status::from(&nan), Status::NumericalFailure);
        let cfg = RtiError::from(ConfigError::NotPrecomputed);
        assert_eq!(Status::from(&cfg), Status::Failure);
    }

    #[test]
    fn display_names_stage_and_role() {
        let e = RtiError::ModelFailed {
            stage: 4,
            role: ModelRole::Cost,
            reason: ModelError::Unsupported {
                operation: "evaluate",
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("cost"), "{msg}");
        assert!(msg.contains("stage 4"), "{msg}");
        assert!(e.source().is_some());
    }
}
