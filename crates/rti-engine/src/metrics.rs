//! Per-call report of the RTI engine.
//!
//! [`RtiReport`] is returned by every successful
//! [`SqpRti::step`](crate::SqpRti::step). All durations are in
//! microseconds.

use rti_qp::{QpInfo, QpResiduals};

/// Wall-clock breakdown of one call, in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RtiTimings {
    /// Model evaluation, regularization and QP assembly.
    pub lin_us: u64,
    /// QP solve.
    pub qp_us: u64,
    /// The whole call.
    pub total_us: u64,
}

/// Outcome of one successful real-time iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RtiReport {
    /// Backend report of the QP solve.
    pub qp: QpInfo,
    /// Sum of stage costs at the linearization point.
    pub cost: f64,
    /// ∞-norm of the primal step `[Δu, Δx, Δs]`.
    pub step_norm: f64,
    /// QP residual norms, when `ext_qp_res` is on.
    pub residuals: Option<QpResiduals>,
    /// Timing breakdown.
    pub timings: RtiTimings,
}
