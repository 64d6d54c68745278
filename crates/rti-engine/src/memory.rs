//! State that survives across real-time iterations.
//!
//! The statistics table, the model memory and the QP backend memory live
//! in the memory block of the solver's arena; this struct keeps the
//! scalar bookkeeping next to them.

use rti_core::Status;
use rti_qp::QpInfo;

use crate::metrics::RtiTimings;

/// Persistent bookkeeping of one [`SqpRti`](crate::SqpRti) instance.
#[derive(Clone, Debug)]
pub struct SqpRtiMemory {
    pub(crate) status: Status,
    pub(crate) timings: RtiTimings,
    pub(crate) call_count: u64,
    pub(crate) qp_info: QpInfo,
    pub(crate) precomputed: bool,
}

impl SqpRtiMemory {
    pub(crate) fn new() -> Self {
        Self {
            status: Status::Success,
            timings: RtiTimings::default(),
            call_count: 0,
            qp_info: QpInfo::default(),
            precomputed: false,
        }
    }

    /// Status of the last call.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Timings of the last call.
    pub fn timings(&self) -> RtiTimings {
        self.timings
    }

    /// Calls to `step` so far, failed ones included.
    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    /// QP iterations of the last call.
    pub fn last_qp_iter(&self) -> usize {
        self.qp_info.iter
    }

    /// Backend report of the last QP solve.
    pub fn qp_info(&self) -> QpInfo {
        self.qp_info
    }

    /// `true` once `precompute` has succeeded.
    pub fn precomputed(&self) -> bool {
        self.precomputed
    }
}
