//! Backend-agnostic dense QP layer for the RTI framework.
//!
//! The crate owns three kinds of object, all laid out with the arena
//! protocol from `rti-arena`:
//!
//! - problem and solution data: [`QpIn`], [`QpOut`], [`QpRes`];
//! - options: [`QpSolverOptions`], a common block plus one tagged
//!   backend block;
//! - the solver itself: [`QpSolver`], which binds one [`QpBackend`] to one
//!   problem shape and either owns its memory and workspace in one arena
//!   or, as `QpSolver<External>`, borrows them from the caller's.
//!
//! Data objects default to owning an `Arena`; with `assign` they can be
//! laid over a region of a larger one instead. Backends always see the
//! borrowed forms [`QpInView`] and [`QpOutView`].
//!
//! # Problem form
//!
//! ```text
//! minimise   ½ vᵀHv + gᵀv
//! subject to A v = b
//!            lb ≤ v[idxb] ≤ ub
//!            lg ≤ C v ≤ ug
//! ```
//!
//! Infinite bounds are inactive. All inequality multipliers are reported
//! non-negative, with stationarity
//! `Hv + g + Aᵀy + Eᵀ(λ_ub − λ_lb) + Cᵀ(λ_ug − λ_lg) = 0`.
//!
//! # Backends
//!
//! | kind             | module        | feature      |
//! |------------------|---------------|--------------|
//! | `interior_point` | [`ipm`]       | always       |
//! | `admm`           | [`admm`]      | always       |
//! | `active_set`     | `active_set`  | `active-set` |
//!
//! [`resolve`] maps a kind to its backend. A compiled-out backend resolves
//! to [`ConfigError::BackendUnavailable`](rti_core::ConfigError).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

#[cfg(feature = "active-set")]
pub mod active_set;
pub mod admm;
pub mod backend;
pub mod ipm;
pub mod linalg;
pub mod options;
pub mod qp_in;
pub mod qp_out;
pub mod residual;
pub mod solver;

// Public re-exports for the primary API surface.
#[cfg(feature = "active-set")]
pub use active_set::ActiveSet;
pub use admm::Admm;
pub use backend::{resolve, QpBackend};
pub use ipm::InteriorPoint;
pub use options::{
    ActiveSetOptions, AdmmOptions, IpmOptions, QpBackendOptions, QpCommonOptions,
    QpSolverOptions,
};
pub use qp_in::{InequalityRows, QpIn, QpInMut, QpInView, RowSide};
pub use qp_out::{QpInfo, QpOut, QpOutMut, QpOutView, QpStatus};
pub use residual::{QpRes, QpResiduals};
pub use solver::{External, QpSolver};
