//! Stage model contracts and reference models for the RTI framework.
//!
//! Every shooting stage is described by up to three models:
//!
//! - a [`Dynamics`] model, giving `x_{k+1} = φ(x_k, u_k)` and its Jacobian;
//! - a [`Cost`] model, giving the stage objective, its gradient and a
//!   Hessian approximation;
//! - a [`Constraints`] model, giving box and general rows with optional
//!   soft (slacked) rows.
//!
//! Models are shared immutably by the engine's worker threads. All
//! per-evaluation scratch is carved from the engine's workspace arena
//! via the `workspace_footprint()` each model declares.
//!
//! Reference implementations cover each kind listed in
//! [`DynamicsKind`](rti_core::DynamicsKind),
//! [`CostKind`](rti_core::CostKind) and
//! [`ConstraintKind`](rti_core::ConstraintKind).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod constraints;
pub mod cost;
mod dense;
pub mod dynamics;
pub mod erk;
pub mod options;

pub use constraints::{
    ConstraintMap, Constraints, ConstraintsOut, LinearConstraints, NonlinearConstraints,
    StageBounds,
};
pub use cost::{
    Cost, CostOut, ExternalCost, LinearLsCost, LsResidual, NonlinearLsCost, Objective,
};
pub use dynamics::{DiscreteDynamics, DiscreteMap, Dynamics, DynamicsOut, LinearDynamics};
pub use erk::{ErkDynamics, Ode};
pub use options::{ConstraintsOptions, CostOptions, DynamicsOptions, MAX_RK_ORDER};
