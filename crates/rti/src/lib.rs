//! RTI: a real-time-iteration SQP framework for nonlinear model predictive
//! control.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! RTI sub-crates. For most users, adding `rti` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use rti::nalgebra::DMatrix;
//! use rti::prelude::*;
//!
//! // min ½x₀² + ½u² + ½x₁²  s.t.  x₁ = x₀ + u,  x₀ = 1
//! let dims = OcpDims::new(vec![
//!     StageDims::new(1, 1).with_bounds(1),
//!     StageDims::new(1, 0),
//! ])?;
//! let config = Plan::new(1, QpSolverKind::InteriorPoint).resolve()?;
//!
//! let mut nlp_in = NlpIn::new(dims.clone());
//! let one = DMatrix::identity(1, 1);
//! nlp_in.set_dynamics(0, LinearDynamics::new(one.clone(), one.clone())?)?;
//! let stage_cost = LinearLsCost::new(
//!     DMatrix::from_row_slice(2, 1, &[1.0, 0.0]),
//!     DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
//!     DMatrix::identity(2, 2),
//! )?;
//! nlp_in.set_cost(0, stage_cost)?;
//! nlp_in.set_cost(1, LinearLsCost::new(one.clone(), DMatrix::zeros(1, 0), one)?)?;
//! // Box indices address w = [u, x]; index 1 pins x₀.
//! let pin = StageBounds::new(1, 1).with_box(vec![1], vec![1.0], vec![1.0])?;
//! nlp_in.set_constraints(0, LinearConstraints::boxes(pin)?)?;
//! nlp_in.set_constraints(1, LinearConstraints::boxes(StageBounds::new(1, 0))?)?;
//!
//! let mut solver = SqpRti::with_defaults(config, &nlp_in)?;
//! solver.precompute(&nlp_in)?;
//! let mut nlp_out = NlpOut::new(dims)?;
//! nlp_out.fill_x(&[1.0])?;
//!
//! let report = solver.step(&nlp_in, &mut nlp_out)?;
//! assert!(report.qp.status.is_success());
//! assert!((nlp_out.u(0)[0] + 0.5).abs() < 1e-6);
//! assert_eq!(solver.memory().status(), Status::Success);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `rti-arena` | Footprints, arenas and the carving half of the size-then-assign protocol |
//! | [`types`] | `rti-core` | Dimensions, kinds, options, status codes and errors |
//! | [`qp`] | `rti-qp` | Dense QP data, residuals and the backend registry |
//! | [`model`] | `rti-model` | Stage model traits and reference models |
//! | [`engine`] | `rti-engine` | Plan resolution, NLP containers and the RTI solver |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Arena sizing and carving (`rti-arena`).
///
/// Every solver-side object computes a [`arena::Footprint`] first and then
/// carves its sub-arrays out of one [`arena::Arena`].
pub use rti_arena as arena;

/// Dimensions, kinds, options and errors (`rti-core`).
pub use rti_core as types;

/// Dense QP layer (`rti-qp`).
///
/// [`qp::QpSolver`] binds one backend to one problem shape. Backends are
/// looked up by [`types::QpSolverKind`] through [`qp::resolve`].
pub use rti_qp as qp;

/// Stage models (`rti-model`).
///
/// Implement [`model::Dynamics`], [`model::Cost`] or
/// [`model::Constraints`] directly, or wrap an [`model::Ode`],
/// [`model::LsResidual`] or [`model::DiscreteMap`] in one of the
/// reference models.
pub use rti_model as model;

/// The SQP real-time-iteration engine (`rti-engine`).
pub use rti_engine as engine;

/// Matrix types used by the reference model constructors.
pub use nalgebra;

/// Common imports for typical RTI usage.
///
/// ```rust
/// use rti::prelude::*;
/// ```
///
/// This imports the dimension and kind types, the reference models, the
/// NLP containers and the solver.
pub mod prelude {
    // Dimensions, kinds and status
    pub use rti_core::{
        ConstraintKind, CostKind, DynamicsKind, ModelRole, OcpDims, QpSolverKind,
        RegularizationKind, StageDims, Status,
    };

    // Errors
    pub use rti_core::{ConfigError, ModelError};
    pub use rti_engine::RtiError;

    // Models
    pub use rti_model::{
        Constraints, Cost, DiscreteDynamics, DiscreteMap, Dynamics, ErkDynamics, LinearConstraints,
        LinearDynamics, LinearLsCost, LsResidual, NonlinearConstraints, NonlinearLsCost, Ode,
        StageBounds,
    };

    // Engine
    pub use rti_engine::{
        NlpIn, NlpOut, Plan, RtiReport, SolverConfig, SqpRti, SqpRtiOptions, StatRow,
    };
}
