//! Shared problem fixtures for RTI development.
//!
//! Every fixture builds a [`Problem`]: a resolved configuration, the
//! stage models in an [`NlpIn`] and an initial state. [`Problem::solver`]
//! and [`Problem::nlp_out`] turn it into a ready-to-step solver and a
//! matching iterate.
//!
//! Stage 0 always carries the initial-state pin as its first `nx` box
//! rows, followed by the input bounds (if any).

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod models;

use std::sync::Arc;

use rti_core::{ConfigError, ModelError, ModelRole, OcpDims, QpSolverKind};
use rti_engine::{NlpIn, NlpOut, SolverConfig, SqpRti, SqpRtiOptions};

pub use fixtures::{random_lq, DoubleIntegrator, PendulumSwing, ScalarLq};
pub use models::{Pendulum, PendulumResidual};

/// A complete optimal-control problem ready to hand to [`SqpRti`].
pub struct Problem {
    pub config: Arc<SolverConfig>,
    pub nlp_in: NlpIn,
    pub x0: Vec<f64>,
    /// Stage-0 input bounds, stored after the state pin.
    pub u_lower: Vec<f64>,
    pub u_upper: Vec<f64>,
}

impl Problem {
    pub fn dims(&self) -> &OcpDims {
        self.nlp_in.dims()
    }

    /// Move the initial-state pin to `x0`.
    pub fn set_x0(&mut self, x0: &[f64]) -> Result<(), ConfigError> {
        let lb: Vec<f64> = x0.iter().chain(&self.u_lower).copied().collect();
        let ub: Vec<f64> = x0.iter().chain(&self.u_upper).copied().collect();
        self.nlp_in
            .set_model_field(ModelRole::Constraints, 0, "lb", &lb)?;
        self.nlp_in
            .set_model_field(ModelRole::Constraints, 0, "ub", &ub)?;
        self.x0 = x0.to_vec();
        Ok(())
    }

    /// Default options, with the ADMM iteration budget raised to reach
    /// `1e-7` tolerances.
    pub fn options(&self) -> Result<SqpRtiOptions, ConfigError> {
        let mut opts = SqpRtiOptions::new(&self.config, self.dims());
        if self.config.plan().qp_solver == QpSolverKind::Admm {
            opts.set("qp_max_iter", 20_000usize)?;
            for field in ["qp_tol_stat", "qp_tol_eq", "qp_tol_ineq"] {
                opts.set(field, 1e-7)?;
            }
        }
        Ok(opts)
    }

    /// A precomputed solver with [`Problem::options`].
    pub fn solver(&self) -> Result<SqpRti, ConfigError> {
        self.solver_with(self.options()?)
    }

    /// A precomputed solver with `opts`.
    pub fn solver_with(&self, opts: SqpRtiOptions) -> Result<SqpRti, ConfigError> {
        let mut solver = SqpRti::new(self.config.clone(), &self.nlp_in, opts)?;
        solver.precompute(&self.nlp_in)?;
        Ok(solver)
    }

    /// A zero iterate with every stage's states at `x0`.
    pub fn nlp_out(&self) -> Result<NlpOut, ConfigError> {
        let mut out = NlpOut::new(self.dims().clone())?;
        out.fill_x(&self.x0)?;
        Ok(out)
    }
}

/// Lift a model constructor error into the setup error space.
pub(crate) fn model<T>(
    role: ModelRole,
    stage: usize,
    built: Result<T, ModelError>,
) -> Result<T, ConfigError> {
    built.map_err(|e| ConfigError::InvalidModel {
        role,
        stage,
        reason: e.to_string(),
    })
}
