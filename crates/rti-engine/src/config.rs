//! Plans and the resolved dispatch table.
//!
//! A [`Plan`] is pure data: one identifier per role. [`Plan::resolve`]
//! binds the QP backend and the regularizer once and returns a
//! [`SolverConfig`] behind an `Arc`, so any number of solver instances
//! built from the same plan share one immutable table.

use std::fmt;
use std::sync::Arc;

use rti_core::{
    ConfigError, ConstraintKind, CostKind, DynamicsKind, QpSolverKind, RegularizationKind,
};
use rti_qp::{resolve as resolve_qp, QpBackend};

use crate::regularize::{resolve as resolve_regularizer, Regularizer};

/// Which implementation fills each role.
///
/// `dynamics` has one entry per shooting interval (`N`); `cost` and
/// `constraints` have one per stage (`N + 1`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Plan {
    /// Dense QP backend.
    pub qp_solver: QpSolverKind,
    /// Hessian regularization.
    pub regularization: RegularizationKind,
    /// Dynamics variant per interval.
    pub dynamics: Vec<DynamicsKind>,
    /// Cost variant per stage.
    pub cost: Vec<CostKind>,
    /// Constraint variant per stage.
    pub constraints: Vec<ConstraintKind>,
}

impl Plan {
    /// `horizon` intervals solved by `qp_solver`, with linear dynamics,
    /// linear least-squares costs, linear constraints and no
    /// regularization.
    pub fn new(horizon: usize, qp_solver: QpSolverKind) -> Self {
        Self {
            qp_solver,
            regularization: RegularizationKind::NoRegularize,
            dynamics: vec![DynamicsKind::Linear; horizon],
            cost: vec![CostKind::LinearLs; horizon + 1],
            constraints: vec![ConstraintKind::Linear; horizon + 1],
        }
    }

    /// Same plan with another regularization.
    pub fn with_regularization(mut self, kind: RegularizationKind) -> Self {
        self.regularization = kind;
        self
    }

    /// Same plan with `kind` dynamics on every interval.
    pub fn with_dynamics(mut self, kind: DynamicsKind) -> Self {
        self.dynamics.fill(kind);
        self
    }

    /// Same plan with `kind` cost on every stage.
    pub fn with_cost(mut self, kind: CostKind) -> Self {
        self.cost.fill(kind);
        self
    }

    /// Same plan with `kind` constraints on every stage.
    pub fn with_constraints(mut self, kind: ConstraintKind) -> Self {
        self.constraints.fill(kind);
        self
    }

    /// Override the dynamics variant of interval `stage`.
    pub fn set_dynamics(&mut self, stage: usize, kind: DynamicsKind) -> Result<(), ConfigError> {
        set_slot(&mut self.dynamics, stage, kind)
    }

    /// Override the cost variant of `stage`.
    pub fn set_cost(&mut self, stage: usize, kind: CostKind) -> Result<(), ConfigError> {
        set_slot(&mut self.cost, stage, kind)
    }

    /// Override the constraint variant of `stage`.
    pub fn set_constraints(
        &mut self,
        stage: usize,
        kind: ConstraintKind,
    ) -> Result<(), ConfigError> {
        set_slot(&mut self.constraints, stage, kind)
    }

    /// Number of shooting intervals `N`.
    pub fn horizon(&self) -> usize {
        self.dynamics.len()
    }

    /// Bind every role to its implementation.
    ///
    /// Fails with [`ConfigError::BackendUnavailable`] if the QP backend
    /// was compiled out, or [`ConfigError::InvalidDims`] if the per-stage
    /// lists disagree in length.
    pub fn resolve(&self) -> Result<Arc<SolverConfig>, ConfigError> {
        let n = self.horizon();
        if n == 0 {
            return Err(ConfigError::InvalidDims {
                reason: "plan has no shooting intervals".to_string(),
            });
        }
        for (role, len) in [("cost", self.cost.len()), ("constraints", self.constraints.len())] {
            if len != n + 1 {
                return Err(ConfigError::InvalidDims {
                    reason: format!("plan lists {len} {role} stages, expected {}", n + 1),
                });
            }
        }
        Ok(Arc::new(SolverConfig {
            plan: self.clone(),
            qp: resolve_qp(self.qp_solver)?,
            regularizer: resolve_regularizer(self.regularization),
        }))
    }
}

fn set_slot<T>(slots: &mut [T], stage: usize, kind: T) -> Result<(), ConfigError> {
    let stages = slots.len();
    match slots.get_mut(stage) {
        Some(slot) => {
            *slot = kind;
            Ok(())
        }
        None => Err(ConfigError::StageOutOfRange { stage, stages }),
    }
}

/// A resolved plan. Immutable; share it with `Arc::clone`.
pub struct SolverConfig {
    plan: Plan,
    qp: &'static dyn QpBackend,
    regularizer: &'static dyn Regularizer,
}

impl SolverConfig {
    /// The plan this table was resolved from.
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// The bound QP backend.
    pub fn qp_backend(&self) -> &'static dyn QpBackend {
        self.qp
    }

    /// The bound regularizer.
    pub fn regularizer(&self) -> &'static dyn Regularizer {
        self.regularizer
    }
}

impl fmt::Debug for SolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverConfig")
            .field("plan", &self.plan)
            .field("qp", &self.qp.name())
            .field("regularizer", &self.regularizer.kind())
            .finish()
    }
}
