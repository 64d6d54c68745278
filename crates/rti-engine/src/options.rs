//! Engine options.
//!
//! [`SqpRtiOptions`] holds the engine knobs, the QP solver options and one
//! options block per stage and model role. The flat setter understands:
//!
//! | field              | type  | default |
//! |--------------------|-------|---------|
//! | `compute_dual_sol` | bool  | `true`  |
//! | `reuse_workspace`  | bool  | `false` |
//! | `num_threads`      | count | `1`     |
//! | `ext_qp_res`       | bool  | `false` |
//! | `qp_warm_start`    | bool  | `false` |
//! | `reg_epsilon`      | real  | `1e-4`  |
//! | `stat_rows`        | count | `1`     |
//! | `qp_<field>`       |       | forwarded to the QP options as `<field>` |

use std::sync::OnceLock;

use indexmap::IndexMap;
use rti_core::{ConfigError, ModelRole, OcpDims, OptionRegistry, OptionValue};
use rti_model::{ConstraintsOptions, CostOptions, DynamicsOptions};
use rti_qp::QpSolverOptions;

use crate::config::SolverConfig;

/// Prefix routing a field to the QP options.
const QP_PREFIX: &str = "qp_";

/// Options of one [`SqpRti`](crate::SqpRti) instance.
#[derive(Clone, Debug, PartialEq)]
pub struct SqpRtiOptions {
    /// Recover `pi` and `lam_*` from the QP multipliers.
    pub compute_dual_sol: bool,
    /// Skip zeroing the workspace at the start of each step.
    pub reuse_workspace: bool,
    /// Linearization threads; `1` runs inline.
    pub num_threads: usize,
    /// Recompute QP residuals after every solve.
    pub ext_qp_res: bool,
    /// Warm-start the QP from the previous solution.
    pub qp_warm_start: bool,
    /// Eigenvalue floor for regularization.
    pub reg_epsilon: f64,
    /// Rows of the statistics table. Fixed once the solver exists.
    pub stat_rows: usize,
    /// QP solver options.
    pub qp: QpSolverOptions,
    /// Dynamics options per interval.
    pub dynamics: Vec<DynamicsOptions>,
    /// Cost options per stage.
    pub cost: Vec<CostOptions>,
    /// Constraint options per stage.
    pub constraints: Vec<ConstraintsOptions>,
}

impl SqpRtiOptions {
    /// Defaults for `config` over `dims`.
    pub fn new(config: &SolverConfig, dims: &OcpDims) -> Self {
        let n = dims.horizon();
        Self {
            compute_dual_sol: true,
            reuse_workspace: false,
            num_threads: 1,
            ext_qp_res: false,
            qp_warm_start: false,
            reg_epsilon: 1e-4,
            stat_rows: 1,
            qp: config.qp_backend().default_options(),
            dynamics: vec![DynamicsOptions::default(); n],
            cost: vec![CostOptions::default(); n + 1],
            constraints: vec![ConstraintsOptions::default(); n + 1],
        }
    }

    fn registry() -> &'static OptionRegistry<SqpRtiOptions> {
        static REGISTRY: OnceLock<OptionRegistry<SqpRtiOptions>> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            OptionRegistry::<SqpRtiOptions>::new()
                .with("compute_dual_sol", |o, v| {
                    o.compute_dual_sol = v.as_bool("compute_dual_sol")?;
                    Ok(())
                })
                .with("reuse_workspace", |o, v| {
                    o.reuse_workspace = v.as_bool("reuse_workspace")?;
                    Ok(())
                })
                .with("num_threads", |o, v| {
                    o.num_threads = v.as_count("num_threads")?;
                    Ok(())
                })
                .with("ext_qp_res", |o, v| {
                    o.ext_qp_res = v.as_bool("ext_qp_res")?;
                    Ok(())
                })
                .with("qp_warm_start", |o, v| {
                    let on = v.as_bool("qp_warm_start")?;
                    o.qp_warm_start = on;
                    o.qp.common.warm_start = on;
                    Ok(())
                })
                .with("reg_epsilon", |o, v| {
                    o.reg_epsilon = v.as_positive("reg_epsilon")?;
                    Ok(())
                })
                .with("stat_rows", |o, v| {
                    o.stat_rows = v.as_count("stat_rows")?;
                    Ok(())
                })
        })
    }

    /// Set one field by name.
    ///
    /// Engine fields are matched first; any other `qp_<field>` is handed
    /// to [`QpSolverOptions::set`] as `<field>`.
    pub fn set(&mut self, field: &str, value: impl Into<OptionValue>) -> Result<(), ConfigError> {
        let value = value.into();
        let registry = Self::registry();
        if registry.contains(field) {
            return registry.set(self, field, value);
        }
        match field.strip_prefix(QP_PREFIX) {
            Some(qp_field) => self.qp.set(qp_field, value),
            None => Err(registry.unknown(field)),
        }
    }

    /// Set one field of the `role` options at `stage`.
    pub fn set_stage(
        &mut self,
        role: ModelRole,
        stage: usize,
        field: &str,
        value: impl Into<OptionValue>,
    ) -> Result<(), ConfigError> {
        let value = value.into();
        match role {
            ModelRole::Dynamics => stage_slot(&mut self.dynamics, stage)?.set(field, value),
            ModelRole::Cost => stage_slot(&mut self.cost, stage)?.set(field, value),
            ModelRole::Constraints => stage_slot(&mut self.constraints, stage)?.set(field, value),
        }
    }

    /// Set one field of the `role` options at every stage.
    pub fn set_all_stages(
        &mut self,
        role: ModelRole,
        field: &str,
        value: impl Into<OptionValue>,
    ) -> Result<(), ConfigError> {
        let value = value.into();
        let stages = match role {
            ModelRole::Dynamics => self.dynamics.len(),
            _ => self.cost.len(),
        };
        for k in 0..stages {
            self.set_stage(role, k, field, value)?;
        }
        Ok(())
    }

    /// Current value of an engine field, or `None` for names outside the
    /// engine vocabulary.
    pub fn get(&self, field: &str) -> Option<OptionValue> {
        self.values().get(field).copied()
    }

    /// Every engine field with its current value, in vocabulary order.
    pub fn values(&self) -> IndexMap<&'static str, OptionValue> {
        let mut out = IndexMap::new();
        out.insert("compute_dual_sol", self.compute_dual_sol.into());
        out.insert("reuse_workspace", self.reuse_workspace.into());
        out.insert("num_threads", self.num_threads.into());
        out.insert("ext_qp_res", self.ext_qp_res.into());
        out.insert("qp_warm_start", self.qp_warm_start.into());
        out.insert("reg_epsilon", self.reg_epsilon.into());
        out.insert("stat_rows", self.stat_rows.into());
        out
    }

    /// Engine field names, in registration order.
    pub fn field_names() -> Vec<&'static str> {
        Self::registry().names().collect()
    }

    /// Check every block, including the per-stage lists against `dims`.
    pub fn validate(&self, dims: &OcpDims) -> Result<(), ConfigError> {
        let n = dims.horizon();
        for (what, len, expected) in [
            ("dynamics options", self.dynamics.len(), n),
            ("cost options", self.cost.len(), n + 1),
            ("constraints options", self.constraints.len(), n + 1),
        ] {
            if len != expected {
                return Err(ConfigError::DimensionMismatch {
                    what: what.to_string(),
                    expected,
                    found: len,
                });
            }
        }
        if self.num_threads == 0 {
            return Err(range("num_threads", "must be at least 1".to_string()));
        }
        if self.stat_rows == 0 {
            return Err(range("stat_rows", "must be at least 1".to_string()));
        }
        if !(self.reg_epsilon.is_finite() && self.reg_epsilon > 0.0) {
            return Err(range("reg_epsilon", format!("{} must be > 0", self.reg_epsilon)));
        }
        self.qp.validate()?;
        self.dynamics.iter().try_for_each(DynamicsOptions::validate)?;
        self.cost.iter().try_for_each(CostOptions::validate)?;
        self.constraints.iter().try_for_each(ConstraintsOptions::validate)
    }
}

fn range(field: &str, reason: String) -> ConfigError {
    ConfigError::OptionRange {
        field: field.to_string(),
        reason,
    }
}

fn stage_slot<T>(slots: &mut [T], stage: usize) -> Result<&mut T, ConfigError> {
    let stages = slots.len();
    slots
        .get_mut(stage)
        .ok_or(ConfigError::StageOutOfRange { stage, stages })
}
