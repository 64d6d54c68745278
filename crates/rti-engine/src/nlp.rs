//! NLP model container and iterate.
//!
//! [`NlpIn`] owns the per-stage model objects. [`NlpOut`] owns the
//! primal-dual iterate in a single arena, laid out stage by stage as
//! `u, x, s, pi, lam_lower, lam_upper`.

use std::sync::Arc;

use rti_arena::{Arena, Footprint, Span, SpanPlanner, Store, StoreMut};
use rti_core::{ConfigError, ModelRole, OcpDims};
use rti_model::{Constraints, Cost, Dynamics};

// ── NlpIn ──────────────────────────────────────────────────────────

/// The stage models of one optimal-control problem.
///
/// Dynamics exist for `k < N`; cost and constraints for `k ≤ N`. Unset
/// slots are reported as [`ConfigError::MissingModel`] by
/// [`SqpRti::new`](crate::SqpRti::new).
///
/// Models are reference-counted so linearization workers can hold a stage
/// model for the duration of one call; between calls the container is
/// their only owner.
pub struct NlpIn {
    dims: OcpDims,
    dynamics: Vec<Option<Arc<dyn Dynamics>>>,
    cost: Vec<Option<Arc<dyn Cost>>>,
    constraints: Vec<Option<Arc<dyn Constraints>>>,
}

impl std::fmt::Debug for NlpIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NlpIn")
            .field("dims", &self.dims)
            .field("dynamics_set", &count_set(&self.dynamics))
            .field("cost_set", &count_set(&self.cost))
            .field("constraints_set", &count_set(&self.constraints))
            .finish()
    }
}

fn count_set<T>(slots: &[Option<T>]) -> usize {
    slots.iter().filter(|m| m.is_some()).count()
}

fn slot<T>(slots: &mut [Option<T>], stage: usize) -> Result<&mut Option<T>, ConfigError> {
    let stages = slots.len();
    slots
        .get_mut(stage)
        .ok_or(ConfigError::StageOutOfRange { stage, stages })
}

impl NlpIn {
    /// An empty container for `dims`.
    pub fn new(dims: OcpDims) -> Self {
        let n = dims.horizon();
        Self {
            dynamics: (0..n).map(|_| None).collect(),
            cost: (0..=n).map(|_| None).collect(),
            constraints: (0..=n).map(|_| None).collect(),
            dims,
        }
    }

    /// Problem shape.
    pub fn dims(&self) -> &OcpDims {
        &self.dims
    }

    /// Install the dynamics of interval `stage`.
    pub fn set_dynamics(
        &mut self,
        stage: usize,
        model: impl Dynamics + 'static,
    ) -> Result<(), ConfigError> {
        *slot(&mut self.dynamics, stage)? = Some(Arc::new(model));
        Ok(())
    }

    /// Install the cost of `stage`.
    pub fn set_cost(&mut self, stage: usize, model: impl Cost + 'static) -> Result<(), ConfigError> {
        *slot(&mut self.cost, stage)? = Some(Arc::new(model));
        Ok(())
    }

    /// Install the constraints of `stage`.
    pub fn set_constraints(
        &mut self,
        stage: usize,
        model: impl Constraints + 'static,
    ) -> Result<(), ConfigError> {
        *slot(&mut self.constraints, stage)? = Some(Arc::new(model));
        Ok(())
    }

    /// Dynamics of interval `stage`, if set.
    pub fn dynamics(&self, stage: usize) -> Option<&dyn Dynamics> {
        self.dynamics.get(stage)?.as_deref()
    }

    /// Cost of `stage`, if set.
    pub fn cost(&self, stage: usize) -> Option<&dyn Cost> {
        self.cost.get(stage)?.as_deref()
    }

    /// Constraints of `stage`, if set.
    pub fn constraints(&self, stage: usize) -> Option<&dyn Constraints> {
        self.constraints.get(stage)?.as_deref()
    }

    /// Shared handles to the dynamics of `stage`, for a worker.
    pub(crate) fn shared_dynamics(&self, stage: usize) -> Option<Arc<dyn Dynamics>> {
        self.dynamics.get(stage)?.clone()
    }

    pub(crate) fn shared_cost(&self, stage: usize) -> Option<Arc<dyn Cost>> {
        self.cost.get(stage)?.clone()
    }

    pub(crate) fn shared_constraints(&self, stage: usize) -> Option<Arc<dyn Constraints>> {
        self.constraints.get(stage)?.clone()
    }

    /// Replace a named parameter vector of one stage model, e.g.
    /// `("lb", …)` on stage 0 constraints to fix the initial state.
    pub fn set_model_field(
        &mut self,
        role: ModelRole,
        stage: usize,
        field: &str,
        values: &[f64],
    ) -> Result<(), ConfigError> {
        let result = match role {
            ModelRole::Dynamics => slot(&mut self.dynamics, stage)?
                .as_mut()
                .map(|m| Arc::get_mut(m).map(|m| m.set(field, values))),
            ModelRole::Cost => slot(&mut self.cost, stage)?
                .as_mut()
                .map(|m| Arc::get_mut(m).map(|m| m.set(field, values))),
            ModelRole::Constraints => slot(&mut self.constraints, stage)?
                .as_mut()
                .map(|m| Arc::get_mut(m).map(|m| m.set(field, values))),
        };
        let invalid = |reason: String| ConfigError::InvalidModel {
            role,
            stage,
            reason,
        };
        match result {
            None => Err(ConfigError::MissingModel { role, stage }),
            Some(None) => Err(invalid(format!("{field}: model is shared with a linearization worker"))),
            Some(Some(Ok(()))) => Ok(()),
            Some(Some(Err(e))) => Err(invalid(format!("{field}: {e}"))),
        }
    }

    /// Pin the initial state: set the stage-0 box bounds to `x0`.
    ///
    /// Stage 0 must carry box rows on exactly the states being pinned,
    /// in the same order as `x0`.
    pub fn set_initial_state(&mut self, x0: &[f64]) -> Result<(), ConfigError> {
        self.set_model_field(ModelRole::Constraints, 0, "lb", x0)?;
        self.set_model_field(ModelRole::Constraints, 0, "ub", x0)
    }
}

// ── NlpOut ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
struct StageSpans {
    u: Span,
    x: Span,
    s: Span,
    pi: Span,
    lam_lower: Span,
    lam_upper: Span,
}

/// The primal-dual iterate.
///
/// Per stage `k`: controls `u`, states `x`, slacks `s`, dynamics
/// multipliers `pi` (length `nx_{k+1}`, empty at `k = N`) and constraint
/// multipliers `lam_lower`/`lam_upper` (length `nb + ng` each, box rows
/// first). All multipliers are non-negative except `pi`.
#[derive(Clone, Debug)]
pub struct NlpOut {
    dims: OcpDims,
    spans: Vec<StageSpans>,
    arena: Arena,
}

/// Mutable view of one stage of an [`NlpOut`].
#[derive(Debug)]
pub struct StageIterateMut<'a> {
    /// Controls.
    pub u: &'a mut [f64],
    /// States.
    pub x: &'a mut [f64],
    /// Slacks.
    pub s: &'a mut [f64],
    /// Dynamics multipliers.
    pub pi: &'a mut [f64],
    /// Lower-side constraint multipliers.
    pub lam_lower: &'a mut [f64],
    /// Upper-side constraint multipliers.
    pub lam_upper: &'a mut [f64],
}

impl NlpOut {
    /// Slots needed for `dims`.
    pub fn footprint(dims: &OcpDims) -> Footprint {
        let stages = dims.stages();
        stages
            .iter()
            .enumerate()
            .map(|(k, s)| {
                let nx_next = stages.get(k + 1).map_or(0, |n| n.nx);
                Footprint::reals(s.nu)
                    + Footprint::reals(s.nx)
                    + Footprint::reals(s.ns)
                    + Footprint::reals(nx_next)
                    + Footprint::reals(s.rows()).repeat(2)
            })
            .sum()
    }

    /// A zero iterate for `dims`.
    pub fn new(dims: OcpDims) -> Result<Self, ConfigError> {
        let mut p = SpanPlanner::new();
        let stages = dims.stages();
        let spans = stages
            .iter()
            .enumerate()
            .map(|(k, s)| {
                let nx_next = stages.get(k + 1).map_or(0, |n| n.nx);
                StageSpans {
                    u: p.reals(s.nu),
                    x: p.reals(s.nx),
                    s: p.reals(s.ns),
                    pi: p.reals(nx_next),
                    lam_lower: p.reals(s.rows()),
                    lam_upper: p.reals(s.rows()),
                }
            })
            .collect();
        let fp = p.finish(Self::footprint(&dims));
        Ok(Self {
            arena: Arena::with_footprint(fp)?,
            spans,
            dims,
        })
    }

    /// Problem shape.
    pub fn dims(&self) -> &OcpDims {
        &self.dims
    }

    /// Backing storage size in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.arena.memory_bytes()
    }

    /// Controls of stage `k`.
    ///
    /// # Panics
    ///
    /// All per-stage accessors panic if `k > N`.
    pub fn u(&self, k: usize) -> &[f64] {
        self.arena.slice(self.spans[k].u)
    }

    /// States of stage `k`.
    pub fn x(&self, k: usize) -> &[f64] {
        self.arena.slice(self.spans[k].x)
    }

    /// Slacks of stage `k`.
    pub fn s(&self, k: usize) -> &[f64] {
        self.arena.slice(self.spans[k].s)
    }

    /// Dynamics multipliers of interval `k`.
    pub fn pi(&self, k: usize) -> &[f64] {
        self.arena.slice(self.spans[k].pi)
    }

    /// Lower-side constraint multipliers of stage `k`.
    pub fn lam_lower(&self, k: usize) -> &[f64] {
        self.arena.slice(self.spans[k].lam_lower)
    }

    /// Upper-side constraint multipliers of stage `k`.
    pub fn lam_upper(&self, k: usize) -> &[f64] {
        self.arena.slice(self.spans[k].lam_upper)
    }

    /// Every field of stage `k`, mutably.
    pub fn stage_mut(&mut self, k: usize) -> StageIterateMut<'_> {
        let sp = self.spans[k];
        let ([u, x, s, pi, lam_lower, lam_upper], _) = self
            .arena
            .split_mut([sp.u, sp.x, sp.s, sp.pi, sp.lam_lower, sp.lam_upper]);
        StageIterateMut {
            u,
            x,
            s,
            pi,
            lam_lower,
            lam_upper,
        }
    }

    /// Overwrite the controls of stage `k`.
    pub fn set_u(&mut self, k: usize, values: &[f64]) -> Result<(), ConfigError> {
        copy_into("u", self.stage_checked(k)?.u, values)
    }

    /// Overwrite the states of stage `k`.
    pub fn set_x(&mut self, k: usize, values: &[f64]) -> Result<(), ConfigError> {
        copy_into("x", self.stage_checked(k)?.x, values)
    }

    /// Overwrite the slacks of stage `k`.
    pub fn set_s(&mut self, k: usize, values: &[f64]) -> Result<(), ConfigError> {
        copy_into("s", self.stage_checked(k)?.s, values)
    }

    /// Set every stage's states to `x`.
    pub fn fill_x(&mut self, x: &[f64]) -> Result<(), ConfigError> {
        (0..self.spans.len()).try_for_each(|k| self.set_x(k, x))
    }

    /// Zero the whole iterate.
    pub fn zero(&mut self) {
        self.arena.zero();
    }

    /// Field-by-field copy from an iterate of the same shape.
    pub fn copy_from(&mut self, other: &NlpOut) -> Result<(), ConfigError> {
        if self.dims != other.dims {
            return Err(ConfigError::DimensionMismatch {
                what: "nlp_out stages".to_string(),
                expected: self.spans.len(),
                found: other.spans.len(),
            });
        }
        self.arena.clone_from(&other.arena);
        Ok(())
    }

    fn stage_checked(&mut self, k: usize) -> Result<StageIterateMut<'_>, ConfigError> {
        let stages = self.spans.len();
        if k >= stages {
            return Err(ConfigError::StageOutOfRange { stage: k, stages });
        }
        Ok(self.stage_mut(k))
    }
}

fn copy_into(what: &str, dst: &mut [f64], src: &[f64]) -> Result<(), ConfigError> {
    if dst.len() != src.len() {
        return Err(ConfigError::DimensionMismatch {
            what: what.to_string(),
            expected: dst.len(),
            found: src.len(),
        });
    }
    dst.copy_from_slice(src);
    Ok(())
}
