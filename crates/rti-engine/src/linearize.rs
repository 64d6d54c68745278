//! Stage linearization, inline or on the worker pool.
//!
//! Inline, every stage is linearized straight into its block of the stage
//! region. On the pool, the caller copies a stage's inputs and its block
//! into a job buffer, a worker linearizes the buffer, and the caller copies
//! the block back:
//!
//! ```text
//! job buffer: [x | u | cost memory] [stage block]
//! ```
//!
//! Both paths run [`linearize_stage`] on identical data.

use std::sync::Arc;

use rti_arena::{Arena, ArenaMut, ArenaRef, Footprint, Region, Span, SpanPlanner, Store, StoreMut};
use rti_core::{ConfigError, ModelError, ModelRole};
use rti_model::{
    Constraints, ConstraintsOut, Cost, CostOptions, CostOut, Dynamics, DynamicsOptions,
    DynamicsOut,
};

use crate::error::RtiError;
use crate::layout::{ModelView, StageBuffers, StageScratch, StageShape};
use crate::nlp::{NlpIn, NlpOut};
use crate::options::SqpRtiOptions;
use crate::pool::{run_inline, Dispatch, StagePool};
use crate::regularize::Regularizer;

// ── One stage ──────────────────────────────────────────────────────

/// Models and options of one stage.
pub(crate) struct StageModels<'m> {
    /// Dynamics with their options; `None` at the terminal stage.
    pub dynamics: Option<(&'m dyn Dynamics, &'m DynamicsOptions)>,
    pub cost: Option<&'m dyn Cost>,
    pub constraints: Option<&'m dyn Constraints>,
    pub cost_opts: &'m CostOptions,
    pub regularizer: &'static dyn Regularizer,
    pub reg_epsilon: f64,
}

/// Iterate and precomputed data of one stage.
pub(crate) struct StageInputs<'a> {
    pub x: &'a [f64],
    pub u: &'a [f64],
    pub cost_memory: &'a [f64],
}

/// Evaluate the models of stage `k` and regularize its Hessian block.
pub(crate) fn linearize_stage(
    k: usize,
    shape: &StageShape,
    models: &StageModels<'_>,
    inputs: &StageInputs<'_>,
    bufs: StageBuffers<'_>,
    scratch: StageScratch<'_>,
) -> Result<(), RtiError> {
    let failed = |role: ModelRole| {
        move |reason: ModelError| RtiError::ModelFailed {
            stage: k,
            role,
            reason,
        }
    };
    let missing = |role: ModelRole| ConfigError::MissingModel { role, stage: k };
    let (x, u) = (inputs.x, inputs.u);

    if let Some((dynamics, opts)) = models.dynamics {
        let out = DynamicsOut {
            phi: bufs.phi,
            jac: bufs.dyn_jac,
        };
        dynamics
            .evaluate(x, u, opts, out, scratch.dynamics)
            .map_err(failed(ModelRole::Dynamics))?;
    }

    let cost = models.cost.ok_or(missing(ModelRole::Cost))?;
    let out = CostOut {
        grad: bufs.grad,
        hess: bufs.hess,
    };
    bufs.value[0] = cost
        .evaluate(x, u, models.cost_opts, inputs.cost_memory, out, scratch.cost)
        .map_err(failed(ModelRole::Cost))?;
    models
        .regularizer
        .regularize(bufs.hess, shape.nw(), models.reg_epsilon, scratch.regularizer);

    let constraints = models.constraints.ok_or(missing(ModelRole::Constraints))?;
    let out = ConstraintsOut {
        h: bufs.h,
        jac: bufs.con_jac,
    };
    constraints
        .evaluate(x, u, out, scratch.constraints)
        .map_err(failed(ModelRole::Constraints))
}

// ── All stages ─────────────────────────────────────────────────────

/// Read-only inputs shared by every stage of one call.
pub(crate) struct StageContext<'a> {
    pub nlp_in: &'a NlpIn,
    pub nlp_out: &'a NlpOut,
    pub opts: &'a SqpRtiOptions,
    pub models: ModelView<'a, 'a>,
    pub regularizer: &'static dyn Regularizer,
}

impl StageContext<'_> {
    fn stage_models(&self, k: usize) -> StageModels<'_> {
        StageModels {
            dynamics: self.nlp_in.dynamics(k).zip(self.opts.dynamics.get(k)),
            cost: self.nlp_in.cost(k),
            constraints: self.nlp_in.constraints(k),
            cost_opts: &self.opts.cost[k],
            regularizer: self.regularizer,
            reg_epsilon: self.opts.reg_epsilon,
        }
    }

    fn stage_inputs(&self, k: usize) -> StageInputs<'_> {
        StageInputs {
            x: self.nlp_out.x(k),
            u: self.nlp_out.u(k),
            cost_memory: self.models.cost(k),
        }
    }
}

/// Linearize every stage into `stages`, on `pool` when there is one.
pub(crate) fn linearize(
    stages: ArenaMut<'_>,
    shapes: &[StageShape],
    ctx: &StageContext<'_>,
    pool: Option<&mut StagePool<StageJob>>,
) -> Result<(), RtiError> {
    match pool {
        Some(pool) if shapes.len() > 1 => {
            let mut dispatch = Transfer { stages, shapes, ctx };
            pool.run(shapes.len(), &mut dispatch)
        }
        _ => {
            let mut stages = stages;
            run_inline(shapes.len(), |k| {
                let shape = &shapes[k];
                let mut c = stages.region_mut(shape.region()).into_carver();
                let (bufs, scratch) = StageBuffers::carve(&mut c, shape);
                linearize_stage(k, shape, &ctx.stage_models(k), &ctx.stage_inputs(k), bufs, scratch)
            })
        }
    }
}

// ── Pool jobs ──────────────────────────────────────────────────────

/// Where a stage's data sits in a job buffer.
#[derive(Clone, Copy, Debug)]
struct JobLayout {
    x: Span,
    u: Span,
    cost: Span,
    inputs: Region,
    block: Region,
}

impl JobLayout {
    fn of(shape: &StageShape) -> Self {
        let mut inputs = SpanPlanner::new();
        let x = inputs.reals(shape.dims.nx);
        let u = inputs.reals(shape.dims.nu);
        let cost = inputs.reals(shape.sizes.cost_len);
        let mut p = SpanPlanner::new();
        let inputs = p.region(inputs.footprint());
        let block = p.region(shape.footprint());
        Self {
            x,
            u,
            cost,
            inputs,
            block,
        }
    }
}

/// Shared handles to the models and options of one stage.
struct StageTask {
    dynamics: Option<(Arc<dyn Dynamics>, DynamicsOptions)>,
    cost: Option<Arc<dyn Cost>>,
    constraints: Option<Arc<dyn Constraints>>,
    cost_opts: CostOptions,
    regularizer: &'static dyn Regularizer,
    reg_epsilon: f64,
}

/// One job shell: a buffer large enough for any stage, plus the task of
/// the stage it currently carries. The task is dropped on collection so
/// workers never keep models alive between calls.
pub(crate) struct StageJob {
    stage: usize,
    shape: Option<StageShape>,
    task: Option<StageTask>,
    buffer: Arena,
}

impl StageJob {
    /// Slots a job buffer needs to carry any of `shapes`.
    pub fn footprint(shapes: &[StageShape]) -> Footprint {
        shapes
            .iter()
            .map(|s| JobLayout::of(s).block.end())
            .fold(Footprint::ZERO, |a, b| Footprint {
                reals: a.reals.max(b.reals),
                indices: a.indices.max(b.indices),
            })
    }

    /// An idle shell with a buffer for any of `shapes`.
    pub fn new(shapes: &[StageShape]) -> Result<Self, ConfigError> {
        Ok(Self {
            stage: 0,
            shape: None,
            task: None,
            buffer: Arena::with_footprint(Self::footprint(shapes))?,
        })
    }

    /// Worker body: linearize the stage this shell carries.
    pub fn run(&mut self) -> Result<(), RtiError> {
        let (Some(shape), Some(task)) = (self.shape.as_ref(), self.task.as_ref()) else {
            return Err(ConfigError::NotPrecomputed.into());
        };
        let layout = JobLayout::of(shape);
        let [inputs, block] = self.buffer.regions_mut([layout.inputs, layout.block]);
        let inputs: ArenaRef<'_> = inputs.into_ref();
        let models = StageModels {
            dynamics: task.dynamics.as_ref().map(|(d, o)| (&**d, o)),
            cost: task.cost.as_deref(),
            constraints: task.constraints.as_deref(),
            cost_opts: &task.cost_opts,
            regularizer: task.regularizer,
            reg_epsilon: task.reg_epsilon,
        };
        let stage_inputs = StageInputs {
            x: inputs.reals_in(layout.x),
            u: inputs.reals_in(layout.u),
            cost_memory: inputs.reals_in(layout.cost),
        };
        let mut c = block.into_carver();
        let (bufs, scratch) = StageBuffers::carve(&mut c, shape);
        linearize_stage(self.stage, shape, &models, &stage_inputs, bufs, scratch)
    }
}

/// Start `threads` workers with one shell each, sized for `shapes`.
pub(crate) fn spawn_pool(
    threads: usize,
    shapes: &[StageShape],
) -> Result<Option<StagePool<StageJob>>, ConfigError> {
    if threads <= 1 {
        return Ok(None);
    }
    let shells = (0..threads)
        .map(|_| StageJob::new(shapes))
        .collect::<Result<Vec<_>, _>>()?;
    StagePool::spawn("rti-linearize", shells, StageJob::run).map(Some)
}

/// Moves stage data between the stage region and job buffers.
struct Transfer<'s, 'c> {
    stages: ArenaMut<'s>,
    shapes: &'s [StageShape],
    ctx: &'s StageContext<'c>,
}

impl Dispatch<StageJob> for Transfer<'_, '_> {
    fn prepare(&mut self, k: usize, job: &mut StageJob) {
        let shape = self.shapes[k];
        let layout = JobLayout::of(&shape);
        let ctx = self.ctx;
        {
            let [mut inputs, mut block] = job.buffer.regions_mut([layout.inputs, layout.block]);
            inputs.slice_mut(layout.x).copy_from_slice(ctx.nlp_out.x(k));
            inputs.slice_mut(layout.u).copy_from_slice(ctx.nlp_out.u(k));
            inputs.slice_mut(layout.cost).copy_from_slice(ctx.models.cost(k));
            block.copy_slots_from(&self.stages.region(shape.region()));
        }
        job.stage = k;
        job.shape = Some(shape);
        job.task = Some(StageTask {
            dynamics: ctx
                .nlp_in
                .shared_dynamics(k)
                .zip(ctx.opts.dynamics.get(k).copied()),
            cost: ctx.nlp_in.shared_cost(k),
            constraints: ctx.nlp_in.shared_constraints(k),
            cost_opts: ctx.opts.cost[k],
            regularizer: ctx.regularizer,
            reg_epsilon: ctx.opts.reg_epsilon,
        });
    }

    fn collect(&mut self, k: usize, job: &mut StageJob, ok: bool) {
        job.task = None;
        if ok {
            let shape = &self.shapes[k];
            let layout = JobLayout::of(shape);
            self.stages
                .region_mut(shape.region())
                .copy_slots_from(&job.buffer.region(layout.block));
        }
    }
}
