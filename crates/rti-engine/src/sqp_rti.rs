//! The real-time-iteration engine.
//!
//! One [`SqpRti::step`] performs exactly one linearization and one QP
//! solve:
//!
//! 1. **Linearize** every stage at the current iterate, on the worker
//!    pool when `num_threads > 1`, into the stage region.
//! 2. **Assemble** the step-form QP from the stage results.
//! 3. **Solve** it and, on success, apply the full step to the iterate.
//!
//! A failed call never touches the iterate. All state of an instance
//! lives in one arena allocated by [`SqpRti::new`]; see the `layout`
//! module for its regions.

use std::sync::Arc;
use std::time::Instant;

use rti_arena::{Arena, ArenaMut, ArenaRef, Footprint, Store, StoreMut};
use rti_core::{ConfigError, ModelRole, OcpDims, OptionValue, QpDims, Status};
use rti_model::{Constraints, Cost};
use rti_qp::linalg::{axpy, norm_inf};
use rti_qp::{External, QpIn, QpInView, QpOut, QpRes, QpSolver};

use crate::config::SolverConfig;
use crate::error::RtiError;
use crate::layout::{EngineLayout, ModelMemory, ModelView, StageBuffers, StageShape, StageSizes};
use crate::linearize::{linearize, spawn_pool, StageContext, StageJob};
use crate::memory::SqpRtiMemory;
use crate::metrics::{RtiReport, RtiTimings};
use crate::nlp::{NlpIn, NlpOut};
use crate::options::SqpRtiOptions;
use crate::pool::StagePool;
use crate::stats::{StatRow, StatTable, StatView};

/// An SQP real-time-iteration solver bound to one configuration and one
/// problem.
///
/// Instances are independent: several may share one [`SolverConfig`] and
/// run on separate threads. A single instance is driven by `&mut self`.
///
/// # Lifecycle
///
/// ```text
/// new(nlp_in) ──► precompute(nlp_in) ──► step(nlp_in, nlp_out) ──► step … ──► drop
/// ```
///
/// `new` sizes everything from the models and allocates once. Steps do
/// not allocate.
#[derive(Debug)]
pub struct SqpRti {
    config: Arc<SolverConfig>,
    dims: OcpDims,
    opts: SqpRtiOptions,
    qp: QpSolver<External>,
    layout: EngineLayout,
    memory: SqpRtiMemory,
    arena: Arena,
    pool: Option<StagePool<StageJob>>,
}

// Compile-time assertion: SqpRti can move to a worker thread.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<SqpRti>();
    }
};

fn elapsed_us(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_micros()).unwrap_or(u64::MAX)
}

impl SqpRti {
    /// Build a solver for the problem held by `nlp_in`, with `opts`.
    ///
    /// Validates the plan, the options and every stage model, then
    /// allocates the single arena holding statistics, model memory, QP
    /// memory and every per-call buffer. With `num_threads > 1` it also
    /// starts the linearization workers.
    pub fn new(
        config: Arc<SolverConfig>,
        nlp_in: &NlpIn,
        opts: SqpRtiOptions,
    ) -> Result<Self, ConfigError> {
        let layout = plan(&config, nlp_in, &opts)?;
        let qp = QpSolver::external(config.qp_backend(), layout.qp_dims, &opts.qp)?;
        let mut arena = Arena::with_footprint(layout.footprint())?;
        qp.initialize_memory(arena.region_mut(layout.qp_memory));
        let pool = spawn_pool(opts.num_threads, &layout.shapes)?;
        Ok(Self {
            dims: nlp_in.dims().clone(),
            memory: SqpRtiMemory::new(),
            config,
            opts,
            qp,
            layout,
            arena,
            pool,
        })
    }

    /// Build a solver with [`SqpRtiOptions::new`] defaults.
    pub fn with_defaults(config: Arc<SolverConfig>, nlp_in: &NlpIn) -> Result<Self, ConfigError> {
        let opts = SqpRtiOptions::new(&config, nlp_in.dims());
        Self::new(config, nlp_in, opts)
    }

    /// Slots [`new`](Self::new) would allocate for the same arguments.
    ///
    /// Linearization workers add one job buffer each on top.
    pub fn footprint(
        config: &SolverConfig,
        nlp_in: &NlpIn,
        opts: &SqpRtiOptions,
    ) -> Result<Footprint, ConfigError> {
        validate(config, nlp_in, opts)?;
        let dims = nlp_in.dims();
        let shapes = StageShape::plan(dims.stages(), |k| stage_sizes(config, opts, nlp_in, k));
        Ok(EngineLayout::footprint_of(
            opts.stat_rows,
            &QpDims::from_ocp(dims),
            config.qp_backend(),
            &shapes,
        ))
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// The shared configuration.
    pub fn config(&self) -> &Arc<SolverConfig> {
        &self.config
    }

    /// Problem shape.
    pub fn dims(&self) -> &OcpDims {
        &self.dims
    }

    /// Shape of the assembled QP.
    pub fn qp_dims(&self) -> &QpDims {
        &self.layout.qp_dims
    }

    /// Current options.
    pub fn options(&self) -> &SqpRtiOptions {
        &self.opts
    }

    /// Persistent bookkeeping: status, timings, call count.
    pub fn memory(&self) -> &SqpRtiMemory {
        &self.memory
    }

    /// The statistics table.
    pub fn stat(&self) -> StatView<'_> {
        StatTable::assign(self.layout.stat_rows, self.arena.region(self.layout.stat))
    }

    /// The QP assembled by the last call.
    pub fn qp_in(&self) -> QpInView<'_> {
        QpIn::assign(self.layout.qp_dims, self.arena.region(self.layout.qp_in))
    }

    /// The QP solution of the last call, with its backend report.
    pub fn qp_out(&self) -> QpOut<ArenaRef<'_>> {
        let mut out = QpOut::assign(self.layout.qp_dims, self.arena.region(self.layout.qp_out));
        out.info = self.memory.qp_info;
        out
    }

    /// The QP solver.
    pub fn qp_solver(&self) -> &QpSolver<External> {
        &self.qp
    }

    /// Bytes of this instance's arena.
    pub fn memory_bytes(&self) -> usize {
        self.arena.memory_bytes()
    }

    /// Linearization workers running for this instance.
    pub fn worker_threads(&self) -> usize {
        self.pool.as_ref().map_or(0, StagePool::threads)
    }

    /// Forget the QP warm start.
    pub fn reset_warm_start(&mut self) {
        self.qp
            .initialize_memory(self.arena.region_mut(self.layout.qp_memory));
    }

    // ── Options ────────────────────────────────────────────────────

    /// Set one engine or `qp_<field>` option.
    ///
    /// The options are left unchanged on error. `stat_rows` fixes the
    /// statistics shape and is rejected on a built solver. Changing
    /// `num_threads` restarts the linearization workers.
    pub fn set_option(
        &mut self,
        field: &str,
        value: impl Into<OptionValue>,
    ) -> Result<(), ConfigError> {
        let value = value.into();
        if field == "stat_rows" {
            return Err(ConfigError::OptionRequiresRebuild {
                field: field.to_string(),
            });
        }
        let mut next = self.opts.clone();
        next.set(field, value)?;
        next.validate(&self.dims)?;

        let pool = if next.num_threads != self.opts.num_threads {
            Some(spawn_pool(next.num_threads, &self.layout.shapes)?)
        } else {
            None
        };
        let qp_field = if field == "qp_warm_start" {
            Some("warm_start")
        } else if next.get(field).is_some() {
            None
        } else {
            field.strip_prefix("qp_")
        };
        if let Some(qp_field) = qp_field {
            self.qp.set_option(qp_field, value)?;
        }
        if let Some(pool) = pool {
            self.pool = pool;
        }
        self.opts = next;
        Ok(())
    }

    /// Set one per-stage model option.
    ///
    /// A change that alters a model's scratch size (such as `rk_order`)
    /// takes effect after the next [`precompute`](Self::precompute).
    pub fn set_stage_option(
        &mut self,
        role: ModelRole,
        stage: usize,
        field: &str,
        value: impl Into<OptionValue>,
    ) -> Result<(), ConfigError> {
        let mut next = self.opts.clone();
        next.set_stage(role, stage, field, value)?;
        next.validate(&self.dims)?;
        self.opts = next;
        Ok(())
    }

    // ── Precompute ─────────────────────────────────────────────────

    /// Structure-only setup against the models of `nlp_in`.
    ///
    /// Validates every model against the dims and the plan, runs each
    /// cost's precompute into model memory, copies the structural indices
    /// and resets the QP warm start. Must succeed before
    /// [`step`](Self::step), and again whenever models are swapped or a
    /// stage option changes their scratch. If the models need a different
    /// layout than the current one, the arena is reallocated; statistics
    /// start over in that case.
    pub fn precompute(&mut self, nlp_in: &NlpIn) -> Result<(), ConfigError> {
        self.memory.precomputed = false;
        self.check_dims("nlp_in", nlp_in.dims())?;
        let layout = plan(&self.config, nlp_in, &self.opts)?;
        if layout != self.layout {
            let arena = Arena::with_footprint(layout.footprint())?;
            let pool = spawn_pool(self.opts.num_threads, &layout.shapes)?;
            self.arena = arena;
            self.pool = pool;
            self.layout = layout;
        }

        let mut models = ModelMemory::assign(
            &self.layout.model_spans,
            self.arena.region_mut(self.layout.models),
        );
        for k in 0..self.layout.shapes.len() {
            let (cost, constraints) = stage_models(nlp_in, k)?;
            cost.precompute(models.cost_mut(k))
                .map_err(|e| ConfigError::InvalidModel {
                    role: ModelRole::Cost,
                    stage: k,
                    reason: e.to_string(),
                })?;
            let bounds = constraints.bounds();
            models.set_indices(k, bounds.idxb(), bounds.idxs());
        }

        self.reset_warm_start();
        self.memory.precomputed = true;
        Ok(())
    }

    fn check_dims(&self, what: &str, dims: &OcpDims) -> Result<(), ConfigError> {
        if *dims == self.dims {
            return Ok(());
        }
        let found = dims.horizon();
        if found != self.dims.horizon() {
            return Err(ConfigError::DimensionMismatch {
                what: format!("{what} horizon"),
                expected: self.dims.horizon(),
                found,
            });
        }
        let stage = self
            .dims
            .stages()
            .iter()
            .zip(dims.stages())
            .position(|(a, b)| a != b)
            .unwrap_or(0);
        Err(ConfigError::DimensionMismatch {
            what: format!("{what} stage {stage} dims"),
            expected: self.dims.stages().get(stage).map_or(0, |s| s.nv()),
            found: dims.stages().get(stage).map_or(0, |s| s.nv()),
        })
    }

    // ── Step ───────────────────────────────────────────────────────

    /// One real-time iteration on `nlp_out`.
    ///
    /// On success the iterate holds `w + Δw` (and the QP duals when
    /// `compute_dual_sol`). On any error the iterate is unchanged; the
    /// status is recorded in [`SqpRtiMemory::status`].
    pub fn step(&mut self, nlp_in: &NlpIn, nlp_out: &mut NlpOut) -> Result<RtiReport, RtiError> {
        let start = Instant::now();
        self.memory.call_count += 1;
        let result = self.run(nlp_in, nlp_out);
        let total_us = elapsed_us(start);
        self.memory.timings.total_us = total_us;
        self.memory.status = match &result {
            Ok(_) => Status::Success,
            Err(e) => Status::from(e),
        };
        result.map(|mut report| {
            report.timings.total_us = total_us;
            report
        })
    }

    fn run(&mut self, nlp_in: &NlpIn, nlp_out: &mut NlpOut) -> Result<RtiReport, RtiError> {
        self.memory.timings = RtiTimings::default();
        if !self.memory.precomputed {
            return Err(ConfigError::NotPrecomputed.into());
        }
        self.check_dims("nlp_in", nlp_in.dims())?;
        self.check_dims("nlp_out", nlp_out.dims())?;
        check_models(&self.config, &self.dims, nlp_in)?;

        let l = &self.layout;
        if !self.opts.reuse_workspace {
            self.arena.region_mut(l.workspace).zero();
        }
        let [stat, models, qp_memory, qp_in, qp_out, qp_res, qp_work, mut stages] =
            self.arena.regions_mut([
                l.stat,
                l.models,
                l.qp_memory,
                l.qp_in,
                l.qp_out,
                l.qp_res,
                l.qp_work,
                l.stages,
            ]);
        let models = ModelMemory::assign(&l.model_spans, models.into_ref());
        check_layout(&self.config, &self.opts, &l.shapes, nlp_in, &models)?;

        let lin_start = Instant::now();
        let ctx = StageContext {
            nlp_in,
            nlp_out,
            opts: &self.opts,
            models,
            regularizer: self.config.regularizer(),
        };
        linearize(stages.reborrow(), &l.shapes, &ctx, self.pool.as_mut())?;
        let mut qp_in = QpIn::assign(l.qp_dims, qp_in);
        let cost = assemble(&mut qp_in, &mut stages, &l.shapes, &ctx);
        self.memory.timings.lin_us = elapsed_us(lin_start);

        let mut qp_out = QpOut::assign(l.qp_dims, qp_out);
        let info = self.qp.solve_in(qp_memory, qp_work, &qp_in, &mut qp_out)?;
        self.memory.qp_info = info;
        self.memory.timings.qp_us = info.solve_us;

        let residuals = if self.opts.ext_qp_res {
            Some(QpRes::assign(l.qp_dims, qp_res).compute(&qp_in, &qp_out)?)
        } else {
            None
        };
        let res = residuals.unwrap_or_default();
        StatTable::assign(l.stat_rows, stat).push(StatRow {
            qp_status: Status::from(info.status).code(),
            qp_iter: info.iter,
            res_stat: res.stat,
            res_eq: res.eq,
            res_ineq: res.ineq,
            res_comp: res.comp,
        });

        if !info.status.is_success() {
            return Err(RtiError::QpFailed {
                status: info.status,
                iterations: info.iter,
            });
        }

        let step_norm = update(
            nlp_out,
            &l.shapes,
            &qp_out,
            &models,
            self.opts.compute_dual_sol,
        );
        Ok(RtiReport {
            qp: info,
            cost,
            step_norm,
            residuals,
            timings: self.memory.timings,
        })
    }
}

// ── Setup ──────────────────────────────────────────────────────────

/// Plan, options and models all agree with `nlp_in`.
fn validate(config: &SolverConfig, nlp_in: &NlpIn, opts: &SqpRtiOptions) -> Result<(), ConfigError> {
    let dims = nlp_in.dims();
    let horizon = config.plan().horizon();
    if horizon != dims.horizon() {
        return Err(ConfigError::DimensionMismatch {
            what: "plan horizon".to_string(),
            expected: dims.horizon(),
            found: horizon,
        });
    }
    opts.validate(dims)?;
    check_models(config, dims, nlp_in)
}

/// The arena layout `nlp_in` and `opts` need.
fn plan(config: &SolverConfig, nlp_in: &NlpIn, opts: &SqpRtiOptions) -> Result<EngineLayout, ConfigError> {
    validate(config, nlp_in, opts)?;
    let dims = nlp_in.dims();
    let sizes: Vec<StageSizes> = (0..dims.stages().len())
        .map(|k| stage_sizes(config, opts, nlp_in, k))
        .collect();
    Ok(EngineLayout::plan(
        opts.stat_rows,
        QpDims::from_ocp(dims),
        config.qp_backend(),
        dims.stages(),
        &sizes,
    ))
}

/// Model-dependent sizes of stage `k`.
fn stage_sizes(config: &SolverConfig, opts: &SqpRtiOptions, nlp_in: &NlpIn, k: usize) -> StageSizes {
    let nw = nlp_in.dims().stages()[k].nw();
    StageSizes {
        dyn_work: nlp_in
            .dynamics(k)
            .zip(opts.dynamics.get(k))
            .map_or(Footprint::ZERO, |(d, o)| d.workspace_footprint(o)),
        cost_work: nlp_in
            .cost(k)
            .map_or(Footprint::ZERO, |c| c.workspace_footprint()),
        reg_work: config.regularizer().workspace_footprint(nw),
        con_work: nlp_in
            .constraints(k)
            .map_or(Footprint::ZERO, |c| c.workspace_footprint()),
        cost_len: nlp_in.cost(k).map_or(0, |c| c.memory_len()),
    }
}

fn stage_models(nlp_in: &NlpIn, stage: usize) -> Result<(&dyn Cost, &dyn Constraints), ConfigError> {
    let cost = nlp_in.cost(stage).ok_or(ConfigError::MissingModel {
        role: ModelRole::Cost,
        stage,
    })?;
    let constraints = nlp_in.constraints(stage).ok_or(ConfigError::MissingModel {
        role: ModelRole::Constraints,
        stage,
    })?;
    Ok((cost, constraints))
}

/// Existence, kind and shape of every stage model.
fn check_models(config: &SolverConfig, dims: &OcpDims, nlp_in: &NlpIn) -> Result<(), ConfigError> {
    let plan = config.plan();
    let stages = dims.stages();
    for (k, d) in stages.iter().enumerate() {
        let shape = |role: ModelRole, field: &str, expected: usize, found: usize| {
            if expected == found {
                Ok(())
            } else {
                Err(ConfigError::DimensionMismatch {
                    what: format!("stage {k} {role} {field}"),
                    expected,
                    found,
                })
            }
        };
        let kind = |role: ModelRole, expected: &'static str, found: &'static str| {
            if expected == found {
                Ok(())
            } else {
                Err(ConfigError::ModelKindMismatch {
                    role,
                    stage: k,
                    expected,
                    found,
                })
            }
        };

        if let Some(next) = stages.get(k + 1) {
            let dynamics = nlp_in.dynamics(k).ok_or(ConfigError::MissingModel {
                role: ModelRole::Dynamics,
                stage: k,
            })?;
            let role = ModelRole::Dynamics;
            kind(role, plan.dynamics[k].as_str(), dynamics.kind().as_str())?;
            shape(role, "nx", d.nx, dynamics.nx())?;
            shape(role, "nu", d.nu, dynamics.nu())?;
            shape(role, "nx_next", next.nx, dynamics.nx_next())?;
        }

        let (cost, constraints) = stage_models(nlp_in, k)?;
        let role = ModelRole::Cost;
        kind(role, plan.cost[k].as_str(), cost.kind().as_str())?;
        shape(role, "nx", d.nx, cost.nx())?;
        shape(role, "nu", d.nu, cost.nu())?;

        let role = ModelRole::Constraints;
        kind(role, plan.constraints[k].as_str(), constraints.kind().as_str())?;
        let b = constraints.bounds();
        shape(role, "nx", d.nx, b.nx())?;
        shape(role, "nu", d.nu, b.nu())?;
        shape(role, "nb", d.nb, b.nb())?;
        shape(role, "ng", d.ng, b.ng())?;
        shape(role, "ns", d.ns, b.ns())?;
    }
    Ok(())
}

/// The models still have the structure `precompute` laid out.
fn check_layout(
    config: &SolverConfig,
    opts: &SqpRtiOptions,
    shapes: &[StageShape],
    nlp_in: &NlpIn,
    models: &ModelView<'_, '_>,
) -> Result<(), ConfigError> {
    for (k, shape) in shapes.iter().enumerate() {
        let (_, constraints) = stage_models(nlp_in, k)?;
        let bounds = constraints.bounds();
        let same = stage_sizes(config, opts, nlp_in, k) == shape.sizes
            && bounds.idxb() == models.idxb(k)
            && bounds.idxs() == models.idxs(k);
        if !same {
            return Err(ConfigError::NotPrecomputed);
        }
    }
    Ok(())
}

// ── Assembly ───────────────────────────────────────────────────────

/// Write the step-form QP of every stage into `qp`; returns the total
/// cost at the current iterate.
fn assemble(
    qp: &mut QpIn<ArenaMut<'_>>,
    stages: &mut ArenaMut<'_>,
    shapes: &[StageShape],
    ctx: &StageContext<'_>,
) -> f64 {
    let q = qp.view_mut();
    let nv = q.g.len();
    let mut total = 0.0;

    for (k, shape) in shapes.iter().enumerate() {
        let mut carver = stages.region_mut(shape.region()).into_carver();
        let (b, _scratch) = StageBuffers::carve(&mut carver, shape);
        total += b.value[0];

        let d = shape.dims;
        let (nu, nw, off) = (d.nu, shape.nw(), shape.v_off);
        let (x, u, s) = (ctx.nlp_out.x(k), ctx.nlp_out.u(k), ctx.nlp_out.s(k));
        let w = |i: usize| if i < nu { u[i] } else { x[i - nu] };
        let copt = &ctx.opts.constraints[k];
        let Some(constraints) = ctx.nlp_in.constraints(k) else {
            continue;
        };
        let bounds = constraints.bounds();
        let idxb = ctx.models.idxb(k);
        let idxs = ctx.models.idxs(k);
        let is_soft = |r: usize| idxs.contains(&r);

        // Objective
        for i in 0..nw {
            let row = (off + i) * nv + off;
            q.h[row..row + nw].copy_from_slice(&b.hess[i * nw..(i + 1) * nw]);
            q.g[off + i] = b.grad[i];
        }
        for (j, (&zq, &zl)) in bounds.z_quad().iter().zip(bounds.z_lin()).enumerate() {
            let c = off + nw + j;
            q.h[c * nv + c] = zq;
            q.g[c] = zq * s[j] + zl;
        }

        // Dynamics: jac·Δw_k − Δx_{k+1} = x_{k+1} − φ
        if let Some(next) = shapes.get(k + 1) {
            let x_next = ctx.nlp_out.x(k + 1);
            let col_next = next.v_off + next.dims.nu;
            for i in 0..shape.nx_next {
                let row = shape.eq_off + i;
                let a = &mut q.a[row * nv..(row + 1) * nv];
                a[off..off + nw].copy_from_slice(&b.dyn_jac[i * nw..(i + 1) * nw]);
                a[col_next + i] = -1.0;
                q.b[row] = x_next[i] - b.phi[i];
            }
        }

        // Box rows, then one Δs ≥ −s row per slack
        for (i, &col) in idxb.iter().enumerate() {
            let row = shape.box_off + i;
            q.idxb[row] = off + col;
            if is_soft(i) {
                q.lb[row] = f64::NEG_INFINITY;
                q.ub[row] = f64::INFINITY;
            } else {
                let wi = w(col);
                q.lb[row] = copt.lower(bounds.lb()[i]) - wi;
                q.ub[row] = copt.upper(bounds.ub()[i]) - wi;
            }
        }
        for j in 0..d.ns {
            let row = shape.box_off + d.nb + j;
            q.idxb[row] = off + nw + j;
            q.lb[row] = -s[j];
            q.ub[row] = f64::INFINITY;
        }

        // General rows
        for i in 0..d.ng {
            let row = shape.gen_off + i;
            let c = &mut q.c[row * nv..(row + 1) * nv];
            c[off..off + nw].copy_from_slice(&b.con_jac[i * nw..(i + 1) * nw]);
            if is_soft(d.nb + i) {
                q.lg[row] = f64::NEG_INFINITY;
                q.ug[row] = f64::INFINITY;
            } else {
                q.lg[row] = copt.lower(bounds.lg()[i]) - b.h[i];
                q.ug[row] = copt.upper(bounds.ug()[i]) - b.h[i];
            }
        }

        // Soft rows: aᵀΔw + Δs ≥ lo − r − s and aᵀΔw − Δs ≤ up − r + s
        for (j, &r) in idxs.iter().enumerate() {
            let lo_row = shape.gen_off + d.ng + 2 * j;
            let up_row = lo_row + 1;
            let value = if r < d.nb { w(idxb[r]) } else { b.h[r - d.nb] };
            for (row, sign) in [(lo_row, 1.0), (up_row, -1.0)] {
                let c = &mut q.c[row * nv..(row + 1) * nv];
                let a = &mut c[off..off + nw];
                if r < d.nb {
                    a.fill(0.0);
                    a[idxb[r]] = 1.0;
                } else {
                    let g = r - d.nb;
                    a.copy_from_slice(&b.con_jac[g * nw..(g + 1) * nw]);
                }
                c[off + nw + j] = sign;
            }
            let (lo, up) = bounds.row_bounds(r);
            q.lg[lo_row] = copt.lower(lo) - value - s[j];
            q.ug[lo_row] = f64::INFINITY;
            q.lg[up_row] = f64::NEG_INFINITY;
            q.ug[up_row] = copt.upper(up) - value + s[j];
        }
    }
    total
}

// ── Update ─────────────────────────────────────────────────────────

/// Apply the full QP step to `nlp_out`; returns `‖Δv‖∞`.
fn update<S: Store>(
    nlp_out: &mut NlpOut,
    shapes: &[StageShape],
    qp_out: &QpOut<S>,
    models: &ModelView<'_, '_>,
    duals: bool,
) -> f64 {
    let v = qp_out.v();
    let mut step_norm: f64 = 0.0;
    for (k, shape) in shapes.iter().enumerate() {
        let d = shape.dims;
        let nw = shape.nw();
        let step = &v[shape.v_off..shape.v_off + d.nv()];
        step_norm = step_norm.max(norm_inf(step));

        let it = nlp_out.stage_mut(k);
        axpy(1.0, &step[..d.nu], it.u);
        axpy(1.0, &step[d.nu..nw], it.x);
        axpy(1.0, &step[nw..], it.s);
        if !duals {
            continue;
        }

        it.pi
            .copy_from_slice(&qp_out.y()[shape.eq_off..shape.eq_off + shape.nx_next]);
        for i in 0..d.nb {
            let row = shape.box_off + i;
            it.lam_lower[i] = qp_out.lam_lb()[row];
            it.lam_upper[i] = qp_out.lam_ub()[row];
        }
        for i in 0..d.ng {
            let row = shape.gen_off + i;
            it.lam_lower[d.nb + i] = qp_out.lam_lg()[row];
            it.lam_upper[d.nb + i] = qp_out.lam_ug()[row];
        }
        for (j, &r) in models.idxs(k).iter().enumerate() {
            let lo_row = shape.gen_off + d.ng + 2 * j;
            it.lam_lower[r] = qp_out.lam_lg()[lo_row];
            it.lam_upper[r] = qp_out.lam_ug()[lo_row + 1];
        }
    }
    step_norm
}
