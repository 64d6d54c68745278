//! [`QpSolver`]: one backend bound to one problem shape.
//!
//! A solver either owns a single arena holding its backend memory followed
//! by its workspace, or leaves both to the caller ([`External`]), who
//! places them in regions of a larger allocation and lends them per call.

use std::time::Instant;

use rti_arena::{Arena, ArenaMut, Footprint, Region, SpanPlanner, Store, StoreMut};
use rti_core::{ConfigError, OptionValue, QpDims, QpSolverKind};

use crate::backend::{resolve, QpBackend};
use crate::options::QpSolverOptions;
use crate::qp_in::QpIn;
use crate::qp_out::{QpInfo, QpOut};

/// Storage marker for a solver whose memory and workspace live in the
/// caller's arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct External;

/// A QP solver instance.
///
/// Creation sizes the backend's memory and workspace and deep-copies the
/// options. An owned solver allocates both once, in one arena. Solving
/// never allocates.
pub struct QpSolver<M = Arena> {
    backend: &'static dyn QpBackend,
    dims: QpDims,
    opts: QpSolverOptions,
    memory: Region,
    workspace: Region,
    storage: M,
}

impl<M> std::fmt::Debug for QpSolver<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QpSolver")
            .field("backend", &self.backend.name())
            .field("dims", &self.dims)
            .field("memory", &self.memory.footprint)
            .field("workspace", &self.workspace.footprint)
            .finish()
    }
}

impl QpSolver {
    /// Memory plus workspace footprint of `backend` for shape `dims`.
    pub fn footprint(backend: &dyn QpBackend, dims: &QpDims) -> Footprint {
        backend.memory_footprint(dims) + backend.workspace_footprint(dims)
    }

    /// Resolve `kind` and build a solver for `dims`.
    pub fn new(kind: QpSolverKind, dims: QpDims, opts: &QpSolverOptions) -> Result<Self, ConfigError> {
        Self::with_backend(resolve(kind)?, dims, opts)
    }

    /// Build a solver around an already resolved backend.
    pub fn with_backend(
        backend: &'static dyn QpBackend,
        dims: QpDims,
        opts: &QpSolverOptions,
    ) -> Result<Self, ConfigError> {
        let (opts, memory, workspace) = prepare(backend, &dims, opts)?;
        let mut arena = Arena::with_footprint(workspace.end())?;
        backend.initialize_memory(&dims, arena.region_mut(memory).into_carver());
        Ok(Self {
            backend,
            dims,
            opts,
            memory,
            workspace,
            storage: arena,
        })
    }

    /// Solve `qp_in` into `qp_out` and return the backend's report.
    ///
    /// The report is also stored in `qp_out.info`. A non-success status is
    /// a normal return; only shape mismatches are errors.
    pub fn solve<A: Store, B: StoreMut>(
        &mut self,
        qp_in: &QpIn<A>,
        qp_out: &mut QpOut<B>,
    ) -> Result<QpInfo, ConfigError> {
        let [memory, work] = self.storage.regions_mut([self.memory, self.workspace]);
        solve_with(self.backend, &self.dims, &self.opts, memory, work, qp_in, qp_out)
    }

    /// Forget warm-start data.
    pub fn reset_warm_start(&mut self) {
        let mut memory = self.storage.region_mut(self.memory);
        memory.zero();
        self.backend.initialize_memory(&self.dims, memory.into_carver());
    }

    /// Bytes held by memory and workspace.
    pub fn memory_bytes(&self) -> usize {
        self.storage.memory_bytes()
    }
}

impl QpSolver<External> {
    /// Build a solver whose memory and workspace the caller places.
    ///
    /// The caller allocates [`memory_footprint`](Self::memory_footprint)
    /// and [`workspace_footprint`](Self::workspace_footprint) slots, runs
    /// [`initialize_memory`](Self::initialize_memory) once, and then lends
    /// the same memory region to every [`solve_in`](Self::solve_in).
    pub fn external(
        backend: &'static dyn QpBackend,
        dims: QpDims,
        opts: &QpSolverOptions,
    ) -> Result<Self, ConfigError> {
        let (opts, memory, workspace) = prepare(backend, &dims, opts)?;
        Ok(Self {
            backend,
            dims,
            opts,
            memory,
            workspace,
            storage: External,
        })
    }

    /// Put `memory` into its initial state, forgetting warm-start data.
    pub fn initialize_memory(&self, mut memory: ArenaMut<'_>) {
        memory.zero();
        self.backend.initialize_memory(&self.dims, memory.into_carver());
    }

    /// Solve using caller-placed memory and workspace.
    pub fn solve_in<A: Store, B: StoreMut>(
        &self,
        memory: ArenaMut<'_>,
        work: ArenaMut<'_>,
        qp_in: &QpIn<A>,
        qp_out: &mut QpOut<B>,
    ) -> Result<QpInfo, ConfigError> {
        solve_with(self.backend, &self.dims, &self.opts, memory, work, qp_in, qp_out)
    }
}

impl<M> QpSolver<M> {
    /// Set one option by name and re-finalise the options.
    pub fn set_option(&mut self, field: &str, value: impl Into<OptionValue>) -> Result<(), ConfigError> {
        let mut next = self.opts.clone();
        next.set(field, value)?;
        self.backend.update_options(&self.dims, &mut next)?;
        self.opts = next;
        Ok(())
    }

    /// Current options.
    pub fn options(&self) -> &QpSolverOptions {
        &self.opts
    }

    /// Persistent backend memory.
    pub fn memory_footprint(&self) -> Footprint {
        self.memory.footprint
    }

    /// Backend scratch.
    pub fn workspace_footprint(&self) -> Footprint {
        self.workspace.footprint
    }

    /// Shape this solver was built for.
    pub fn dims(&self) -> &QpDims {
        &self.dims
    }

    /// Backend identifier.
    pub fn kind(&self) -> QpSolverKind {
        self.backend.kind()
    }

    /// Backend name.
    pub fn name(&self) -> &'static str {
        self.backend.name()
    }
}

/// Finalise options and lay out memory then workspace.
fn prepare(
    backend: &dyn QpBackend,
    dims: &QpDims,
    opts: &QpSolverOptions,
) -> Result<(QpSolverOptions, Region, Region), ConfigError> {
    dims.validate()?;
    let mut opts = backend.copy_options(opts)?;
    backend.update_options(dims, &mut opts)?;
    let mut p = SpanPlanner::new();
    let memory = p.region(backend.memory_footprint(dims));
    let workspace = p.region(backend.workspace_footprint(dims));
    Ok((opts, memory, workspace))
}

fn solve_with<A: Store, B: StoreMut>(
    backend: &dyn QpBackend,
    dims: &QpDims,
    opts: &QpSolverOptions,
    memory: ArenaMut<'_>,
    work: ArenaMut<'_>,
    qp_in: &QpIn<A>,
    qp_out: &mut QpOut<B>,
) -> Result<QpInfo, ConfigError> {
    for (what, found) in [("qp_in", qp_in.dims()), ("qp_out", qp_out.dims())] {
        if found != dims {
            return Err(ConfigError::DimensionMismatch {
                what: format!("{what} nv"),
                expected: dims.nv,
                found: found.nv,
            });
        }
    }
    let start = Instant::now();
    let mut info = backend.solve(
        &qp_in.as_view(),
        &mut qp_out.as_view_mut(),
        opts,
        memory.into_carver(),
        work.into_carver(),
    );
    info.solve_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
    qp_out.info = info;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footprint_matches_allocation() {
        let dims = QpDims {
            nv: 6,
            ne: 2,
            nb: 3,
            ng: 2,
            ns: 0,
        };
        for kind in [QpSolverKind::InteriorPoint, QpSolverKind::Admm] {
            let backend = resolve(kind).unwrap();
            let opts = backend.default_options();
            let solver = QpSolver::new(kind, dims, &opts).unwrap();
            assert_eq!(
                solver.memory_bytes(),
                QpSolver::footprint(backend, &dims).bytes()
            );
            assert_eq!(solver.kind(), kind);
        }
    }

    #[test]
    fn mismatched_options_are_rejected() {
        let admm = resolve(QpSolverKind::Admm).unwrap().default_options();
        assert!(matches!(
            QpSolver::new(QpSolverKind::InteriorPoint, QpDims::default(), &admm),
            Err(ConfigError::OptionsMismatch { .. })
        ));
    }

    #[test]
    fn set_option_keeps_old_options_on_error() {
        let opts = QpSolverOptions::new(QpSolverKind::InteriorPoint).unwrap();
        let mut solver = QpSolver::new(QpSolverKind::InteriorPoint, QpDims::default(), &opts).unwrap();
        assert!(solver.set_option("max_iter", 0i64).is_err());
        assert_eq!(solver.options(), &opts);
        solver.set_option("max_iter", 7i64).unwrap();
        assert_eq!(solver.options().common.max_iter, 7);
    }

    #[test]
    fn wrong_shape_is_a_config_error() {
        let opts = QpSolverOptions::new(QpSolverKind::Admm).unwrap();
        let dims = QpDims {
            nv: 2,
            ..QpDims::default()
        };
        let mut solver = QpSolver::new(QpSolverKind::Admm, dims, &opts).unwrap();
        let qp = QpIn::new(QpDims {
            nv: 3,
            ..QpDims::default()
        })
        .unwrap();
        let mut out = QpOut::new(dims).unwrap();
        assert!(matches!(
            solver.solve(&qp, &mut out),
            Err(ConfigError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn external_solver_matches_owned() {
        let dims = QpDims {
            nv: 2,
            ne: 1,
            nb: 1,
            ..QpDims::default()
        };
        let mut qp = QpIn::new(dims).unwrap();
        {
            let v = qp.view_mut();
            v.h.copy_from_slice(&[1.0, 0.0, 0.0, 1.0]);
            v.g.copy_from_slice(&[-1.0, 0.0]);
            v.a.copy_from_slice(&[1.0, 1.0]);
            v.b[0] = 1.0;
            v.lb[0] = f64::NEG_INFINITY;
            v.ub[0] = 0.75;
        }
        for kind in [QpSolverKind::InteriorPoint, QpSolverKind::Admm] {
            let backend = resolve(kind).unwrap();
            let opts = backend.default_options();
            let mut owned = QpSolver::new(kind, dims, &opts).unwrap();
            let external = QpSolver::external(backend, dims, &opts).unwrap();

            let mut p = SpanPlanner::new();
            let memory = p.region(external.memory_footprint());
            let work = p.region(external.workspace_footprint());
            assert_eq!(p.footprint(), QpSolver::footprint(backend, &dims));
            let mut arena = Arena::with_footprint(p.footprint()).unwrap();
            external.initialize_memory(arena.region_mut(memory));

            let mut a = QpOut::new(dims).unwrap();
            let mut b = QpOut::new(dims).unwrap();
            let ia = owned.solve(&qp, &mut a).unwrap();
            let [m, w] = arena.regions_mut([memory, work]);
            let ib = external.solve_in(m, w, &qp, &mut b).unwrap();
            assert_eq!(ia.iter, ib.iter, "{kind}");
            assert_eq!(a.v(), b.v(), "{kind}");
            assert_eq!(b.info.iter, ib.iter);
        }
    }

    mod proptests {
        use super::*;
        use crate::residual::QpRes;
        use proptest::prelude::*;

        fn arb_dims() -> impl Strategy<Value = QpDims> {
            (1usize..8)
                .prop_flat_map(|nv| (Just(nv), 0..nv, 0..=nv, 0usize..5))
                .prop_map(|(nv, ne, nb, ng)| QpDims { nv, ne, nb, ng, ns: 0 })
        }

        proptest! {
            #[test]
            fn allocation_matches_footprint_and_solve_stays_inside(dims in arb_dims()) {
                let mut qp = QpIn::new(dims).unwrap();
                {
                    let v = qp.view_mut();
                    for i in 0..dims.nv {
                        v.h[i * dims.nv + i] = 1.0;
                    }
                    for r in 0..dims.ne {
                        v.a[r * dims.nv + r] = 1.0;
                    }
                    for (k, i) in v.idxb.iter_mut().enumerate() {
                        *i = k;
                    }
                    v.lb.fill(-1.0);
                    v.ub.fill(1.0);
                    v.lg.fill(f64::NEG_INFINITY);
                    v.ug.fill(f64::INFINITY);
                }
                prop_assert_eq!(qp.memory_bytes(), QpIn::footprint(&dims).bytes());
                let mut res = QpRes::new(dims).unwrap();
                prop_assert_eq!(res.memory_bytes(), QpRes::footprint(&dims).bytes());
                for &kind in QpSolverKind::ALL {
                    let Ok(backend) = resolve(kind) else { continue };
                    let opts = backend.default_options();
                    let mut solver = QpSolver::new(kind, dims, &opts).unwrap();
                    prop_assert_eq!(
                        solver.memory_bytes(),
                        QpSolver::footprint(backend, &dims).bytes()
                    );
                    let mut out = QpOut::new(dims).unwrap();
                    let info = solver.solve(&qp, &mut out).unwrap();
                    prop_assert!(info.status.is_success(), "{} on {:?}: {:?}", kind, dims, info);
                    prop_assert_eq!(out.memory_bytes(), QpOut::footprint(&dims).bytes());
                    let norms = res.compute(&qp, &out).unwrap();
                    prop_assert!(norms.max().is_finite());
                }
            }
        }
    }
}
