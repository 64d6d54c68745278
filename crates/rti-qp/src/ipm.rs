//! Dense primal-dual interior point method.
//!
//! Mehrotra predictor-corrector on the one-sided form
//!
//! ```text
//! min ½ vᵀHv + gᵀv   s.t.  A v = b,  G v + s = h,  s ≥ 0
//! ```
//!
//! where `G v ≤ h` are the active rows of
//! [`InequalityRows`](crate::InequalityRows). Each iteration eliminates
//! `s` and `λ`, factors `M = H + Gᵀ(Λ/S)G + reg·I`, and handles the
//! equality rows through the Schur complement `A M⁻¹ Aᵀ`. The factors
//! are shared between the predictor and corrector solves.
//!
//! A warm start reuses only `v` and `y` of the previous solution. Slacks
//! are recomputed from the new bounds and every multiplier restarts at
//! `mu0`, so the first iterate stays well inside the cone; a solution on
//! the boundary would stall the centering step.

use rti_arena::{Carver, Footprint};
use rti_core::{QpDims, QpSolverKind};

use crate::backend::QpBackend;
use crate::linalg::{
    add_diagonal, axpy, cholesky, cholesky_solve, dot, gemv, gemv_t_acc, norm_inf,
};
use crate::options::{IpmOptions, QpBackendOptions, QpCommonOptions, QpSolverOptions};
use crate::qp_in::{InequalityRows, QpInView, RowSide};
use crate::qp_out::{QpInfo, QpOutView, QpStatus};

const STEP_FRACTION: f64 = 0.995;
const DIVERGENCE: f64 = 1e12;

/// The interior-point backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct InteriorPoint;

// ── Memory / workspace layout ──────────────────────────────────────

struct Memory<'a> {
    v: &'a mut [f64],
    y: &'a mut [f64],
    flag: &'a mut [f64],
}

impl<'a> Memory<'a> {
    fn footprint(d: &QpDims) -> Footprint {
        Footprint::reals(d.nv) + Footprint::reals(d.ne) + Footprint::reals(1)
    }

    fn carve(d: &QpDims, mut c: Carver<'a>) -> Self {
        let mem = Self {
            v: c.reals(d.nv),
            y: c.reals(d.ne),
            flag: c.reals(1),
        };
        c.finish(Self::footprint(d));
        mem
    }

    fn has_prev(&self) -> bool {
        self.flag[0] > 0.5
    }
}

struct Work<'a> {
    act: &'a mut [usize],
    s: &'a mut [f64],
    lam: &'a mut [f64],
    ds: &'a mut [f64],
    dlam: &'a mut [f64],
    ds_aff: &'a mut [f64],
    dlam_aff: &'a mut [f64],
    ri: &'a mut [f64],
    rc: &'a mut [f64],
    v: &'a mut [f64],
    rd: &'a mut [f64],
    r1: &'a mut [f64],
    dv: &'a mut [f64],
    tmp: &'a mut [f64],
    y: &'a mut [f64],
    re: &'a mut [f64],
    dy: &'a mut [f64],
    m: &'a mut [f64],
    minv_at: &'a mut [f64],
    schur: &'a mut [f64],
}

impl<'a> Work<'a> {
    fn footprint(d: &QpDims) -> Footprint {
        let rows = 2 * d.nb + 2 * d.ng;
        Footprint::indices(rows)
            + Footprint::reals(rows).repeat(8)
            + Footprint::reals(d.nv).repeat(5)
            + Footprint::reals(d.ne).repeat(3)
            + Footprint::reals(d.nv * d.nv)
            + Footprint::reals(d.ne * d.nv)
            + Footprint::reals(d.ne * d.ne)
    }

    fn carve(d: &QpDims, mut c: Carver<'a>) -> Self {
        let rows = 2 * d.nb + 2 * d.ng;
        let work = Self {
            act: c.indices(rows),
            s: c.reals(rows),
            lam: c.reals(rows),
            ds: c.reals(rows),
            dlam: c.reals(rows),
            ds_aff: c.reals(rows),
            dlam_aff: c.reals(rows),
            ri: c.reals(rows),
            rc: c.reals(rows),
            v: c.reals(d.nv),
            rd: c.reals(d.nv),
            r1: c.reals(d.nv),
            dv: c.reals(d.nv),
            tmp: c.reals(d.nv),
            y: c.reals(d.ne),
            re: c.reals(d.ne),
            dy: c.reals(d.ne),
            m: c.reals(d.nv * d.nv),
            minv_at: c.reals(d.ne * d.nv),
            schur: c.reals(d.ne * d.ne),
        };
        c.finish(Self::footprint(d));
        work
    }
}

// ── Newton directions ──────────────────────────────────────────────

/// Factored Newton system of one iteration.
struct Newton<'r> {
    rows: &'r InequalityRows<'r>,
    act: &'r [usize],
    a: &'r [f64],
    nv: usize,
    ne: usize,
    chol_m: &'r [f64],
    minv_at: &'r [f64],
    chol_schur: &'r [f64],
}

/// Right-hand side and output buffers of one direction solve.
struct Direction<'b> {
    r1: &'b mut [f64],
    dv: &'b mut [f64],
    dy: &'b mut [f64],
    ds: &'b mut [f64],
    dlam: &'b mut [f64],
}

impl Newton<'_> {
    /// Solve for `(dv, dy, ds, dλ)` given the current residuals and the
    /// complementarity target `rc`.
    #[allow(clippy::too_many_arguments)]
    fn solve(
        &self,
        rd: &[f64],
        re: &[f64],
        ri: &[f64],
        s: &[f64],
        lam: &[f64],
        rc: &[f64],
        out: Direction<'_>,
    ) {
        let Direction {
            r1,
            dv,
            dy,
            ds,
            dlam,
        } = out;
        for (r, rd_k) in r1.iter_mut().zip(rd) {
            *r = -rd_k;
        }
        for (k, &r) in self.act.iter().enumerate() {
            let t = (lam[k] * ri[k] - rc[k]) / s[k];
            self.rows.axpy(r, -t, r1);
        }
        dv.copy_from_slice(r1);
        cholesky_solve(self.chol_m, self.nv, dv);
        if self.ne > 0 {
            gemv(self.a, self.ne, self.nv, dv, dy);
            for (dy_i, re_i) in dy.iter_mut().zip(re) {
                *dy_i += re_i;
            }
            cholesky_solve(self.chol_schur, self.ne, dy);
            gemv_t_acc(-1.0, self.minv_at, self.ne, self.nv, dy, dv);
        }
        for (k, &r) in self.act.iter().enumerate() {
            ds[k] = -ri[k] - self.rows.dot(r, dv);
            dlam[k] = (-rc[k] - lam[k] * ds[k]) / s[k];
        }
    }
}

/// Largest `α` keeping `x + α dx ≥ 0` componentwise (infinite if none
/// of `dx` is negative).
fn max_step(x: &[f64], dx: &[f64]) -> f64 {
    x.iter()
        .zip(dx)
        .filter(|(_, d)| **d < 0.0)
        .map(|(x, d)| -x / d)
        .fold(f64::INFINITY, f64::min)
}

fn all_finite(bufs: &[&[f64]]) -> bool {
    bufs.iter().all(|b| b.iter().all(|v| v.is_finite()))
}

// ── Backend ────────────────────────────────────────────────────────

impl QpBackend for InteriorPoint {
    fn kind(&self) -> QpSolverKind {
        QpSolverKind::InteriorPoint
    }

    fn default_options(&self) -> QpSolverOptions {
        QpSolverOptions {
            common: QpCommonOptions {
                max_iter: 100,
                ..QpCommonOptions::default()
            },
            backend: QpBackendOptions::InteriorPoint(IpmOptions::default()),
        }
    }

    fn memory_footprint(&self, dims: &QpDims) -> Footprint {
        Memory::footprint(dims)
    }

    fn workspace_footprint(&self, dims: &QpDims) -> Footprint {
        Work::footprint(dims)
    }

    fn initialize_memory(&self, dims: &QpDims, memory: Carver<'_>) {
        let mem = Memory::carve(dims, memory);
        mem.v.fill(0.0);
        mem.y.fill(0.0);
        mem.flag[0] = 0.0;
    }

    fn solve(
        &self,
        qp_in: &QpInView<'_>,
        qp_out: &mut QpOutView<'_>,
        opts: &QpSolverOptions,
        memory: Carver<'_>,
        work: Carver<'_>,
    ) -> QpInfo {
        let d = *qp_in.dims();
        let params = match &opts.backend {
            QpBackendOptions::InteriorPoint(p) => p.clone(),
            _ => IpmOptions::default(),
        };
        let mem = Memory::carve(&d, memory);
        let work = Work::carve(&d, work);
        qp_out.zero();
        if qp_in.has_inconsistent_bounds() {
            return QpInfo {
                status: QpStatus::Infeasible,
                ..QpInfo::default()
            };
        }
        run(qp_in, qp_out, &opts.common, &params, mem, work)
    }
}

fn run(
    qp_in: &QpInView<'_>,
    qp_out: &mut QpOutView<'_>,
    common: &QpCommonOptions,
    params: &IpmOptions,
    mem: Memory<'_>,
    work: Work<'_>,
) -> QpInfo {
    let QpDims { nv, ne, .. } = *qp_in.dims();
    let rows = qp_in.inequality_rows();
    let Work {
        act,
        s,
        lam,
        ds,
        dlam,
        ds_aff,
        dlam_aff,
        ri,
        rc,
        v,
        rd,
        r1,
        dv,
        tmp,
        y,
        re,
        dy,
        m,
        minv_at,
        schur,
    } = work;

    let mut na = 0;
    for r in 0..rows.len() {
        if rows.is_active(r) {
            act[na] = r;
            na += 1;
        }
    }
    let act = &act[..na];
    let (s, lam) = (&mut s[..na], &mut lam[..na]);
    let (ds, dlam) = (&mut ds[..na], &mut dlam[..na]);
    let (ds_aff, dlam_aff) = (&mut ds_aff[..na], &mut dlam_aff[..na]);
    let (ri, rc) = (&mut ri[..na], &mut rc[..na]);

    if common.warm_start && mem.has_prev() {
        v.copy_from_slice(mem.v);
        y.copy_from_slice(mem.y);
    } else {
        v.fill(0.0);
        y.fill(0.0);
    }
    for (k, &r) in act.iter().enumerate() {
        s[k] = (rows.rhs(r) - rows.dot(r, v)).max(params.mu0);
        lam[k] = params.mu0;
    }

    let mut iter = 0;
    let status = loop {
        gemv(qp_in.h(), nv, nv, v, rd);
        axpy(1.0, qp_in.g(), rd);
        gemv_t_acc(1.0, qp_in.a(), ne, nv, y, rd);
        for (k, &r) in act.iter().enumerate() {
            rows.axpy(r, lam[k], rd);
        }
        gemv(qp_in.a(), ne, nv, v, re);
        axpy(-1.0, qp_in.b(), re);
        for (k, &r) in act.iter().enumerate() {
            ri[k] = rows.dot(r, v) + s[k] - rows.rhs(r);
        }
        let mu = if na > 0 { dot(s, lam) / na as f64 } else { 0.0 };

        if !(mu.is_finite() && all_finite(&[&*v, &*y, &*rd, &*re, &*ri])) {
            break QpStatus::NumericalFailure;
        }
        if norm_inf(rd) <= common.tol_stat
            && norm_inf(re) <= common.tol_eq
            && norm_inf(ri) <= common.tol_ineq
            && mu <= common.tol_comp
        {
            break QpStatus::Success;
        }
        if iter >= common.max_iter {
            break QpStatus::MaxIter;
        }
        if norm_inf(lam) > DIVERGENCE {
            break QpStatus::Infeasible;
        }
        iter += 1;

        m.copy_from_slice(qp_in.h());
        add_diagonal(m, nv, params.reg);
        for (k, &r) in act.iter().enumerate() {
            rows.add_outer(r, lam[k] / s[k], m);
        }
        if cholesky(m, nv).is_err() {
            break QpStatus::NumericalFailure;
        }
        if ne > 0 {
            minv_at.copy_from_slice(qp_in.a());
            for row in minv_at.chunks_exact_mut(nv.max(1)) {
                cholesky_solve(m, nv, row);
            }
            let a = qp_in.a();
            for i in 0..ne {
                for j in 0..=i {
                    let sij = dot(&a[i * nv..(i + 1) * nv], &minv_at[j * nv..(j + 1) * nv]);
                    schur[i * ne + j] = sij;
                    schur[j * ne + i] = sij;
                }
            }
            add_diagonal(schur, ne, params.reg);
            if cholesky(schur, ne).is_err() {
                break QpStatus::NumericalFailure;
            }
        }

        let newton = Newton {
            rows: &rows,
            act,
            a: qp_in.a(),
            nv,
            ne,
            chol_m: m,
            minv_at,
            chol_schur: schur,
        };

        // Predictor.
        for k in 0..na {
            rc[k] = s[k] * lam[k];
        }
        newton.solve(
            rd,
            re,
            ri,
            s,
            lam,
            rc,
            Direction {
                r1,
                dv: tmp,
                dy,
                ds: ds_aff,
                dlam: dlam_aff,
            },
        );
        let alpha_aff = max_step(s, ds_aff).min(max_step(lam, dlam_aff)).min(1.0);
        let sigma = if na > 0 && mu > 0.0 {
            let mu_aff = (0..na)
                .map(|k| (s[k] + alpha_aff * ds_aff[k]) * (lam[k] + alpha_aff * dlam_aff[k]))
                .sum::<f64>()
                / na as f64;
            (mu_aff / mu).powi(3)
        } else {
            0.0
        };

        // Corrector.
        for k in 0..na {
            rc[k] = s[k] * lam[k] + ds_aff[k] * dlam_aff[k] - sigma * mu;
        }
        newton.solve(
            rd,
            re,
            ri,
            s,
            lam,
            rc,
            Direction {
                r1,
                dv,
                dy,
                ds,
                dlam,
            },
        );
        let alpha = (STEP_FRACTION * max_step(s, ds).min(max_step(lam, dlam))).min(1.0);

        axpy(alpha, dv, v);
        axpy(alpha, dy, y);
        axpy(alpha, ds, s);
        axpy(alpha, dlam, lam);
    };

    if status != QpStatus::NumericalFailure {
        let out = qp_out.view_mut();
        out.v.copy_from_slice(v);
        out.y.copy_from_slice(y);
        for (k, &r) in act.iter().enumerate() {
            match rows.side(r) {
                RowSide::BoxUpper(i) => out.lam_ub[i] = lam[k],
                RowSide::BoxLower(i) => out.lam_lb[i] = lam[k],
                RowSide::GeneralUpper(j) => out.lam_ug[j] = lam[k],
                RowSide::GeneralLower(j) => out.lam_lg[j] = lam[k],
            }
        }
    }
    if status.is_success() {
        mem.v.copy_from_slice(v);
        mem.y.copy_from_slice(y);
        mem.flag[0] = 1.0;
    }
    QpInfo {
        status,
        iter,
        solve_us: 0,
    }
}
