//! Dense operator-splitting (ADMM) method.
//!
//! Solves the QP in the stacked form `l ≤ K v ≤ u` with
//! `K = [A; E; C]`, where `E` selects the boxed variables and equality
//! rows have `l = u = b`. Each iteration solves one linear system with the
//! fixed matrix `H + σI + Kᵀ R K` (factored once per solve), relaxes,
//! projects onto the bounds, and updates the duals.
//!
//! The iterate `(x, z, y)` is kept in backend memory after a successful
//! solve and reused when `warm_start` is on. Primal infeasibility is
//! detected from the dual-iterate difference.

use rti_arena::{Carver, Footprint};
use rti_core::{QpDims, QpSolverKind};

use crate::backend::QpBackend;
use crate::linalg::{add_diagonal, axpy, cholesky, cholesky_solve, dot, gemv, norm_inf};
use crate::options::{AdmmOptions, QpBackendOptions, QpCommonOptions, QpSolverOptions};
use crate::qp_in::QpInView;
use crate::qp_out::{QpInfo, QpOutView, QpStatus};

/// Penalty multiplier for equality rows.
const RHO_EQ_SCALE: f64 = 1e3;
/// Penalty for rows that are unbounded on both sides.
const RHO_MIN: f64 = 1e-6;

/// The ADMM backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct Admm;

fn stacked_rows(d: &QpDims) -> usize {
    d.ne + d.nb + d.ng
}

// ── Stacked constraint matrix ──────────────────────────────────────

struct Stacked<'q> {
    qp: &'q QpInView<'q>,
    nv: usize,
    ne: usize,
    nb: usize,
}

enum Row<'q> {
    Dense(&'q [f64]),
    Unit(usize),
}

impl<'q> Stacked<'q> {
    fn new(qp: &'q QpInView<'q>) -> Self {
        let d = qp.dims();
        Self {
            qp,
            nv: d.nv,
            ne: d.ne,
            nb: d.nb,
        }
    }

    fn row(&self, i: usize) -> Row<'q> {
        let nv = self.nv;
        if i < self.ne {
            Row::Dense(&self.qp.a()[i * nv..(i + 1) * nv])
        } else if i < self.ne + self.nb {
            Row::Unit(self.qp.idxb()[i - self.ne])
        } else {
            let j = i - self.ne - self.nb;
            Row::Dense(&self.qp.c()[j * nv..(j + 1) * nv])
        }
    }

    fn bounds(&self, i: usize) -> (f64, f64) {
        if i < self.ne {
            let b = self.qp.b()[i];
            (b, b)
        } else if i < self.ne + self.nb {
            let k = i - self.ne;
            (self.qp.lb()[k], self.qp.ub()[k])
        } else {
            let j = i - self.ne - self.nb;
            (self.qp.lg()[j], self.qp.ug()[j])
        }
    }

    fn dot(&self, i: usize, x: &[f64]) -> f64 {
        match self.row(i) {
            Row::Dense(r) => dot(r, x),
            Row::Unit(k) => x[k],
        }
    }

    fn axpy(&self, i: usize, alpha: f64, out: &mut [f64]) {
        match self.row(i) {
            Row::Dense(r) => axpy(alpha, r, out),
            Row::Unit(k) => out[k] += alpha,
        }
    }

    fn add_outer(&self, i: usize, w: f64, m: &mut [f64]) {
        let nv = self.nv;
        match self.row(i) {
            Row::Dense(r) => {
                for (p, &rp) in r.iter().enumerate() {
                    if rp != 0.0 {
                        axpy(w * rp, r, &mut m[p * nv..(p + 1) * nv]);
                    }
                }
            }
            Row::Unit(k) => m[k * nv + k] += w,
        }
    }
}

// ── Memory / workspace layout ──────────────────────────────────────

struct Memory<'a> {
    x: &'a mut [f64],
    z: &'a mut [f64],
    y: &'a mut [f64],
    flag: &'a mut [f64],
}

impl<'a> Memory<'a> {
    fn footprint(d: &QpDims) -> Footprint {
        let m = stacked_rows(d);
        Footprint::reals(d.nv) + Footprint::reals(m).repeat(2) + Footprint::reals(1)
    }

    fn carve(d: &QpDims, mut c: Carver<'a>) -> Self {
        let m = stacked_rows(d);
        let mem = Self {
            x: c.reals(d.nv),
            z: c.reals(m),
            y: c.reals(m),
            flag: c.reals(1),
        };
        c.finish(Self::footprint(d));
        mem
    }
}

struct Work<'a> {
    x: &'a mut [f64],
    xt: &'a mut [f64],
    rhs: &'a mut [f64],
    rd: &'a mut [f64],
    kt_dy: &'a mut [f64],
    z: &'a mut [f64],
    zt: &'a mut [f64],
    y: &'a mut [f64],
    dy: &'a mut [f64],
    rho: &'a mut [f64],
    lo: &'a mut [f64],
    up: &'a mut [f64],
    kkt: &'a mut [f64],
}

impl<'a> Work<'a> {
    fn footprint(d: &QpDims) -> Footprint {
        let m = stacked_rows(d);
        Footprint::reals(d.nv).repeat(5) + Footprint::reals(m).repeat(7) + Footprint::reals(d.nv * d.nv)
    }

    fn carve(d: &QpDims, mut c: Carver<'a>) -> Self {
        let m = stacked_rows(d);
        let work = Self {
            x: c.reals(d.nv),
            xt: c.reals(d.nv),
            rhs: c.reals(d.nv),
            rd: c.reals(d.nv),
            kt_dy: c.reals(d.nv),
            z: c.reals(m),
            zt: c.reals(m),
            y: c.reals(m),
            dy: c.reals(m),
            rho: c.reals(m),
            lo: c.reals(m),
            up: c.reals(m),
            kkt: c.reals(d.nv * d.nv),
        };
        c.finish(Self::footprint(d));
        work
    }
}

// ── Backend ────────────────────────────────────────────────────────

impl QpBackend for Admm {
    fn kind(&self) -> QpSolverKind {
        QpSolverKind::Admm
    }

    fn default_options(&self) -> QpSolverOptions {
        QpSolverOptions {
            common: QpCommonOptions {
                max_iter: 4000,
                ..QpCommonOptions::default()
            }
            .with_tolerance(1e-6),
            backend: QpBackendOptions::Admm(AdmmOptions::default()),
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
        mem.x.fill(0.0);
        mem.z.fill(0.0);
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
            QpBackendOptions::Admm(p) => p.clone(),
            _ => AdmmOptions::default(),
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
    params: &AdmmOptions,
    mem: Memory<'_>,
    work: Work<'_>,
) -> QpInfo {
    let d = *qp_in.dims();
    let (nv, ne, m) = (d.nv, d.ne, stacked_rows(&d));
    let k = Stacked::new(qp_in);
    let Work {
        x,
        xt,
        rhs,
        rd,
        kt_dy,
        z,
        zt,
        y,
        dy,
        rho,
        lo,
        up,
        kkt,
    } = work;
    let alpha = params.alpha;
    let sigma = params.sigma;

    for i in 0..m {
        let (l, u) = k.bounds(i);
        lo[i] = l;
        up[i] = u;
        rho[i] = if l == u {
            RHO_EQ_SCALE * params.rho
        } else if l == f64::NEG_INFINITY && u == f64::INFINITY {
            RHO_MIN
        } else {
            params.rho
        };
    }

    kkt.copy_from_slice(qp_in.h());
    add_diagonal(kkt, nv, sigma);
    for (i, &r) in rho.iter().enumerate() {
        k.add_outer(i, r, kkt);
    }
    if cholesky(kkt, nv).is_err() {
        return QpInfo {
            status: QpStatus::NumericalFailure,
            ..QpInfo::default()
        };
    }

    if common.warm_start && mem.flag[0] > 0.5 {
        x.copy_from_slice(mem.x);
        z.copy_from_slice(mem.z);
        y.copy_from_slice(mem.y);
    } else {
        x.fill(0.0);
        z.fill(0.0);
        y.fill(0.0);
    }

    let mut iter = 0;
    let status = loop {
        if iter >= common.max_iter {
            break QpStatus::MaxIter;
        }
        iter += 1;

        // x̃ = (H + σI + KᵀRK)⁻¹ (σx − g + Kᵀ(Rz − y))
        for ((r, xi), gi) in rhs.iter_mut().zip(x.iter()).zip(qp_in.g()) {
            *r = sigma * xi - gi;
        }
        for i in 0..m {
            k.axpy(i, rho[i] * z[i] - y[i], rhs);
        }
        xt.copy_from_slice(rhs);
        cholesky_solve(kkt, nv, xt);
        for (i, zi) in zt.iter_mut().enumerate() {
            *zi = k.dot(i, xt);
        }

        for (xi, xti) in x.iter_mut().zip(xt.iter()) {
            *xi = alpha * xti + (1.0 - alpha) * *xi;
        }
        for i in 0..m {
            let relaxed = alpha * zt[i] + (1.0 - alpha) * z[i];
            let z_next = (relaxed + y[i] / rho[i]).clamp(lo[i], up[i]);
            dy[i] = rho[i] * (relaxed - z_next);
            y[i] += dy[i];
            z[i] = z_next;
        }

        if !x.iter().chain(y.iter()).all(|v| v.is_finite()) {
            break QpStatus::NumericalFailure;
        }

        // Residuals.
        let mut prim_eq: f64 = 0.0;
        let mut prim_ineq: f64 = 0.0;
        for i in 0..m {
            let r = (k.dot(i, x) - z[i]).abs();
            if i < ne {
                prim_eq = prim_eq.max(r);
            } else {
                prim_ineq = prim_ineq.max(r);
            }
        }
        gemv(qp_in.h(), nv, nv, x, rd);
        axpy(1.0, qp_in.g(), rd);
        for (i, &yi) in y.iter().enumerate() {
            if yi != 0.0 {
                k.axpy(i, yi, rd);
            }
        }
        if prim_eq <= common.tol_eq && prim_ineq <= common.tol_ineq && norm_inf(rd) <= common.tol_stat {
            break QpStatus::Success;
        }

        if primal_infeasible(&k, dy, lo, up, kt_dy, params.eps_infeas) {
            break QpStatus::Infeasible;
        }
    };

    if status != QpStatus::NumericalFailure {
        let out = qp_out.view_mut();
        out.v.copy_from_slice(x);
        out.y.copy_from_slice(&y[..ne]);
        for (b, &yi) in y[ne..ne + d.nb].iter().enumerate() {
            out.lam_ub[b] = yi.max(0.0);
            out.lam_lb[b] = (-yi).max(0.0);
        }
        for (j, &yi) in y[ne + d.nb..].iter().enumerate() {
            out.lam_ug[j] = yi.max(0.0);
            out.lam_lg[j] = (-yi).max(0.0);
        }
    }
    if status.is_success() {
        mem.x.copy_from_slice(x);
        mem.z.copy_from_slice(z);
        mem.y.copy_from_slice(y);
        mem.flag[0] = 1.0;
    }
    QpInfo {
        status,
        iter,
        solve_us: 0,
    }
}

/// Certificate test on the last dual increment `dy`: `Kᵀdy ≈ 0` while
/// `uᵀdy₊ + lᵀdy₋ < 0`.
fn primal_infeasible(
    k: &Stacked<'_>,
    dy: &[f64],
    lo: &[f64],
    up: &[f64],
    kt_dy: &mut [f64],
    eps: f64,
) -> bool {
    let norm = norm_inf(dy);
    if norm <= f64::MIN_POSITIVE {
        return false;
    }
    kt_dy.fill(0.0);
    for (i, &di) in dy.iter().enumerate() {
        if di != 0.0 {
            k.axpy(i, di, kt_dy);
        }
    }
    if norm_inf(kt_dy) > eps * norm {
        return false;
    }
    let mut support = 0.0;
    for (i, &di) in dy.iter().enumerate() {
        let bound = if di > 0.0 { up[i] } else { lo[i] };
        if bound.is_finite() {
            support += bound * di;
        } else if di.abs() > eps * norm {
            return false;
        }
    }
    support < -eps * norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QpIn, QpOut, QpRes, QpSolver};

    fn dims(nv: usize, ne: usize, nb: usize, ng: usize) -> QpDims {
        QpDims {
            nv,
            ne,
            nb,
            ng,
            ns: 0,
        }
    }

    fn bound_problem() -> QpIn {
        let mut qp = QpIn::new(dims(2, 1, 1, 0)).unwrap();
        {
            let v = qp.view_mut();
            v.h.copy_from_slice(&[1.0, 0.0, 0.0, 1.0]);
            v.g.copy_from_slice(&[-1.0, 0.0]);
            v.a.copy_from_slice(&[1.0, 1.0]);
            v.b[0] = 1.0;
            v.idxb[0] = 0;
            v.lb[0] = f64::NEG_INFINITY;
            v.ub[0] = 0.75;
        }
        qp
    }

    #[test]
    fn solves_bound_constrained_problem() {
        let qp = bound_problem();
        let opts = Admm.default_options();
        let mut solver = QpSolver::new(QpSolverKind::Admm, *qp.dims(), &opts).unwrap();
        let mut out = QpOut::new(*qp.dims()).unwrap();
        let info = solver.solve(&qp, &mut out).unwrap();
        assert_eq!(info.status, QpStatus::Success);
        assert!((out.v()[0] - 0.75).abs() < 1e-4);
        assert!((out.lam_ub()[0] - 0.5).abs() < 1e-3);
        let mut res = QpRes::new(*qp.dims()).unwrap();
        assert!(res.compute(&qp, &out).unwrap().stat < 1e-4);
    }

    #[test]
    fn warm_start_does_not_need_more_iterations() {
        let qp = bound_problem();
        let mut opts = Admm.default_options();
        opts.common.warm_start = true;
        let mut solver = QpSolver::new(QpSolverKind::Admm, *qp.dims(), &opts).unwrap();
        let mut out = QpOut::new(*qp.dims()).unwrap();
        let cold = solver.solve(&qp, &mut out).unwrap();
        let warm = solver.solve(&qp, &mut out).unwrap();
        assert!(warm.status.is_success());
        assert!(warm.iter <= cold.iter, "warm {} > cold {}", warm.iter, cold.iter);
        solver.reset_warm_start();
        let again = solver.solve(&qp, &mut out).unwrap();
        assert_eq!(again.iter, cold.iter);
    }

    #[test]
    fn conflicting_general_rows_are_infeasible() {
        // v0 + v1 ≥ 2 and v0 + v1 ≤ 0 via two general rows
        let mut qp = QpIn::new(dims(2, 0, 0, 2)).unwrap();
        {
            let v = qp.view_mut();
            v.h.copy_from_slice(&[1.0, 0.0, 0.0, 1.0]);
            v.c.copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
            v.lg.copy_from_slice(&[2.0, f64::NEG_INFINITY]);
            v.ug.copy_from_slice(&[f64::INFINITY, 0.0]);
        }
        let opts = Admm.default_options();
        let mut solver = QpSolver::new(QpSolverKind::Admm, *qp.dims(), &opts).unwrap();
        let mut out = QpOut::new(*qp.dims()).unwrap();
        let info = solver.solve(&qp, &mut out).unwrap();
        assert_eq!(info.status, QpStatus::Infeasible);
    }

    #[test]
    fn indefinite_hessian_fails_factorization() {
        let mut qp = QpIn::new(dims(2, 0, 0, 0)).unwrap();
        qp.view_mut().h.copy_from_slice(&[1.0, 0.0, 0.0, -1.0]);
        let opts = Admm.default_options();
        let mut solver = QpSolver::new(QpSolverKind::Admm, *qp.dims(), &opts).unwrap();
        let mut out = QpOut::new(*qp.dims()).unwrap();
        let info = solver.solve(&qp, &mut out).unwrap();
        assert_eq!(info.status, QpStatus::NumericalFailure);
    }
}
