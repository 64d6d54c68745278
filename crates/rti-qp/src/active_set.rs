//! Dense dual active-set method (Goldfarb–Idnani).
//!
//! Works on the materialised rows `a_iᵀ v = b_i` (equalities first) and
//! `a_iᵀ v ≤ b_i` (the active one-sided inequality rows), starting from
//! the unconstrained minimum and adding the most violated row each outer
//! iteration. `J = L⁻ᵀ` and the packed factor `R` are updated with Givens
//! rotations as rows enter and leave the active set.
//!
//! Triangular factors here use column-major storage: entry `(i, j)` of an
//! `n × n` factor lives at `j * n + i`. The backend keeps no warm-start
//! data, so its memory footprint is empty.

use rti_arena::{Carver, Footprint};
use rti_core::{QpDims, QpSolverKind};

use crate::backend::QpBackend;
use crate::linalg::{add_diagonal, axpy, dot};
use crate::options::{ActiveSetOptions, QpBackendOptions, QpCommonOptions, QpSolverOptions};
use crate::qp_in::{QpInView, RowSide};
use crate::qp_out::{QpInfo, QpOutView, QpStatus};

/// The dual active-set backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActiveSet;

fn materialised_rows(d: &QpDims) -> usize {
    d.ne + 2 * d.nb + 2 * d.ng
}

struct Work<'a> {
    jmat: &'a mut [f64],
    amat: &'a mut [f64],
    bvec: &'a mut [f64],
    direc_of: &'a mut [f64],
    sv: &'a mut [f64],
    nbv: &'a mut [f64],
    sol: &'a mut [f64],
    dv: &'a mut [f64],
    zv: &'a mut [f64],
    rv: &'a mut [f64],
    uv: &'a mut [f64],
    rmat: &'a mut [f64],
    iact: &'a mut [usize],
    rowmap: &'a mut [usize],
}

impl<'a> Work<'a> {
    fn footprint(d: &QpDims) -> Footprint {
        let (n, q) = (d.nv, materialised_rows(d));
        let r = n.min(q);
        Footprint::reals(n * n)
            + Footprint::reals(q * n)
            + Footprint::reals(q).repeat(4)
            + Footprint::reals(n).repeat(3)
            + Footprint::reals(r).repeat(2)
            + Footprint::reals(r * (r + 1) / 2)
            + Footprint::indices(r)
            + Footprint::indices(q)
    }

    fn carve(d: &QpDims, mut c: Carver<'a>) -> Self {
        let (n, q) = (d.nv, materialised_rows(d));
        let r = n.min(q);
        let work = Self {
            jmat: c.reals(n * n),
            amat: c.reals(q * n),
            bvec: c.reals(q),
            direc_of: c.reals(q),
            sv: c.reals(q),
            nbv: c.reals(q),
            sol: c.reals(n),
            dv: c.reals(n),
            zv: c.reals(n),
            rv: c.reals(r),
            uv: c.reals(r),
            rmat: c.reals(r * (r + 1) / 2),
            iact: c.indices(r),
            rowmap: c.indices(q),
        };
        c.finish(Self::footprint(d));
        work
    }
}

// ── Factor updates ─────────────────────────────────────────────────

/// Upper Cholesky factor `R` with `A = RᵀR`, in place.
fn upper_cholesky(mat: &mut [f64], n: usize) -> bool {
    for j in 0..n {
        for k in 0..j {
            let s = dot(&mat[k * n..k * n + k], &mat[j * n..j * n + k]);
            mat[j * n + k] = (mat[j * n + k] - s) / mat[k * n + k];
        }
        let s = mat[j * n + j] - dot(&mat[j * n..j * n + j], &mat[j * n..j * n + j]);
        if !(s > 0.0 && s.is_finite()) {
            return false;
        }
        mat[j * n + j] = s.sqrt();
    }
    true
}

/// `x ← R⁻¹ x`.
fn solve_upper(mat: &[f64], n: usize, x: &mut [f64]) {
    for k in (0..n).rev() {
        x[k] /= mat[k * n + k];
        let xk = x[k];
        axpy(-xk, &mat[k * n..k * n + k], &mut x[..k]);
    }
}

/// `x ← R⁻ᵀ x`.
fn solve_upper_transpose(mat: &[f64], n: usize, x: &mut [f64]) {
    for k in 0..n {
        x[k] -= dot(&mat[k * n..k * n + k], &x[..k]);
        x[k] /= mat[k * n + k];
    }
}

/// `R ← R⁻¹`, in place.
fn invert_upper(mat: &mut [f64], n: usize) {
    for k in 0..n {
        mat[k * n + k] = 1.0 / mat[k * n + k];
        let dk = mat[k * n + k];
        for v in &mut mat[k * n..k * n + k] {
            *v *= -dk;
        }
        let (left, right) = mat.split_at_mut(n + k * n);
        for j in 0..n - k - 1 {
            axpy(
                right[j * n + k],
                &left[k * n..k * n + k],
                &mut right[j * n..j * n + k],
            );
            right[j * n + k] *= left[k * n + k];
        }
    }
}

/// Neighbouring length-`len` windows on either side of `split`.
fn neighbours<T>(slice: &mut [T], split: usize, len: usize) -> (&mut [T], &mut [T]) {
    let (left, right) = slice.split_at_mut(split);
    (&mut left[split - len..], &mut right[..len])
}

/// Rotate `d` so its entries past `r` vanish, applying the same rotations
/// to the columns of `J`.
fn insert_column(r: usize, d: &mut [f64], jmat: &mut [f64], n: usize) {
    for i in (r..n).rev() {
        if d[i] == 0.0 {
            continue;
        }
        let (left, right) = neighbours(jmat, i * n, n);
        if d[i - 1] == 0.0 {
            d[i - 1] = d[i];
            left.swap_with_slice(right);
        } else {
            let h = d[i - 1].hypot(d[i]).copysign(d[i - 1]);
            let gc = d[i - 1] / h;
            let gs = d[i] / h;
            let nu = d[i] / (d[i - 1] + h);
            d[i - 1] = h;
            for (li, ri) in left.iter_mut().zip(right.iter_mut()) {
                let t = gc * *li + gs * *ri;
                *ri = nu * (*li + t) - *ri;
                *li = t;
            }
        }
    }
}

/// Drop column `col` (1-based) of the packed `r × r` factor and restore
/// its triangular shape, rotating the columns of `J` to match.
fn delete_column(col: usize, jmat: &mut [f64], n: usize, rmat: &mut [f64], r: usize) {
    for i in col..r {
        let di = i * (i + 1) / 2;
        let l = di + i;
        if rmat[l] == 0.0 {
            continue;
        }
        let (left, right) = neighbours(jmat, i * n, n);
        if rmat[l - 1] == 0.0 {
            let mut ind = l;
            for j in i + 1..=r {
                rmat.swap(ind - 1, ind);
                ind += j;
            }
            left.swap_with_slice(right);
        } else {
            let h = rmat[l - 1].hypot(rmat[l]).copysign(rmat[l - 1]);
            let gc = rmat[l - 1] / h;
            let gs = rmat[l] / h;
            let nu = rmat[l] / (rmat[l - 1] + h);
            let mut ind = l;
            for j in i + 1..=r {
                let t = gc * rmat[ind - 1] + gs * rmat[ind];
                rmat[ind] = nu * (rmat[ind - 1] + t) - rmat[ind];
                rmat[ind - 1] = t;
                ind += j;
            }
            for (li, ri) in left.iter_mut().zip(right.iter_mut()) {
                let t = gc * *li + gs * *ri;
                *ri = nu * (*li + t) - *ri;
                *li = t;
            }
        }
        let (left, right) = neighbours(rmat, di, i);
        left.swap_with_slice(right);
    }
}

// ── Backend ────────────────────────────────────────────────────────

impl QpBackend for ActiveSet {
    fn kind(&self) -> QpSolverKind {
        QpSolverKind::ActiveSet
    }

    fn default_options(&self) -> QpSolverOptions {
        QpSolverOptions {
            common: QpCommonOptions {
                max_iter: 1000,
                ..QpCommonOptions::default()
            },
            backend: QpBackendOptions::ActiveSet(ActiveSetOptions::default()),
        }
    }

    fn memory_footprint(&self, _dims: &QpDims) -> Footprint {
        Footprint::ZERO
    }

    fn workspace_footprint(&self, dims: &QpDims) -> Footprint {
        Work::footprint(dims)
    }

    fn initialize_memory(&self, _dims: &QpDims, memory: Carver<'_>) {
        memory.finish(Footprint::ZERO);
    }

    fn solve(
        &self,
        qp_in: &QpInView<'_>,
        qp_out: &mut QpOutView<'_>,
        opts: &QpSolverOptions,
        memory: Carver<'_>,
        work: Carver<'_>,
    ) -> QpInfo {
        memory.finish(Footprint::ZERO);
        let d = *qp_in.dims();
        let shift = match &opts.backend {
            QpBackendOptions::ActiveSet(p) => p.hessian_shift,
            _ => 0.0,
        };
        let work = Work::carve(&d, work);
        qp_out.zero();
        if qp_in.has_inconsistent_bounds() {
            return QpInfo {
                status: QpStatus::Infeasible,
                ..QpInfo::default()
            };
        }
        run(qp_in, qp_out, &opts.common, shift, work)
    }
}

fn run(
    qp_in: &QpInView<'_>,
    qp_out: &mut QpOutView<'_>,
    common: &QpCommonOptions,
    shift: f64,
    work: Work<'_>,
) -> QpInfo {
    let QpDims { nv: n, ne, .. } = *qp_in.dims();
    let rows = qp_in.inequality_rows();
    let Work {
        jmat,
        amat,
        bvec,
        direc_of,
        sv,
        nbv,
        sol,
        dv,
        zv,
        rv,
        uv,
        rmat,
        iact,
        rowmap,
    } = work;
    if n == 0 {
        return QpInfo::default();
    }

    amat[..ne * n].copy_from_slice(qp_in.a());
    bvec[..ne].copy_from_slice(qp_in.b());
    let mut q = ne;
    for r in 0..rows.len() {
        if rows.is_active(r) {
            rows.write_row(r, &mut amat[q * n..(q + 1) * n]);
            bvec[q] = rows.rhs(r);
            rowmap[q] = r;
            q += 1;
        }
    }
    let amat = &amat[..q * n];
    let bvec = &bvec[..q];
    let (sv, nbv, direc_of) = (&mut sv[..q], &mut nbv[..q], &mut direc_of[..q]);

    jmat.copy_from_slice(qp_in.h());
    add_diagonal(jmat, n, shift);
    for (s, g) in sol.iter_mut().zip(qp_in.g()) {
        *s = -g;
    }
    if !upper_cholesky(jmat, n) {
        return QpInfo {
            status: QpStatus::NumericalFailure,
            ..QpInfo::default()
        };
    }
    solve_upper_transpose(jmat, n, sol);
    solve_upper(jmat, n, sol);
    invert_upper(jmat, n);
    for j in 0..n {
        for i in j + 1..n {
            jmat[j * n + i] = 0.0;
        }
    }

    for (norm, row) in nbv.iter_mut().zip(amat.chunks_exact(n)) {
        *norm = dot(row, row).sqrt();
    }

    let mut nact = 0;
    let mut iter = 0;
    let status = 'outer: loop {
        for ((row, b), s) in amat.chunks_exact(n).zip(bvec).zip(sv.iter_mut()) {
            *s = b - dot(sol, row);
        }
        for &i in &iact[..nact] {
            sv[i] = 0.0;
        }

        let mut iadd = q;
        let mut worst = 0.0;
        for (i, (&s, &norm)) in sv.iter().zip(nbv.iter()).enumerate() {
            if s < -worst * norm - f64::EPSILON {
                iadd = i;
                worst = -s / norm;
            } else if i < ne && s > worst * norm + f64::EPSILON {
                iadd = i;
                worst = s / norm;
            }
        }
        if iadd == q {
            break QpStatus::Success;
        }
        if iter >= common.max_iter {
            break QpStatus::MaxIter;
        }
        iter += 1;

        let aadd = &amat[iadd * n..(iadd + 1) * n];
        let mut slack = sv[iadd];
        let mut u = 0.0;
        let direc = slack.signum();
        direc_of[iadd] = direc;

        loop {
            for (d, jcol) in dv.iter_mut().zip(jmat.chunks_exact(n)) {
                *d = direc * dot(jcol, aadd);
            }
            zv.fill(0.0);
            for (jcol, &d) in jmat.chunks_exact(n).zip(dv.iter()).skip(nact) {
                axpy(d, jcol, zv);
            }
            let rv = &mut rv[..nact];
            rv.copy_from_slice(&dv[..nact]);
            for i in (0..nact).rev() {
                let start = i * (i + 1) / 2;
                rv[i] /= rmat[start + i];
                let ri = rv[i];
                axpy(-ri, &rmat[start..start + i], &mut rv[..i]);
            }

            let mut idel = nact;
            let mut t1 = f64::INFINITY;
            for (i, (&ui, &ri)) in uv[..nact].iter().zip(rv.iter()).enumerate() {
                if iact[i] >= ne && ri > 0.0 {
                    let t = ui / ri;
                    if t < t1 {
                        t1 = t;
                        idel = i;
                    }
                }
            }
            let t2 = if dot(zv, zv).abs() <= f64::EPSILON {
                f64::INFINITY
            } else {
                slack / dot(zv, aadd)
            };
            if t1 == f64::INFINITY && t2 == f64::INFINITY {
                break 'outer QpStatus::Infeasible;
            }
            let partial = t2 > t1;
            let step = if partial { t1 } else { t2 };

            axpy(step, zv, sol);
            axpy(-step, rv, &mut uv[..nact]);
            u += step;

            if !partial {
                break;
            }
            let rlen = nact * (nact + 1) / 2;
            delete_column(idel + 1, jmat, n, &mut rmat[..rlen], nact);
            uv.copy_within(idel + 1..nact, idel);
            iact.copy_within(idel + 1..nact, idel);
            nact -= 1;
            slack = bvec[iadd] - dot(sol, aadd);
        }

        if nact == uv.len() {
            break QpStatus::NumericalFailure;
        }
        uv[nact] = u;
        iact[nact] = iadd;
        nact += 1;
        insert_column(nact, dv, jmat, n);
        let start = nact * (nact - 1) / 2;
        rmat[start..start + nact].copy_from_slice(&dv[..nact]);
    };

    if status.is_success() || status == QpStatus::MaxIter {
        let out = qp_out.view_mut();
        out.v.copy_from_slice(sol);
        for k in 0..nact {
            let row = iact[k];
            let u = uv[k];
            if row < ne {
                out.y[row] = -direc_of[row] * u;
                continue;
            }
            match rows.side(rowmap[row]) {
                RowSide::BoxUpper(i) => out.lam_ub[i] = u,
                RowSide::BoxLower(i) => out.lam_lb[i] = u,
                RowSide::GeneralUpper(j) => out.lam_ug[j] = u,
                RowSide::GeneralLower(j) => out.lam_lg[j] = u,
            }
        }
    }
    QpInfo {
        status,
        iter,
        solve_us: 0,
    }
}
