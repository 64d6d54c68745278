//! Dense kernels on row-major slices.
//!
//! Everything here works on caller-provided storage so that the solve
//! path never allocates. Matrices are row-major: entry `(i, j)` of an
//! `r × c` matrix lives at `i * c + j`.

/// The matrix is not positive definite (a pivot was not positive).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotPositiveDefinite {
    /// Row of the failing pivot.
    pub pivot: usize,
}

/// `xᵀ y`.
#[inline]
pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

/// `y ← a x + y`.
#[inline]
pub fn axpy(a: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += a * xi;
    }
}

/// `‖x‖∞`, or `0` for an empty slice.
#[inline]
pub fn norm_inf(x: &[f64]) -> f64 {
    x.iter().fold(0.0, |m: f64, v| m.max(v.abs()))
}

/// `y ← A x` for an `rows × cols` matrix.
pub fn gemv(a: &[f64], rows: usize, cols: usize, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(a.len(), rows * cols);
    if cols == 0 {
        y[..rows].fill(0.0);
        return;
    }
    for (yi, row) in y[..rows].iter_mut().zip(a.chunks_exact(cols)) {
        *yi = dot(row, x);
    }
}

/// `y ← y + alpha Aᵀ x` for an `rows × cols` matrix.
pub fn gemv_t_acc(alpha: f64, a: &[f64], rows: usize, cols: usize, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(a.len(), rows * cols);
    if cols == 0 {
        return;
    }
    for (row, xi) in a.chunks_exact(cols).zip(&x[..rows]) {
        axpy(alpha * xi, row, y);
    }
}

/// Lower Cholesky factorization in place: `A = L Lᵀ`.
///
/// Reads the lower triangle of `a` (`n × n`, symmetric) and overwrites it
/// with `L`. The strict upper triangle is not touched.
pub fn cholesky(a: &mut [f64], n: usize) -> Result<(), NotPositiveDefinite> {
    debug_assert_eq!(a.len(), n * n);
    for j in 0..n {
        let (done, rest) = a.split_at_mut(j * n);
        let row_j = &mut rest[..n];
        for k in 0..j {
            let row_k = &done[k * n..k * n + k + 1];
            row_j[k] = (row_j[k] - dot(&row_j[..k], &row_k[..k])) / row_k[k];
        }
        let s = row_j[j] - dot(&row_j[..j], &row_j[..j]);
        if !(s > 0.0 && s.is_finite()) {
            return Err(NotPositiveDefinite { pivot: j });
        }
        row_j[j] = s.sqrt();
    }
    Ok(())
}

/// Solve `L Lᵀ x = b` in place given the factor from [`cholesky`].
pub fn cholesky_solve(l: &[f64], n: usize, b: &mut [f64]) {
    debug_assert_eq!(l.len(), n * n);
    for i in 0..n {
        let row = &l[i * n..i * n + i + 1];
        b[i] = (b[i] - dot(&row[..i], &b[..i])) / row[i];
    }
    for i in (0..n).rev() {
        let mut s = b[i];
        for k in i + 1..n {
            s -= l[k * n + i] * b[k];
        }
        b[i] = s / l[i * n + i];
    }
}

/// Add `shift` to the diagonal of an `n × n` matrix.
pub fn add_diagonal(a: &mut [f64], n: usize, shift: f64) {
    for i in 0..n {
        a[i * n + i] += shift;
    }
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// On return `vals` holds the eigenvalues and the columns of `vecs` the
/// matching orthonormal eigenvectors (`A = V diag(λ) Vᵀ`). `a` is
/// destroyed. Returns the number of sweeps performed.
pub fn symmetric_eigen(
    a: &mut [f64],
    n: usize,
    vecs: &mut [f64],
    vals: &mut [f64],
    max_sweeps: usize,
) -> usize {
    debug_assert_eq!(a.len(), n * n);
    debug_assert_eq!(vecs.len(), n * n);
    vecs.fill(0.0);
    for i in 0..n {
        vecs[i * n + i] = 1.0;
    }
    let scale = a.iter().fold(0.0f64, |m, v| m.max(v.abs())).max(f64::MIN_POSITIVE);
    let mut sweeps = 0;
    while sweeps < max_sweeps {
        let mut off = 0.0;
        for p in 0..n {
            for q in p + 1..n {
                off += a[p * n + q] * a[p * n + q];
            }
        }
        if off.sqrt() <= 1e-15 * scale {
            break;
        }
        sweeps += 1;
        for p in 0..n {
            for q in p + 1..n {
                let apq = a[p * n + q];
                if apq.abs() <= f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[q * n + q] - a[p * n + p]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                rotate_columns(a, n, p, q, c, s);
                rotate_rows(a, n, p, q, c, s);
                rotate_columns(vecs, n, p, q, c, s);
            }
        }
    }
    for i in 0..n {
        vals[i] = a[i * n + i];
    }
    sweeps
}

fn rotate_columns(m: &mut [f64], n: usize, p: usize, q: usize, c: f64, s: f64) {
    for k in 0..n {
        let mkp = m[k * n + p];
        let mkq = m[k * n + q];
        m[k * n + p] = c * mkp - s * mkq;
        m[k * n + q] = s * mkp + c * mkq;
    }
}

fn rotate_rows(m: &mut [f64], n: usize, p: usize, q: usize, c: f64, s: f64) {
    for k in 0..n {
        let mpk = m[p * n + k];
        let mqk = m[q * n + k];
        m[p * n + k] = c * mpk - s * mqk;
        m[q * n + k] = s * mpk + c * mqk;
    }
}

/// `A ← V diag(λ) Vᵀ`.
pub fn reconstruct_symmetric(a: &mut [f64], n: usize, vecs: &[f64], vals: &[f64]) {
    for i in 0..n {
        for j in 0..=i {
            let mut s = 0.0;
            for k in 0..n {
                s += vecs[i * n + k] * vals[k] * vecs[j * n + k];
            }
            a[i * n + j] = s;
            a[j * n + i] = s;
        }
    }
}
