//! Conversions between `nalgebra` matrices and row-major arena slices.

use nalgebra::{DMatrix, DVector};
use rti_core::ModelError;

/// Write `m` into `out` in row-major order.
pub(crate) fn write_row_major(m: &DMatrix<f64>, out: &mut [f64]) {
    let cols = m.ncols();
    for (i, row) in out.chunks_exact_mut(cols.max(1)).take(m.nrows()).enumerate() {
        for (j, o) in row.iter_mut().enumerate().take(cols) {
            *o = m[(i, j)];
        }
    }
}

/// `out = m · x`, `m` column-major, no allocation.
pub(crate) fn mat_vec(m: &DMatrix<f64>, x: &[f64], out: &mut [f64]) {
    for (i, o) in out.iter_mut().enumerate() {
        let mut s = 0.0;
        for (j, xj) in x.iter().enumerate() {
            s += m[(i, j)] * xj;
        }
        *o = s;
    }
}

/// Check that `m` is `rows × cols`.
pub(crate) fn check_shape(
    what: &'static str,
    m: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> Result<(), ModelError> {
    if m.nrows() != rows {
        return Err(ModelError::DimensionMismatch {
            what,
            expected: rows,
            found: m.nrows(),
        });
    }
    if m.ncols() != cols {
        return Err(ModelError::DimensionMismatch {
            what,
            expected: cols,
            found: m.ncols(),
        });
    }
    Ok(())
}

/// Check that `v` has `len` entries.
pub(crate) fn check_vec(what: &'static str, v: &DVector<f64>, len: usize) -> Result<(), ModelError> {
    ModelError::check_len(what, v.as_slice(), len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_layout() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut out = [0.0; 6];
        write_row_major(&m, &mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn mat_vec_matches_nalgebra() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let x = [1.0, -1.0];
        let mut out = [0.0; 2];
        mat_vec(&m, &x, &mut out);
        let expect = &m * DVector::from_column_slice(&x);
        assert_eq!(out.as_slice(), expect.as_slice());
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let m = DMatrix::<f64>::zeros(2, 3);
        assert!(check_shape("m", &m, 2, 3).is_ok());
        assert!(matches!(
            check_shape("m", &m, 3, 3),
            Err(ModelError::DimensionMismatch { expected: 3, found: 2, .. })
        ));
    }
}
