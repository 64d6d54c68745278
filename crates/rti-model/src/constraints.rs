//! The [`Constraints`] trait, stage bounds and the reference models.
//!
//! Stage constraints over `w = [u, x]` come in two families:
//!
//! ```text
//! lb ≤ w[idxb] ≤ ub          box rows      (nb)
//! lg ≤ h(u, x) ≤ ug          general rows  (ng)
//! ```
//!
//! Rows `0..nb` are the box rows and rows `nb..nb+ng` the general rows.
//! Any of them may be softened by listing it in `idxs`; a soft row gets a
//! slack `s ≥ 0` penalised by `½ z_quad s² + z_lin s`.

use nalgebra::DMatrix;
use rti_arena::{Carver, Footprint};
use rti_core::{ConstraintKind, ModelError};

use crate::dense::{check_shape, write_row_major};

fn invalid(reason: String) -> ModelError {
    ModelError::InvalidStructure { reason }
}

// ── Bounds ─────────────────────────────────────────────────────────

/// Bound data and soft-row structure of one stage.
///
/// Built with the `with_*` methods; each one validates what it adds.
#[derive(Clone, Debug, PartialEq)]
pub struct StageBounds {
    nx: usize,
    nu: usize,
    idxb: Vec<usize>,
    lb: Vec<f64>,
    ub: Vec<f64>,
    lg: Vec<f64>,
    ug: Vec<f64>,
    idxs: Vec<usize>,
    z_quad: Vec<f64>,
    z_lin: Vec<f64>,
}

impl StageBounds {
    /// No bounds on a stage with `nx` states and `nu` controls.
    pub fn new(nx: usize, nu: usize) -> Self {
        Self {
            nx,
            nu,
            idxb: Vec::new(),
            lb: Vec::new(),
            ub: Vec::new(),
            lg: Vec::new(),
            ug: Vec::new(),
            idxs: Vec::new(),
            z_quad: Vec::new(),
            z_lin: Vec::new(),
        }
    }

    /// Box rows `lb ≤ w[idxb] ≤ ub`. Indices address `w = [u, x]`.
    pub fn with_box(
        mut self,
        idxb: Vec<usize>,
        lb: Vec<f64>,
        ub: Vec<f64>,
    ) -> Result<Self, ModelError> {
        let nw = self.nu + self.nx;
        ModelError::check_len("lb", &lb, idxb.len())?;
        ModelError::check_len("ub", &ub, idxb.len())?;
        if let Some(&i) = idxb.iter().find(|&&i| i >= nw) {
            return Err(invalid(format!("box index {i} outside 0..{nw}")));
        }
        for (k, &i) in idxb.iter().enumerate() {
            if idxb[..k].contains(&i) {
                return Err(invalid(format!("box index {i} listed twice")));
            }
        }
        self.idxb = idxb;
        self.lb = lb;
        self.ub = ub;
        Ok(self)
    }

    /// Box rows on the states only. `idx` addresses `x`.
    pub fn with_state_box(
        self,
        idx: Vec<usize>,
        lb: Vec<f64>,
        ub: Vec<f64>,
    ) -> Result<Self, ModelError> {
        let nu = self.nu;
        let idxb = idx.into_iter().map(|i| nu + i).collect();
        self.with_box(idxb, lb, ub)
    }

    /// Bounds of the general rows. Their count fixes `ng`.
    pub fn with_general(mut self, lg: Vec<f64>, ug: Vec<f64>) -> Result<Self, ModelError> {
        ModelError::check_len("ug", &ug, lg.len())?;
        self.lg = lg;
        self.ug = ug;
        Ok(self)
    }

    /// Soften rows `idxs` (indices into `0..nb+ng`).
    pub fn with_soft(
        mut self,
        idxs: Vec<usize>,
        z_quad: Vec<f64>,
        z_lin: Vec<f64>,
    ) -> Result<Self, ModelError> {
        let rows = self.nb() + self.ng();
        ModelError::check_len("z_quad", &z_quad, idxs.len())?;
        ModelError::check_len("z_lin", &z_lin, idxs.len())?;
        if let Some(&i) = idxs.iter().find(|&&i| i >= rows) {
            return Err(invalid(format!("soft row {i} outside 0..{rows}")));
        }
        for (k, &i) in idxs.iter().enumerate() {
            if idxs[..k].contains(&i) {
                return Err(invalid(format!("soft row {i} listed twice")));
            }
        }
        if let Some(z) = z_quad.iter().find(|z| !(z.is_finite() && **z >= 0.0)) {
            return Err(invalid(format!("slack weight {z} must be finite and >= 0")));
        }
        self.idxs = idxs;
        self.z_quad = z_quad;
        self.z_lin = z_lin;
        Ok(self)
    }

    /// Replace `lb`, `ub`, `lg` or `ug` in place.
    pub fn set(&mut self, field: &str, values: &[f64]) -> Result<(), ModelError> {
        let target = match field {
            "lb" => &mut self.lb,
            "ub" => &mut self.ub,
            "lg" => &mut self.lg,
            "ug" => &mut self.ug,
            _ => return Err(ModelError::Unsupported { operation: "set" }),
        };
        ModelError::check_len("bounds", values, target.len())?;
        target.copy_from_slice(values);
        Ok(())
    }

    /// Number of states.
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Number of controls.
    pub fn nu(&self) -> usize {
        self.nu
    }

    /// Number of box rows.
    pub fn nb(&self) -> usize {
        self.idxb.len()
    }

    /// Number of general rows.
    pub fn ng(&self) -> usize {
        self.lg.len()
    }

    /// Number of soft rows.
    pub fn ns(&self) -> usize {
        self.idxs.len()
    }

    /// Box indices into `w = [u, x]`.
    pub fn idxb(&self) -> &[usize] {
        &self.idxb
    }

    /// Box lower bounds.
    pub fn lb(&self) -> &[f64] {
        &self.lb
    }

    /// Box upper bounds.
    pub fn ub(&self) -> &[f64] {
        &self.ub
    }

    /// General lower bounds.
    pub fn lg(&self) -> &[f64] {
        &self.lg
    }

    /// General upper bounds.
    pub fn ug(&self) -> &[f64] {
        &self.ug
    }

    /// Soft row indices into `0..nb+ng`.
    pub fn idxs(&self) -> &[usize] {
        &self.idxs
    }

    /// Quadratic slack weights.
    pub fn z_quad(&self) -> &[f64] {
        &self.z_quad
    }

    /// Linear slack weights.
    pub fn z_lin(&self) -> &[f64] {
        &self.z_lin
    }

    /// Lower and upper bound of row `r` in `0..nb+ng`.
    pub fn row_bounds(&self, r: usize) -> (f64, f64) {
        let nb = self.nb();
        if r < nb {
            (self.lb[r], self.ub[r])
        } else {
            (self.lg[r - nb], self.ug[r - nb])
        }
    }
}

// ── Trait ──────────────────────────────────────────────────────────

/// Output buffers of one constraint evaluation.
#[derive(Debug)]
pub struct ConstraintsOut<'a> {
    /// `h(u, x)`, length `ng`.
    pub h: &'a mut [f64],
    /// `[∂h/∂u  ∂h/∂x]`, row-major `ng × (nu + nx)`.
    pub jac: &'a mut [f64],
}

/// A stage constraint model.
///
/// Box rows are pure structure and live in [`StageBounds`]; only the
/// general rows are evaluated.
pub trait Constraints: Send + Sync {
    /// Which variant this model implements.
    fn kind(&self) -> ConstraintKind;

    /// Bounds and soft-row structure.
    fn bounds(&self) -> &StageBounds;

    /// Mutable bounds, for per-call updates such as the initial state.
    fn bounds_mut(&mut self) -> &mut StageBounds;

    /// Scratch needed by one evaluation.
    fn workspace_footprint(&self) -> Footprint {
        Footprint::ZERO
    }

    /// Replace a named parameter vector. Default: the bound vectors.
    fn set(&mut self, field: &str, values: &[f64]) -> Result<(), ModelError> {
        self.bounds_mut().set(field, values)
    }

    /// Evaluate the general rows and their Jacobian at `(x, u)`.
    fn evaluate(
        &self,
        x: &[f64],
        u: &[f64],
        out: ConstraintsOut<'_>,
        work: Carver<'_>,
    ) -> Result<(), ModelError>;
}

// ── Linear ─────────────────────────────────────────────────────────

/// Box rows plus `lg ≤ C [u; x] ≤ ug`.
#[derive(Clone, Debug)]
pub struct LinearConstraints {
    bounds: StageBounds,
    c: DMatrix<f64>,
}

impl LinearConstraints {
    /// General rows given by `C` (`ng × (nu + nx)`).
    pub fn new(bounds: StageBounds, c: DMatrix<f64>) -> Result<Self, ModelError> {
        check_shape("C", &c, bounds.ng(), bounds.nu() + bounds.nx())?;
        Ok(Self { bounds, c })
    }

    /// Box rows only. `bounds` must carry no general rows.
    pub fn boxes(bounds: StageBounds) -> Result<Self, ModelError> {
        let c = DMatrix::zeros(0, bounds.nu() + bounds.nx());
        Self::new(bounds, c)
    }
}

impl Constraints for LinearConstraints {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Linear
    }

    fn bounds(&self) -> &StageBounds {
        &self.bounds
    }

    fn bounds_mut(&mut self) -> &mut StageBounds {
        &mut self.bounds
    }

    fn evaluate(
        &self,
        x: &[f64],
        u: &[f64],
        out: ConstraintsOut<'_>,
        work: Carver<'_>,
    ) -> Result<(), ModelError> {
        let nu = self.bounds.nu();
        ModelError::check_len("x", x, self.bounds.nx())?;
        ModelError::check_len("u", u, nu)?;
        for (i, hi) in out.h.iter_mut().enumerate() {
            let mut s = 0.0;
            for (j, uj) in u.iter().enumerate() {
                s += self.c[(i, j)] * uj;
            }
            for (j, xj) in x.iter().enumerate() {
                s += self.c[(i, nu + j)] * xj;
            }
            *hi = s;
        }
        write_row_major(&self.c, out.jac);
        work.finish(Footprint::ZERO);
        Ok(())
    }
}

// ── Nonlinear ──────────────────────────────────────────────────────

/// A user constraint function `h(u, x)` with its Jacobian.
pub trait ConstraintMap: Send + Sync {
    /// Number of general rows.
    fn ng(&self) -> usize;

    /// Write `h(u, x)` and `[∂h/∂u  ∂h/∂x]` (row-major).
    fn eval(&self, x: &[f64], u: &[f64], h: &mut [f64], jac: &mut [f64])
        -> Result<(), ModelError>;
}

/// Box rows plus `lg ≤ h(u, x) ≤ ug` for a [`ConstraintMap`].
#[derive(Clone, Debug)]
pub struct NonlinearConstraints<M> {
    bounds: StageBounds,
    map: M,
}

impl<M: ConstraintMap> NonlinearConstraints<M> {
    /// Pair `map` with `bounds`; row counts must agree.
    pub fn new(bounds: StageBounds, map: M) -> Result<Self, ModelError> {
        if map.ng() != bounds.ng() {
            return Err(ModelError::DimensionMismatch {
                what: "general rows",
                expected: bounds.ng(),
                found: map.ng(),
            });
        }
        Ok(Self { bounds, map })
    }
}

impl<M: ConstraintMap> Constraints for NonlinearConstraints<M> {
    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Nonlinear
    }

    fn bounds(&self) -> &StageBounds {
        &self.bounds
    }

    fn bounds_mut(&mut self) -> &mut StageBounds {
        &mut self.bounds
    }

    fn evaluate(
        &self,
        x: &[f64],
        u: &[f64],
        out: ConstraintsOut<'_>,
        work: Carver<'_>,
    ) -> Result<(), ModelError> {
        work.finish(Footprint::ZERO);
        self.map.eval(x, u, out.h, out.jac)?;
        ModelError::check_finite("constraint value", out.h)?;
        ModelError::check_finite("constraint jacobian", out.jac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_indices_are_validated() {
        let b = StageBounds::new(2, 1);
        assert!(b.clone().with_box(vec![3], vec![0.0], vec![1.0]).is_err());
        assert!(b
            .clone()
            .with_box(vec![1, 1], vec![0.0; 2], vec![1.0; 2])
            .is_err());
        assert!(b.clone().with_box(vec![0], vec![0.0, 1.0], vec![1.0]).is_err());
        let ok = b.with_state_box(vec![1], vec![-1.0], vec![1.0]).unwrap();
        assert_eq!(ok.idxb(), &[2]);
        assert_eq!(ok.nb(), 1);
    }

    #[test]
    fn soft_rows_address_box_then_general() {
        let b = StageBounds::new(1, 1)
            .with_box(vec![0], vec![-1.0], vec![1.0])
            .unwrap()
            .with_general(vec![0.0], vec![2.0])
            .unwrap();
        assert_eq!(b.row_bounds(0), (-1.0, 1.0));
        assert_eq!(b.row_bounds(1), (0.0, 2.0));
        assert!(b.clone().with_soft(vec![2], vec![1.0], vec![0.0]).is_err());
        assert!(b.clone().with_soft(vec![1], vec![-1.0], vec![0.0]).is_err());
        let soft = b.with_soft(vec![1], vec![10.0], vec![0.5]).unwrap();
        assert_eq!(soft.ns(), 1);
        assert_eq!(soft.z_quad(), &[10.0]);
    }

    #[test]
    fn bound_vectors_are_settable() {
        let mut c = LinearConstraints::boxes(
            StageBounds::new(2, 0)
                .with_state_box(vec![0, 1], vec![0.0; 2], vec![0.0; 2])
                .unwrap(),
        )
        .unwrap();
        c.set("lb", &[1.0, 2.0]).unwrap();
        c.set("ub", &[1.0, 2.0]).unwrap();
        assert_eq!(c.bounds().lb(), &[1.0, 2.0]);
        assert!(matches!(
            c.set("lb", &[1.0]),
            Err(ModelError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            c.set("idxb", &[1.0]),
            Err(ModelError::Unsupported { .. })
        ));
    }

    #[test]
    fn linear_rows_evaluate_c_times_w() {
        let bounds = StageBounds::new(2, 1)
            .with_general(vec![0.0], vec![1.0])
            .unwrap();
        let c = LinearConstraints::new(bounds, DMatrix::from_row_slice(1, 3, &[1.0, 2.0, 3.0]))
            .unwrap();
        let (mut h, mut jac) = ([0.0], [0.0; 3]);
        c.evaluate(
            &[1.0, -1.0],
            &[0.5],
            ConstraintsOut {
                h: &mut h,
                jac: &mut jac,
            },
            Carver::new(&mut [], &mut []),
        )
        .unwrap();
        assert_eq!(h, [0.5 + 2.0 - 3.0]);
        assert_eq!(jac, [1.0, 2.0, 3.0]);
        assert!(LinearConstraints::new(
            StageBounds::new(2, 1),
            DMatrix::zeros(1, 3)
        )
        .is_err());
    }

    struct Disk;

    impl ConstraintMap for Disk {
        fn ng(&self) -> usize {
            1
        }

        fn eval(
            &self,
            x: &[f64],
            _u: &[f64],
            h: &mut [f64],
            jac: &mut [f64],
        ) -> Result<(), ModelError> {
            h[0] = x[0] * x[0] + x[1] * x[1];
            jac.copy_from_slice(&[2.0 * x[0], 2.0 * x[1]]);
            Ok(())
        }
    }

    #[test]
    fn nonlinear_rows_check_counts() {
        let bounds = StageBounds::new(2, 0)
            .with_general(vec![f64::NEG_INFINITY], vec![1.0])
            .unwrap();
        let c = NonlinearConstraints::new(bounds, Disk).unwrap();
        assert_eq!(c.kind(), ConstraintKind::Nonlinear);
        let (mut h, mut jac) = ([0.0], [0.0; 2]);
        c.evaluate(
            &[1.0, 2.0],
            &[],
            ConstraintsOut {
                h: &mut h,
                jac: &mut jac,
            },
            Carver::new(&mut [], &mut []),
        )
        .unwrap();
        assert_eq!(h, [5.0]);
        assert_eq!(jac, [2.0, 4.0]);
        assert!(NonlinearConstraints::new(StageBounds::new(2, 0), Disk).is_err());
    }
}
