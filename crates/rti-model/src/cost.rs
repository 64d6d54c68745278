//! The [`Cost`] trait and the least-squares and external reference costs.
//!
//! A cost model returns the stage objective `ℓ(u, x)`, its gradient and a
//! Hessian approximation over `w = [u, x]`, all multiplied by the stage
//! `scaling` option. Least-squares costs use the Gauss–Newton Hessian
//! `Jᵀ W J`, which is positive semi-definite whenever `W` is.

use nalgebra::{DMatrix, DVector};
use rti_arena::{Carver, Footprint};
use rti_core::{CostKind, ModelError};

use crate::dense::{check_shape, check_vec, write_row_major};
use crate::options::CostOptions;

/// Output buffers of one cost evaluation.
#[derive(Debug)]
pub struct CostOut<'a> {
    /// `∇ℓ`, length `nu + nx`.
    pub grad: &'a mut [f64],
    /// Hessian approximation, row-major `(nu + nx) × (nu + nx)`.
    pub hess: &'a mut [f64],
}

/// A stage objective.
///
/// # Contract
///
/// - `precompute()` runs once before the first evaluation and may fill
///   `memory`, a region of exactly [`memory_len`](Cost::memory_len)
///   reals that `evaluate()` later reads.
/// - `evaluate()` MUST overwrite both output buffers and return the
///   scaled objective value.
pub trait Cost: Send + Sync {
    /// Which variant this model implements.
    fn kind(&self) -> CostKind;

    /// Number of states.
    fn nx(&self) -> usize;

    /// Number of controls.
    fn nu(&self) -> usize;

    /// Persistent reals filled by [`precompute`](Cost::precompute).
    fn memory_len(&self) -> usize {
        0
    }

    /// Structure-only setup.
    fn precompute(&self, memory: &mut [f64]) -> Result<(), ModelError> {
        let _ = memory;
        Ok(())
    }

    /// Scratch needed by one evaluation.
    fn workspace_footprint(&self) -> Footprint {
        Footprint::ZERO
    }

    /// Replace a named parameter vector.
    ///
    /// Default: every field is unsupported.
    fn set(&mut self, field: &str, values: &[f64]) -> Result<(), ModelError> {
        let _ = (field, values);
        Err(ModelError::Unsupported { operation: "set" })
    }

    /// Evaluate value, gradient and Hessian at `(x, u)`.
    fn evaluate(
        &self,
        x: &[f64],
        u: &[f64],
        opts: &CostOptions,
        memory: &[f64],
        out: CostOut<'_>,
        work: Carver<'_>,
    ) -> Result<f64, ModelError>;
}

fn set_reference(y_ref: &mut DVector<f64>, field: &str, values: &[f64]) -> Result<(), ModelError> {
    match field {
        "y_ref" => {
            ModelError::check_len("y_ref", values, y_ref.len())?;
            y_ref.copy_from_slice(values);
            Ok(())
        }
        _ => Err(ModelError::Unsupported { operation: "set" }),
    }
}

/// `wr = W r` without allocating.
fn weight(w: &DMatrix<f64>, r: &[f64], wr: &mut [f64]) {
    for (i, o) in wr.iter_mut().enumerate() {
        *o = r.iter().enumerate().map(|(j, rj)| w[(i, j)] * rj).sum();
    }
}

// ── Linear least squares ───────────────────────────────────────────

/// `ℓ = ½ ‖Vu u + Vx x − y_ref‖²_W` with a constant Hessian.
///
/// The Gauss–Newton Hessian `Vᵀ W V` is formed once in
/// [`precompute`](Cost::precompute) and copied on every evaluation.
#[derive(Clone, Debug)]
pub struct LinearLsCost {
    vx: DMatrix<f64>,
    vu: DMatrix<f64>,
    w: DMatrix<f64>,
    y_ref: DVector<f64>,
}

impl LinearLsCost {
    /// Build from `Vx` (`ny × nx`), `Vu` (`ny × nu`) and `W` (`ny × ny`).
    pub fn new(vx: DMatrix<f64>, vu: DMatrix<f64>, w: DMatrix<f64>) -> Result<Self, ModelError> {
        let ny = vx.nrows();
        check_shape("Vu", &vu, ny, vu.ncols())?;
        check_shape("W", &w, ny, ny)?;
        Ok(Self {
            vx,
            vu,
            w,
            y_ref: DVector::zeros(ny),
        })
    }

    /// Set the reference `y_ref`.
    pub fn with_y_ref(mut self, y_ref: DVector<f64>) -> Result<Self, ModelError> {
        check_vec("y_ref", &y_ref, self.w.nrows())?;
        self.y_ref = y_ref;
        Ok(self)
    }

    fn ny(&self) -> usize {
        self.w.nrows()
    }
}

impl Cost for LinearLsCost {
    fn kind(&self) -> CostKind {
        CostKind::LinearLs
    }

    fn nx(&self) -> usize {
        self.vx.ncols()
    }

    fn nu(&self) -> usize {
        self.vu.ncols()
    }

    fn memory_len(&self) -> usize {
        let nw = self.nu() + self.nx();
        nw * nw
    }

    fn precompute(&self, memory: &mut [f64]) -> Result<(), ModelError> {
        let (nu, nw) = (self.nu(), self.nu() + self.nx());
        ModelError::check_len("linear_ls memory", memory, nw * nw)?;
        let v = DMatrix::from_fn(self.ny(), nw, |i, j| {
            if j < nu {
                self.vu[(i, j)]
            } else {
                self.vx[(i, j - nu)]
            }
        });
        let h = v.transpose() * &self.w * &v;
        write_row_major(&h, memory);
        Ok(())
    }

    fn workspace_footprint(&self) -> Footprint {
        Footprint::reals(self.ny()).repeat(2)
    }

    fn set(&mut self, field: &str, values: &[f64]) -> Result<(), ModelError> {
        set_reference(&mut self.y_ref, field, values)
    }

    fn evaluate(
        &self,
        x: &[f64],
        u: &[f64],
        opts: &CostOptions,
        memory: &[f64],
        out: CostOut<'_>,
        mut work: Carver<'_>,
    ) -> Result<f64, ModelError> {
        let (nu, ny) = (self.nu(), self.ny());
        ModelError::check_len("x", x, self.nx())?;
        ModelError::check_len("u", u, nu)?;
        let r = work.reals(ny);
        let wr = work.reals(ny);
        work.finish(self.workspace_footprint());

        for (i, ri) in r.iter_mut().enumerate() {
            let mut s = -self.y_ref[i];
            for (j, uj) in u.iter().enumerate() {
                s += self.vu[(i, j)] * uj;
            }
            for (j, xj) in x.iter().enumerate() {
                s += self.vx[(i, j)] * xj;
            }
            *ri = s;
        }
        weight(&self.w, r, wr);

        let scale = opts.scaling;
        for (j, g) in out.grad.iter_mut().enumerate() {
            let col = |i: usize| {
                if j < nu {
                    self.vu[(i, j)]
                } else {
                    self.vx[(i, j - nu)]
                }
            };
            *g = scale * (0..ny).map(|i| col(i) * wr[i]).sum::<f64>();
        }
        for (h, m) in out.hess.iter_mut().zip(memory) {
            *h = scale * m;
        }
        let value: f64 = r.iter().zip(wr.iter()).map(|(a, b)| a * b).sum();
        Ok(0.5 * scale * value)
    }
}

// ── Nonlinear least squares ────────────────────────────────────────

/// A residual map `y(u, x)` with its Jacobian.
pub trait LsResidual: Send + Sync {
    /// Number of residuals.
    fn ny(&self) -> usize;

    /// Number of states.
    fn nx(&self) -> usize;

    /// Number of controls.
    fn nu(&self) -> usize;

    /// Write `y(u, x)` and `[∂y/∂u  ∂y/∂x]` (row-major `ny × (nu + nx)`).
    fn eval(&self, x: &[f64], u: &[f64], y: &mut [f64], jac: &mut [f64])
        -> Result<(), ModelError>;
}

/// `ℓ = ½ ‖y(u, x) − y_ref‖²_W` with the Gauss–Newton Hessian.
#[derive(Clone, Debug)]
pub struct NonlinearLsCost<R> {
    residual: R,
    w: DMatrix<f64>,
    y_ref: DVector<f64>,
}

impl<R: LsResidual> NonlinearLsCost<R> {
    /// Weight `residual` by `W` (`ny × ny`).
    pub fn new(residual: R, w: DMatrix<f64>) -> Result<Self, ModelError> {
        let ny = residual.ny();
        check_shape("W", &w, ny, ny)?;
        Ok(Self {
            residual,
            w,
            y_ref: DVector::zeros(ny),
        })
    }

    /// Set the reference `y_ref`.
    pub fn with_y_ref(mut self, y_ref: DVector<f64>) -> Result<Self, ModelError> {
        check_vec("y_ref", &y_ref, self.residual.ny())?;
        self.y_ref = y_ref;
        Ok(self)
    }
}

impl<R: LsResidual> Cost for NonlinearLsCost<R> {
    fn kind(&self) -> CostKind {
        CostKind::NonlinearLs
    }

    fn nx(&self) -> usize {
        self.residual.nx()
    }

    fn nu(&self) -> usize {
        self.residual.nu()
    }

    fn workspace_footprint(&self) -> Footprint {
        let ny = self.residual.ny();
        let nw = self.nu() + self.nx();
        Footprint::reals(ny).repeat(2) + Footprint::reals(ny * nw).repeat(2)
    }

    fn set(&mut self, field: &str, values: &[f64]) -> Result<(), ModelError> {
        set_reference(&mut self.y_ref, field, values)
    }

    fn evaluate(
        &self,
        x: &[f64],
        u: &[f64],
        opts: &CostOptions,
        _memory: &[f64],
        out: CostOut<'_>,
        mut work: Carver<'_>,
    ) -> Result<f64, ModelError> {
        let ny = self.residual.ny();
        let nw = self.nu() + self.nx();
        let r = work.reals(ny);
        let wr = work.reals(ny);
        let jac = work.reals(ny * nw);
        let wj = work.reals(ny * nw);
        work.finish(self.workspace_footprint());

        self.residual.eval(x, u, r, jac)?;
        ModelError::check_finite("residual", r)?;
        ModelError::check_finite("residual jacobian", jac)?;
        for (ri, yi) in r.iter_mut().zip(self.y_ref.iter()) {
            *ri -= yi;
        }
        weight(&self.w, r, wr);
        // wj = W · J
        for i in 0..ny {
            for c in 0..nw {
                wj[i * nw + c] = (0..ny).map(|l| self.w[(i, l)] * jac[l * nw + c]).sum();
            }
        }

        let scale = opts.scaling;
        for (c, g) in out.grad.iter_mut().enumerate() {
            *g = scale * (0..ny).map(|i| jac[i * nw + c] * wr[i]).sum::<f64>();
        }
        for a in 0..nw {
            for b in 0..nw {
                out.hess[a * nw + b] =
                    scale * (0..ny).map(|i| jac[i * nw + a] * wj[i * nw + b]).sum::<f64>();
            }
        }
        let value: f64 = r.iter().zip(wr.iter()).map(|(a, b)| a * b).sum();
        Ok(0.5 * scale * value)
    }
}

// ── External ───────────────────────────────────────────────────────

/// A user objective supplying its own gradient and Hessian.
pub trait Objective: Send + Sync {
    /// Number of states.
    fn nx(&self) -> usize;

    /// Number of controls.
    fn nu(&self) -> usize;

    /// Write `∇ℓ` and `∇²ℓ` over `[u, x]` and return `ℓ`.
    fn eval(&self, x: &[f64], u: &[f64], grad: &mut [f64], hess: &mut [f64])
        -> Result<f64, ModelError>;
}

/// Cost backed by an [`Objective`]. The Hessian may be indefinite; the
/// engine's regularization handles that.
#[derive(Clone, Debug)]
pub struct ExternalCost<O> {
    objective: O,
}

impl<O: Objective> ExternalCost<O> {
    /// Wrap `objective`.
    pub fn new(objective: O) -> Self {
        Self { objective }
    }
}

impl<O: Objective> Cost for ExternalCost<O> {
    fn kind(&self) -> CostKind {
        CostKind::External
    }

    fn nx(&self) -> usize {
        self.objective.nx()
    }

    fn nu(&self) -> usize {
        self.objective.nu()
    }

    fn evaluate(
        &self,
        x: &[f64],
        u: &[f64],
        opts: &CostOptions,
        _memory: &[f64],
        out: CostOut<'_>,
        work: Carver<'_>,
    ) -> Result<f64, ModelError> {
        work.finish(Footprint::ZERO);
        let value = self.objective.eval(x, u, out.grad, out.hess)?;
        ModelError::check_finite("cost gradient", out.grad)?;
        ModelError::check_finite("cost hessian", out.hess)?;
        let scale = opts.scaling;
        if scale != 1.0 {
            out.grad.iter_mut().for_each(|g| *g *= scale);
            out.hess.iter_mut().for_each(|h| *h *= scale);
        }
        Ok(scale * value)
    }
}
