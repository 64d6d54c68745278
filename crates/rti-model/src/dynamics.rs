//! The [`Dynamics`] trait and the linear and discrete reference models.
//!
//! A dynamics model maps the stage variables `w = [u, x]` to the next
//! state `φ(x, u)` and its Jacobian `[∂φ/∂u  ∂φ/∂x]`. The engine writes
//! the result straight into its workspace arena; models never allocate
//! while evaluating.

use nalgebra::{DMatrix, DVector};
use rti_arena::{Carver, Footprint};
use rti_core::{DynamicsKind, ModelError};

use crate::dense::{check_shape, check_vec, mat_vec};
use crate::options::DynamicsOptions;

/// Output buffers of one dynamics evaluation.
#[derive(Debug)]
pub struct DynamicsOut<'a> {
    /// `φ(x, u)`, length `nx_next`.
    pub phi: &'a mut [f64],
    /// `[∂φ/∂u  ∂φ/∂x]`, row-major `nx_next × (nu + nx)`.
    pub jac: &'a mut [f64],
}

/// A stage transition model.
///
/// # Contract
///
/// - `evaluate()` MUST be deterministic and MUST overwrite every entry of
///   both output buffers.
/// - `&self`: models are shared across worker threads during parallel
///   linearization. Per-call scratch comes from the `work` carver, which
///   covers exactly [`workspace_footprint`](Dynamics::workspace_footprint).
pub trait Dynamics: Send + Sync {
    /// Which variant this model implements.
    fn kind(&self) -> DynamicsKind;

    /// Number of states at this stage.
    fn nx(&self) -> usize;

    /// Number of controls at this stage.
    fn nu(&self) -> usize;

    /// Number of states at the next stage.
    fn nx_next(&self) -> usize {
        self.nx()
    }

    /// Scratch needed by one evaluation.
    fn workspace_footprint(&self, opts: &DynamicsOptions) -> Footprint {
        let _ = opts;
        Footprint::ZERO
    }

    /// Replace a named parameter vector.
    ///
    /// Default: every field is unsupported.
    fn set(&mut self, field: &str, values: &[f64]) -> Result<(), ModelError> {
        let _ = (field, values);
        Err(ModelError::Unsupported { operation: "set" })
    }

    /// Evaluate `φ` and its Jacobian at `(x, u)`.
    fn evaluate(
        &self,
        x: &[f64],
        u: &[f64],
        opts: &DynamicsOptions,
        out: DynamicsOut<'_>,
        work: Carver<'_>,
    ) -> Result<(), ModelError>;
}

// ── Linear ─────────────────────────────────────────────────────────

/// `x⁺ = A x + B u + c`.
#[derive(Clone, Debug)]
pub struct LinearDynamics {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    c: DVector<f64>,
}

impl LinearDynamics {
    /// Build from `A` (`nx_next × nx`) and `B` (`nx_next × nu`), no offset.
    pub fn new(a: DMatrix<f64>, b: DMatrix<f64>) -> Result<Self, ModelError> {
        check_shape("B", &b, a.nrows(), b.ncols())?;
        let c = DVector::zeros(a.nrows());
        Ok(Self { a, b, c })
    }

    /// Add the constant offset `c`.
    pub fn with_offset(mut self, c: DVector<f64>) -> Result<Self, ModelError> {
        check_vec("c", &c, self.a.nrows())?;
        self.c = c;
        Ok(self)
    }

    /// State matrix.
    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    /// Input matrix.
    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }
}

impl Dynamics for LinearDynamics {
    fn kind(&self) -> DynamicsKind {
        DynamicsKind::Linear
    }

    fn nx(&self) -> usize {
        self.a.ncols()
    }

    fn nu(&self) -> usize {
        self.b.ncols()
    }

    fn nx_next(&self) -> usize {
        self.a.nrows()
    }

    fn set(&mut self, field: &str, values: &[f64]) -> Result<(), ModelError> {
        match field {
            "c" => {
                ModelError::check_len("c", values, self.c.len())?;
                self.c.copy_from_slice(values);
                Ok(())
            }
            _ => Err(ModelError::Unsupported { operation: "set" }),
        }
    }

    fn evaluate(
        &self,
        x: &[f64],
        u: &[f64],
        _opts: &DynamicsOptions,
        out: DynamicsOut<'_>,
        work: Carver<'_>,
    ) -> Result<(), ModelError> {
        let (nx, nu, n1) = (self.nx(), self.nu(), self.nx_next());
        ModelError::check_len("x", x, nx)?;
        ModelError::check_len("u", u, nu)?;
        mat_vec(&self.a, x, out.phi);
        for (i, p) in out.phi.iter_mut().enumerate() {
            for (j, uj) in u.iter().enumerate() {
                *p += self.b[(i, j)] * uj;
            }
            *p += self.c[i];
        }
        let nw = nu + nx;
        for i in 0..n1 {
            let row = &mut out.jac[i * nw..(i + 1) * nw];
            for j in 0..nu {
                row[j] = self.b[(i, j)];
            }
            for j in 0..nx {
                row[nu + j] = self.a[(i, j)];
            }
        }
        work.finish(Footprint::ZERO);
        Ok(())
    }
}

// ── Discrete ───────────────────────────────────────────────────────

/// A user-supplied discrete transition with its Jacobian.
pub trait DiscreteMap: Send + Sync {
    /// Number of states at this stage.
    fn nx(&self) -> usize;

    /// Number of controls.
    fn nu(&self) -> usize;

    /// Number of states at the next stage.
    fn nx_next(&self) -> usize {
        self.nx()
    }

    /// Write `φ(x, u)` and `[∂φ/∂u  ∂φ/∂x]` (row-major).
    fn eval(&self, x: &[f64], u: &[f64], phi: &mut [f64], jac: &mut [f64])
        -> Result<(), ModelError>;
}

/// Dynamics backed by a [`DiscreteMap`].
///
/// Outputs are checked for non-finite values after every call.
#[derive(Clone, Debug)]
pub struct DiscreteDynamics<M> {
    map: M,
}

impl<M: DiscreteMap> DiscreteDynamics<M> {
    /// Wrap `map`.
    pub fn new(map: M) -> Self {
        Self { map }
    }

    /// The wrapped map.
    pub fn map(&self) -> &M {
        &self.map
    }
}

impl<M: DiscreteMap> Dynamics for DiscreteDynamics<M> {
    fn kind(&self) -> DynamicsKind {
        DynamicsKind::Discrete
    }

    fn nx(&self) -> usize {
        self.map.nx()
    }

    fn nu(&self) -> usize {
        self.map.nu()
    }

    fn nx_next(&self) -> usize {
        self.map.nx_next()
    }

    fn evaluate(
        &self,
        x: &[f64],
        u: &[f64],
        _opts: &DynamicsOptions,
        out: DynamicsOut<'_>,
        work: Carver<'_>,
    ) -> Result<(), ModelError> {
        self.map.eval(x, u, out.phi, out.jac)?;
        ModelError::check_finite("phi", out.phi)?;
        ModelError::check_finite("dynamics jacobian", out.jac)?;
        work.finish(Footprint::ZERO);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(d: &dyn Dynamics, x: &[f64], u: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let n1 = d.nx_next();
        let nw = d.nx() + d.nu();
        let mut phi = vec![0.0; n1];
        let mut jac = vec![0.0; n1 * nw];
        d.evaluate(
            x,
            u,
            &DynamicsOptions::default(),
            DynamicsOut {
                phi: &mut phi,
                jac: &mut jac,
            },
            Carver::new(&mut [], &mut []),
        )
        .unwrap();
        (phi, jac)
    }

    #[test]
    fn linear_dynamics_value_and_jacobian() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0]);
        let b = DMatrix::from_row_slice(2, 1, &[0.0, 0.1]);
        let d = LinearDynamics::new(a, b)
            .unwrap()
            .with_offset(DVector::from_column_slice(&[0.5, 0.0]))
            .unwrap();
        let (phi, jac) = eval(&d, &[1.0, 2.0], &[3.0]);
        assert!((phi[0] - 1.7).abs() < 1e-12);
        assert!((phi[1] - 2.3).abs() < 1e-12);
        assert_eq!(jac, vec![0.0, 1.0, 0.1, 0.1, 0.0, 1.0]);
    }

    #[test]
    fn linear_dynamics_rejects_bad_shapes() {
        let a = DMatrix::<f64>::identity(2, 2);
        let b = DMatrix::<f64>::zeros(3, 1);
        assert!(LinearDynamics::new(a.clone(), b).is_err());
        let d = LinearDynamics::new(a, DMatrix::zeros(2, 1)).unwrap();
        assert!(d.with_offset(DVector::zeros(3)).is_err());
    }

    #[test]
    fn offset_is_settable() {
        let mut d =
            LinearDynamics::new(DMatrix::identity(1, 1), DMatrix::zeros(1, 1)).unwrap();
        d.set("c", &[2.0]).unwrap();
        assert_eq!(eval(&d, &[1.0], &[0.0]).0, vec![3.0]);
        assert!(matches!(
            d.set("A", &[1.0]),
            Err(ModelError::Unsupported { .. })
        ));
    }

    struct Blowup;

    impl DiscreteMap for Blowup {
        fn nx(&self) -> usize {
            1
        }

        fn nu(&self) -> usize {
            0
        }

        fn eval(
            &self,
            x: &[f64],
            _u: &[f64],
            phi: &mut [f64],
            jac: &mut [f64],
        ) -> Result<(), ModelError> {
            phi[0] = 1.0 / x[0];
            jac[0] = -1.0 / (x[0] * x[0]);
            Ok(())
        }
    }

    #[test]
    fn discrete_dynamics_catches_non_finite_output() {
        let d = DiscreteDynamics::new(Blowup);
        assert_eq!(d.kind(), DynamicsKind::Discrete);
        assert_eq!(eval(&d, &[2.0], &[]).0, vec![0.5]);
        let mut phi = [0.0];
        let mut jac = [0.0];
        let err = d
            .evaluate(
                &[0.0],
                &[],
                &DynamicsOptions::default(),
                DynamicsOut {
                    phi: &mut phi,
                    jac: &mut jac,
                },
                Carver::new(&mut [], &mut []),
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::NanDetected { what: "phi", .. }));
    }
}
