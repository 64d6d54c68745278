//! Nonlinear reference models used by the fixtures.

use rti_core::ModelError;
use rti_model::{LsResidual, Ode};

/// Damped pendulum, `x = [θ, ω]`, torque input:
///
/// ```text
/// θ' = ω
/// ω' = −(g/l) sin θ − c ω + u
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pendulum {
    pub g_over_l: f64,
    pub damping: f64,
}

impl Default for Pendulum {
    fn default() -> Self {
        Self {
            g_over_l: 9.81,
            damping: 0.1,
        }
    }
}

impl Ode for Pendulum {
    fn nx(&self) -> usize {
        2
    }

    fn nu(&self) -> usize {
        1
    }

    fn rhs(&self, x: &[f64], u: &[f64], xdot: &mut [f64]) -> Result<(), ModelError> {
        xdot[0] = x[1];
        xdot[1] = -self.g_over_l * x[0].sin() - self.damping * x[1] + u[0];
        Ok(())
    }

    fn jacobians(
        &self,
        x: &[f64],
        _u: &[f64],
        jx: &mut [f64],
        ju: &mut [f64],
    ) -> Result<(), ModelError> {
        jx.copy_from_slice(&[0.0, 1.0, -self.g_over_l * x[0].cos(), -self.damping]);
        ju.copy_from_slice(&[0.0, 1.0]);
        Ok(())
    }
}

/// Residual `y = [sin θ, ω, ρ u]`; the terminal variant (`rho = None`)
/// drops the input row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendulumResidual {
    pub rho: Option<f64>,
}

impl LsResidual for PendulumResidual {
    fn ny(&self) -> usize {
        if self.rho.is_some() {
            3
        } else {
            2
        }
    }

    fn nx(&self) -> usize {
        2
    }

    fn nu(&self) -> usize {
        usize::from(self.rho.is_some())
    }

    fn eval(&self, x: &[f64], u: &[f64], y: &mut [f64], jac: &mut [f64]) -> Result<(), ModelError> {
        let (s, c) = x[0].sin_cos();
        match self.rho {
            // columns [u, θ, ω]
            Some(rho) => {
                y.copy_from_slice(&[s, x[1], rho * u[0]]);
                jac.copy_from_slice(&[0.0, c, 0.0, 0.0, 0.0, 1.0, rho, 0.0, 0.0]);
            }
            // columns [θ, ω]
            None => {
                y.copy_from_slice(&[s, x[1]]);
                jac.copy_from_slice(&[c, 0.0, 0.0, 1.0]);
            }
        }
        Ok(())
    }
}
