//! Explicit Runge–Kutta integration with forward sensitivities.
//!
//! Integrates `ẋ = f(x, u)` over one shooting interval of length `T`
//! with `num_steps` steps of an explicit tableau of order `rk_order`,
//! propagating the sensitivity `S = ∂x(t)/∂[u, x₀]` alongside:
//!
//! ```text
//! Ṡ = ∂f/∂x · S + [∂f/∂u  0],      S(0) = [0  I]
//! ```
//!
//! Controls are held constant over the interval. The augmented state
//! `z = (x, S)` is stepped with the same tableau, so the returned
//! Jacobian is the exact derivative of the discrete integrator.

use rti_arena::{Carver, Footprint};
use rti_core::{DynamicsKind, ModelError};

use crate::dynamics::{Dynamics, DynamicsOut};
use crate::options::DynamicsOptions;

/// An explicit ODE `ẋ = f(x, u)` with its Jacobians.
pub trait Ode: Send + Sync {
    /// Number of states.
    fn nx(&self) -> usize;

    /// Number of controls.
    fn nu(&self) -> usize;

    /// Write `f(x, u)` into `xdot`.
    fn rhs(&self, x: &[f64], u: &[f64], xdot: &mut [f64]) -> Result<(), ModelError>;

    /// Write `∂f/∂x` (`nx × nx`) and `∂f/∂u` (`nx × nu`), both row-major.
    fn jacobians(&self, x: &[f64], u: &[f64], jx: &mut [f64], ju: &mut [f64])
        -> Result<(), ModelError>;
}

/// Butcher tableau of an explicit method. `a` is strictly lower
/// triangular and stored row by row.
struct Tableau {
    a: &'static [&'static [f64]],
    b: &'static [f64],
}

const EULER: Tableau = Tableau {
    a: &[&[]],
    b: &[1.0],
};

const MIDPOINT: Tableau = Tableau {
    a: &[&[], &[0.5]],
    b: &[0.0, 1.0],
};

const KUTTA3: Tableau = Tableau {
    a: &[&[], &[0.5], &[-1.0, 2.0]],
    b: &[1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0],
};

const RK4: Tableau = Tableau {
    a: &[&[], &[0.5], &[0.0, 0.5], &[0.0, 0.0, 1.0]],
    b: &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
};

fn tableau(order: usize) -> Result<&'static Tableau, ModelError> {
    match order {
        1 => Ok(&EULER),
        2 => Ok(&MIDPOINT),
        3 => Ok(&KUTTA3),
        4 => Ok(&RK4),
        _ => Err(ModelError::Unsupported {
            operation: "rk_order outside 1..=4",
        }),
    }
}

/// Dynamics given by integrating an [`Ode`] over a fixed interval.
#[derive(Clone, Debug)]
pub struct ErkDynamics<O> {
    ode: O,
    interval: f64,
}

impl<O: Ode> ErkDynamics<O> {
    /// Integrate `ode` over intervals of length `interval`.
    pub fn new(ode: O, interval: f64) -> Result<Self, ModelError> {
        if !(interval.is_finite() && interval > 0.0) {
            return Err(ModelError::InvalidStructure {
                reason: format!("integration interval {interval} must be finite and > 0"),
            });
        }
        Ok(Self { ode, interval })
    }

    /// The integrated ODE.
    pub fn ode(&self) -> &O {
        &self.ode
    }

    /// Interval length `T`.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    fn augmented_len(&self) -> usize {
        let nx = self.ode.nx();
        nx + nx * (nx + self.ode.nu())
    }

    /// `k = F(z)`: state derivative and sensitivity derivative.
    fn augmented_rhs(
        &self,
        z: &[f64],
        u: &[f64],
        k: &mut [f64],
        jx: &mut [f64],
        ju: &mut [f64],
    ) -> Result<(), ModelError> {
        let (nx, nu) = (self.ode.nx(), self.ode.nu());
        let nw = nu + nx;
        let (x, s) = z.split_at(nx);
        let (kx, ks) = k.split_at_mut(nx);
        self.ode.rhs(x, u, kx)?;
        self.ode.jacobians(x, u, jx, ju)?;
        for i in 0..nx {
            let row = &mut ks[i * nw..(i + 1) * nw];
            for (j, r) in row.iter_mut().enumerate() {
                let mut acc = if j < nu { ju[i * nu + j] } else { 0.0 };
                for l in 0..nx {
                    acc += jx[i * nx + l] * s[l * nw + j];
                }
                *r = acc;
            }
        }
        Ok(())
    }
}

impl<O: Ode> Dynamics for ErkDynamics<O> {
    fn kind(&self) -> DynamicsKind {
        DynamicsKind::Erk
    }

    fn nx(&self) -> usize {
        self.ode.nx()
    }

    fn nu(&self) -> usize {
        self.ode.nu()
    }

    fn workspace_footprint(&self, opts: &DynamicsOptions) -> Footprint {
        let (nx, nu) = (self.ode.nx(), self.ode.nu());
        let m = self.augmented_len();
        Footprint::reals(m).repeat(opts.rk_order)
            + Footprint::reals(m)
            + Footprint::reals(m)
            + Footprint::reals(nx * nx)
            + Footprint::reals(nx * nu)
    }

    fn evaluate(
        &self,
        x: &[f64],
        u: &[f64],
        opts: &DynamicsOptions,
        out: DynamicsOut<'_>,
        mut work: Carver<'_>,
    ) -> Result<(), ModelError> {
        let (nx, nu) = (self.ode.nx(), self.ode.nu());
        let nw = nu + nx;
        let m = self.augmented_len();
        ModelError::check_len("x", x, nx)?;
        ModelError::check_len("u", u, nu)?;
        let tab = tableau(opts.rk_order)?;
        let stages = tab.b.len();
        let expected = self.workspace_footprint(opts);

        let mut k: [&mut [f64]; 4] = Default::default();
        for slot in k.iter_mut().take(stages) {
            *slot = work.reals(m);
        }
        let z = work.reals(m);
        let zt = work.reals(m);
        let jx = work.reals(nx * nx);
        let ju = work.reals(nx * nu);
        work.finish(expected);

        z.fill(0.0);
        z[..nx].copy_from_slice(x);
        for i in 0..nx {
            z[nx + i * nw + nu + i] = 1.0;
        }

        let h = self.interval / opts.num_steps as f64;
        for _ in 0..opts.num_steps {
            for i in 0..stages {
                let (done, rest) = k.split_at_mut(i);
                zt.copy_from_slice(z);
                for (aij, kj) in tab.a[i].iter().zip(done.iter()) {
                    if *aij != 0.0 {
                        for (t, kv) in zt.iter_mut().zip(kj.iter()) {
                            *t += h * aij * kv;
                        }
                    }
                }
                self.augmented_rhs(zt, u, &mut *rest[0], jx, ju)?;
            }
            for (bi, ki) in tab.b.iter().zip(k.iter()) {
                if *bi != 0.0 {
                    for (zv, kv) in z.iter_mut().zip(ki.iter()) {
                        *zv += h * bi * kv;
                    }
                }
            }
        }

        out.phi.copy_from_slice(&z[..nx]);
        out.jac.copy_from_slice(&z[nx..]);
        ModelError::check_finite("phi", out.phi)?;
        ModelError::check_finite("dynamics jacobian", out.jac)
    }
}
