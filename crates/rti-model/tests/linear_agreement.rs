//! Integration test: every reference model agrees with its linear
//! counterpart on linear data.
//!
//! Each evaluation carves its scratch from an arena sized by the model's
//! own footprint, so a model that carves more or less than it declares
//! trips the carver's end check.

use nalgebra::DMatrix;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rti_arena::{Arena, StoreMut};
use rti_core::ModelError;
use rti_model::{
    Cost, CostOptions, CostOut, DiscreteDynamics, DiscreteMap, Dynamics, DynamicsOptions,
    DynamicsOut, ErkDynamics, LinearDynamics, LinearLsCost, LsResidual, NonlinearLsCost, Ode,
};

fn random_matrix(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |_, _| rng.random_range(-1.0..1.0))
}

fn random_vec(rng: &mut ChaCha8Rng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.random_range(-2.0..2.0)).collect()
}

fn eval_dynamics(
    d: &dyn Dynamics,
    opts: &DynamicsOptions,
    x: &[f64],
    u: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let n1 = d.nx_next();
    let mut phi = vec![0.0; n1];
    let mut jac = vec![0.0; n1 * (d.nu() + d.nx())];
    let mut arena = Arena::with_footprint(d.workspace_footprint(opts)).unwrap();
    d.evaluate(
        x,
        u,
        opts,
        DynamicsOut {
            phi: &mut phi,
            jac: &mut jac,
        },
        arena.carver(),
    )
    .unwrap();
    (phi, jac)
}

fn eval_cost(c: &dyn Cost, x: &[f64], u: &[f64]) -> (f64, Vec<f64>, Vec<f64>) {
    let nw = c.nu() + c.nx();
    let mut memory = vec![0.0; c.memory_len()];
    c.precompute(&mut memory).unwrap();
    let mut grad = vec![0.0; nw];
    let mut hess = vec![0.0; nw * nw];
    let mut arena = Arena::with_footprint(c.workspace_footprint()).unwrap();
    let value = c
        .evaluate(
            x,
            u,
            &CostOptions::default(),
            &memory,
            CostOut {
                grad: &mut grad,
                hess: &mut hess,
            },
            arena.carver(),
        )
        .unwrap();
    (value, grad, hess)
}

fn assert_close(a: &[f64], b: &[f64], tol: f64) -> Result<(), TestCaseError> {
    prop_assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        prop_assert!((x - y).abs() <= tol, "entry {}: {} vs {}", i, x, y);
    }
    Ok(())
}

/// `x⁺ = A x + B u` through the user-map interface.
struct Affine {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
}

impl DiscreteMap for Affine {
    fn nx(&self) -> usize {
        self.a.ncols()
    }

    fn nu(&self) -> usize {
        self.b.ncols()
    }

    fn eval(
        &self,
        x: &[f64],
        u: &[f64],
        phi: &mut [f64],
        jac: &mut [f64],
    ) -> Result<(), ModelError> {
        let (nx, nu) = (self.nx(), self.nu());
        for (i, p) in phi.iter_mut().enumerate() {
            *p = (0..nx).map(|j| self.a[(i, j)] * x[j]).sum::<f64>()
                + (0..nu).map(|j| self.b[(i, j)] * u[j]).sum::<f64>();
            for j in 0..nu {
                jac[i * (nu + nx) + j] = self.b[(i, j)];
            }
            for j in 0..nx {
                jac[i * (nu + nx) + nu + j] = self.a[(i, j)];
            }
        }
        Ok(())
    }
}

/// `ẋ = A x + B u` as an ODE.
struct LinearOde(Affine);

impl Ode for LinearOde {
    fn nx(&self) -> usize {
        self.0.nx()
    }

    fn nu(&self) -> usize {
        self.0.nu()
    }

    fn rhs(&self, x: &[f64], u: &[f64], xdot: &mut [f64]) -> Result<(), ModelError> {
        let mut jac = vec![0.0; xdot.len() * (self.nu() + self.nx())];
        self.0.eval(x, u, xdot, &mut jac)
    }

    fn jacobians(
        &self,
        _x: &[f64],
        _u: &[f64],
        jx: &mut [f64],
        ju: &mut [f64],
    ) -> Result<(), ModelError> {
        let (nx, nu) = (self.nx(), self.nu());
        for i in 0..nx {
            for j in 0..nx {
                jx[i * nx + j] = self.0.a[(i, j)];
            }
            for j in 0..nu {
                ju[i * nu + j] = self.0.b[(i, j)];
            }
        }
        Ok(())
    }
}

/// `y = [Vu Vx] w` through the residual interface.
struct LinearResidual {
    vx: DMatrix<f64>,
    vu: DMatrix<f64>,
}

impl LsResidual for LinearResidual {
    fn ny(&self) -> usize {
        self.vx.nrows()
    }

    fn nx(&self) -> usize {
        self.vx.ncols()
    }

    fn nu(&self) -> usize {
        self.vu.ncols()
    }

    fn eval(&self, x: &[f64], u: &[f64], y: &mut [f64], jac: &mut [f64]) -> Result<(), ModelError> {
        let (nx, nu) = (self.nx(), self.nu());
        for (i, yi) in y.iter_mut().enumerate() {
            *yi = (0..nu).map(|j| self.vu[(i, j)] * u[j]).sum::<f64>()
                + (0..nx).map(|j| self.vx[(i, j)] * x[j]).sum::<f64>();
            for j in 0..nu {
                jac[i * (nu + nx) + j] = self.vu[(i, j)];
            }
            for j in 0..nx {
                jac[i * (nu + nx) + nu + j] = self.vx[(i, j)];
            }
        }
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn discrete_map_matches_linear_dynamics(seed in any::<u64>(), nx in 1usize..5, nu in 0usize..3) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let a = random_matrix(&mut rng, nx, nx);
        let b = random_matrix(&mut rng, nx, nu);
        let (x, u) = (random_vec(&mut rng, nx), random_vec(&mut rng, nu));
        let opts = DynamicsOptions::default();

        let linear = LinearDynamics::new(a.clone(), b.clone()).unwrap();
        let user = DiscreteDynamics::new(Affine { a, b });
        let (phi_l, jac_l) = eval_dynamics(&linear, &opts, &x, &u);
        let (phi_u, jac_u) = eval_dynamics(&user, &opts, &x, &u);
        assert_close(&phi_l, &phi_u, 1e-12)?;
        assert_close(&jac_l, &jac_u, 1e-12)?;
    }

    #[test]
    fn erk_of_a_linear_ode_is_consistent_with_its_jacobian(
        seed in any::<u64>(),
        nx in 1usize..4,
        nu in 1usize..3,
    ) {
        // For a linear flow φ(x, u) = Φ [u; x] exactly, so the value must
        // equal the Jacobian applied to the point.
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let ode = LinearOde(Affine {
            a: random_matrix(&mut rng, nx, nx),
            b: random_matrix(&mut rng, nx, nu),
        });
        let (x, u) = (random_vec(&mut rng, nx), random_vec(&mut rng, nu));
        let erk = ErkDynamics::new(ode, 0.1).unwrap();
        let opts = DynamicsOptions::default();
        let (phi, jac) = eval_dynamics(&erk, &opts, &x, &u);

        let w: Vec<f64> = u.iter().chain(&x).copied().collect();
        let nw = nu + nx;
        let applied: Vec<f64> = (0..nx)
            .map(|i| (0..nw).map(|j| jac[i * nw + j] * w[j]).sum())
            .collect();
        assert_close(&phi, &applied, 1e-10)?;
    }

    #[test]
    fn nonlinear_ls_matches_linear_ls(
        seed in any::<u64>(),
        nx in 1usize..4,
        nu in 0usize..3,
        ny in 1usize..5,
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let vx = random_matrix(&mut rng, ny, nx);
        let vu = random_matrix(&mut rng, ny, nu);
        let l = random_matrix(&mut rng, ny, ny);
        let w = &l * l.transpose() + DMatrix::identity(ny, ny);
        let (x, u) = (random_vec(&mut rng, nx), random_vec(&mut rng, nu));

        let linear = LinearLsCost::new(vx.clone(), vu.clone(), w.clone()).unwrap();
        let gauss_newton = NonlinearLsCost::new(LinearResidual { vx, vu }, w).unwrap();
        let (vl, gl, hl) = eval_cost(&linear, &x, &u);
        let (vn, gn, hn) = eval_cost(&gauss_newton, &x, &u);
        prop_assert!((vl - vn).abs() <= 1e-9 * (1.0 + vl.abs()));
        assert_close(&gl, &gn, 1e-9)?;
        assert_close(&hl, &hn, 1e-9)?;
    }
}
