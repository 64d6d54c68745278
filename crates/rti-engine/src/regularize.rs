//! Hessian regularization strategies.
//!
//! Each stage's `(nu + nx)` Hessian block is regularized in place during
//! linearization, on scratch carved from the stage workspace. `Mirror`
//! and `Project` work on the eigen-decomposition `H = V diag(λ) Vᵀ`:
//!
//! | kind            | eigenvalue map   |
//! |-----------------|------------------|
//! | `no_regularize` | `λ`              |
//! | `mirror`        | `max(|λ|, ε)`    |
//! | `project`       | `max(λ, ε)`      |

use rti_arena::{Carver, Footprint};
use rti_core::RegularizationKind;
use rti_qp::linalg::{reconstruct_symmetric, symmetric_eigen};

/// Jacobi sweeps before the eigen-solver gives up refining.
const MAX_SWEEPS: usize = 64;

/// One regularization strategy. Implementations are stateless.
pub trait Regularizer: Send + Sync + 'static {
    /// Which variant this is.
    fn kind(&self) -> RegularizationKind;

    /// Scratch needed for an `n × n` block.
    fn workspace_footprint(&self, n: usize) -> Footprint;

    /// Regularize the row-major `n × n` block `hess` with threshold
    /// `epsilon`.
    fn regularize(&self, hess: &mut [f64], n: usize, epsilon: f64, work: Carver<'_>);
}

/// Leaves the Hessian untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRegularize;

/// Mirrors negative eigenvalues and lifts small ones to `ε`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mirror;

/// Clips eigenvalues below `ε` to `ε`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Project;

impl Regularizer for NoRegularize {
    fn kind(&self) -> RegularizationKind {
        RegularizationKind::NoRegularize
    }

    fn workspace_footprint(&self, _n: usize) -> Footprint {
        Footprint::ZERO
    }

    fn regularize(&self, _hess: &mut [f64], _n: usize, _epsilon: f64, work: Carver<'_>) {
        work.finish(Footprint::ZERO);
    }
}

fn eigen_footprint(n: usize) -> Footprint {
    Footprint::reals(n * n) + Footprint::reals(n)
}

/// Decompose, map eigenvalues, rebuild.
fn spectral(hess: &mut [f64], n: usize, mut work: Carver<'_>, map: impl Fn(f64) -> f64) {
    let vecs = work.reals(n * n);
    let vals = work.reals(n);
    work.finish(eigen_footprint(n));
    // H ← (H + Hᵀ) / 2
    for i in 0..n {
        for j in 0..i {
            let m = 0.5 * (hess[i * n + j] + hess[j * n + i]);
            hess[i * n + j] = m;
            hess[j * n + i] = m;
        }
    }
    symmetric_eigen(hess, n, vecs, vals, MAX_SWEEPS);
    vals.iter_mut().for_each(|v| *v = map(*v));
    reconstruct_symmetric(hess, n, vecs, vals);
}

impl Regularizer for Mirror {
    fn kind(&self) -> RegularizationKind {
        RegularizationKind::Mirror
    }

    fn workspace_footprint(&self, n: usize) -> Footprint {
        eigen_footprint(n)
    }

    fn regularize(&self, hess: &mut [f64], n: usize, epsilon: f64, work: Carver<'_>) {
        spectral(hess, n, work, |v| v.abs().max(epsilon));
    }
}

impl Regularizer for Project {
    fn kind(&self) -> RegularizationKind {
        RegularizationKind::Project
    }

    fn workspace_footprint(&self, n: usize) -> Footprint {
        eigen_footprint(n)
    }

    fn regularize(&self, hess: &mut [f64], n: usize, epsilon: f64, work: Carver<'_>) {
        spectral(hess, n, work, |v| v.max(epsilon));
    }
}

/// Map a regularization kind to its implementation. Total.
pub fn resolve(kind: RegularizationKind) -> &'static dyn Regularizer {
    match kind {
        RegularizationKind::NoRegularize => &NoRegularize,
        RegularizationKind::Mirror => &Mirror,
        RegularizationKind::Project => &Project,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rti_arena::{Arena, StoreMut};
    use rti_qp::linalg::cholesky;

    fn apply(kind: RegularizationKind, hess: &mut [f64], n: usize, eps: f64) {
        let reg = resolve(kind);
        let mut arena = Arena::with_footprint(reg.workspace_footprint(n)).unwrap();
        reg.regularize(hess, n, eps, arena.carver());
    }

    fn eigenvalues(hess: &[f64], n: usize) -> Vec<f64> {
        let mut a = hess.to_vec();
        let mut vecs = vec![0.0; n * n];
        let mut vals = vec![0.0; n];
        symmetric_eigen(&mut a, n, &mut vecs, &mut vals, MAX_SWEEPS);
        vals.sort_by(|a, b| a.total_cmp(b));
        vals
    }

    #[rustfmt::skip]
    const INDEFINITE: [f64; 9] = [
        1.0, 2.0, 0.0,
        2.0, 1.0, 0.0,
        0.0, 0.0, 1e-9,
    ];

    #[test]
    fn resolution_is_total() {
        for kind in RegularizationKind::ALL {
            assert_eq!(resolve(*kind).kind(), *kind);
        }
    }

    #[test]
    fn no_regularize_is_identity() {
        let mut h = INDEFINITE;
        apply(RegularizationKind::NoRegularize, &mut h, 3, 1e-4);
        assert_eq!(h, INDEFINITE);
    }

    #[test]
    fn mirror_flips_negative_eigenvalues() {
        let mut h = INDEFINITE;
        apply(RegularizationKind::Mirror, &mut h, 3, 1e-4);
        let vals = eigenvalues(&h, 3);
        // spectrum {-1, 3, 1e-9} becomes {1e-4, 1, 3}
        for (got, want) in vals.iter().zip([1e-4, 1.0, 3.0]) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
    }

    #[test]
    fn project_clips_to_epsilon() {
        let mut h = INDEFINITE;
        apply(RegularizationKind::Project, &mut h, 3, 1e-3);
        let vals = eigenvalues(&h, 3);
        for (got, want) in vals.iter().zip([1e-3, 1e-3, 3.0]) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
    }

    #[test]
    fn positive_definite_input_is_preserved() {
        #[rustfmt::skip]
        let spd = [
            4.0, 1.0,
            1.0, 3.0,
        ];
        let mut h = spd;
        apply(RegularizationKind::Project, &mut h, 2, 1e-6);
        for (a, b) in h.iter().zip(spd) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_symmetric() -> impl Strategy<Value = (usize, Vec<f64>)> {
            (1usize..6).prop_flat_map(|n| {
                (Just(n), proptest::collection::vec(-10.0f64..10.0, n * n)).prop_map(
                    |(n, mut a)| {
                        for i in 0..n {
                            for j in 0..i {
                                a[j * n + i] = a[i * n + j];
                            }
                        }
                        (n, a)
                    },
                )
            })
        }

        proptest! {
            #[test]
            fn regularized_blocks_are_positive_definite(
                (n, a) in arb_symmetric(),
                mirror in any::<bool>(),
            ) {
                let kind = if mirror {
                    RegularizationKind::Mirror
                } else {
                    RegularizationKind::Project
                };
                let mut h = a;
                apply(kind, &mut h, n, 1e-2);
                let mut l = h.clone();
                prop_assert!(cholesky(&mut l, n).is_ok());
            }
        }
    }
}
