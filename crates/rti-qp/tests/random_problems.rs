//! Integration test: every backend on seeded random feasible QPs.
//!
//! Each problem is built around a strictly feasible point `v0`, so all
//! backends must report success. Solutions are compared across backends
//! and checked against the KKT residuals computed by `QpRes`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rti_core::{QpDims, QpSolverKind, Status};
use rti_qp::{QpIn, QpInfo, QpOut, QpRes, QpSolver, QpSolverOptions, QpStatus};

// ── Problem generator ────────────────────────────────────────────────

fn random_qp(rng: &mut ChaCha8Rng, dims: QpDims) -> QpIn {
    let QpDims { nv, ne, nb, ng, .. } = dims;
    let mut qp = QpIn::new(dims).unwrap();
    let v0: Vec<f64> = (0..nv).map(|_| rng.random_range(-1.0..1.0)).collect();
    let m: Vec<f64> = (0..nv * nv).map(|_| rng.random_range(-1.0..1.0)).collect();
    let view = qp.view_mut();

    // H = M Mᵀ + I
    for i in 0..nv {
        for j in 0..nv {
            let mut s = if i == j { 1.0 } else { 0.0 };
            for k in 0..nv {
                s += m[i * nv + k] * m[j * nv + k];
            }
            view.h[i * nv + j] = s;
        }
    }
    for gi in view.g.iter_mut() {
        *gi = rng.random_range(-2.0..2.0);
    }
    for r in 0..ne {
        let row = &mut view.a[r * nv..(r + 1) * nv];
        for a in row.iter_mut() {
            *a = rng.random_range(-1.0..1.0);
        }
        view.b[r] = row.iter().zip(&v0).map(|(a, v)| a * v).sum();
    }
    for k in 0..nb {
        let i = k % nv;
        view.idxb[k] = i;
        view.lb[k] = v0[i] - rng.random_range(0.05..0.5);
        view.ub[k] = v0[i] + rng.random_range(0.05..0.5);
    }
    for r in 0..ng {
        let row = &mut view.c[r * nv..(r + 1) * nv];
        for c in row.iter_mut() {
            *c = rng.random_range(-1.0..1.0);
        }
        let cv: f64 = row.iter().zip(&v0).map(|(c, v)| c * v).sum();
        view.lg[r] = cv - rng.random_range(0.05..0.5);
        view.ug[r] = if r % 2 == 0 {
            f64::INFINITY
        } else {
            cv + rng.random_range(0.05..0.5)
        };
    }
    qp
}

fn options(kind: QpSolverKind) -> QpSolverOptions {
    let mut opts = QpSolverOptions::new(kind).unwrap();
    if kind == QpSolverKind::Admm {
        opts.set("max_iter", 20_000i64).unwrap();
        opts.set("tol_stat", 1e-7).unwrap();
        opts.set("tol_eq", 1e-7).unwrap();
        opts.set("tol_ineq", 1e-7).unwrap();
    }
    opts
}

fn solve(kind: QpSolverKind, qp: &QpIn) -> (QpOut, QpInfo) {
    let mut solver = QpSolver::new(kind, *qp.dims(), &options(kind)).unwrap();
    let mut out = QpOut::new(*qp.dims()).unwrap();
    let info = solver.solve(qp, &mut out).unwrap();
    (out, info)
}

fn backends() -> Vec<QpSolverKind> {
    QpSolverKind::ALL
        .iter()
        .copied()
        .filter(|&k| rti_qp::resolve(k).is_ok())
        .collect()
}

const SHAPES: &[QpDims] = &[
    QpDims { nv: 3, ne: 0, nb: 0, ng: 0, ns: 0 },
    QpDims { nv: 4, ne: 1, nb: 2, ng: 0, ns: 0 },
    QpDims { nv: 6, ne: 2, nb: 3, ng: 2, ns: 0 },
    QpDims { nv: 8, ne: 3, nb: 8, ng: 4, ns: 0 },
];

// ── Tests ────────────────────────────────────────────────────────────

#[test]
fn interior_point_satisfies_kkt() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for &dims in SHAPES {
        for _ in 0..5 {
            let qp = random_qp(&mut rng, dims);
            let (out, info) = solve(QpSolverKind::InteriorPoint, &qp);
            assert_eq!(info.status, QpStatus::Success, "dims {dims:?}");
            let mut res = QpRes::new(dims).unwrap();
            let norms = res.compute(&qp, &out).unwrap();
            assert!(norms.max() < 1e-6, "residuals {norms:?} for {dims:?}");
            for lam in [out.lam_lb(), out.lam_ub(), out.lam_lg(), out.lam_ug()] {
                assert!(lam.iter().all(|&l| l >= 0.0));
            }
        }
    }
}

#[test]
fn backends_agree_on_the_primal_solution() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for &dims in SHAPES {
        let qp = random_qp(&mut rng, dims);
        let (reference, _) = solve(QpSolverKind::InteriorPoint, &qp);
        for kind in backends() {
            let (out, info) = solve(kind, &qp);
            assert_eq!(info.status, QpStatus::Success, "{kind} on {dims:?}");
            for (a, b) in out.v().iter().zip(reference.v()) {
                assert!((a - b).abs() < 1e-4, "{kind} on {dims:?}: {a} vs {b}");
            }
        }
    }
}

#[test]
fn copied_options_and_dims_give_bit_identical_results() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let dims = SHAPES[2];
    let qp = random_qp(&mut rng, dims);
    let mut qp_copy = QpIn::new(*qp.dims()).unwrap();
    qp_copy.copy_from(&qp).unwrap();

    for kind in backends() {
        let opts = options(kind);
        let opts_copy = opts.clone();
        let mut a = QpSolver::new(kind, dims, &opts).unwrap();
        let mut b = QpSolver::new(kind, *qp_copy.dims(), &opts_copy).unwrap();
        let mut out_a = QpOut::new(dims).unwrap();
        let mut out_b = QpOut::new(dims).unwrap();
        a.solve(&qp, &mut out_a).unwrap();
        b.solve(&qp_copy, &mut out_b).unwrap();
        assert_eq!(out_a.v(), out_b.v(), "{kind}");
        assert_eq!(out_a.y(), out_b.y(), "{kind}");
        assert_eq!(out_a.info.iter, out_b.info.iter, "{kind}");
    }
}

#[test]
fn admm_warm_start_never_needs_more_iterations() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let dims = SHAPES[3];
    for _ in 0..3 {
        let qp = random_qp(&mut rng, dims);
        let kind = QpSolverKind::Admm;
        let mut opts = options(kind);
        opts.set("warm_start", true).unwrap();
        let mut solver = QpSolver::new(kind, dims, &opts).unwrap();
        let mut out = QpOut::new(dims).unwrap();
        let first = solver.solve(&qp, &mut out).unwrap();
        let second = solver.solve(&qp, &mut out).unwrap();
        assert!(first.status.is_success());
        assert!(second.iter <= first.iter, "{kind}: {} > {}", second.iter, first.iter);
    }
}

#[test]
fn concurrent_instances_are_independent() {
    let mut rng = ChaCha8Rng::seed_from_u64(19);
    let dims = SHAPES[2];
    let problems: Vec<QpIn> = (0..4).map(|_| random_qp(&mut rng, dims)).collect();
    let sequential: Vec<Vec<f64>> = problems
        .iter()
        .map(|qp| solve(QpSolverKind::InteriorPoint, qp).0.v().to_vec())
        .collect();

    let parallel: Vec<Vec<f64>> = std::thread::scope(|s| {
        let handles: Vec<_> = problems
            .iter()
            .map(|qp| s.spawn(move || solve(QpSolverKind::InteriorPoint, qp).0.v().to_vec()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(sequential, parallel);
}

#[test]
fn non_success_maps_to_nonzero_status() {
    let mut qp = QpIn::new(QpDims { nv: 1, ne: 0, nb: 1, ng: 0, ns: 0 }).unwrap();
    {
        let v = qp.view_mut();
        v.h[0] = 1.0;
        v.idxb[0] = 0;
        v.lb[0] = 1.0;
        v.ub[0] = -1.0;
    }
    for kind in backends() {
        let (_, info) = solve(kind, &qp);
        assert_eq!(info.status, QpStatus::Infeasible, "{kind}");
        assert_ne!(Status::from(info.status) as i32, 0);
    }
}
