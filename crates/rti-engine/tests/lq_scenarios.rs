//! Integration test: linear-quadratic scenarios with known answers.
//!
//! On a linear-quadratic problem one real-time iteration is a full
//! Newton step, so a single call must land on the optimum and a second
//! call must not move.

use rti_core::{QpSolverKind, Status};
use rti_test_utils::{random_lq, DoubleIntegrator, ScalarLq};

fn backends() -> Vec<QpSolverKind> {
    let mut kinds = vec![QpSolverKind::InteriorPoint, QpSolverKind::Admm];
    if cfg!(feature = "active-set") {
        kinds.push(QpSolverKind::ActiveSet);
    }
    kinds
}

/// Looser for the first-order backend.
fn tolerance(kind: QpSolverKind) -> f64 {
    match kind {
        QpSolverKind::Admm => 1e-4,
        _ => 1e-6,
    }
}

#[test]
fn scalar_lq_reaches_the_analytic_optimum_in_one_call() {
    let lq = ScalarLq::default();
    for kind in backends() {
        let problem = lq.problem(kind).unwrap();
        let mut solver = problem.solver().unwrap();
        let mut out = problem.nlp_out().unwrap();
        let report = solver.step(&problem.nlp_in, &mut out).unwrap();

        let tol = tolerance(kind);
        assert!(report.qp.status.is_success(), "{kind}");
        assert!((out.u(0)[0] - lq.optimal_u()).abs() < tol, "{kind}: u = {}", out.u(0)[0]);
        assert!((out.x(1)[0] - lq.optimal_x1()).abs() < tol, "{kind}");
        assert!((out.x(0)[0] - lq.x0).abs() < tol, "{kind}");
        // Multiplier of x₁ = a x₀ + b u: p x₁ − π = 0
        assert!((out.pi(0)[0] - lq.p * lq.optimal_x1()).abs() < 10.0 * tol, "{kind}");
        assert_eq!(solver.memory().status(), Status::Success);
    }
}

#[test]
fn second_call_on_a_linear_problem_does_not_move() {
    for seed in 0..6 {
        let problem = random_lq(seed, 8, QpSolverKind::InteriorPoint).unwrap();
        let mut solver = problem.solver().unwrap();
        let mut out = problem.nlp_out().unwrap();
        let first = solver.step(&problem.nlp_in, &mut out).unwrap();
        let second = solver.step(&problem.nlp_in, &mut out).unwrap();
        assert!(first.step_norm > 0.0, "seed {seed}");
        assert!(second.step_norm < 1e-6, "seed {seed}: {}", second.step_norm);
    }
}

#[test]
fn input_bounds_are_respected() {
    let problem = DoubleIntegrator {
        x0: [5.0, 0.0],
        ..DoubleIntegrator::default()
    }
    .problem(QpSolverKind::InteriorPoint)
    .unwrap();
    let mut solver = problem.solver().unwrap();
    let mut out = problem.nlp_out().unwrap();
    solver.step(&problem.nlp_in, &mut out).unwrap();

    let n = problem.dims().horizon();
    for k in 0..n {
        assert!(out.u(k)[0].abs() <= 1.0 + 1e-6, "stage {k}: {}", out.u(k)[0]);
    }
    // Far from the origin the first input saturates, with an active
    // lower multiplier on the stage-0 input row.
    assert!((out.u(0)[0] + 1.0).abs() < 1e-6);
    assert!(out.lam_lower(0)[2] > 1e-6);
    assert!(out.lam_upper(0)[2].abs() < 1e-6);
}

#[test]
fn soft_velocity_limit_is_violated_only_through_slacks() {
    let problem = DoubleIntegrator {
        x0: [5.0, 0.0],
        u_max: 10.0,
        v_max: Some(0.5),
        slack_weight: 1e4,
        ..DoubleIntegrator::default()
    }
    .problem(QpSolverKind::InteriorPoint)
    .unwrap();
    let mut solver = problem.solver().unwrap();
    let mut out = problem.nlp_out().unwrap();
    solver.step(&problem.nlp_in, &mut out).unwrap();

    for k in 1..=problem.dims().horizon() {
        let v = out.x(k)[1];
        let s = out.s(k)[0];
        assert!(s >= -1e-8, "stage {k}: slack {s}");
        assert!(v.abs() <= 0.5 + s + 1e-6, "stage {k}: v = {v}, s = {s}");
    }
}

#[test]
fn duals_are_skipped_when_disabled() {
    let problem = ScalarLq::default().problem(QpSolverKind::InteriorPoint).unwrap();
    let mut opts = problem.options().unwrap();
    opts.set("compute_dual_sol", false).unwrap();
    let mut solver = problem.solver_with(opts).unwrap();
    let mut out = problem.nlp_out().unwrap();
    solver.step(&problem.nlp_in, &mut out).unwrap();
    assert_eq!(out.pi(0), &[0.0]);
    assert!(out.u(0)[0] != 0.0);
}

#[cfg(not(feature = "active-set"))]
#[test]
fn unavailable_backend_fails_before_any_allocation() {
    use rti_core::ConfigError;
    use rti_engine::RtiError;

    let err = ScalarLq::default()
        .problem(QpSolverKind::ActiveSet)
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::BackendUnavailable { .. }));
    assert_eq!(Status::from(&err), Status::Failure);
    assert_eq!(Status::from(&RtiError::from(err)), Status::Failure);
}
