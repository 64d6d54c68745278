//! Integration test: reproducibility of solver copies and warm starts.

use proptest::prelude::*;
use rti_core::QpSolverKind;
use rti_engine::{NlpOut, SqpRti};
use rti_test_utils::{random_lq, DoubleIntegrator, PendulumSwing};

fn primal(out: &NlpOut) -> Vec<f64> {
    (0..=out.dims().horizon())
        .flat_map(|k| [out.u(k), out.x(k), out.s(k)].concat())
        .collect()
}

#[test]
fn solver_rebuilt_from_copied_settings_is_bit_identical() {
    let problem = PendulumSwing::default()
        .problem(QpSolverKind::InteriorPoint)
        .unwrap();
    let mut opts = problem.options().unwrap();
    opts.set("ext_qp_res", true).unwrap();
    opts.set("reg_epsilon", 1e-6).unwrap();
    let mut original = problem.solver_with(opts).unwrap();

    let mut copy = SqpRti::new(
        original.config().clone(),
        &problem.nlp_in,
        original.options().clone(),
    )
    .unwrap();
    copy.precompute(&problem.nlp_in).unwrap();
    assert_eq!(copy.memory_bytes(), original.memory_bytes());

    let mut a = problem.nlp_out().unwrap();
    let mut b = NlpOut::new(a.dims().clone()).unwrap();
    b.copy_from(&a).unwrap();
    for _ in 0..3 {
        let ra = original.step(&problem.nlp_in, &mut a).unwrap();
        let rb = copy.step(&problem.nlp_in, &mut b).unwrap();
        assert_eq!(ra.step_norm.to_bits(), rb.step_norm.to_bits());
        assert_eq!(ra.residuals, rb.residuals);
        assert_eq!(ra.qp.iter, rb.qp.iter);
    }
    assert_eq!(primal(&a), primal(&b));
    assert_eq!(original.stat().as_slice(), copy.stat().as_slice());
}

#[test]
fn reused_workspace_gives_bit_identical_iterates() {
    let problem = PendulumSwing::default()
        .problem(QpSolverKind::InteriorPoint)
        .unwrap();
    let mut opts = problem.options().unwrap();
    opts.set("ext_qp_res", true).unwrap();
    let mut fresh = problem.solver_with(opts.clone()).unwrap();
    opts.set("reuse_workspace", true).unwrap();
    let mut reused = problem.solver_with(opts).unwrap();

    let mut a = problem.nlp_out().unwrap();
    let mut b = problem.nlp_out().unwrap();
    for _ in 0..4 {
        let ra = fresh.step(&problem.nlp_in, &mut a).unwrap();
        let rb = reused.step(&problem.nlp_in, &mut b).unwrap();
        assert_eq!(ra.step_norm.to_bits(), rb.step_norm.to_bits());
        assert_eq!(ra.cost.to_bits(), rb.cost.to_bits());
        assert_eq!(ra.qp.iter, rb.qp.iter);
        assert_eq!(ra.residuals, rb.residuals);
    }
    let bits = |v: Vec<f64>| v.into_iter().map(f64::to_bits).collect::<Vec<_>>();
    assert_eq!(bits(primal(&a)), bits(primal(&b)));
    assert_eq!(
        bits(fresh.stat().as_slice().to_vec()),
        bits(reused.stat().as_slice().to_vec())
    );
}

#[test]
fn warm_started_repeat_needs_no_more_iterations() {
    let problem = DoubleIntegrator {
        x0: [2.0, -0.5],
        ..DoubleIntegrator::default()
    }
    .problem(QpSolverKind::Admm)
    .unwrap();
    let mut opts = problem.options().unwrap();
    opts.set("qp_warm_start", true).unwrap();
    let mut solver = problem.solver_with(opts).unwrap();
    assert!(solver.qp_solver().options().common.warm_start);

    let start = problem.nlp_out().unwrap();
    let mut out = problem.nlp_out().unwrap();
    let cold = solver.step(&problem.nlp_in, &mut out).unwrap();
    let cold_primal = primal(&out);

    out.copy_from(&start).unwrap();
    let warm = solver.step(&problem.nlp_in, &mut out).unwrap();
    assert!(warm.qp.iter <= cold.qp.iter, "warm {} > cold {}", warm.qp.iter, cold.qp.iter);
    for (w, c) in primal(&out).iter().zip(&cold_primal) {
        assert!((w - c).abs() < 1e-4);
    }

    solver.reset_warm_start();
    out.copy_from(&start).unwrap();
    let again = solver.step(&problem.nlp_in, &mut out).unwrap();
    assert_eq!(again.qp.iter, cold.qp.iter);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_lq_converges_in_one_call(seed in 0u64..10_000, horizon in 1usize..6) {
        let problem = random_lq(seed, horizon, QpSolverKind::InteriorPoint).unwrap();
        let mut opts = problem.options().unwrap();
        opts.set("ext_qp_res", true).unwrap();
        let mut solver = problem.solver_with(opts).unwrap();
        let mut out = problem.nlp_out().unwrap();

        let first = solver.step(&problem.nlp_in, &mut out).unwrap();
        let res = first.residuals.unwrap();
        prop_assert!(res.stat < 1e-6 && res.eq < 1e-6, "{:?}", res);
        prop_assert!(first.cost.is_finite());

        let second = solver.step(&problem.nlp_in, &mut out).unwrap();
        prop_assert!(second.step_norm < 1e-6, "step {}", second.step_norm);
        prop_assert_eq!(solver.stat().written(), 2);
    }
}
