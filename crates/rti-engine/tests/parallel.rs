//! Integration test: threaded stage evaluation and concurrent instances.
//!
//! Stage work is split across threads but reduced in stage order, so the
//! iterate must be bit-identical for any `num_threads`. Independent
//! solvers sharing one resolved configuration must not interfere.

use std::sync::Arc;

use rti_core::QpSolverKind;
use rti_engine::NlpOut;
use rti_test_utils::{PendulumSwing, Problem};

fn iterate(out: &NlpOut) -> Vec<f64> {
    (0..=out.dims().horizon())
        .flat_map(|k| {
            out.u(k)
                .iter()
                .chain(out.x(k))
                .chain(out.s(k))
                .chain(out.pi(k))
                .chain(out.lam_lower(k))
                .chain(out.lam_upper(k))
                .copied()
                .collect::<Vec<_>>()
        })
        .collect()
}

fn run(problem: &Problem, threads: usize, calls: usize) -> Vec<f64> {
    let mut opts = problem.options().unwrap();
    opts.set("num_threads", threads).unwrap();
    let mut solver = problem.solver_with(opts).unwrap();
    let mut out = problem.nlp_out().unwrap();
    for _ in 0..calls {
        solver.step(&problem.nlp_in, &mut out).unwrap();
    }
    iterate(&out)
}

#[test]
fn thread_count_does_not_change_the_iterate() {
    let problem = PendulumSwing::default()
        .problem(QpSolverKind::InteriorPoint)
        .unwrap();
    let reference = run(&problem, 1, 3);
    for threads in [2, 3, 4, 64] {
        assert_eq!(run(&problem, threads, 3), reference, "{threads} threads");
    }
}

#[test]
fn instances_sharing_a_configuration_run_concurrently() {
    let swing = PendulumSwing::default();
    let mut left = swing.problem(QpSolverKind::InteriorPoint).unwrap();
    let mut right = swing.problem(QpSolverKind::InteriorPoint).unwrap();
    right.config = Arc::clone(&left.config);
    left.set_x0(&[0.4, 0.0]).unwrap();
    right.set_x0(&[-0.6, 1.0]).unwrap();

    let expected = (run(&left, 1, 4), run(&right, 2, 4));
    let got = std::thread::scope(|s| {
        let a = s.spawn(|| run(&left, 1, 4));
        let b = s.spawn(|| run(&right, 2, 4));
        (a.join().unwrap(), b.join().unwrap())
    });
    assert_eq!(got, expected);
    assert_ne!(got.0, got.1);
    assert_eq!(Arc::strong_count(&left.config), 2);
}
