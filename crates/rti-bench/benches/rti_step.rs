//! Criterion benchmarks for one real-time iteration.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rti_bench::{linear_profile, reference_profile, stress_profile, Profile};
use rti_core::QpSolverKind;

fn bench_profile(c: &mut Criterion, name: &str, mut p: Profile) {
    let start = p.nlp_out.clone();
    // Warm up: first call touches every page of the workspace
    p.solver.step(&p.nlp_in, &mut p.nlp_out).unwrap();

    c.bench_function(name, |b| {
        b.iter(|| {
            p.nlp_out.copy_from(&start).unwrap();
            let report = p.solver.step(&p.nlp_in, &mut p.nlp_out).unwrap();
            black_box(&report);
        });
    });
}

fn bench_pendulum_30(c: &mut Criterion) {
    let p = reference_profile(QpSolverKind::InteriorPoint, 1).unwrap();
    bench_profile(c, "step_pendulum_30", p);
}

fn bench_pendulum_300(c: &mut Criterion) {
    for threads in [1, 4] {
        let p = stress_profile(QpSolverKind::InteriorPoint, threads).unwrap();
        bench_profile(c, &format!("step_pendulum_300_t{threads}"), p);
    }
}

fn bench_double_integrator(c: &mut Criterion) {
    for qp in [QpSolverKind::InteriorPoint, QpSolverKind::Admm] {
        let p = linear_profile(qp).unwrap();
        bench_profile(c, &format!("step_double_integrator_{qp}"), p);
    }
}

criterion_group!(
    benches,
    bench_pendulum_30,
    bench_pendulum_300,
    bench_double_integrator
);
criterion_main!(benches);
