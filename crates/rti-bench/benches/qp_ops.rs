//! Criterion micro-benchmarks for the dense QP backends.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rti_bench::linear_profile;
use rti_core::QpSolverKind;
use rti_qp::{resolve, QpIn, QpOut, QpRes, QpSolver};

/// The QP assembled by one engine call on the linear profile.
fn assembled_qp() -> QpIn {
    let mut p = linear_profile(QpSolverKind::InteriorPoint).unwrap();
    p.solver.step(&p.nlp_in, &mut p.nlp_out).unwrap();
    let view = p.solver.qp_in();
    let mut qp = QpIn::new(*view.dims()).unwrap();
    qp.copy_from(&view).unwrap();
    qp
}

fn bench_solve(c: &mut Criterion) {
    let qp = assembled_qp();
    for kind in [QpSolverKind::InteriorPoint, QpSolverKind::Admm] {
        let mut opts = resolve(kind).unwrap().default_options();
        opts.common.max_iter = 20_000;
        let mut solver = QpSolver::new(kind, *qp.dims(), &opts).unwrap();
        let mut out = QpOut::new(*qp.dims()).unwrap();

        c.bench_function(&format!("qp_solve_{kind}"), |b| {
            b.iter(|| {
                let info = solver.solve(&qp, &mut out).unwrap();
                black_box(info);
            });
        });
    }
}

fn bench_residuals(c: &mut Criterion) {
    let qp = assembled_qp();
    let opts = resolve(QpSolverKind::InteriorPoint).unwrap().default_options();
    let mut solver = QpSolver::new(QpSolverKind::InteriorPoint, *qp.dims(), &opts).unwrap();
    let mut out = QpOut::new(*qp.dims()).unwrap();
    solver.solve(&qp, &mut out).unwrap();
    let mut res = QpRes::new(*qp.dims()).unwrap();

    c.bench_function("qp_residuals", |b| {
        b.iter(|| {
            let r = res.compute(&qp, &out).unwrap();
            black_box(r);
        });
    });
}

fn bench_solver_creation(c: &mut Criterion) {
    let qp = assembled_qp();
    let opts = resolve(QpSolverKind::InteriorPoint).unwrap().default_options();
    c.bench_function("qp_solver_create", |b| {
        b.iter(|| {
            let s = QpSolver::new(QpSolverKind::InteriorPoint, *qp.dims(), &opts).unwrap();
            black_box(s.memory_bytes());
        });
    });
}

criterion_group!(benches, bench_solve, bench_residuals, bench_solver_creation);
criterion_main!(benches);
