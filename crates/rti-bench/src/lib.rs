//! Benchmark profiles for the RTI framework.
//!
//! Each profile is a ready-to-step solver plus its model container and a
//! fresh iterate:
//!
//! - [`reference_profile`]: pendulum swing-up, 30 ERK stages
//! - [`stress_profile`]: the same pendulum over 300 stages
//! - [`linear_profile`]: constrained double integrator, 20 stages

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rti_core::{ConfigError, QpSolverKind};
use rti_engine::{NlpIn, NlpOut, SqpRti};
use rti_test_utils::{DoubleIntegrator, PendulumSwing, Problem};

/// A solver with everything it needs to step.
pub struct Profile {
    pub solver: SqpRti,
    pub nlp_in: NlpIn,
    pub nlp_out: NlpOut,
}

impl Profile {
    fn build(problem: Problem, threads: usize) -> Result<Self, ConfigError> {
        let mut opts = problem.options()?;
        opts.set("num_threads", threads)?;
        let solver = problem.solver_with(opts)?;
        let nlp_out = problem.nlp_out()?;
        Ok(Self {
            solver,
            nlp_in: problem.nlp_in,
            nlp_out,
        })
    }
}

/// Pendulum swing-up over 30 stages (nx = 2, nu = 1, RK4).
pub fn reference_profile(qp: QpSolverKind, threads: usize) -> Result<Profile, ConfigError> {
    Profile::build(PendulumSwing::default().problem(qp)?, threads)
}

/// Pendulum swing-up over 300 stages, 10x the reference horizon.
pub fn stress_profile(qp: QpSolverKind, threads: usize) -> Result<Profile, ConfigError> {
    let swing = PendulumSwing {
        horizon: 300,
        dt: 0.005,
        ..PendulumSwing::default()
    };
    Profile::build(swing.problem(qp)?, threads)
}

/// Double integrator with input bounds and a soft velocity limit.
pub fn linear_profile(qp: QpSolverKind) -> Result<Profile, ConfigError> {
    let di = DoubleIntegrator {
        x0: [3.0, 0.0],
        v_max: Some(0.8),
        ..DoubleIntegrator::default()
    };
    Profile::build(di.problem(qp)?, 1)
}
