//! Problem builders.
//!
//! - [`ScalarLq`]: one interval, scalar state and input, closed-form optimum.
//! - [`DoubleIntegrator`]: linear, input-bounded, optional soft velocity limit.
//! - [`PendulumSwing`]: ERK pendulum with a nonlinear least-squares cost.
//! - [`random_lq`]: seeded random linear-quadratic problem.

use std::iter::repeat_n;

use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rti_core::{
    ConfigError, CostKind, DynamicsKind, ModelError, ModelRole, OcpDims, QpSolverKind,
    RegularizationKind, StageDims,
};
use rti_engine::{NlpIn, Plan};
use rti_model::{
    ErkDynamics, LinearConstraints, LinearDynamics, LinearLsCost, NonlinearLsCost, StageBounds,
};

use crate::models::{Pendulum, PendulumResidual};
use crate::{model, Problem};

// ── Shared pieces ──────────────────────────────────────────────────

/// `½ (xᵀ diag(wx) x + uᵀ diag(wu) u)` as a linear least-squares cost.
fn diagonal_ls(wx: &[f64], wu: &[f64]) -> Result<LinearLsCost, ModelError> {
    let (nx, nu) = (wx.len(), wu.len());
    let ny = nx + nu;
    let vx = DMatrix::from_fn(ny, nx, |i, j| if i == j { 1.0 } else { 0.0 });
    let vu = DMatrix::from_fn(ny, nu, |i, j| if i == nx + j { 1.0 } else { 0.0 });
    let w = DMatrix::from_diagonal(&DVector::from_iterator(
        ny,
        wx.iter().chain(wu).copied(),
    ));
    LinearLsCost::new(vx, vu, w)
}

/// Stage-0 bounds: every state pinned to `x0`, then `|u| ≤ u_max`.
fn pinned(
    nx: usize,
    nu: usize,
    x0: &[f64],
    u_max: Option<f64>,
) -> Result<StageBounds, ModelError> {
    let mut idxb: Vec<usize> = (nu..nu + nx).collect();
    let (mut lb, mut ub) = (x0.to_vec(), x0.to_vec());
    if let Some(m) = u_max {
        idxb.extend(0..nu);
        lb.extend(repeat_n(-m, nu));
        ub.extend(repeat_n(m, nu));
    }
    StageBounds::new(nx, nu).with_box(idxb, lb, ub)
}

fn input_box(nx: usize, nu: usize, u_max: f64) -> Result<StageBounds, ModelError> {
    StageBounds::new(nx, nu).with_box((0..nu).collect(), vec![-u_max; nu], vec![u_max; nu])
}

fn set_boxes(
    nlp: &mut NlpIn,
    stage: usize,
    bounds: Result<StageBounds, ModelError>,
) -> Result<(), ConfigError> {
    let bounds = model(ModelRole::Constraints, stage, bounds)?;
    let c = model(ModelRole::Constraints, stage, LinearConstraints::boxes(bounds))?;
    nlp.set_constraints(stage, c)
}

// ── Scalar LQ ──────────────────────────────────────────────────────

/// `min ½ q x₀² + ½ r u² + ½ p x₁²` subject to `x₁ = a x₀ + b u`, `x₀`
/// fixed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalarLq {
    pub a: f64,
    pub b: f64,
    pub q: f64,
    pub r: f64,
    pub p: f64,
    pub x0: f64,
}

impl Default for ScalarLq {
    fn default() -> Self {
        Self {
            a: 1.2,
            b: 0.5,
            q: 1.0,
            r: 0.1,
            p: 2.0,
            x0: 1.0,
        }
    }
}

impl ScalarLq {
    /// `u* = −p b a x₀ / (r + p b²)`.
    pub fn optimal_u(&self) -> f64 {
        -(self.p * self.b * self.a * self.x0) / (self.r + self.p * self.b * self.b)
    }

    pub fn optimal_x1(&self) -> f64 {
        self.a * self.x0 + self.b * self.optimal_u()
    }

    pub fn problem(&self, qp: QpSolverKind) -> Result<Problem, ConfigError> {
        let dims = OcpDims::new(vec![
            StageDims::new(1, 1).with_bounds(1),
            StageDims::new(1, 0),
        ])?;
        let config = Plan::new(1, qp).resolve()?;
        let mut nlp = NlpIn::new(dims);
        let dynamics = LinearDynamics::new(
            DMatrix::from_element(1, 1, self.a),
            DMatrix::from_element(1, 1, self.b),
        );
        nlp.set_dynamics(0, model(ModelRole::Dynamics, 0, dynamics)?)?;
        nlp.set_cost(0, model(ModelRole::Cost, 0, diagonal_ls(&[self.q], &[self.r]))?)?;
        nlp.set_cost(1, model(ModelRole::Cost, 1, diagonal_ls(&[self.p], &[]))?)?;
        set_boxes(&mut nlp, 0, pinned(1, 1, &[self.x0], None))?;
        set_boxes(&mut nlp, 1, Ok(StageBounds::new(1, 0)))?;
        Ok(Problem {
            config,
            nlp_in: nlp,
            x0: vec![self.x0],
            u_lower: Vec::new(),
            u_upper: Vec::new(),
        })
    }
}

// ── Double integrator ──────────────────────────────────────────────

/// Position/velocity double integrator driven by a bounded
/// acceleration. With `v_max` set, every stage after the first carries
/// a soft `|v| ≤ v_max` row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DoubleIntegrator {
    pub horizon: usize,
    pub dt: f64,
    pub u_max: f64,
    pub v_max: Option<f64>,
    /// Quadratic penalty on the velocity slack.
    pub slack_weight: f64,
    pub x0: [f64; 2],
}

impl Default for DoubleIntegrator {
    fn default() -> Self {
        Self {
            horizon: 20,
            dt: 0.1,
            u_max: 1.0,
            v_max: None,
            slack_weight: 100.0,
            x0: [1.0, 0.0],
        }
    }
}

impl DoubleIntegrator {
    pub fn problem(&self, qp: QpSolverKind) -> Result<Problem, ConfigError> {
        let n = self.horizon;
        let soft = usize::from(self.v_max.is_some());
        let mut stages = vec![StageDims::new(2, 1).with_bounds(3)];
        stages.extend(repeat_n(
            StageDims::new(2, 1).with_bounds(1 + soft).with_soft(soft),
            n.saturating_sub(1),
        ));
        stages.push(StageDims::new(2, 0).with_bounds(soft).with_soft(soft));
        let dims = OcpDims::new(stages)?;

        let config = Plan::new(n, qp).resolve()?;
        let mut nlp = NlpIn::new(dims);
        let dt = self.dt;
        let a = DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]);
        let b = DMatrix::from_row_slice(2, 1, &[0.5 * dt * dt, dt]);
        for k in 0..n {
            let dynamics = LinearDynamics::new(a.clone(), b.clone());
            nlp.set_dynamics(k, model(ModelRole::Dynamics, k, dynamics)?)?;
            nlp.set_cost(k, model(ModelRole::Cost, k, diagonal_ls(&[1.0, 0.1], &[0.01]))?)?;
        }
        nlp.set_cost(n, model(ModelRole::Cost, n, diagonal_ls(&[10.0, 1.0], &[]))?)?;

        set_boxes(&mut nlp, 0, pinned(2, 1, &self.x0, Some(self.u_max)))?;
        for k in 1..=n {
            let nu = usize::from(k < n);
            let bounds = match self.v_max {
                None => input_box(2, nu, self.u_max),
                Some(v) => {
                    let mut idxb: Vec<usize> = (0..nu).collect();
                    idxb.push(nu + 1);
                    let mut lb = vec![-self.u_max; nu];
                    let mut ub = vec![self.u_max; nu];
                    lb.push(-v);
                    ub.push(v);
                    StageBounds::new(2, nu)
                        .with_box(idxb, lb, ub)
                        .and_then(|b| b.with_soft(vec![nu], vec![self.slack_weight], vec![0.0]))
                }
            };
            set_boxes(&mut nlp, k, bounds)?;
        }
        Ok(Problem {
            config,
            nlp_in: nlp,
            x0: self.x0.to_vec(),
            u_lower: vec![-self.u_max],
            u_upper: vec![self.u_max],
        })
    }
}

// ── Pendulum ───────────────────────────────────────────────────────

/// Damped pendulum stabilised at `θ = 0` under a torque limit, with RK
/// integration and a `sin θ` least-squares cost.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendulumSwing {
    pub horizon: usize,
    pub dt: f64,
    pub u_max: f64,
    pub pendulum: Pendulum,
    pub x0: [f64; 2],
}

impl Default for PendulumSwing {
    fn default() -> Self {
        Self {
            horizon: 30,
            dt: 0.05,
            u_max: 2.0,
            pendulum: Pendulum::default(),
            x0: [0.8, 0.0],
        }
    }
}

impl PendulumSwing {
    pub fn problem(&self, qp: QpSolverKind) -> Result<Problem, ConfigError> {
        let n = self.horizon;
        let mut stages = vec![StageDims::new(2, 1).with_bounds(3)];
        stages.extend(repeat_n(StageDims::new(2, 1).with_bounds(1), n.saturating_sub(1)));
        stages.push(StageDims::new(2, 0));
        let dims = OcpDims::new(stages)?;

        let config = Plan::new(n, qp)
            .with_dynamics(DynamicsKind::Erk)
            .with_cost(CostKind::NonlinearLs)
            .with_regularization(RegularizationKind::Project)
            .resolve()?;
        let mut nlp = NlpIn::new(dims);
        let stage_w = DMatrix::from_diagonal(&DVector::from_vec(vec![10.0, 1.0, 1.0]));
        let terminal_w = DMatrix::from_diagonal(&DVector::from_vec(vec![50.0, 5.0]));
        for k in 0..n {
            let dynamics = ErkDynamics::new(self.pendulum, self.dt);
            nlp.set_dynamics(k, model(ModelRole::Dynamics, k, dynamics)?)?;
            let residual = PendulumResidual { rho: Some(0.1) };
            let cost = NonlinearLsCost::new(residual, stage_w.clone());
            nlp.set_cost(k, model(ModelRole::Cost, k, cost)?)?;
        }
        let cost = NonlinearLsCost::new(PendulumResidual { rho: None }, terminal_w);
        nlp.set_cost(n, model(ModelRole::Cost, n, cost)?)?;

        set_boxes(&mut nlp, 0, pinned(2, 1, &self.x0, Some(self.u_max)))?;
        for k in 1..n {
            set_boxes(&mut nlp, k, input_box(2, 1, self.u_max))?;
        }
        set_boxes(&mut nlp, n, Ok(StageBounds::new(2, 0)))?;
        Ok(Problem {
            config,
            nlp_in: nlp,
            x0: self.x0.to_vec(),
            u_lower: vec![-self.u_max],
            u_upper: vec![self.u_max],
        })
    }
}

// ── Random LQ ──────────────────────────────────────────────────────

/// Input bound of [`random_lq`] problems.
pub const RANDOM_U_MAX: f64 = 5.0;

/// A seeded random linear-quadratic problem with `1..=4` states,
/// `1..=2` inputs and input bounds `±RANDOM_U_MAX`.
pub fn random_lq(seed: u64, horizon: usize, qp: QpSolverKind) -> Result<Problem, ConfigError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let nx = rng.random_range(1..=4);
    let nu = rng.random_range(1..=2);

    let mut stages = vec![StageDims::new(nx, nu).with_bounds(nx + nu)];
    stages.extend(repeat_n(
        StageDims::new(nx, nu).with_bounds(nu),
        horizon.saturating_sub(1),
    ));
    stages.push(StageDims::new(nx, 0));
    let dims = OcpDims::new(stages)?;

    let config = Plan::new(horizon, qp).resolve()?;
    let mut nlp = NlpIn::new(dims);
    let a = DMatrix::from_fn(nx, nx, |i, j| {
        let e = 0.2 * rng.random_range(-1.0..1.0);
        if i == j {
            1.0 + e
        } else {
            e
        }
    });
    let b = DMatrix::from_fn(nx, nu, |_, _| rng.random_range(-1.0..1.0));
    let wx: Vec<f64> = (0..nx).map(|_| rng.random_range(0.5..2.0)).collect();
    let wu: Vec<f64> = (0..nu).map(|_| rng.random_range(0.1..1.0)).collect();
    let x0: Vec<f64> = (0..nx).map(|_| rng.random_range(-1.0..1.0)).collect();

    for k in 0..horizon {
        let dynamics = LinearDynamics::new(a.clone(), b.clone());
        nlp.set_dynamics(k, model(ModelRole::Dynamics, k, dynamics)?)?;
        nlp.set_cost(k, model(ModelRole::Cost, k, diagonal_ls(&wx, &wu))?)?;
    }
    nlp.set_cost(horizon, model(ModelRole::Cost, horizon, diagonal_ls(&wx, &[]))?)?;

    set_boxes(&mut nlp, 0, pinned(nx, nu, &x0, Some(RANDOM_U_MAX)))?;
    for k in 1..horizon {
        set_boxes(&mut nlp, k, input_box(nx, nu, RANDOM_U_MAX))?;
    }
    set_boxes(&mut nlp, horizon, Ok(StageBounds::new(nx, 0)))?;
    Ok(Problem {
        config,
        nlp_in: nlp,
        x0,
        u_lower: vec![-RANDOM_U_MAX; nu],
        u_upper: vec![RANDOM_U_MAX; nu],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_optimum_satisfies_stationarity() {
        let p = ScalarLq::default();
        let u = p.optimal_u();
        let grad = p.r * u + p.p * p.b * p.optimal_x1();
        assert!(grad.abs() < 1e-12);
    }

    #[test]
    fn fixtures_have_consistent_dims() {
        let qp = QpSolverKind::InteriorPoint;
        let di = DoubleIntegrator {
            v_max: Some(0.5),
            ..DoubleIntegrator::default()
        }
        .problem(qp)
        .unwrap();
        assert_eq!(di.dims().horizon(), 20);
        assert_eq!(di.dims().stage(1).ns, 1);
        assert_eq!(di.dims().stage(20).nb, 1);

        let pend = PendulumSwing::default().problem(qp).unwrap();
        assert_eq!(pend.config.plan().dynamics[0], DynamicsKind::Erk);
        assert!(pend.nlp_in.cost(30).is_some());
    }

    #[test]
    fn random_problems_are_reproducible() {
        let a = random_lq(11, 5, QpSolverKind::Admm).unwrap();
        let b = random_lq(11, 5, QpSolverKind::Admm).unwrap();
        assert_eq!(a.dims(), b.dims());
        assert_eq!(a.x0, b.x0);
    }

    #[test]
    fn x0_moves_the_stage_zero_pin() {
        let mut p = DoubleIntegrator::default()
            .problem(QpSolverKind::InteriorPoint)
            .unwrap();
        p.set_x0(&[2.0, -1.0]).unwrap();
        let bounds = p.nlp_in.constraints(0).unwrap().bounds();
        assert_eq!(bounds.lb(), &[2.0, -1.0, -1.0]);
        assert_eq!(bounds.ub(), &[2.0, -1.0, 1.0]);
        assert!(p.set_x0(&[1.0]).is_err());
    }
}
