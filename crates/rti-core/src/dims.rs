//! Problem shape descriptors.
//!
//! [`OcpDims`] describes the optimal-control problem: `N` shooting
//! intervals and `N + 1` stages, each with its own [`StageDims`].
//! [`QpDims`] describes the dense QP the engine assembles from it.
//! Both are immutable once validated and drive every footprint
//! computation downstream.

use crate::error::ConfigError;

/// Shape of one stage.
///
/// Stage variables are ordered `[u, x]` (controls first), followed by the
/// `ns` slack variables of the stage's soft rows. Constraint rows are the
/// `nb` box rows followed by the `ng` general rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StageDims {
    /// Number of states.
    pub nx: usize,
    /// Number of controls.
    pub nu: usize,
    /// Number of box-bound rows on `[u, x]`.
    pub nb: usize,
    /// Number of general constraint rows.
    pub ng: usize,
    /// Number of soft (slacked) rows among the `nb + ng`.
    pub ns: usize,
}

impl StageDims {
    /// A stage with `nx` states and `nu` controls and no constraints.
    pub fn new(nx: usize, nu: usize) -> Self {
        Self {
            nx,
            nu,
            ..Self::default()
        }
    }

    /// Same stage with `nb` box rows.
    pub fn with_bounds(mut self, nb: usize) -> Self {
        self.nb = nb;
        self
    }

    /// Same stage with `ng` general rows.
    pub fn with_general(mut self, ng: usize) -> Self {
        self.ng = ng;
        self
    }

    /// Same stage with `ns` soft rows.
    pub fn with_soft(mut self, ns: usize) -> Self {
        self.ns = ns;
        self
    }

    /// Width of `[u, x]`.
    pub fn nw(&self) -> usize {
        self.nu + self.nx
    }

    /// Width of `[u, x, s]`.
    pub fn nv(&self) -> usize {
        self.nu + self.nx + self.ns
    }

    /// Number of constraint rows, `nb + ng`.
    pub fn rows(&self) -> usize {
        self.nb + self.ng
    }

    fn validate(&self, stage: usize) -> Result<(), ConfigError> {
        if self.nb > self.nw() {
            return Err(ConfigError::InvalidDims {
                reason: format!(
                    "stage {stage}: nb ({}) exceeds nu + nx ({})",
                    self.nb,
                    self.nw()
                ),
            });
        }
        if self.ns > self.rows() {
            return Err(ConfigError::InvalidDims {
                reason: format!(
                    "stage {stage}: ns ({}) exceeds nb + ng ({})",
                    self.ns,
                    self.rows()
                ),
            });
        }
        Ok(())
    }
}

/// Shape of the whole optimal-control problem.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OcpDims {
    stages: Vec<StageDims>,
}

impl OcpDims {
    /// Build from `N + 1` stage shapes.
    pub fn new(stages: Vec<StageDims>) -> Result<Self, ConfigError> {
        if stages.len() < 2 {
            return Err(ConfigError::InvalidDims {
                reason: format!(
                    "need at least one shooting interval, got {} stage(s)",
                    stages.len()
                ),
            });
        }
        for (k, s) in stages.iter().enumerate() {
            s.validate(k)?;
        }
        Ok(Self { stages })
    }

    /// `N` intervals with identical stages. The terminal stage has no
    /// controls and no constraints.
    pub fn uniform(n: usize, stage: StageDims) -> Result<Self, ConfigError> {
        let mut stages = vec![stage; n + 1];
        if let Some(last) = stages.last_mut() {
            *last = StageDims::new(stage.nx, 0);
        }
        Self::new(stages)
    }

    /// Replace the shape of stage `k`.
    pub fn set_stage(&mut self, k: usize, stage: StageDims) -> Result<(), ConfigError> {
        let stages = self.stages.len();
        if k >= stages {
            return Err(ConfigError::StageOutOfRange { stage: k, stages });
        }
        stage.validate(k)?;
        self.stages[k] = stage;
        Ok(())
    }

    /// Number of shooting intervals `N`.
    pub fn horizon(&self) -> usize {
        self.stages.len() - 1
    }

    /// Shape of stage `k`.
    ///
    /// # Panics
    ///
    /// Panics if `k > N`.
    pub fn stage(&self, k: usize) -> &StageDims {
        &self.stages[k]
    }

    /// All `N + 1` stage shapes.
    pub fn stages(&self) -> &[StageDims] {
        &self.stages
    }
}

/// Shape of a dense QP.
///
/// ```text
/// minimise   ½ vᵀ H v + gᵀ v
/// subject to A v = b                 (ne rows)
///            lb ≤ v[idxb] ≤ ub       (nb rows)
///            lg ≤ C v ≤ ug           (ng rows)
/// ```
///
/// `ns` counts slack variables inside `v`; it is informational only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct QpDims {
    /// Number of variables.
    pub nv: usize,
    /// Number of equality rows.
    pub ne: usize,
    /// Number of box rows.
    pub nb: usize,
    /// Number of general rows.
    pub ng: usize,
    /// Number of slack variables among the `nv`.
    pub ns: usize,
}

impl QpDims {
    /// Dense full-space shape of the step QP for `ocp`.
    ///
    /// Each soft row contributes its slack to `nv`, a `s ≥ 0` box row to
    /// `nb` and two one-sided general rows to `ng`.
    pub fn from_ocp(ocp: &OcpDims) -> Self {
        let stages = ocp.stages();
        let mut d = QpDims::default();
        for s in stages {
            d.nv += s.nv();
            d.nb += s.nb + s.ns;
            d.ng += s.ng + 2 * s.ns;
            d.ns += s.ns;
        }
        d.ne = stages[1..].iter().map(|s| s.nx).sum();
        d
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nb > self.nv {
            return Err(ConfigError::InvalidDims {
                reason: format!("nb ({}) exceeds nv ({})", self.nb, self.nv),
            });
        }
        if self.ns > self.nv {
            return Err(ConfigError::InvalidDims {
                reason: format!("ns ({}) exceeds nv ({})", self.ns, self.nv),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_terminal_stage_has_no_controls() {
        let d = OcpDims::uniform(3, StageDims::new(2, 1).with_bounds(1)).unwrap();
        assert_eq!(d.horizon(), 3);
        assert_eq!(d.stage(0).nu, 1);
        assert_eq!(d.stage(3).nu, 0);
        assert_eq!(d.stage(3).nb, 0);
        assert_eq!(d.stage(3).nx, 2);
    }

    #[test]
    fn zero_intervals_rejected() {
        match OcpDims::new(vec![StageDims::new(1, 1)]) {
            Err(ConfigError::InvalidDims { .. }) => {}
            other => panic!("expected InvalidDims, got {other:?}"),
        }
    }

    #[test]
    fn too_many_bounds_rejected() {
        let bad = StageDims::new(1, 1).with_bounds(3);
        match OcpDims::new(vec![bad, StageDims::new(1, 0)]) {
            Err(ConfigError::InvalidDims { reason }) => assert!(reason.contains("stage 0")),
            other => panic!("expected InvalidDims, got {other:?}"),
        }
    }

    #[test]
    fn too_many_soft_rows_rejected() {
        let bad = StageDims::new(2, 1).with_bounds(1).with_soft(2);
        assert!(OcpDims::new(vec![bad, StageDims::new(2, 0)]).is_err());
    }

    #[test]
    fn set_stage_checks_range() {
        let mut d = OcpDims::uniform(1, StageDims::new(1, 1)).unwrap();
        assert!(matches!(
            d.set_stage(2, StageDims::new(1, 1)),
            Err(ConfigError::StageOutOfRange { stage: 2, stages: 2 })
        ));
        d.set_stage(1, StageDims::new(1, 0).with_bounds(1)).unwrap();
        assert_eq!(d.stage(1).nb, 1);
    }

    #[test]
    fn qp_dims_count_slack_rows() {
        let stages = vec![
            StageDims::new(2, 1).with_bounds(1).with_general(1).with_soft(1),
            StageDims::new(3, 1).with_bounds(2),
            StageDims::new(1, 0),
        ];
        let ocp = OcpDims::new(stages).unwrap();
        let qp = QpDims::from_ocp(&ocp);
        assert_eq!(qp.nv, (3 + 1) + 4 + 1);
        assert_eq!(qp.ne, 3 + 1);
        assert_eq!(qp.nb, (1 + 1) + 2);
        assert_eq!(qp.ng, 1 + 2);
        assert_eq!(qp.ns, 1);
        qp.validate().unwrap();
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn stage() -> impl Strategy<Value = StageDims> {
            (1usize..4, 0usize..3, 0usize..3).prop_flat_map(|(nx, nu, ng)| {
                (0..=nx + nu, Just((nx, nu, ng))).prop_flat_map(|(nb, (nx, nu, ng))| {
                    (0..=nb + ng).prop_map(move |ns| StageDims { nx, nu, nb, ng, ns })
                })
            })
        }

        proptest! {
            #[test]
            fn valid_ocp_gives_valid_qp(stages in proptest::collection::vec(stage(), 2..6)) {
                let ocp = OcpDims::new(stages).unwrap();
                let qp = QpDims::from_ocp(&ocp);
                prop_assert!(qp.validate().is_ok());
                let nv: usize = ocp.stages().iter().map(|s| s.nu + s.nx + s.ns).sum();
                prop_assert_eq!(qp.nv, nv);
            }
        }
    }
}
