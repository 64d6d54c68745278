//! QP solver options: a common block plus one tagged backend block.

use std::sync::OnceLock;

use rti_core::{ConfigError, OptionRegistry, OptionValue, QpSolverKind};

use crate::backend::resolve;

// ── Common ─────────────────────────────────────────────────────────

/// Options every backend understands.
#[derive(Clone, Debug, PartialEq)]
pub struct QpCommonOptions {
    /// Iteration limit. Default depends on the backend.
    pub max_iter: usize,
    /// Stationarity tolerance.
    pub tol_stat: f64,
    /// Equality tolerance.
    pub tol_eq: f64,
    /// Inequality tolerance.
    pub tol_ineq: f64,
    /// Complementarity tolerance.
    pub tol_comp: f64,
    /// Start from the previous solution kept in backend memory.
    pub warm_start: bool,
}

impl Default for QpCommonOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol_stat: 1e-8,
            tol_eq: 1e-8,
            tol_ineq: 1e-8,
            tol_comp: 1e-8,
            warm_start: false,
        }
    }
}

impl QpCommonOptions {
    /// Same options with every tolerance set to `tol`.
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tol_stat = tol;
        self.tol_eq = tol;
        self.tol_ineq = tol;
        self.tol_comp = tol;
        self
    }

    fn registry() -> &'static OptionRegistry<QpCommonOptions> {
        static REGISTRY: OnceLock<OptionRegistry<QpCommonOptions>> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            OptionRegistry::<QpCommonOptions>::new()
                .with("max_iter", |o, v| {
                    o.max_iter = v.as_count("max_iter")?;
                    Ok(())
                })
                .with("tol_stat", |o, v| {
                    o.tol_stat = v.as_positive("tol_stat")?;
                    Ok(())
                })
                .with("tol_eq", |o, v| {
                    o.tol_eq = v.as_positive("tol_eq")?;
                    Ok(())
                })
                .with("tol_ineq", |o, v| {
                    o.tol_ineq = v.as_positive("tol_ineq")?;
                    Ok(())
                })
                .with("tol_comp", |o, v| {
                    o.tol_comp = v.as_positive("tol_comp")?;
                    Ok(())
                })
                .with("warm_start", |o, v| {
                    o.warm_start = v.as_bool("warm_start")?;
                    Ok(())
                })
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iter == 0 {
            return Err(range("max_iter", "must be at least 1".to_string()));
        }
        for (field, tol) in [
            ("tol_stat", self.tol_stat),
            ("tol_eq", self.tol_eq),
            ("tol_ineq", self.tol_ineq),
            ("tol_comp", self.tol_comp),
        ] {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(range(field, format!("{tol} must be finite and > 0")));
            }
        }
        Ok(())
    }
}

fn range(field: &str, reason: String) -> ConfigError {
    ConfigError::OptionRange {
        field: field.to_string(),
        reason,
    }
}

// ── Backend blocks ─────────────────────────────────────────────────

/// Interior-point options.
#[derive(Clone, Debug, PartialEq)]
pub struct IpmOptions {
    /// Initial slack and multiplier value. Default: 1.0.
    pub mu0: f64,
    /// Primal regularization added to the Newton matrix. Default: 1e-8.
    pub reg: f64,
}

impl Default for IpmOptions {
    fn default() -> Self {
        Self { mu0: 1.0, reg: 1e-8 }
    }
}

/// Operator-splitting (ADMM) options.
#[derive(Clone, Debug, PartialEq)]
pub struct AdmmOptions {
    /// Penalty parameter. Default: 0.1.
    pub rho: f64,
    /// Primal proximal weight. Default: 1e-6.
    pub sigma: f64,
    /// Over-relaxation factor in `(0, 2)`. Default: 1.6.
    pub alpha: f64,
    /// Tolerance of the infeasibility certificate. Default: 1e-5.
    pub eps_infeas: f64,
}

impl Default for AdmmOptions {
    fn default() -> Self {
        Self {
            rho: 0.1,
            sigma: 1e-6,
            alpha: 1.6,
            eps_infeas: 1e-5,
        }
    }
}

/// Dual active-set options.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActiveSetOptions {
    /// Multiple of the identity added to `H` before factorization.
    pub hessian_shift: f64,
}

/// Backend-specific options, tagged by backend.
#[derive(Clone, Debug, PartialEq)]
pub enum QpBackendOptions {
    /// Interior point.
    InteriorPoint(IpmOptions),
    /// ADMM.
    Admm(AdmmOptions),
    /// Dual active set.
    ActiveSet(ActiveSetOptions),
}

impl QpBackendOptions {
    /// Default block for `kind`.
    pub fn defaults(kind: QpSolverKind) -> Self {
        match kind {
            QpSolverKind::InteriorPoint => Self::InteriorPoint(IpmOptions::default()),
            QpSolverKind::Admm => Self::Admm(AdmmOptions::default()),
            QpSolverKind::ActiveSet => Self::ActiveSet(ActiveSetOptions::default()),
        }
    }

    /// Backend these options belong to.
    pub fn kind(&self) -> QpSolverKind {
        match self {
            Self::InteriorPoint(_) => QpSolverKind::InteriorPoint,
            Self::Admm(_) => QpSolverKind::Admm,
            Self::ActiveSet(_) => QpSolverKind::ActiveSet,
        }
    }

    fn names(&self) -> Vec<&'static str> {
        match self {
            Self::InteriorPoint(_) => ipm_registry().names().collect(),
            Self::Admm(_) => admm_registry().names().collect(),
            Self::ActiveSet(_) => active_set_registry().names().collect(),
        }
    }

    fn contains(&self, field: &str) -> bool {
        match self {
            Self::InteriorPoint(_) => ipm_registry().contains(field),
            Self::Admm(_) => admm_registry().contains(field),
            Self::ActiveSet(_) => active_set_registry().contains(field),
        }
    }

    fn set(&mut self, field: &str, value: OptionValue) -> Result<(), ConfigError> {
        match self {
            Self::InteriorPoint(o) => ipm_registry().set(o, field, value),
            Self::Admm(o) => admm_registry().set(o, field, value),
            Self::ActiveSet(o) => active_set_registry().set(o, field, value),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::InteriorPoint(o) => {
                if !(o.mu0.is_finite() && o.mu0 > 0.0) {
                    return Err(range("mu0", format!("{} must be > 0", o.mu0)));
                }
                if !(o.reg.is_finite() && o.reg >= 0.0) {
                    return Err(range("reg", format!("{} must be >= 0", o.reg)));
                }
            }
            Self::Admm(o) => {
                if !(o.rho.is_finite() && o.rho > 0.0) {
                    return Err(range("rho", format!("{} must be > 0", o.rho)));
                }
                if !(o.sigma.is_finite() && o.sigma > 0.0) {
                    return Err(range("sigma", format!("{} must be > 0", o.sigma)));
                }
                if !(o.alpha > 0.0 && o.alpha < 2.0) {
                    return Err(range("alpha", format!("{} not in (0, 2)", o.alpha)));
                }
                if !(o.eps_infeas.is_finite() && o.eps_infeas > 0.0) {
                    return Err(range("eps_infeas", format!("{} must be > 0", o.eps_infeas)));
                }
            }
            Self::ActiveSet(o) => {
                if !(o.hessian_shift.is_finite() && o.hessian_shift >= 0.0) {
                    return Err(range(
                        "hessian_shift",
                        format!("{} must be >= 0", o.hessian_shift),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn ipm_registry() -> &'static OptionRegistry<IpmOptions> {
    static REGISTRY: OnceLock<OptionRegistry<IpmOptions>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        OptionRegistry::<IpmOptions>::new()
            .with("mu0", |o, v| {
                o.mu0 = v.as_positive("mu0")?;
                Ok(())
            })
            .with("reg", |o, v| {
                o.reg = v.as_non_negative("reg")?;
                Ok(())
            })
    })
}

fn admm_registry() -> &'static OptionRegistry<AdmmOptions> {
    static REGISTRY: OnceLock<OptionRegistry<AdmmOptions>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        OptionRegistry::<AdmmOptions>::new()
            .with("rho", |o, v| {
                o.rho = v.as_positive("rho")?;
                Ok(())
            })
            .with("sigma", |o, v| {
                o.sigma = v.as_positive("sigma")?;
                Ok(())
            })
            .with("alpha", |o, v| {
                let alpha = v.as_positive("alpha")?;
                if alpha >= 2.0 {
                    return Err(range("alpha", format!("{alpha} not in (0, 2)")));
                }
                o.alpha = alpha;
                Ok(())
            })
            .with("eps_infeas", |o, v| {
                o.eps_infeas = v.as_positive("eps_infeas")?;
                Ok(())
            })
    })
}

fn active_set_registry() -> &'static OptionRegistry<ActiveSetOptions> {
    static REGISTRY: OnceLock<OptionRegistry<ActiveSetOptions>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        OptionRegistry::<ActiveSetOptions>::new().with("hessian_shift", |o, v| {
            o.hessian_shift = v.as_non_negative("hessian_shift")?;
            Ok(())
        })
    })
}

// ── QpSolverOptions ────────────────────────────────────────────────

/// Complete options of one QP solver instance.
#[derive(Clone, Debug, PartialEq)]
pub struct QpSolverOptions {
    /// Options shared by all backends.
    pub common: QpCommonOptions,
    /// Options of the selected backend.
    pub backend: QpBackendOptions,
}

impl QpSolverOptions {
    /// Defaults chosen by the backend for `kind`.
    ///
    /// Fails with [`ConfigError::BackendUnavailable`] if the backend was
    /// compiled out.
    pub fn new(kind: QpSolverKind) -> Result<Self, ConfigError> {
        Ok(resolve(kind)?.default_options())
    }

    /// Backend these options belong to.
    pub fn kind(&self) -> QpSolverKind {
        self.backend.kind()
    }

    /// Set one field by name.
    ///
    /// Common fields are tried first, then the backend's own. An unknown
    /// name fails with both vocabularies listed.
    pub fn set(&mut self, field: &str, value: impl Into<OptionValue>) -> Result<(), ConfigError> {
        let value = value.into();
        let common = QpCommonOptions::registry();
        if common.contains(field) {
            return common.set(&mut self.common, field, value);
        }
        if self.backend.contains(field) {
            return self.backend.set(field, value);
        }
        let mut accepted: Vec<&'static str> = common.names().collect();
        accepted.extend(self.backend.names());
        Err(ConfigError::UnknownOption {
            field: field.to_string(),
            accepted,
        })
    }

    /// Every field name `set` accepts for these options.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = QpCommonOptions::registry().names().collect();
        names.extend(self.backend.names());
        names
    }

    /// Check every field's range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.common.validate()?;
        self.backend.validate()
    }
}
