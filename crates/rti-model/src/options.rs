//! Per-stage model options.
//!
//! Each role has one small options struct with a string-keyed setter.
//! The engine holds one instance per stage and hands it to the model on
//! every evaluation.

use std::sync::OnceLock;

use rti_core::{ConfigError, OptionRegistry, OptionValue};

/// Highest explicit Runge–Kutta order with a built-in tableau.
pub const MAX_RK_ORDER: usize = 4;

// ── Dynamics ───────────────────────────────────────────────────────

/// Options for one stage's dynamics model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DynamicsOptions {
    /// Integrator steps per shooting interval.
    pub num_steps: usize,
    /// Explicit Runge–Kutta order, `1..=4`.
    pub rk_order: usize,
}

impl Default for DynamicsOptions {
    fn default() -> Self {
        Self {
            num_steps: 1,
            rk_order: 4,
        }
    }
}

impl DynamicsOptions {
    fn registry() -> &'static OptionRegistry<Self> {
        static REGISTRY: OnceLock<OptionRegistry<DynamicsOptions>> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            OptionRegistry::<DynamicsOptions>::new()
                .with("num_steps", |o, v| {
                    o.num_steps = v.as_count("num_steps")?;
                    Ok(())
                })
                .with("rk_order", |o, v| {
                    let order = v.as_count("rk_order")?;
                    if order > MAX_RK_ORDER {
                        return Err(ConfigError::OptionRange {
                            field: "rk_order".to_string(),
                            reason: format!("{order} exceeds {MAX_RK_ORDER}"),
                        });
                    }
                    o.rk_order = order;
                    Ok(())
                })
        })
    }

    /// Set one field by name.
    pub fn set(&mut self, field: &str, value: impl Into<OptionValue>) -> Result<(), ConfigError> {
        Self::registry().set(self, field, value.into())
    }

    /// Accepted field names.
    pub fn field_names() -> Vec<&'static str> {
        Self::registry().names().collect()
    }

    /// Check fields that may have been assigned directly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_steps == 0 {
            return Err(range("num_steps", "must be at least 1".to_string()));
        }
        if !(1..=MAX_RK_ORDER).contains(&self.rk_order) {
            return Err(range(
                "rk_order",
                format!("{} not in 1..={MAX_RK_ORDER}", self.rk_order),
            ));
        }
        Ok(())
    }
}

// ── Cost ───────────────────────────────────────────────────────────

/// Options for one stage's cost model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostOptions {
    /// Factor applied to value, gradient and Hessian.
    pub scaling: f64,
}

impl Default for CostOptions {
    fn default() -> Self {
        Self { scaling: 1.0 }
    }
}

impl CostOptions {
    fn registry() -> &'static OptionRegistry<Self> {
        static REGISTRY: OnceLock<OptionRegistry<CostOptions>> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            OptionRegistry::<CostOptions>::new().with("scaling", |o, v| {
                o.scaling = v.as_non_negative("scaling")?;
                Ok(())
            })
        })
    }

    /// Set one field by name.
    pub fn set(&mut self, field: &str, value: impl Into<OptionValue>) -> Result<(), ConfigError> {
        Self::registry().set(self, field, value.into())
    }

    /// Accepted field names.
    pub fn field_names() -> Vec<&'static str> {
        Self::registry().names().collect()
    }

    /// Check fields that may have been assigned directly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.scaling.is_finite() && self.scaling >= 0.0) {
            return Err(range("scaling", format!("{} must be finite and >= 0", self.scaling)));
        }
        Ok(())
    }
}

// ── Constraints ────────────────────────────────────────────────────

/// Options for one stage's constraint model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstraintsOptions {
    /// Margin by which every finite bound is tightened.
    pub tighten: f64,
}

impl Default for ConstraintsOptions {
    fn default() -> Self {
        Self { tighten: 0.0 }
    }
}

impl ConstraintsOptions {
    fn registry() -> &'static OptionRegistry<Self> {
        static REGISTRY: OnceLock<OptionRegistry<ConstraintsOptions>> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            OptionRegistry::<ConstraintsOptions>::new().with("tighten", |o, v| {
                o.tighten = v.as_non_negative("tighten")?;
                Ok(())
            })
        })
    }

    /// Set one field by name.
    pub fn set(&mut self, field: &str, value: impl Into<OptionValue>) -> Result<(), ConfigError> {
        Self::registry().set(self, field, value.into())
    }

    /// Accepted field names.
    pub fn field_names() -> Vec<&'static str> {
        Self::registry().names().collect()
    }

    /// Check fields that may have been assigned directly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tighten.is_finite() && self.tighten >= 0.0) {
            return Err(range("tighten", format!("{} must be finite and >= 0", self.tighten)));
        }
        Ok(())
    }

    /// `lo` raised by the margin. Infinite bounds stay infinite.
    pub fn lower(&self, lo: f64) -> f64 {
        if lo.is_finite() {
            lo + self.tighten
        } else {
            lo
        }
    }

    /// `up` lowered by the margin. Infinite bounds stay infinite.
    pub fn upper(&self, up: f64) -> f64 {
        if up.is_finite() {
            up - self.tighten
        } else {
            up
        }
    }
}

fn range(field: &str, reason: String) -> ConfigError {
    ConfigError::OptionRange {
        field: field.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        DynamicsOptions::default().validate().unwrap();
        CostOptions::default().validate().unwrap();
        ConstraintsOptions::default().validate().unwrap();
    }

    #[test]
    fn rk_order_is_bounded() {
        let mut o = DynamicsOptions::default();
        o.set("rk_order", 2i64).unwrap();
        assert_eq!(o.rk_order, 2);
        assert!(matches!(
            o.set("rk_order", 5i64),
            Err(ConfigError::OptionRange { .. })
        ));
        assert!(o.set("rk_order", 0i64).is_err());
        assert_eq!(o.rk_order, 2);
    }

    #[test]
    fn unknown_field_names_the_vocabulary() {
        let mut o = CostOptions::default();
        match o.set("scale", 2.0) {
            Err(ConfigError::UnknownOption { field, accepted }) => {
                assert_eq!(field, "scale");
                assert_eq!(accepted, vec!["scaling"]);
            }
            other => panic!("expected UnknownOption, got {other:?}"),
        }
    }

    #[test]
    fn tightening_leaves_infinite_bounds() {
        let mut o = ConstraintsOptions::default();
        o.set("tighten", 0.1).unwrap();
        assert!((o.lower(1.0) - 1.1).abs() < 1e-15);
        assert!((o.upper(1.0) - 0.9).abs() < 1e-15);
        assert_eq!(o.lower(f64::NEG_INFINITY), f64::NEG_INFINITY);
        assert_eq!(o.upper(f64::INFINITY), f64::INFINITY);
        assert!(o.set("tighten", -1.0).is_err());
    }
}
