//! Closed identifier sets for every pluggable role.
//!
//! Each role (QP solver, Hessian regularization, stage dynamics, stage
//! cost, stage constraints) has a fixed set of variants. A plan picks
//! one per role; resolution into implementations happens elsewhere.
//! Variants parse from their snake_case names so that plans can be built
//! from configuration text.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

macro_rules! kind_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $role:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The role this identifier selects an implementation for.
            pub const ROLE: &'static str = $role;

            /// Stable snake_case name.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(ConfigError::UnknownBackend {
                        role: $role,
                        name: other.to_string(),
                    }),
                }
            }
        }
    };
}

kind_enum! {
    /// Which dense QP algorithm solves the subproblem.
    QpSolverKind, "qp_solver" {
        /// Primal-dual interior point (Mehrotra predictor-corrector).
        InteriorPoint => "interior_point",
        /// Operator splitting (ADMM) with warm start.
        Admm => "admm",
        /// Goldfarb–Idnani dual active set. Requires the `active-set` feature.
        ActiveSet => "active_set",
    }
}

kind_enum! {
    /// How indefinite stage Hessians are made positive definite.
    RegularizationKind, "regularization" {
        /// Leave the Hessian untouched.
        NoRegularize => "no_regularize",
        /// Replace each eigenvalue by `max(|λ|, ε)`.
        Mirror => "mirror",
        /// Replace each eigenvalue by `max(λ, ε)`.
        Project => "project",
    }
}

kind_enum! {
    /// Stage dynamics model variant.
    DynamicsKind, "dynamics" {
        /// `x⁺ = A x + B u + c`.
        Linear => "linear",
        /// Explicit Runge–Kutta integration of an ODE.
        Erk => "erk",
        /// User-supplied discrete map with Jacobian.
        Discrete => "discrete",
    }
}

kind_enum! {
    /// Stage cost model variant.
    CostKind, "cost" {
        /// Linear least squares with a constant Gauss–Newton Hessian.
        LinearLs => "linear_ls",
        /// Nonlinear least squares with a Gauss–Newton Hessian.
        NonlinearLs => "nonlinear_ls",
        /// User-supplied value, gradient and Hessian.
        External => "external",
    }
}

kind_enum! {
    /// Stage constraint model variant.
    ConstraintKind, "constraints" {
        /// Box bounds plus linear general rows.
        Linear => "linear",
        /// Box bounds plus nonlinear general rows.
        Nonlinear => "nonlinear",
    }
}

/// The three per-stage model roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelRole {
    /// Stage transition.
    Dynamics,
    /// Stage objective.
    Cost,
    /// Stage path constraints.
    Constraints,
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dynamics => "dynamics",
            Self::Cost => "cost",
            Self::Constraints => "constraints",
        })
    }
}
