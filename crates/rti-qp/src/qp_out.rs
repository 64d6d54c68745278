//! QP solution and solver report.

use std::fmt;

use rti_arena::{Arena, ArenaMut, ArenaRef, Footprint, Span, SpanPlanner, Store, StoreMut};
use rti_core::{ConfigError, QpDims, Status};

/// Outcome of one QP solve, as reported by a backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum QpStatus {
    /// Converged to the requested tolerances.
    #[default]
    Success,
    /// Iteration limit reached.
    MaxIter,
    /// Primal infeasibility detected.
    Infeasible,
    /// Factorization breakdown or non-finite iterates.
    NumericalFailure,
}

impl QpStatus {
    /// `true` for [`QpStatus::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for QpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Status::from(*self), f)
    }
}

impl From<QpStatus> for Status {
    fn from(s: QpStatus) -> Self {
        match s {
            QpStatus::Success => Status::Success,
            QpStatus::MaxIter => Status::MaxIter,
            QpStatus::Infeasible => Status::Infeasible,
            QpStatus::NumericalFailure => Status::NumericalFailure,
        }
    }
}

/// Backend report attached to every [`QpOut`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QpInfo {
    /// Outcome.
    pub status: QpStatus,
    /// Iterations performed.
    pub iter: usize,
    /// Wall-clock solve time in microseconds.
    pub solve_us: u64,
}

#[derive(Clone, Copy, Debug)]
struct Layout {
    v: Span,
    y: Span,
    lam_lb: Span,
    lam_ub: Span,
    lam_lg: Span,
    lam_ug: Span,
}

impl Layout {
    fn plan(d: &QpDims) -> (Self, Footprint) {
        let mut p = SpanPlanner::new();
        let layout = Layout {
            v: p.reals(d.nv),
            y: p.reals(d.ne),
            lam_lb: p.reals(d.nb),
            lam_ub: p.reals(d.nb),
            lam_lg: p.reals(d.ng),
            lam_ug: p.reals(d.ng),
        };
        let fp = p.finish(QpOut::footprint(d));
        (layout, fp)
    }
}

/// Primal and dual solution of a dense QP.
///
/// Multipliers follow the convention
/// `H v + g + Aᵀ y + Eᵀ (λ_ub − λ_lb) + Cᵀ (λ_ug − λ_lg) = 0`
/// with every inequality multiplier non-negative.
#[derive(Clone, Debug)]
pub struct QpOut<S = Arena> {
    dims: QpDims,
    layout: Layout,
    arena: S,
    /// Report of the last solve that wrote this output.
    pub info: QpInfo,
}

/// A solution written through an exclusive region view.
pub type QpOutView<'a> = QpOut<ArenaMut<'a>>;

/// Simultaneous mutable access to the fields of a [`QpOut`].
#[derive(Debug)]
pub struct QpOutMut<'a> {
    /// Primal solution, `nv`.
    pub v: &'a mut [f64],
    /// Equality multipliers, `ne`.
    pub y: &'a mut [f64],
    /// Box lower multipliers, `nb`.
    pub lam_lb: &'a mut [f64],
    /// Box upper multipliers, `nb`.
    pub lam_ub: &'a mut [f64],
    /// General lower multipliers, `ng`.
    pub lam_lg: &'a mut [f64],
    /// General upper multipliers, `ng`.
    pub lam_ug: &'a mut [f64],
}

impl QpOut {
    /// Slots needed for a solution of shape `d`.
    pub fn footprint(d: &QpDims) -> Footprint {
        Footprint::reals(d.nv)
            + Footprint::reals(d.ne)
            + Footprint::reals(d.nb).repeat(2)
            + Footprint::reals(d.ng).repeat(2)
    }

    /// Allocate a zeroed solution of shape `dims`.
    pub fn new(dims: QpDims) -> Result<Self, ConfigError> {
        let fp = QpOut::footprint(&dims);
        Ok(Self::assign(dims, Arena::with_footprint(fp)?))
    }
}

impl<S: Store> QpOut<S> {
    /// Lay a solution of shape `dims` over `store`, which must hold exactly
    /// [`QpOut::footprint`] slots. The report starts at its default.
    pub fn assign(dims: QpDims, store: S) -> Self {
        let (layout, fp) = Layout::plan(&dims);
        debug_assert_eq!(store.footprint(), fp, "qp_out store does not match its layout");
        Self {
            dims,
            layout,
            arena: store,
            info: QpInfo::default(),
        }
    }

    /// Borrow the solution as a shared view, report included.
    pub fn as_view(&self) -> QpOut<ArenaRef<'_>> {
        QpOut {
            dims: self.dims,
            layout: self.layout,
            arena: self.arena.share(),
            info: self.info,
        }
    }

    /// Shape of this solution.
    pub fn dims(&self) -> &QpDims {
        &self.dims
    }

    /// Backing storage size in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.arena.memory_bytes()
    }

    /// Primal solution.
    pub fn v(&self) -> &[f64] {
        self.arena.slice(self.layout.v)
    }

    /// Equality multipliers.
    pub fn y(&self) -> &[f64] {
        self.arena.slice(self.layout.y)
    }

    /// Box lower multipliers.
    pub fn lam_lb(&self) -> &[f64] {
        self.arena.slice(self.layout.lam_lb)
    }

    /// Box upper multipliers.
    pub fn lam_ub(&self) -> &[f64] {
        self.arena.slice(self.layout.lam_ub)
    }

    /// General lower multipliers.
    pub fn lam_lg(&self) -> &[f64] {
        self.arena.slice(self.layout.lam_lg)
    }

    /// General upper multipliers.
    pub fn lam_ug(&self) -> &[f64] {
        self.arena.slice(self.layout.lam_ug)
    }

}

impl<S: StoreMut> QpOut<S> {
    /// Borrow the solution as an exclusive view, report included.
    pub fn as_view_mut(&mut self) -> QpOutView<'_> {
        QpOut {
            dims: self.dims,
            layout: self.layout,
            arena: self.arena.reborrow(),
            info: self.info,
        }
    }

    /// Mutable access to every field at once.
    pub fn view_mut(&mut self) -> QpOutMut<'_> {
        let l = self.layout;
        let ([v, y, lam_lb, lam_ub, lam_lg, lam_ug], _) = self
            .arena
            .split_mut([l.v, l.y, l.lam_lb, l.lam_ub, l.lam_lg, l.lam_ug]);
        QpOutMut {
            v,
            y,
            lam_lb,
            lam_ub,
            lam_lg,
            lam_ug,
        }
    }

    /// Reset the solution and report.
    pub fn zero(&mut self) {
        self.arena.zero();
        self.info = QpInfo::default();
    }

    /// Copy from a solution of the same shape. Does not allocate.
    pub fn copy_from<T: Store>(&mut self, other: &QpOut<T>) -> Result<(), ConfigError> {
        if self.dims != other.dims {
            return Err(ConfigError::DimensionMismatch {
                what: "qp_out nv".to_string(),
                expected: self.dims.nv,
                found: other.dims.nv,
            });
        }
        self.arena.copy_slots_from(&other.arena);
        self.info = other.info;
        Ok(())
    }
}
