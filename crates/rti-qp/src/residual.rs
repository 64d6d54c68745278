//! KKT residuals of a QP solution.

use rti_arena::{Arena, Footprint, Span, SpanPlanner, Store, StoreMut};
use rti_core::{ConfigError, QpDims};

use crate::linalg::{gemv, gemv_t_acc, norm_inf};
use crate::qp_in::{QpIn, RowSide};
use crate::qp_out::QpOut;

/// ∞-norms of the four residual vectors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QpResiduals {
    /// Stationarity.
    pub stat: f64,
    /// Equality violation.
    pub eq: f64,
    /// Inequality violation.
    pub ineq: f64,
    /// Complementarity.
    pub comp: f64,
}

impl QpResiduals {
    /// Largest of the four norms.
    pub fn max(&self) -> f64 {
        self.stat.max(self.eq).max(self.ineq).max(self.comp)
    }
}

/// Residual buffers sized for one QP shape.
///
/// Inequality and complementarity residuals are laid out per one-sided
/// row, in the order of [`InequalityRows`](crate::InequalityRows).
#[derive(Clone, Debug)]
pub struct QpRes<S = Arena> {
    dims: QpDims,
    stat: Span,
    eq: Span,
    ineq: Span,
    comp: Span,
    arena: S,
    norms: QpResiduals,
}

impl QpRes {
    /// Slots needed for residuals of shape `d`.
    pub fn footprint(d: &QpDims) -> Footprint {
        let rows = 2 * d.nb + 2 * d.ng;
        Footprint::reals(d.nv) + Footprint::reals(d.ne) + Footprint::reals(rows).repeat(2)
    }

    /// Allocate zeroed residual buffers.
    pub fn new(dims: QpDims) -> Result<Self, ConfigError> {
        let fp = QpRes::footprint(&dims);
        Ok(Self::assign(dims, Arena::with_footprint(fp)?))
    }
}

impl<S: Store> QpRes<S> {
    /// Lay residual buffers of shape `dims` over `store`, which must hold
    /// exactly [`QpRes::footprint`] slots.
    pub fn assign(dims: QpDims, store: S) -> Self {
        let rows = 2 * dims.nb + 2 * dims.ng;
        let mut p = SpanPlanner::new();
        let stat = p.reals(dims.nv);
        let eq = p.reals(dims.ne);
        let ineq = p.reals(rows);
        let comp = p.reals(rows);
        let fp = p.finish(QpRes::footprint(&dims));
        debug_assert_eq!(store.footprint(), fp, "qp_res store does not match its layout");
        Self {
            dims,
            stat,
            eq,
            ineq,
            comp,
            arena: store,
            norms: QpResiduals::default(),
        }
    }

    /// Backing storage size in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.arena.memory_bytes()
    }

    /// Stationarity residual vector.
    pub fn stat(&self) -> &[f64] {
        self.arena.slice(self.stat)
    }

    /// Equality residual vector.
    pub fn eq(&self) -> &[f64] {
        self.arena.slice(self.eq)
    }

    /// Inequality violation per one-sided row.
    pub fn ineq(&self) -> &[f64] {
        self.arena.slice(self.ineq)
    }

    /// Complementarity product per one-sided row.
    pub fn comp(&self) -> &[f64] {
        self.arena.slice(self.comp)
    }

    /// Norms from the last [`compute`](Self::compute).
    pub fn norms(&self) -> QpResiduals {
        self.norms
    }

}

impl<S: StoreMut> QpRes<S> {
    /// Evaluate the residuals of `qp_out` against `qp_in`.
    pub fn compute<A: Store, B: Store>(
        &mut self,
        qp_in: &QpIn<A>,
        qp_out: &QpOut<B>,
    ) -> Result<QpResiduals, ConfigError> {
        for (what, found) in [("qp_in nv", qp_in.dims().nv), ("qp_out nv", qp_out.dims().nv)] {
            if found != self.dims.nv {
                return Err(ConfigError::DimensionMismatch {
                    what: what.to_string(),
                    expected: self.dims.nv,
                    found,
                });
            }
        }
        let d = self.dims;
        let rows = qp_in.inequality_rows();
        let v = qp_out.v();
        let ([stat, eq, ineq, comp], _) =
            self.arena.split_mut([self.stat, self.eq, self.ineq, self.comp]);

        gemv(qp_in.h(), d.nv, d.nv, v, stat);
        for (s, g) in stat.iter_mut().zip(qp_in.g()) {
            *s += g;
        }
        gemv_t_acc(1.0, qp_in.a(), d.ne, d.nv, qp_out.y(), stat);
        for r in 0..rows.len() {
            let lam = multiplier(qp_out, rows.side(r));
            if lam != 0.0 {
                rows.axpy(r, lam, stat);
            }
        }

        gemv(qp_in.a(), d.ne, d.nv, v, eq);
        for (e, b) in eq.iter_mut().zip(qp_in.b()) {
            *e -= b;
        }

        for r in 0..rows.len() {
            if rows.is_active(r) {
                let slack = rows.rhs(r) - rows.dot(r, v);
                ineq[r] = (-slack).max(0.0);
                comp[r] = multiplier(qp_out, rows.side(r)) * slack;
            } else {
                ineq[r] = 0.0;
                comp[r] = 0.0;
            }
        }

        self.norms = QpResiduals {
            stat: norm_inf(stat),
            eq: norm_inf(eq),
            ineq: norm_inf(ineq),
            comp: norm_inf(comp),
        };
        Ok(self.norms)
    }
}

fn multiplier<B: Store>(out: &QpOut<B>, side: RowSide) -> f64 {
    match side {
        RowSide::BoxUpper(i) => out.lam_ub()[i],
        RowSide::BoxLower(i) => out.lam_lb()[i],
        RowSide::GeneralUpper(j) => out.lam_ug()[j],
        RowSide::GeneralLower(j) => out.lam_lg()[j],
    }
}
