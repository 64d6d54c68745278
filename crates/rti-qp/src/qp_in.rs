//! Dense QP problem data.

use rti_arena::{Arena, ArenaRef, Footprint, IndexSpan, Span, SpanPlanner, Store, StoreMut};
use rti_core::{ConfigError, QpDims};

use crate::linalg::dot;

#[derive(Clone, Copy, Debug)]
struct Layout {
    h: Span,
    g: Span,
    a: Span,
    b: Span,
    lb: Span,
    ub: Span,
    c: Span,
    lg: Span,
    ug: Span,
    idxb: IndexSpan,
}

impl Layout {
    fn plan(d: &QpDims) -> (Self, Footprint) {
        let mut p = SpanPlanner::new();
        let layout = Layout {
            h: p.reals(d.nv * d.nv),
            g: p.reals(d.nv),
            a: p.reals(d.ne * d.nv),
            b: p.reals(d.ne),
            lb: p.reals(d.nb),
            ub: p.reals(d.nb),
            c: p.reals(d.ng * d.nv),
            lg: p.reals(d.ng),
            ug: p.reals(d.ng),
            idxb: p.indices(d.nb),
        };
        let fp = p.finish(QpIn::footprint(d));
        (layout, fp)
    }
}

/// One dense QP instance.
///
/// Matrices are row-major: `H` is `nv × nv`, `A` is `ne × nv`, `C` is
/// `ng × nv`. Infinite bounds mark inactive sides.
///
/// By default a `QpIn` owns its [`Arena`]. A solver that places the QP
/// inside its own allocation assigns it to a region instead, and hands
/// backends a borrowed [`QpInView`].
#[derive(Clone, Debug)]
pub struct QpIn<S = Arena> {
    dims: QpDims,
    layout: Layout,
    arena: S,
}

/// A QP read through a shared region view.
pub type QpInView<'a> = QpIn<ArenaRef<'a>>;

/// Simultaneous mutable access to every field of a [`QpIn`].
#[derive(Debug)]
pub struct QpInMut<'a> {
    /// Hessian, `nv × nv`.
    pub h: &'a mut [f64],
    /// Gradient, `nv`.
    pub g: &'a mut [f64],
    /// Equality matrix, `ne × nv`.
    pub a: &'a mut [f64],
    /// Equality right-hand side, `ne`.
    pub b: &'a mut [f64],
    /// Box lower bounds, `nb`.
    pub lb: &'a mut [f64],
    /// Box upper bounds, `nb`.
    pub ub: &'a mut [f64],
    /// General constraint matrix, `ng × nv`.
    pub c: &'a mut [f64],
    /// General lower bounds, `ng`.
    pub lg: &'a mut [f64],
    /// General upper bounds, `ng`.
    pub ug: &'a mut [f64],
    /// Variable index of each box row, `nb`.
    pub idxb: &'a mut [usize],
}

impl QpIn {
    /// Slots needed for a QP of shape `d`.
    pub fn footprint(d: &QpDims) -> Footprint {
        Footprint::reals(d.nv * d.nv)
            + Footprint::reals(d.nv)
            + Footprint::reals(d.ne * d.nv)
            + Footprint::reals(d.ne)
            + Footprint::reals(d.nb).repeat(2)
            + Footprint::reals(d.ng * d.nv)
            + Footprint::reals(d.ng).repeat(2)
            + Footprint::indices(d.nb)
    }

    /// Allocate a zeroed QP of shape `dims`.
    pub fn new(dims: QpDims) -> Result<Self, ConfigError> {
        dims.validate()?;
        let fp = QpIn::footprint(&dims);
        Ok(Self::assign(dims, Arena::with_footprint(fp)?))
    }
}

impl<S: Store> QpIn<S> {
    /// Lay a QP of shape `dims` over `store`, which must hold exactly
    /// [`QpIn::footprint`] slots. Existing contents are kept.
    pub fn assign(dims: QpDims, store: S) -> Self {
        let (layout, fp) = Layout::plan(&dims);
        debug_assert_eq!(store.footprint(), fp, "qp_in store does not match its layout");
        Self {
            dims,
            layout,
            arena: store,
        }
    }

    /// Shape of this QP.
    pub fn dims(&self) -> &QpDims {
        &self.dims
    }

    /// Backing storage size in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.arena.memory_bytes()
    }

    /// Borrow the QP as a shared view.
    pub fn as_view(&self) -> QpInView<'_> {
        QpIn {
            dims: self.dims,
            layout: self.layout,
            arena: self.arena.share(),
        }
    }

    /// Hessian.
    pub fn h(&self) -> &[f64] {
        self.arena.slice(self.layout.h)
    }

    /// Gradient.
    pub fn g(&self) -> &[f64] {
        self.arena.slice(self.layout.g)
    }

    /// Equality matrix.
    pub fn a(&self) -> &[f64] {
        self.arena.slice(self.layout.a)
    }

    /// Equality right-hand side.
    pub fn b(&self) -> &[f64] {
        self.arena.slice(self.layout.b)
    }

    /// Box lower bounds.
    pub fn lb(&self) -> &[f64] {
        self.arena.slice(self.layout.lb)
    }

    /// Box upper bounds.
    pub fn ub(&self) -> &[f64] {
        self.arena.slice(self.layout.ub)
    }

    /// General constraint matrix.
    pub fn c(&self) -> &[f64] {
        self.arena.slice(self.layout.c)
    }

    /// General lower bounds.
    pub fn lg(&self) -> &[f64] {
        self.arena.slice(self.layout.lg)
    }

    /// General upper bounds.
    pub fn ug(&self) -> &[f64] {
        self.arena.slice(self.layout.ug)
    }

    /// Variable index of each box row.
    pub fn idxb(&self) -> &[usize] {
        self.arena.index_slice(self.layout.idxb)
    }

    /// `true` if some box row or general row has `lower > upper`, or a box
    /// row indexes past `nv`.
    pub fn has_inconsistent_bounds(&self) -> bool {
        let boxes = self.lb().iter().zip(self.ub()).any(|(l, u)| l > u);
        let general = self.lg().iter().zip(self.ug()).any(|(l, u)| l > u);
        let index = self.idxb().iter().any(|&i| i >= self.dims.nv);
        boxes || general || index
    }

    /// The inequality rows in one-sided `G v ≤ h` form.
    pub fn inequality_rows(&self) -> InequalityRows<'_> {
        InequalityRows {
            nv: self.dims.nv,
            nb: self.dims.nb,
            ng: self.dims.ng,
            idxb: self.idxb(),
            lb: self.lb(),
            ub: self.ub(),
            c: self.c(),
            lg: self.lg(),
            ug: self.ug(),
        }
    }
}

impl<S: StoreMut> QpIn<S> {
    /// Mutable access to every field at once.
    pub fn view_mut(&mut self) -> QpInMut<'_> {
        let l = self.layout;
        let ([h, g, a, b, lb, ub, c, lg, ug], indices) =
            self.arena
                .split_mut([l.h, l.g, l.a, l.b, l.lb, l.ub, l.c, l.lg, l.ug]);
        QpInMut {
            h,
            g,
            a,
            b,
            lb,
            ub,
            c,
            lg,
            ug,
            idxb: &mut indices[l.idxb.offset..l.idxb.end()],
        }
    }

    /// Reset every entry to zero.
    pub fn zero(&mut self) {
        self.arena.zero();
    }

    /// Field-by-field copy from a QP of the same shape. Does not allocate.
    pub fn copy_from<T: Store>(&mut self, other: &QpIn<T>) -> Result<(), ConfigError> {
        if self.dims != other.dims {
            return Err(ConfigError::DimensionMismatch {
                what: "qp_in nv".to_string(),
                expected: self.dims.nv,
                found: other.dims.nv,
            });
        }
        self.arena.copy_slots_from(&other.arena);
        Ok(())
    }
}

/// Which multiplier an inequality row feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowSide {
    /// Upper side of box row `i`.
    BoxUpper(usize),
    /// Lower side of box row `i`.
    BoxLower(usize),
    /// Upper side of general row `j`.
    GeneralUpper(usize),
    /// Lower side of general row `j`.
    GeneralLower(usize),
}

/// Box and general rows unfolded into `2 nb + 2 ng` one-sided rows
/// `G_r v ≤ h_r`.
///
/// Row order is: box upper, box lower, general upper, general lower.
/// A row whose `h_r` is infinite is inactive.
#[derive(Clone, Copy, Debug)]
pub struct InequalityRows<'a> {
    nv: usize,
    nb: usize,
    ng: usize,
    idxb: &'a [usize],
    lb: &'a [f64],
    ub: &'a [f64],
    c: &'a [f64],
    lg: &'a [f64],
    ug: &'a [f64],
}

impl InequalityRows<'_> {
    /// Number of one-sided rows, active or not.
    pub fn len(&self) -> usize {
        2 * self.nb + 2 * self.ng
    }

    /// `true` if there are no rows at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Which multiplier row `r` feeds.
    pub fn side(&self, r: usize) -> RowSide {
        let (nb, ng) = (self.nb, self.ng);
        if r < nb {
            RowSide::BoxUpper(r)
        } else if r < 2 * nb {
            RowSide::BoxLower(r - nb)
        } else if r < 2 * nb + ng {
            RowSide::GeneralUpper(r - 2 * nb)
        } else {
            RowSide::GeneralLower(r - 2 * nb - ng)
        }
    }

    /// Right-hand side `h_r`.
    pub fn rhs(&self, r: usize) -> f64 {
        match self.side(r) {
            RowSide::BoxUpper(i) => self.ub[i],
            RowSide::BoxLower(i) => -self.lb[i],
            RowSide::GeneralUpper(j) => self.ug[j],
            RowSide::GeneralLower(j) => -self.lg[j],
        }
    }

    /// `true` if row `r` has a finite right-hand side.
    pub fn is_active(&self, r: usize) -> bool {
        self.rhs(r).is_finite()
    }

    /// `G_r v`.
    pub fn dot(&self, r: usize, v: &[f64]) -> f64 {
        match self.side(r) {
            RowSide::BoxUpper(i) => v[self.idxb[i]],
            RowSide::BoxLower(i) => -v[self.idxb[i]],
            RowSide::GeneralUpper(j) => dot(self.general(j), v),
            RowSide::GeneralLower(j) => -dot(self.general(j), v),
        }
    }

    /// `out ← out + alpha G_rᵀ`.
    pub fn axpy(&self, r: usize, alpha: f64, out: &mut [f64]) {
        match self.side(r) {
            RowSide::BoxUpper(i) => out[self.idxb[i]] += alpha,
            RowSide::BoxLower(i) => out[self.idxb[i]] -= alpha,
            RowSide::GeneralUpper(j) => crate::linalg::axpy(alpha, self.general(j), out),
            RowSide::GeneralLower(j) => crate::linalg::axpy(-alpha, self.general(j), out),
        }
    }

    /// `M ← M + w G_rᵀ G_r` for an `nv × nv` matrix.
    pub fn add_outer(&self, r: usize, w: f64, m: &mut [f64]) {
        let nv = self.nv;
        match self.side(r) {
            RowSide::BoxUpper(i) | RowSide::BoxLower(i) => {
                let k = self.idxb[i];
                m[k * nv + k] += w;
            }
            RowSide::GeneralUpper(j) | RowSide::GeneralLower(j) => {
                let row = self.general(j);
                for (p, &rp) in row.iter().enumerate() {
                    if rp == 0.0 {
                        continue;
                    }
                    crate::linalg::axpy(w * rp, row, &mut m[p * nv..(p + 1) * nv]);
                }
            }
        }
    }

    /// Write `G_r` densely into `out` (length `nv`).
    pub fn write_row(&self, r: usize, out: &mut [f64]) {
        out.fill(0.0);
        self.axpy(r, 1.0, out);
    }

    fn general(&self, j: usize) -> &[f64] {
        &self.c[j * self.nv..(j + 1) * self.nv]
    }
}
