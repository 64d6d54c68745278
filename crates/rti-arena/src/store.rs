//! Borrowed views of arena storage.
//!
//! Data objects are generic over where their slots live. An owned
//! [`Arena`](crate::Arena) backs a standalone object; an [`ArenaRef`] or
//! [`ArenaMut`] backs an object placed inside a [`Region`] of a larger
//! arena. Spans recorded by a layout are always relative to the start of
//! the store they index.

use crate::carve::Carver;
use crate::footprint::Footprint;
use crate::span::{IndexSpan, Span};

/// A contiguous part of an arena: where it starts in each pool and how
/// many slots it covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Region {
    /// First slot in each pool.
    pub base: Footprint,
    /// Slots covered in each pool.
    pub footprint: Footprint,
}

impl Region {
    /// One past the last slot in each pool.
    pub fn end(&self) -> Footprint {
        self.base + self.footprint
    }
}

/// Shared access to a real pool and an index pool.
pub trait Store {
    /// Both pools.
    fn pools(&self) -> (&[f64], &[usize]);

    /// Slots held.
    fn footprint(&self) -> Footprint {
        let (reals, indices) = self.pools();
        Footprint {
            reals: reals.len(),
            indices: indices.len(),
        }
    }

    /// Storage size in bytes.
    fn memory_bytes(&self) -> usize {
        self.footprint().bytes()
    }

    /// The real slots covered by `span`.
    fn slice(&self, span: Span) -> &[f64] {
        &self.pools().0[span.offset..span.end()]
    }

    /// The index slots covered by `span`.
    fn index_slice(&self, span: IndexSpan) -> &[usize] {
        &self.pools().1[span.offset..span.end()]
    }

    /// The whole store as a shared view.
    fn share(&self) -> ArenaRef<'_> {
        let (reals, indices) = self.pools();
        ArenaRef { reals, indices }
    }

    /// The slots covered by `region`.
    fn region(&self, region: Region) -> ArenaRef<'_> {
        self.share().into_region(region)
    }
}

/// Exclusive access to a real pool and an index pool.
pub trait StoreMut: Store {
    /// Both pools, mutably.
    fn pools_mut(&mut self) -> (&mut [f64], &mut [usize]);

    /// Mutable real slots covered by `span`.
    fn slice_mut(&mut self, span: Span) -> &mut [f64] {
        &mut self.pools_mut().0[span.offset..span.end()]
    }

    /// Mutable index slots covered by `span`.
    fn index_slice_mut(&mut self, span: IndexSpan) -> &mut [usize] {
        &mut self.pools_mut().1[span.offset..span.end()]
    }

    /// The whole store as an exclusive view.
    fn reborrow(&mut self) -> ArenaMut<'_> {
        let (reals, indices) = self.pools_mut();
        ArenaMut { reals, indices }
    }

    /// Carve the whole store from the start.
    fn carver(&mut self) -> Carver<'_> {
        self.reborrow().into_carver()
    }

    /// Zero every slot.
    fn zero(&mut self) {
        let (reals, indices) = self.pools_mut();
        reals.fill(0.0);
        indices.fill(0);
    }

    /// Copy every slot of `src`, which must have the same footprint.
    fn copy_slots_from<S: Store + ?Sized>(&mut self, src: &S) {
        let (reals, indices) = self.pools_mut();
        let (src_reals, src_indices) = src.pools();
        reals.copy_from_slice(src_reals);
        indices.copy_from_slice(src_indices);
    }

    /// The slots covered by `region`, mutably.
    fn region_mut(&mut self, region: Region) -> ArenaMut<'_> {
        self.reborrow().into_region(region)
    }

    /// Several disjoint regions at once, in ascending order.
    fn regions_mut<const K: usize>(&mut self, regions: [Region; K]) -> [ArenaMut<'_>; K] {
        self.reborrow().into_regions(regions)
    }

    /// Borrow several disjoint real spans mutably at once, plus the whole
    /// index pool.
    ///
    /// Spans must be given in ascending, non-overlapping order, which is
    /// the order a [`SpanPlanner`](crate::SpanPlanner) produces them in.
    fn split_mut<const K: usize>(&mut self, spans: [Span; K]) -> ([&mut [f64]; K], &mut [usize]) {
        let (reals, indices) = self.pools_mut();
        let mut out: [&mut [f64]; K] = std::array::from_fn(|_| <&mut [f64]>::default());
        let mut rest: &mut [f64] = reals;
        let mut base = 0;
        for (slot, span) in out.iter_mut().zip(spans) {
            assert!(
                span.offset >= base,
                "spans must be ascending: offset {} precedes {base}",
                span.offset
            );
            let tail = std::mem::take(&mut rest);
            let (_, tail) = tail.split_at_mut(span.offset - base);
            let (head, tail) = tail.split_at_mut(span.len);
            *slot = head;
            rest = tail;
            base = span.end();
        }
        (out, indices)
    }
}

/// Shared view of part of an arena.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArenaRef<'a> {
    reals: &'a [f64],
    indices: &'a [usize],
}

impl<'a> ArenaRef<'a> {
    /// Narrow to `region`, keeping the original lifetime.
    pub fn into_region(self, region: Region) -> ArenaRef<'a> {
        let end = region.end();
        ArenaRef {
            reals: &self.reals[region.base.reals..end.reals],
            indices: &self.indices[region.base.indices..end.indices],
        }
    }

    /// The real slots covered by `span`, with the view's lifetime.
    pub fn reals_in(self, span: Span) -> &'a [f64] {
        &self.reals[span.offset..span.end()]
    }

    /// The index slots covered by `span`, with the view's lifetime.
    pub fn indices_in(self, span: IndexSpan) -> &'a [usize] {
        &self.indices[span.offset..span.end()]
    }
}

impl Store for ArenaRef<'_> {
    fn pools(&self) -> (&[f64], &[usize]) {
        (self.reals, self.indices)
    }
}

/// Exclusive view of part of an arena.
#[derive(Debug, Default)]
pub struct ArenaMut<'a> {
    reals: &'a mut [f64],
    indices: &'a mut [usize],
}

impl<'a> ArenaMut<'a> {
    /// Give up exclusivity.
    pub fn into_ref(self) -> ArenaRef<'a> {
        ArenaRef {
            reals: self.reals,
            indices: self.indices,
        }
    }

    /// A carver over the whole view, with the view's lifetime.
    pub fn into_carver(self) -> Carver<'a> {
        Carver::new(self.reals, self.indices)
    }

    /// Narrow to `region`, keeping the original lifetime.
    pub fn into_region(self, region: Region) -> ArenaMut<'a> {
        let [inner] = self.into_regions([region]);
        inner
    }

    /// Split into disjoint regions given in ascending order.
    pub fn into_regions<const K: usize>(self, regions: [Region; K]) -> [ArenaMut<'a>; K] {
        let mut out: [ArenaMut<'a>; K] = std::array::from_fn(|_| ArenaMut::default());
        let mut reals = self.reals;
        let mut indices = self.indices;
        let mut base = Footprint::ZERO;
        for (slot, region) in out.iter_mut().zip(regions) {
            assert!(
                region.base.reals >= base.reals && region.base.indices >= base.indices,
                "regions must be ascending: {:?} precedes {base:?}",
                region.base
            );
            let (_, r_tail) = reals.split_at_mut(region.base.reals - base.reals);
            let (r_head, r_tail) = r_tail.split_at_mut(region.footprint.reals);
            let (_, i_tail) = indices.split_at_mut(region.base.indices - base.indices);
            let (i_head, i_tail) = i_tail.split_at_mut(region.footprint.indices);
            *slot = ArenaMut {
                reals: r_head,
                indices: i_head,
            };
            reals = r_tail;
            indices = i_tail;
            base = region.end();
        }
        out
    }
}

impl Store for ArenaMut<'_> {
    fn pools(&self) -> (&[f64], &[usize]) {
        (self.reals, self.indices)
    }
}

impl StoreMut for ArenaMut<'_> {
    fn pools_mut(&mut self) -> (&mut [f64], &mut [usize]) {
        (self.reals, self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::span::SpanPlanner;

    #[test]
    fn regions_partition_the_arena() {
        let mut p = SpanPlanner::new();
        let a = p.region(Footprint::reals(3) + Footprint::indices(2));
        let b = p.region(Footprint::reals(10));
        let c = p.region(Footprint::indices(1));
        let mut arena = Arena::with_footprint(p.footprint()).unwrap();
        {
            let [mut ra, mut rb, mut rc] = arena.regions_mut([a, b, c]);
            assert_eq!(ra.footprint(), a.footprint);
            ra.zero();
            ra.pools_mut().0.fill(1.0);
            ra.pools_mut().1.fill(4);
            rb.pools_mut().0.fill(2.0);
            rc.pools_mut().1.fill(9);
        }
        assert!(arena.region(a).pools().0.iter().all(|&v| v == 1.0));
        assert!(arena.region(b).pools().0.iter().all(|&v| v == 2.0));
        assert_eq!(arena.region(a).pools().1, &[4; 8]);
        assert_eq!(arena.region(c).pools().1, &[9; 8]);
    }

    #[test]
    #[should_panic(expected = "regions must be ascending")]
    fn out_of_order_regions_panic() {
        let mut p = SpanPlanner::new();
        let a = p.region(Footprint::reals(8));
        let b = p.region(Footprint::reals(8));
        let mut arena = Arena::with_footprint(p.footprint()).unwrap();
        let _ = arena.regions_mut([b, a]);
    }

    #[test]
    fn region_spans_are_local() {
        let mut outer = SpanPlanner::new();
        let _skip = outer.region(Footprint::reals(16));
        let mut inner = SpanPlanner::new();
        let x = inner.reals(2);
        let region = outer.region(inner.footprint());
        let mut arena = Arena::with_footprint(outer.footprint()).unwrap();
        arena.region_mut(region).slice_mut(x).copy_from_slice(&[5.0, 6.0]);
        assert_eq!(arena.region(region).slice(x), &[5.0, 6.0]);
        assert_eq!(arena.slice(Span { offset: 16, len: 2 }), &[5.0, 6.0]);
    }

    #[test]
    fn copy_slots_requires_nothing_but_equal_shape() {
        let fp = Footprint::reals(4) + Footprint::indices(1);
        let mut a = Arena::with_footprint(fp).unwrap();
        let mut b = Arena::with_footprint(fp).unwrap();
        b.pools_mut().0[3] = 7.0;
        b.pools_mut().1[0] = 2;
        a.reborrow().copy_slots_from(&b.share());
        assert_eq!(a.pools().0[3], 7.0);
        assert_eq!(a.pools().1[0], 2);
    }
}
