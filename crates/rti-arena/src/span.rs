//! Stable offsets into an arena for objects read through `&self`.

use crate::footprint::{pad, Footprint};
use crate::store::Region;

/// A range of real slots inside an [`Arena`](crate::Arena).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    /// First slot.
    pub offset: usize,
    /// Number of slots (unpadded).
    pub len: usize,
}

impl Span {
    /// One past the last slot.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// A range of index slots inside an [`Arena`](crate::Arena).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IndexSpan {
    /// First slot.
    pub offset: usize,
    /// Number of slots (unpadded).
    pub len: usize,
}

impl IndexSpan {
    /// One past the last slot.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Records spans with the same padding a [`Carver`](crate::Carver) uses.
///
/// A data object plans its layout once at construction, keeps the spans,
/// and allocates an arena of [`SpanPlanner::footprint`] slots.
#[derive(Clone, Debug, Default)]
pub struct SpanPlanner {
    used: Footprint,
}

impl SpanPlanner {
    /// Start planning at offset zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `n` reals.
    pub fn reals(&mut self, n: usize) -> Span {
        let span = Span {
            offset: self.used.reals,
            len: n,
        };
        self.used.reals += pad(n);
        span
    }

    /// Reserve `n` indices.
    pub fn indices(&mut self, n: usize) -> IndexSpan {
        let span = IndexSpan {
            offset: self.used.indices,
            len: n,
        };
        self.used.indices += pad(n);
        span
    }

    /// Reserve a nested block of `footprint` slots in both pools.
    ///
    /// `footprint` must come from padded sub-footprints, which keeps every
    /// later span aligned.
    pub fn region(&mut self, footprint: Footprint) -> Region {
        let region = Region {
            base: self.used,
            footprint,
        };
        self.used += footprint;
        region
    }

    /// Footprint planned so far.
    pub fn footprint(&self) -> Footprint {
        self.used
    }

    /// Close the plan, checking that it matches the closed-form footprint.
    pub fn finish(self, expected: Footprint) -> Footprint {
        debug_assert_eq!(
            self.used, expected,
            "planned layout {:?} differs from footprint {:?}",
            self.used, expected
        );
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_offsets_are_aligned() {
        let mut p = SpanPlanner::new();
        let a = p.reals(3);
        let b = p.reals(8);
        let c = p.reals(1);
        let i = p.indices(5);
        assert_eq!(a, Span { offset: 0, len: 3 });
        assert_eq!(b, Span { offset: 8, len: 8 });
        assert_eq!(c, Span { offset: 16, len: 1 });
        assert_eq!(i, IndexSpan { offset: 0, len: 5 });
        assert_eq!(p.footprint(), Footprint::reals(24) + Footprint::indices(5));
    }

    #[test]
    fn span_end_is_offset_plus_len() {
        assert_eq!(Span { offset: 8, len: 3 }.end(), 11);
        assert_eq!(IndexSpan { offset: 0, len: 0 }.end(), 0);
    }
}
