//! Sequential partitioning of an arena region into disjoint slices.
//!
//! [`Carver`] is the "assign" half of the arena protocol. Composite
//! objects carve their parts in a fixed order, recursing into nested
//! regions with [`Carver::sub`], and close with [`Carver::finish`], which
//! checks that exactly the advertised footprint was consumed.

use crate::footprint::{pad, Footprint};

/// Hands out disjoint mutable sub-slices of an arena region in sequence.
///
/// Each request is padded to the arena alignment, so the slots a carver
/// consumes always agree with the [`Footprint`] constructors used to size
/// the region.
///
/// Over-carving is a contract violation between a type's footprint and
/// its assign routine, and panics.
#[derive(Debug)]
pub struct Carver<'a> {
    reals: &'a mut [f64],
    indices: &'a mut [usize],
    used: Footprint,
}

impl<'a> Carver<'a> {
    /// Start carving the given pools.
    pub fn new(reals: &'a mut [f64], indices: &'a mut [usize]) -> Self {
        Self {
            reals,
            indices,
            used: Footprint::ZERO,
        }
    }

    /// Take the next `n` reals.
    pub fn reals(&mut self, n: usize) -> &'a mut [f64] {
        let padded = pad(n);
        let rest = std::mem::take(&mut self.reals);
        assert!(
            padded <= rest.len(),
            "arena overrun: requested {padded} real slots, {} remaining",
            rest.len()
        );
        let (head, tail) = rest.split_at_mut(padded);
        self.reals = tail;
        self.used.reals += padded;
        &mut head[..n]
    }

    /// Take the next `n` indices.
    pub fn indices(&mut self, n: usize) -> &'a mut [usize] {
        let padded = pad(n);
        let rest = std::mem::take(&mut self.indices);
        assert!(
            padded <= rest.len(),
            "arena overrun: requested {padded} index slots, {} remaining",
            rest.len()
        );
        let (head, tail) = rest.split_at_mut(padded);
        self.indices = tail;
        self.used.indices += padded;
        &mut head[..n]
    }

    /// Split off a nested region of exactly `fp` slots.
    ///
    /// The nested carver is independent of `self`; the parent advances
    /// past the whole region immediately.
    pub fn sub(&mut self, fp: Footprint) -> Carver<'a> {
        let reals = std::mem::take(&mut self.reals);
        let indices = std::mem::take(&mut self.indices);
        assert!(
            fp.reals <= reals.len() && fp.indices <= indices.len(),
            "arena overrun: nested region {fp:?} exceeds remaining ({}, {})",
            reals.len(),
            indices.len()
        );
        let (r_head, r_tail) = reals.split_at_mut(fp.reals);
        let (i_head, i_tail) = indices.split_at_mut(fp.indices);
        self.reals = r_tail;
        self.indices = i_tail;
        self.used += fp;
        Carver::new(r_head, i_head)
    }

    /// Slots consumed so far.
    pub fn used(&self) -> Footprint {
        self.used
    }

    /// Slots still available.
    pub fn remaining(&self) -> Footprint {
        Footprint {
            reals: self.reals.len(),
            indices: self.indices.len(),
        }
    }

    /// Close the region, checking that exactly `expected` was consumed.
    ///
    /// This is the end-pointer check of the protocol. It is a debug-build
    /// assertion; release builds skip it.
    pub fn finish(self, expected: Footprint) {
        debug_assert_eq!(
            self.used, expected,
            "assign consumed {:?} but footprint advertised {:?}",
            self.used, expected
        );
    }
}
