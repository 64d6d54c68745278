//! The single backing allocation of a solver object.

use crate::error::ArenaError;
use crate::footprint::Footprint;
use crate::store::{Store, StoreMut};

/// Largest single arena allocation, in bytes.
const MAX_ARENA_BYTES: usize = isize::MAX as usize;

/// One zero-filled allocation holding a real pool and an index pool.
///
/// An arena is created once from a [`Footprint`] and never grows. Views
/// are produced either by carving ([`StoreMut::carver`]), by indexing with
/// recorded spans ([`Store::slice`], [`StoreMut::split_mut`]) or by
/// handing out planned regions ([`StoreMut::regions_mut`]).
#[derive(Clone, Debug, Default)]
pub struct Arena {
    reals: Vec<f64>,
    indices: Vec<usize>,
}

impl Arena {
    /// Allocate an arena of exactly `footprint` slots.
    pub fn with_footprint(footprint: Footprint) -> Result<Self, ArenaError> {
        let requested = footprint
            .reals
            .checked_mul(std::mem::size_of::<f64>())
            .and_then(|r| {
                footprint
                    .indices
                    .checked_mul(std::mem::size_of::<usize>())
                    .and_then(|i| r.checked_add(i))
            })
            .ok_or(ArenaError::SizeOverflow { what: "arena" })?;
        if requested > MAX_ARENA_BYTES {
            return Err(ArenaError::AllocationTooLarge {
                requested,
                limit: MAX_ARENA_BYTES,
            });
        }
        Ok(Self {
            reals: vec![0.0; footprint.reals],
            indices: vec![0; footprint.indices],
        })
    }
}

impl Store for Arena {
    fn pools(&self) -> (&[f64], &[usize]) {
        (&self.reals, &self.indices)
    }
}

impl StoreMut for Arena {
    fn pools_mut(&mut self) -> (&mut [f64], &mut [usize]) {
        (&mut self.reals, &mut self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{Span, SpanPlanner};

    #[test]
    fn new_arena_is_zeroed_and_sized() {
        let fp = Footprint::reals(10) + Footprint::indices(3);
        let arena = Arena::with_footprint(fp).unwrap();
        assert_eq!(arena.footprint(), fp);
        assert_eq!(arena.memory_bytes(), fp.bytes());
        let span = Span { offset: 0, len: 16 };
        assert!(arena.slice(span).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_clears_both_pools() {
        let fp = Footprint::reals(16) + Footprint::indices(2);
        let mut arena = Arena::with_footprint(fp).unwrap();
        arena.slice_mut(Span { offset: 0, len: 16 }).fill(3.0);
        arena.pools_mut().1.fill(5);
        arena.zero();
        assert!(arena.pools().0.iter().all(|&v| v == 0.0));
        assert!(arena.pools().1.iter().all(|&i| i == 0));
    }

    #[test]
    fn split_mut_returns_planned_spans() {
        let mut p = SpanPlanner::new();
        let a = p.reals(2);
        let b = p.reals(10);
        let i = p.indices(4);
        let mut arena = Arena::with_footprint(p.footprint()).unwrap();
        {
            let ([sa, sb], idx) = arena.split_mut([a, b]);
            sa.fill(1.0);
            sb.fill(2.0);
            idx[i.offset..i.end()].copy_from_slice(&[4, 3, 2, 1]);
        }
        assert_eq!(arena.slice(a), &[1.0, 1.0]);
        assert_eq!(arena.slice(b), &[2.0; 10]);
        assert_eq!(arena.index_slice(i), &[4, 3, 2, 1]);
    }

    #[test]
    #[should_panic(expected = "spans must be ascending")]
    fn split_mut_rejects_out_of_order_spans() {
        let mut arena = Arena::with_footprint(Footprint::reals(16)).unwrap();
        let _ = arena.split_mut([Span { offset: 8, len: 2 }, Span { offset: 0, len: 2 }]);
    }

    #[test]
    fn oversized_arena_is_rejected() {
        let fp = Footprint {
            reals: usize::MAX / 4,
            indices: 0,
        };
        match Arena::with_footprint(fp) {
            Err(ArenaError::SizeOverflow { .. }) | Err(ArenaError::AllocationTooLarge { .. }) => {}
            other => panic!("expected a size error, got {:?}", other.map(|a| a.footprint())),
        }
    }

    #[test]
    fn carver_covers_whole_arena() {
        let fp = Footprint::reals(5) + Footprint::indices(1);
        let mut arena = Arena::with_footprint(fp).unwrap();
        let mut c = arena.carver();
        let r = c.reals(5);
        let i = c.indices(1);
        r[4] = 9.0;
        i[0] = 2;
        c.finish(fp);
        assert_eq!(arena.slice(Span { offset: 4, len: 1 }), &[9.0]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn planner_and_carver_agree(lens in proptest::collection::vec(0usize..40, 1..12)) {
                let mut p = SpanPlanner::new();
                let spans: Vec<Span> = lens.iter().map(|&n| p.reals(n)).collect();
                let fp = p.footprint();
                let closed: Footprint = lens.iter().map(|&n| Footprint::reals(n)).sum();
                prop_assert_eq!(fp, closed);

                let mut arena = Arena::with_footprint(fp).unwrap();
                let mut c = arena.carver();
                for (k, &n) in lens.iter().enumerate() {
                    c.reals(n).fill(k as f64 + 1.0);
                }
                c.finish(fp);
                for (k, span) in spans.iter().enumerate() {
                    prop_assert!(arena.slice(*span).iter().all(|&v| v == k as f64 + 1.0));
                }
            }
        }
    }
}
