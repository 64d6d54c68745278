//! Slot counts describing an arena layout.
//!
//! A [`Footprint`] is the "calculate size" half of the arena protocol. It
//! counts slots in two pools: `f64` numeric data and `usize` index data.
//! Every sub-array is padded to [`ALIGN_SLOTS`] so that each one starts on
//! a 64-byte boundary relative to the pool start.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use crate::error::ArenaError;

/// Alignment granularity of every sub-array, in slots.
pub const ALIGN_SLOTS: usize = 8;

/// Round `n` up to the next multiple of [`ALIGN_SLOTS`].
#[inline]
pub const fn pad(n: usize) -> usize {
    n.div_ceil(ALIGN_SLOTS) * ALIGN_SLOTS
}

/// Slot counts of an arena layout, padding included.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Footprint {
    /// Number of `f64` slots.
    pub reals: usize,
    /// Number of `usize` slots.
    pub indices: usize,
}

impl Footprint {
    /// The empty footprint.
    pub const ZERO: Footprint = Footprint {
        reals: 0,
        indices: 0,
    };

    /// Footprint of one real sub-array of length `n`.
    pub const fn reals(n: usize) -> Self {
        Self {
            reals: pad(n),
            indices: 0,
        }
    }

    /// Footprint of one index sub-array of length `n`.
    pub const fn indices(n: usize) -> Self {
        Self {
            reals: 0,
            indices: pad(n),
        }
    }

    /// Footprint of `n` consecutive copies of `self`.
    pub const fn repeat(self, n: usize) -> Self {
        Self {
            reals: self.reals * n,
            indices: self.indices * n,
        }
    }

    /// Overflow-checked addition.
    pub fn checked_add(self, rhs: Footprint, what: &'static str) -> Result<Self, ArenaError> {
        let reals = self.reals.checked_add(rhs.reals);
        let indices = self.indices.checked_add(rhs.indices);
        match (reals, indices) {
            (Some(reals), Some(indices)) => Ok(Self { reals, indices }),
            _ => Err(ArenaError::SizeOverflow { what }),
        }
    }

    /// Total size in bytes.
    pub fn bytes(&self) -> usize {
        self.reals * std::mem::size_of::<f64>() + self.indices * std::mem::size_of::<usize>()
    }

    /// `true` if both pools are empty.
    pub fn is_empty(&self) -> bool {
        self.reals == 0 && self.indices == 0
    }
}

impl Add for Footprint {
    type Output = Footprint;

    fn add(self, rhs: Footprint) -> Footprint {
        Footprint {
            reals: self.reals + rhs.reals,
            indices: self.indices + rhs.indices,
        }
    }
}

impl AddAssign for Footprint {
    fn add_assign(&mut self, rhs: Footprint) {
        self.reals += rhs.reals;
        self.indices += rhs.indices;
    }
}

impl Sum for Footprint {
    fn sum<I: Iterator<Item = Footprint>>(iter: I) -> Footprint {
        iter.fold(Footprint::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_rounds_up_to_alignment() {
        assert_eq!(pad(0), 0);
        assert_eq!(pad(1), 8);
        assert_eq!(pad(8), 8);
        assert_eq!(pad(9), 16);
    }

    #[test]
    fn reals_and_indices_are_padded() {
        let fp = Footprint::reals(3) + Footprint::indices(10);
        assert_eq!(fp.reals, 8);
        assert_eq!(fp.indices, 16);
        assert_eq!(fp.bytes(), 8 * 8 + 16 * std::mem::size_of::<usize>());
    }

    #[test]
    fn sum_matches_repeated_add() {
        let parts = [Footprint::reals(5), Footprint::indices(2), Footprint::reals(17)];
        let total: Footprint = parts.iter().copied().sum();
        assert_eq!(total, parts[0] + parts[1] + parts[2]);
        assert_eq!(Footprint::reals(5).repeat(3), Footprint::reals(5) + Footprint::reals(5) + Footprint::reals(5));
    }

    #[test]
    fn checked_add_reports_overflow() {
        let big = Footprint {
            reals: usize::MAX,
            indices: 0,
        };
        match big.checked_add(Footprint::reals(1), "test") {
            Err(ArenaError::SizeOverflow { what: "test" }) => {}
            other => panic!("expected SizeOverflow, got {other:?}"),
        }
    }

    #[test]
    fn zero_is_empty() {
        assert!(Footprint::ZERO.is_empty());
        assert!(Footprint::reals(0).is_empty());
        assert!(!Footprint::indices(1).is_empty());
    }
}
