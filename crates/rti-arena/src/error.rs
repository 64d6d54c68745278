//! Arena-specific error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur while sizing or allocating an arena.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// A footprint computation overflowed `usize`.
    SizeOverflow {
        /// Which layout was being sized.
        what: &'static str,
    },
    /// The requested arena is larger than a single allocation may be.
    AllocationTooLarge {
        /// Number of bytes requested.
        requested: usize,
        /// Largest permitted allocation in bytes.
        limit: usize,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeOverflow { what } => {
                write!(f, "arena size overflow while sizing {what}")
            }
            Self::AllocationTooLarge { requested, limit } => {
                write!(
                    f,
                    "arena allocation too large: requested {requested} bytes, limit {limit} bytes"
                )
            }
        }
    }
}

impl Error for ArenaError {}
