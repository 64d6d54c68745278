//! Size-then-assign arena layouts for real-time solver memory.
//!
//! Every object that participates in a solve is laid out in two phases:
//! first its [`Footprint`] is computed from shape parameters alone, then a
//! single [`Arena`] of exactly that footprint is allocated and partitioned
//! in place. Nothing on the solve path allocates.
//!
//! # Architecture
//!
//! ```text
//! Footprint (reals + indices slot counts, 8-slot aligned)
//! │
//! ├── Arena (one Vec<f64> + one Vec<usize>, zero-filled)
//! │   ├── Carver      sequential &mut sub-slice handout, end check on finish
//! │   └── Span/IndexSpan  stable offsets for objects read through &self
//! ├── SpanPlanner     computes spans in the same order a Carver would carve
//! └── Region          a planned nested block, viewed as ArenaRef / ArenaMut
//! ```
//!
//! Two partitioning styles coexist. Scratch regions that are only ever
//! touched through `&mut` are re-carved on every call with a [`Carver`].
//! Long-lived data objects that need shared reads (problem data, iterates,
//! statistics) record [`Span`]s once with a [`SpanPlanner`] and index the
//! arena through them.
//!
//! Data objects are generic over [`Store`]: an owned [`Arena`] when they
//! stand alone, or an [`ArenaRef`]/[`ArenaMut`] over a [`Region`] when a
//! solver places them inside its own single allocation.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod arena;
pub mod carve;
pub mod error;
pub mod footprint;
pub mod span;
pub mod store;

pub use arena::Arena;
pub use carve::Carver;
pub use error::ArenaError;
pub use footprint::{Footprint, ALIGN_SLOTS};
pub use span::{IndexSpan, Span, SpanPlanner};
pub use store::{ArenaMut, ArenaRef, Region, Store, StoreMut};
