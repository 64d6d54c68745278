//! SQP real-time-iteration engine for nonlinear model predictive control.
//!
//! A [`Plan`] names one implementation per role and resolves into a
//! shared [`SolverConfig`]. Each [`SqpRti`] instance binds that config to
//! the models of one [`NlpIn`] and owns a single arena holding its
//! statistics, model memory, QP memory and every per-call buffer. Every
//! [`SqpRti::step`] linearizes the stage models at the iterate in an
//! [`NlpOut`], solves one QP and applies the step.
//!
//! ```text
//! Plan ──resolve──► Arc<SolverConfig> ──► SqpRti::new(nlp_in) ──► precompute ──► step …
//! ```
//!
//! Stage linearization runs on a persistent worker pool when
//! `num_threads > 1`; everything else is sequential.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
mod layout;
mod linearize;
pub mod memory;
pub mod metrics;
pub mod nlp;
pub mod options;
mod pool;
pub mod regularize;
pub mod sqp_rti;
pub mod stats;

pub use config::{Plan, SolverConfig};
pub use error::RtiError;
pub use memory::SqpRtiMemory;
pub use metrics::{RtiReport, RtiTimings};
pub use nlp::{NlpIn, NlpOut, StageIterateMut};
pub use options::SqpRtiOptions;
pub use regularize::{Mirror, NoRegularize, Project, Regularizer};
pub use sqp_rti::SqpRti;
pub use stats::{StatRow, StatTable, StatView, STAT_COLUMNS};
