//! The QP backend contract and its resolver.
//!
//! A backend is a stateless, `'static` implementation of [`QpBackend`].
//! All per-instance state lives in two arena regions handed in by the
//! [`QpSolver`](crate::QpSolver): *memory*, which persists between solves
//! (warm-start data), and *workspace*, which is scratch. The backend sizes
//! both and carves them in the same order on every call.
//!
//! [`resolve`] is the only place that maps a [`QpSolverKind`] to an
//! implementation. Adding a backend means adding one arm there.

use rti_arena::{Carver, Footprint};
use rti_core::{ConfigError, QpDims, QpSolverKind};

use crate::options::QpSolverOptions;
use crate::qp_in::QpInView;
use crate::qp_out::{QpInfo, QpOutView};

/// One dense QP algorithm.
pub trait QpBackend: Send + Sync + 'static {
    /// The identifier this backend implements.
    fn kind(&self) -> QpSolverKind;

    /// Human-readable name.
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Default options, including backend-tuned common fields.
    fn default_options(&self) -> QpSolverOptions;

    /// Deep copy of `src`, which must belong to this backend.
    fn copy_options(&self, src: &QpSolverOptions) -> Result<QpSolverOptions, ConfigError> {
        if src.kind() != self.kind() {
            return Err(ConfigError::OptionsMismatch {
                expected: self.name(),
                found: src.kind().as_str(),
            });
        }
        Ok(src.clone())
    }

    /// Finalise `opts` for a problem of shape `dims` after user edits.
    fn update_options(&self, dims: &QpDims, opts: &mut QpSolverOptions) -> Result<(), ConfigError> {
        let _ = dims;
        if opts.kind() != self.kind() {
            return Err(ConfigError::OptionsMismatch {
                expected: self.name(),
                found: opts.kind().as_str(),
            });
        }
        opts.validate()
    }

    /// Persistent memory needed for shape `dims`.
    fn memory_footprint(&self, dims: &QpDims) -> Footprint;

    /// Scratch needed for shape `dims`.
    fn workspace_footprint(&self, dims: &QpDims) -> Footprint;

    /// Put freshly allocated memory into its initial state.
    fn initialize_memory(&self, dims: &QpDims, memory: Carver<'_>);

    /// Solve `qp_in` into `qp_out`.
    ///
    /// `memory` and `work` cover exactly the footprints reported above.
    /// The returned report's `solve_us` is filled in by the caller.
    fn solve(
        &self,
        qp_in: &QpInView<'_>,
        qp_out: &mut QpOutView<'_>,
        opts: &QpSolverOptions,
        memory: Carver<'_>,
        work: Carver<'_>,
    ) -> QpInfo;
}

/// Map an identifier to its implementation.
///
/// Resolution is total over [`QpSolverKind`]: every identifier yields
/// either a backend or [`ConfigError::BackendUnavailable`].
pub fn resolve(kind: QpSolverKind) -> Result<&'static dyn QpBackend, ConfigError> {
    match kind {
        QpSolverKind::InteriorPoint => Ok(&crate::ipm::InteriorPoint),
        QpSolverKind::Admm => Ok(&crate::admm::Admm),
        #[cfg(feature = "active-set")]
        QpSolverKind::ActiveSet => Ok(&crate::active_set::ActiveSet),
        #[cfg(not(feature = "active-set"))]
        QpSolverKind::ActiveSet => Err(ConfigError::BackendUnavailable {
            backend: QpSolverKind::ActiveSet.as_str(),
            feature: "active-set",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_is_deterministic() {
        for &kind in QpSolverKind::ALL {
            let a = resolve(kind).map(|b| b.kind());
            let b = resolve(kind).map(|b| b.kind());
            assert_eq!(a, b);
            if let Ok(k) = a {
                assert_eq!(k, kind);
            }
        }
    }

    #[cfg(not(feature = "active-set"))]
    #[test]
    fn compiled_out_backend_is_unavailable() {
        match resolve(QpSolverKind::ActiveSet) {
            Err(ConfigError::BackendUnavailable { feature, .. }) => {
                assert_eq!(feature, "active-set")
            }
            Err(other) => panic!("expected BackendUnavailable, got {other:?}"),
            Ok(_) => panic!("active set should be compiled out"),
        }
    }

    #[test]
    fn copy_options_rejects_foreign_block() {
        let ipm = resolve(QpSolverKind::InteriorPoint).unwrap();
        let admm = resolve(QpSolverKind::Admm).unwrap();
        let opts = admm.default_options();
        assert!(matches!(
            ipm.copy_options(&opts),
            Err(ConfigError::OptionsMismatch { .. })
        ));
        assert_eq!(admm.copy_options(&opts).unwrap(), opts);
    }

    #[test]
    fn update_options_validates() {
        let ipm = resolve(QpSolverKind::InteriorPoint).unwrap();
        let mut opts = ipm.default_options();
        opts.common.max_iter = 0;
        let dims = QpDims::default();
        assert!(ipm.update_options(&dims, &mut opts).is_err());
    }
}
