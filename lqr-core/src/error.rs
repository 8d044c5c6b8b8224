//! Error types for the LQR solver.

use thiserror::Error;

/// Errors raised while building, factorizing or rolling out an LQR problem.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LqrError {
    /// Knot chain or buffer shapes are inconsistent.
    #[error("dimension mismatch at stage {stage}: {reason}")]
    Dimension {
        /// Stage where the mismatch was detected.
        stage: usize,
        /// Which block disagreed and how.
        reason: String,
    },

    /// A damped block was not positive definite (or a dense system was singular).
    #[error("factorization failed at stage {stage}: {block} block is not positive definite")]
    Factorization {
        /// Stage whose block failed.
        stage: usize,
        /// Name of the block (`control`, `initial state`, `parameter`, `kkt`).
        block: &'static str,
    },

    /// Misuse of the parameter mechanism.
    #[error("parameterization error: {0}")]
    Parameterization(String),

    /// The coupling matrix `E` of a transition stage is not invertible.
    #[error("singular dynamics at stage {stage}: E is not invertible")]
    SingularDynamics {
        /// Transition stage index.
        stage: usize,
    },

    /// Invalid proximal parameters.
    #[error("invalid regularization: {0}")]
    Regularization(String),
}

impl LqrError {
    pub(crate) fn dim(stage: usize, reason: impl Into<String>) -> Self {
        Self::Dimension {
            stage,
            reason: reason.into(),
        }
    }

    /// Whether retrying with a larger proximal parameter can help.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Factorization { .. })
    }
}

/// Result type for LQR operations.
pub type LqrResult<T> = Result<T, LqrError>;
