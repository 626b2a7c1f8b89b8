//! Error types for the polynomial mixer.
//!
//! Every check runs before tensor arithmetic, so a returned error means no
//! computation was performed for that call.

use thiserror::Error;

/// Result type alias using [`PomError`].
pub type Result<T> = std::result::Result<T, PomError>;

/// Errors raised by the mixer operations and the `ComPom` layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PomError {
    /// Mask tensor was neither rank 2 (padding) nor rank 3 (pairwise).
    #[error("Unsupported mask dimension: {rank}. Expected 2, 3, or None.")]
    UnsupportedMaskRank {
        /// Rank of the rejected mask.
        rank: usize,
    },

    /// Coefficient tensor does not carry exactly one column per power term.
    #[error("Coefficient degree mismatch: order {order} needs {order} coefficient columns, got {degree}")]
    DegreeMismatch {
        /// Requested polynomial order.
        order: usize,
        /// Number of coefficient columns supplied.
        degree: usize,
    },

    /// Operand shapes are incompatible.
    #[error("Shape mismatch in {op}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Operation that detected the mismatch.
        op: &'static str,
        /// Expected shape (0 marks a free axis).
        expected: Vec<usize>,
        /// Actual shape.
        got: Vec<usize>,
    },

    /// Invalid argument provided to an operation.
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name.
        arg: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A zero-length chunk reached the streaming path with nothing to carry.
    #[error("Empty streaming chunk with no prior aggregate to carry forward")]
    EmptyChunk,
}

impl PomError {
    /// Build an [`PomError::InvalidArgument`].
    pub fn invalid(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }
}
