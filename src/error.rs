//! Error types for the matching core.

use thiserror::Error;

/// Errors raised by the matching core.
///
/// Numeric non-convergence of the angle optimiser is not represented here;
/// it is an expected outcome and is reported as `None` by the optimiser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// Invalid configuration detected at the call that received it
    /// (mismatched array lengths, unknown names, out-of-range parameters).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cooperative cancellation requested through the progress indicator.
    #[error("Match interrupted")]
    Interrupted,
}

/// Result type for matching operations.
pub type Result<T> = std::result::Result<T, MatchError>;
