use thiserror::Error;

/// Errors raised by the problem-building surface and the interior-point driver.
///
/// Validation errors ([`SolverError::ArgumentError`],
/// [`SolverError::FeasibilityError`]) abort immediately and are returned
/// from the top-level `solve` entry points. An [`SolverError::ArithmeticError`]
/// raised during the very first outer iteration is also fatal and
/// propagates to the caller; one raised on a later iteration is instead
/// absorbed by the driver's rollback/retry logic and reported through
/// [`crate::result::Status::Unknown`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("argument error: {0}")]
    ArgumentError(String),

    #[error("rank(A) < p or rank([H; A; Df; G]) < n")]
    RankDeficient,

    #[error("{0}")]
    FeasibilityError(String),

    #[error("singular KKT matrix in {stage}")]
    ArithmeticError { stage: &'static str },

    #[error("dimension mismatch: {what} expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}

pub type Result<T> = std::result::Result<T, SolverError>;
