use thiserror::Error;

/// Errors raised while building a spline basis. All of these are detected
/// eagerly, before any numeric work starts, and indicate caller misuse rather
/// than a transient condition; an operation either fully succeeds or fails
/// without producing a matrix.
#[derive(Error, Debug)]
pub enum BasisError {
    #[error(
        "The knot layout is invalid: {0}. Boundary knots must satisfy lower < upper, be finite, and contain every internal knot."
    )]
    InvalidKnotRange(String),

    #[error("No evaluable points: the evaluation vector is empty or contains no finite values.")]
    EmptyDomain,

    #[error(
        "Cannot reach {requested} degrees of freedom: at least {minimum} are required for this degree and intercept choice."
    )]
    DegreesOfFreedomTooSmall { requested: usize, minimum: usize },
}
