pub mod bspline;
pub mod cspline;
pub mod error;
pub mod family;
pub mod ispline;
pub mod knots;
pub mod mspline;

pub use bspline::{bspline_basis, bspline_integral, BasisOptions};
pub use cspline::{cspline_basis, CSplineOptions};
pub use error::BasisError;
pub use family::{BasisMatrix, SplineFamily};
pub use ispline::ispline_basis;
pub use knots::{BoundaryChoice, KnotChoice, KnotSpec, SplineSpec};
pub use mspline::mspline_basis;
