use crate::bspline;
use crate::error::BasisError;
use crate::family::{BasisMatrix, SplineFamily};
use crate::knots::{prepare, KnotSpec, SplineSpec};
use crate::mspline;
use ndarray::ArrayView1;

/// I-spline basis: the running integral of the M-spline basis, so every
/// column is non-decreasing from 0 at the lower boundary to 1 at the upper.
///
/// The stated degree tracks the generating M-spline, not the polynomial
/// degree: an I-spline of degree `p` is piecewise polynomial of degree
/// `p + 1`. Derivative order 1 is exactly the generating M-spline; higher
/// orders delegate to the M-spline derivative of order `d - 1`.
pub fn ispline_basis(
    points: ArrayView1<f64>,
    spec: &SplineSpec,
    options: &bspline::BasisOptions,
) -> Result<BasisMatrix, BasisError> {
    let knot_spec = prepare(points, spec)?;
    build_resolved(points, &knot_spec, options.derivative_order)
}

pub(crate) fn build_resolved(
    points: ArrayView1<f64>,
    knot_spec: &KnotSpec,
    derivative_order: usize,
) -> Result<BasisMatrix, BasisError> {
    match derivative_order {
        0 => {
            bspline::ensure_points(points)?;
            // Tail sums of the once-elevated basis. The M-spline rescaling
            // cancels the per-column integration constant exactly, leaving
            // unit weights.
            let ncols = knot_spec.internal_knots.len() + knot_spec.degree + 1;
            let scales = vec![1.0; ncols];
            let full = bspline::tail_sum_matrix(points, knot_spec, &scales);
            let matrix = bspline::apply_intercept(full, knot_spec.intercept);
            let mspline = mspline::build_resolved(points, knot_spec, 0)?;
            Ok(BasisMatrix::new(
                matrix,
                points.to_owned(),
                knot_spec.clone(),
                0,
                SplineFamily::ISpline {
                    rescale: None,
                    mspline: Box::new(mspline),
                },
            ))
        }
        1 => mspline::build_resolved(points, knot_spec, 0),
        d => mspline::build_resolved(points, knot_spec, d - 1),
    }
}
