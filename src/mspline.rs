use crate::bspline;
use crate::error::BasisError;
use crate::family::{BasisMatrix, SplineFamily};
use crate::knots::{prepare, KnotSpec, SplineSpec};
use ndarray::ArrayView1;

/// M-spline basis: the B-spline basis rescaled per column so every column
/// integrates to 1 over its support. Derivatives of any order are built
/// directly from the rescaled derivative transform, per the options.
pub fn mspline_basis(
    points: ArrayView1<f64>,
    spec: &SplineSpec,
    options: &bspline::BasisOptions,
) -> Result<BasisMatrix, BasisError> {
    let knot_spec = prepare(points, spec)?;
    build_resolved(points, &knot_spec, options.derivative_order)
}

/// Per-column rescaling factors `(degree + 1) / (t_{j+degree+1} - t_j)` over
/// the augmented sequence. A zero-width support (possible only with heavily
/// duplicated internal knots) maps to 0: the column is identically zero.
fn unit_integral_scales(knot_spec: &KnotSpec) -> Vec<f64> {
    let degree = knot_spec.degree;
    let ord = degree + 1;
    let aug = knot_spec.augmented_knots();
    let ncols = aug.len() - degree - 1;
    (0..ncols)
        .map(|j| {
            let width = aug[j + ord] - aug[j];
            if width.abs() > 1e-12 {
                ord as f64 / width
            } else {
                0.0
            }
        })
        .collect()
}

pub(crate) fn build_resolved(
    points: ArrayView1<f64>,
    knot_spec: &KnotSpec,
    derivative_order: usize,
) -> Result<BasisMatrix, BasisError> {
    bspline::ensure_points(points)?;
    let degree = knot_spec.degree;
    let scales = unit_integral_scales(knot_spec);

    let full = if derivative_order == 0 {
        let mut matrix = bspline::full_basis_matrix(points, knot_spec);
        for (j, &scale) in scales.iter().enumerate() {
            matrix.column_mut(j).mapv_inplace(|v| v * scale);
        }
        matrix
    } else if derivative_order > degree {
        bspline::zeros_matrix(points, scales.len())
    } else {
        // The rescaling commutes with differentiation, so it is folded into
        // the coefficient transform instead of multiplying two matrices.
        let aug = knot_spec.augmented_knots();
        let mut transform = bspline::derivative_transform(aug.view(), degree, derivative_order);
        for (j, &scale) in scales.iter().enumerate() {
            transform.column_mut(j).mapv_inplace(|v| v * scale);
        }
        let lower_spec = KnotSpec {
            degree: degree - derivative_order,
            intercept: true,
            ..knot_spec.clone()
        };
        bspline::full_basis_matrix(points, &lower_spec).dot(&transform)
    };

    let matrix = bspline::apply_intercept(full, knot_spec.intercept);
    Ok(BasisMatrix::new(
        matrix,
        points.to_owned(),
        knot_spec.clone(),
        derivative_order,
        SplineFamily::MSpline { rescale: None },
    ))
}
