use crate::bspline::{apply_intercept, ensure_points, fill_rows, nonzero_basis_at, EvalScratch};
use crate::error::BasisError;
use crate::family::{BasisMatrix, SplineFamily};
use crate::ispline;
use crate::knots::{prepare, KnotSpec, SplineSpec};
use crate::mspline;
use ndarray::{Array1, ArrayView1};

/// Options for the C-spline builder.
#[derive(Clone, Copy, Debug)]
pub struct CSplineOptions {
    pub derivative_order: usize,
    /// Divide each column by its value at the upper boundary knot, so every
    /// column equals 1 there. Columns whose boundary value is 0 are left
    /// unscaled.
    pub scale: bool,
}

impl Default for CSplineOptions {
    fn default() -> Self {
        Self {
            derivative_order: 0,
            scale: true,
        }
    }
}

/// C-spline basis: the running integral of the I-spline basis, so every
/// column is convex over the boundary interval. Like the I-spline, the
/// stated degree tracks the generating M-spline; the polynomial degree is
/// `degree + 2`. Derivative order 1 is the I-spline, order 2 the M-spline,
/// and higher orders delegate to the M-spline derivative of order `d - 2`,
/// all rescaled consistently when `scale` is on.
pub fn cspline_basis(
    points: ArrayView1<f64>,
    spec: &SplineSpec,
    options: &CSplineOptions,
) -> Result<BasisMatrix, BasisError> {
    let knot_spec = prepare(points, spec)?;
    build_resolved(points, &knot_spec, options.scale, options.derivative_order)
}

/// Integration constants of the once-elevated basis columns: the weights of
/// the second cumulative-sum pass.
fn elevation_constants(knot_spec: &KnotSpec) -> Vec<f64> {
    let q2 = knot_spec.degree + 2;
    let elevated_once = knot_spec.augmented_with_degree(knot_spec.degree + 1);
    let n1 = elevated_once.len() - (knot_spec.degree + 1) - 1;
    (0..n1)
        .map(|m| (elevated_once[m + q2] - elevated_once[m]) / q2 as f64)
        .collect()
}

/// Per-column reciprocal boundary values, in the exposed column space.
/// The boundary value of each column has the closed form
/// `sum of the elevation constants past the column index`, so no basis
/// evaluation is needed. Zero boundary values map to a factor of 1.
fn boundary_rescale_factors(knot_spec: &KnotSpec) -> Array1<f64> {
    let consts = elevation_constants(knot_spec);
    let n1 = consts.len();
    let mut factors = Vec::with_capacity(n1 - 1);
    for j in 0..n1 - 1 {
        let boundary_value: f64 = consts[j + 1..].iter().sum();
        if boundary_value > 0.0 {
            factors.push(1.0 / boundary_value);
        } else {
            log::warn!(
                "C-spline column {j} is 0 at the upper boundary knot and is left unscaled"
            );
            factors.push(1.0);
        }
    }
    let factors = Array1::from_vec(factors);
    if knot_spec.intercept {
        factors
    } else {
        factors.slice(ndarray::s![1..]).to_owned()
    }
}

pub(crate) fn build_resolved(
    points: ArrayView1<f64>,
    knot_spec: &KnotSpec,
    scale: bool,
    derivative_order: usize,
) -> Result<BasisMatrix, BasisError> {
    if derivative_order == 0 {
        return build_cspline(points, knot_spec, scale);
    }
    // Derivatives walk back down the chain before any C-spline matrix is
    // built: C' is the I-spline, C'' the M-spline, and beyond that the
    // M-spline derivative.
    let basis = match derivative_order {
        1 => ispline::build_resolved(points, knot_spec, 0)?,
        2 => mspline::build_resolved(points, knot_spec, 0)?,
        d => mspline::build_resolved(points, knot_spec, d - 2)?,
    };
    if scale {
        let factors = boundary_rescale_factors(knot_spec);
        Ok(basis.scaled_columns(factors.view()))
    } else {
        Ok(basis)
    }
}

fn build_cspline(
    points: ArrayView1<f64>,
    knot_spec: &KnotSpec,
    scale: bool,
) -> Result<BasisMatrix, BasisError> {
    ensure_points(points)?;
    let q2 = knot_spec.degree + 2;
    let elevated_twice = knot_spec.augmented_with_degree(q2);
    let consts = elevation_constants(knot_spec);
    let n1 = consts.len();
    let ncols = n1 - 1;

    let full = fill_rows(
        points,
        ncols,
        || (EvalScratch::new(q2), vec![0.0; q2 + 1]),
        |x, (scratch, values), row| {
            let start = nonzero_basis_at(x, q2, elevated_twice.view(), values, scratch);
            // Tail sums of the twice-elevated row, forced to 1 left of the
            // span, then a weighted reverse scan with the once-elevated
            // integration constants.
            let tail = |m: usize| {
                if m <= start {
                    1.0
                } else if m > start + q2 {
                    0.0
                } else {
                    values[m - start..].iter().sum::<f64>()
                }
            };
            let mut running = 0.0;
            for m in (1..n1).rev() {
                running += consts[m] * tail(m + 1);
                row[m - 1] = running;
            }
        },
    );
    let matrix = apply_intercept(full, knot_spec.intercept);

    let ispline = ispline::build_resolved(points, knot_spec, 0)?;
    let mspline = mspline::build_resolved(points, knot_spec, 0)?;

    let (matrix, rescale, ispline, mspline) = if scale {
        let factors = boundary_rescale_factors(knot_spec);
        (
            &matrix * &factors,
            Some(factors.clone()),
            ispline.scaled_columns(factors.view()),
            mspline.scaled_columns(factors.view()),
        )
    } else {
        (matrix, None, ispline, mspline)
    };

    Ok(BasisMatrix::new(
        matrix,
        points.to_owned(),
        knot_spec.clone(),
        0,
        SplineFamily::CSpline {
            rescale,
            ispline: Box::new(ispline),
            mspline: Box::new(mspline),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bspline::BasisOptions;
    use crate::ispline::ispline_basis;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    fn spec(degree: usize, internal: &[f64]) -> SplineSpec {
        SplineSpec::new(degree)
            .with_internal_knots(internal)
            .with_boundary(0.0, 1.0)
            .with_intercept(true)
    }

    fn unscaled() -> CSplineOptions {
        CSplineOptions {
            derivative_order: 0,
            scale: false,
        }
    }

    #[test]
    fn test_degree_zero_cspline_has_closed_form() {
        // With one internal knot at 0.5 the two unscaled columns are the
        // second antiderivatives of the degree-0 M-splines.
        let x = array![0.0, 0.25, 0.5, 0.75, 1.0];
        let basis = cspline_basis(x.view(), &spec(0, &[0.5]), &unscaled()).unwrap();
        let expected = array![
            [0.0, 0.0],
            [0.0625, 0.0],   // x^2 before the knot
            [0.25, 0.0],
            [0.5, 0.0625],   // 0.25 + (x - 0.5), then (x - 0.5)^2
            [0.75, 0.25],
        ];
        assert_abs_diff_eq!(
            basis.matrix().as_slice().unwrap(),
            expected.as_slice().unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_scaled_columns_are_one_at_upper_boundary() {
        let x = array![0.0, 0.37, 1.0];
        for degree in 0..=3 {
            let basis = cspline_basis(
                x.view(),
                &spec(degree, &[0.3, 0.5, 0.6]),
                &CSplineOptions::default(),
            )
            .unwrap();
            let last = basis.matrix().nrows() - 1;
            for &v in basis.matrix().row(last) {
                assert_abs_diff_eq!(v, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_columns_are_convex() {
        let x = Array1::linspace(0.0, 1.0, 401);
        let basis = cspline_basis(x.view(), &spec(2, &[0.3, 0.5, 0.6]), &unscaled()).unwrap();
        let h = 1.0 / 400.0;
        for c in 0..basis.matrix().ncols() {
            let col = basis.matrix().column(c);
            for r in 1..col.len() - 1 {
                let second = (col[r + 1] - 2.0 * col[r] + col[r - 1]) / (h * h);
                assert!(
                    second >= -1e-8,
                    "column {c} is concave at row {r}: {second}"
                );
            }
        }
    }

    #[test]
    fn test_matches_trapezoid_integral_of_ispline() {
        let n = 2001;
        let x = Array1::linspace(0.0, 1.0, n);
        let spec = spec(2, &[0.3, 0.5, 0.6]);
        let cspline = cspline_basis(x.view(), &spec, &unscaled()).unwrap();
        let ispline = ispline_basis(x.view(), &spec, &BasisOptions::value()).unwrap();
        let h = 1.0 / (n - 1) as f64;
        for c in 0..cspline.matrix().ncols() {
            let mut running = 0.0;
            for r in 0..n {
                if r > 0 {
                    running +=
                        0.5 * (ispline.matrix()[[r - 1, c]] + ispline.matrix()[[r, c]]) * h;
                }
                assert_abs_diff_eq!(cspline.matrix()[[r, c]], running, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_zero_boundary_column_is_left_unscaled() {
        // An internal knot sitting exactly on the upper boundary produces a
        // final column that is identically zero, including at the boundary.
        // Scaling must leave it untouched instead of dividing by zero.
        let x = array![0.0, 0.5, 1.0];
        let basis = cspline_basis(
            x.view(),
            &spec(0, &[1.0]),
            &CSplineOptions::default(),
        )
        .unwrap();
        assert_eq!(basis.matrix().ncols(), 2);
        let last_col = basis.matrix().column(1);
        assert!(last_col.iter().all(|&v| v == 0.0));
        // The surviving column still scales to 1 at the boundary.
        assert_abs_diff_eq!(basis.matrix()[[2, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(basis.matrix()[[1, 0]], 0.25, epsilon = 1e-12);
        assert!(basis.matrix().iter().all(|v| v.is_finite()));
    }
}
