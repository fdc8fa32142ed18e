use crate::error::BasisError;
use crate::family::{BasisMatrix, SplineFamily};
use crate::knots::{prepare, KnotSpec, SplineSpec};
use ndarray::parallel::prelude::*;
use ndarray::{s, Array2, ArrayView1, Axis};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::OnceLock;

/// Options for basis generation, controlling the derivative order baked into
/// the returned matrix. Order 0 is the basis itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasisOptions {
    pub derivative_order: usize,
}

impl BasisOptions {
    /// Evaluate the basis functions themselves (no derivative).
    pub fn value() -> Self {
        Self { derivative_order: 0 }
    }

    /// Evaluate the derivative of the given order.
    pub fn derivative(order: usize) -> Self {
        Self {
            derivative_order: order,
        }
    }
}

/// Row evaluation switches to the shared thread pool above this row count;
/// below it the pool setup costs more than it saves.
const PARALLEL_ROW_THRESHOLD: usize = 256;

fn basis_thread_pool() -> &'static ThreadPool {
    static POOL: OnceLock<ThreadPool> = OnceLock::new();
    POOL.get_or_init(|| {
        ThreadPoolBuilder::new()
            .build()
            .expect("basis thread pool initialization should succeed")
    })
}

/// Reusable buffers for the Cox-de Boor recursion, shared across evaluation
/// points to avoid per-point allocation.
#[derive(Clone, Debug)]
pub(crate) struct EvalScratch {
    left: Vec<f64>,
    right: Vec<f64>,
    values: Vec<f64>,
}

impl EvalScratch {
    pub(crate) fn new(degree: usize) -> Self {
        let len = degree + 1;
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
            values: vec![0.0; len],
        }
    }
}

/// Evaluates the `degree + 1` basis functions that are non-zero at `x` over
/// the augmented sequence `knots`, writing them into `out` and returning the
/// index of the first non-zero column.
///
/// Numerically stable triangular form of the Cox-de Boor recursion
/// (The NURBS Book, algorithm A2.2). The span search assigns a point sitting
/// exactly on an internal knot to the interval that has that knot as its left
/// endpoint; a point at or beyond the upper boundary uses the last span, so
/// the upper boundary point is always covered. Points outside the boundary
/// extend the boundary-span polynomial rather than evaluating to zero.
pub(crate) fn nonzero_basis_at(
    x: f64,
    degree: usize,
    knots: ArrayView1<f64>,
    out: &mut [f64],
    scratch: &mut EvalScratch,
) -> usize {
    let num_basis = knots.len() - degree - 1;
    debug_assert_eq!(out.len(), degree + 1);

    let span = if x >= knots[num_basis] {
        num_basis - 1
    } else if x < knots[degree] {
        degree
    } else {
        let mut span = degree;
        while span < num_basis && x >= knots[span + 1] {
            span += 1;
        }
        span
    };

    let left = &mut scratch.left;
    let right = &mut scratch.right;
    let values = &mut scratch.values;
    values[0] = 1.0;

    for d in 1..=degree {
        left[d] = x - knots[span + 1 - d];
        right[d] = knots[span + d] - x;

        let mut saved = 0.0;
        for r in 0..d {
            let den = right[r + 1] + left[d - r];
            let temp = if den.abs() > 1e-12 { values[r] / den } else { 0.0 };
            values[r] = saved + right[r + 1] * temp;
            saved = left[d - r] * temp;
        }
        values[d] = saved;
    }

    out.copy_from_slice(&values[..=degree]);
    span - degree
}

/// Degree-0 basis row: column `k` indicates `[knot_k, knot_{k+1})`, with the
/// final interval closed on the right so the upper boundary point is covered
/// by exactly one column. Zero outside the boundary knots.
fn step_indicator_row(x: f64, breaks: &[f64], row: &mut [f64]) {
    row.fill(0.0);
    let last = row.len() - 1;
    for k in 0..row.len() {
        let hit = if k == last {
            x >= breaks[k] && x <= breaks[k + 1]
        } else {
            x >= breaks[k] && x < breaks[k + 1]
        };
        if hit {
            row[k] = 1.0;
            break;
        }
    }
}

/// Runs a per-row evaluation kernel over all points. Rows for non-finite
/// points are filled with NaN and skipped by the kernel; everything else is
/// evaluated independently, in parallel above [`PARALLEL_ROW_THRESHOLD`].
pub(crate) fn fill_rows<S, I, F>(
    points: ArrayView1<f64>,
    ncols: usize,
    init: I,
    eval: F,
) -> Array2<f64>
where
    S: Send,
    I: Fn() -> S + Sync + Send,
    F: Fn(f64, &mut S, &mut [f64]) + Sync + Send,
{
    let n = points.len();
    let mut matrix = Array2::zeros((n, ncols));

    if let (true, Some(xs)) = (n >= PARALLEL_ROW_THRESHOLD, points.as_slice()) {
        basis_thread_pool().install(|| {
            matrix
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .zip(xs.par_iter().copied())
                .for_each_init(&init, |scratch, (mut row, x)| {
                    let row = row
                        .as_slice_mut()
                        .expect("basis matrix rows should be contiguous");
                    if x.is_finite() {
                        eval(x, scratch, row);
                    } else {
                        row.fill(f64::NAN);
                    }
                });
        });
    } else {
        let mut scratch = init();
        for (mut row, &x) in matrix.axis_iter_mut(Axis(0)).zip(points.iter()) {
            let row = row
                .as_slice_mut()
                .expect("basis matrix rows should be contiguous");
            if x.is_finite() {
                eval(x, &mut scratch, row);
            } else {
                row.fill(f64::NAN);
            }
        }
    }
    matrix
}

/// Full basis matrix over the augmented sequence, intercept column included.
pub(crate) fn full_basis_matrix(points: ArrayView1<f64>, knot_spec: &KnotSpec) -> Array2<f64> {
    let degree = knot_spec.degree;
    let knots = knot_spec.augmented_knots();
    let ncols = knots.len() - degree - 1;

    if degree == 0 {
        let breaks = knots;
        return fill_rows(points, ncols, || (), |x, _scratch, row| {
            step_indicator_row(x, breaks.as_slice().expect("knots are contiguous"), row);
        });
    }

    fill_rows(
        points,
        ncols,
        || (EvalScratch::new(degree), vec![0.0; degree + 1]),
        |x, (scratch, values), row| {
            row.fill(0.0);
            let start = nonzero_basis_at(x, degree, knots.view(), values, scratch);
            for (offset, &v) in values.iter().enumerate() {
                let col = start + offset;
                if col < ncols {
                    row[col] = v;
                }
            }
        },
    )
}

/// Zero matrix with NaN passthrough rows, for derivative orders that
/// annihilate the basis.
pub(crate) fn zeros_matrix(points: ArrayView1<f64>, ncols: usize) -> Array2<f64> {
    fill_rows(points, ncols, || (), |_x, _scratch, _row| {})
}

/// Coefficient transform mapping the full basis columns of `degree` to their
/// order-`order` derivative expressed in the degree-`(degree - order)` basis.
///
/// Each differencing step applies the divided-difference derivative identity
/// over the original augmented sequence; the per-step factor `q` accumulates
/// to `degree! / (degree - order)!`. Rows for basis functions whose support
/// degenerates to a point are dropped at the end: they are identically zero.
pub(crate) fn derivative_transform(
    aug: ArrayView1<f64>,
    degree: usize,
    order: usize,
) -> Array2<f64> {
    let ncols = aug.len() - degree - 1;
    let mut coeff = Array2::<f64>::eye(ncols);
    let mut nrows = ncols;

    for step in 0..order {
        let q = degree - step;
        let next_rows = nrows + 1;
        let mut next = Array2::<f64>::zeros((next_rows, ncols));
        for i in 0..next_rows {
            let width = aug[i + q] - aug[i];
            if width.abs() <= 1e-12 {
                continue;
            }
            let factor = q as f64 / width;
            for j in 0..ncols {
                let hi = if i < nrows { coeff[[i, j]] } else { 0.0 };
                let lo = if i >= 1 { coeff[[i - 1, j]] } else { 0.0 };
                next[[i, j]] = factor * (hi - lo);
            }
        }
        coeff = next;
        nrows = next_rows;
    }

    coeff.slice(s![order..nrows - order, ..]).to_owned()
}

/// Full matrix of the order-`order` derivative of the basis, intercept
/// column included. Orders beyond the degree are identically zero.
pub(crate) fn derivative_full_matrix(
    points: ArrayView1<f64>,
    knot_spec: &KnotSpec,
    order: usize,
) -> Array2<f64> {
    let degree = knot_spec.degree;
    let aug = knot_spec.augmented_knots();
    let ncols = aug.len() - degree - 1;
    if order > degree {
        return zeros_matrix(points, ncols);
    }

    let transform = derivative_transform(aug.view(), degree, order);
    let lower_spec = KnotSpec {
        degree: degree - order,
        intercept: true,
        ..knot_spec.clone()
    };
    full_basis_matrix(points, &lower_spec).dot(&transform)
}

/// Row-wise tail-sum transform over the once-elevated basis: the shared
/// mechanism behind the B-spline antiderivative and the I-spline transform.
///
/// For each row the elevated basis is evaluated sparsely; column `j` receives
/// `scales[j]` times the sum of elevated columns `j + 1` onward. Columns whose
/// support lies entirely left of the point's span are forced to exactly 1
/// (they are fully integrated), columns entirely right of it are 0. The
/// column order inside a row is the only ordering dependency.
pub(crate) fn tail_sum_matrix(
    points: ArrayView1<f64>,
    knot_spec: &KnotSpec,
    scales: &[f64],
) -> Array2<f64> {
    let q = knot_spec.degree + 1;
    let elevated = knot_spec.augmented_with_degree(q);
    let ncols = scales.len();

    fill_rows(
        points,
        ncols,
        || (EvalScratch::new(q), vec![0.0; q + 1]),
        |x, (scratch, values), row| {
            let start = nonzero_basis_at(x, q, elevated.view(), values, scratch);
            for j in 0..ncols {
                let m0 = j + 1;
                row[j] = scales[j]
                    * if m0 <= start {
                        1.0
                    } else if m0 > start + q {
                        0.0
                    } else {
                        values[m0 - start..].iter().sum::<f64>()
                    };
            }
        },
    )
}

/// Drops the intercept column when the layout asks for it. The drop happens
/// after construction for every family.
pub(crate) fn apply_intercept(matrix: Array2<f64>, intercept: bool) -> Array2<f64> {
    if intercept {
        matrix
    } else {
        matrix.slice(s![.., 1..]).to_owned()
    }
}

/// Fails with `EmptyDomain` unless at least one point is finite. The public
/// builders check this through `prepare`; the resolved entry points used by
/// derivative dispatch and re-evaluation check it here.
pub(crate) fn ensure_points(points: ArrayView1<f64>) -> Result<(), BasisError> {
    if points.iter().any(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(BasisError::EmptyDomain)
    }
}

/// B-spline basis (derivative order 0) or the basis of its order-`d`
/// derivative (order `d >= 1`), per the options.
pub fn bspline_basis(
    points: ArrayView1<f64>,
    spec: &SplineSpec,
    options: &BasisOptions,
) -> Result<BasisMatrix, BasisError> {
    let knot_spec = prepare(points, spec)?;
    build_resolved(points, &knot_spec, options.derivative_order)
}

/// Antiderivative of the B-spline basis, normalized to vanish at the lower
/// boundary knot.
pub fn bspline_integral(
    points: ArrayView1<f64>,
    spec: &SplineSpec,
) -> Result<BasisMatrix, BasisError> {
    let knot_spec = prepare(points, spec)?;
    build_integral_resolved(points, &knot_spec)
}

pub(crate) fn build_resolved(
    points: ArrayView1<f64>,
    knot_spec: &KnotSpec,
    derivative_order: usize,
) -> Result<BasisMatrix, BasisError> {
    ensure_points(points)?;
    let (full, family) = if derivative_order == 0 {
        (full_basis_matrix(points, knot_spec), SplineFamily::BSpline)
    } else {
        (
            derivative_full_matrix(points, knot_spec, derivative_order),
            SplineFamily::BSplineDerivative,
        )
    };
    let matrix = apply_intercept(full, knot_spec.intercept);
    Ok(BasisMatrix::new(
        matrix,
        points.to_owned(),
        knot_spec.clone(),
        derivative_order,
        family,
    ))
}

pub(crate) fn build_integral_resolved(
    points: ArrayView1<f64>,
    knot_spec: &KnotSpec,
) -> Result<BasisMatrix, BasisError> {
    ensure_points(points)?;
    let degree = knot_spec.degree;
    let ord = degree + 1;
    let aug = knot_spec.augmented_knots();
    let ncols = aug.len() - degree - 1;

    // Per-column integration constant: the total integral of the column over
    // its support.
    let scales: Vec<f64> = (0..ncols)
        .map(|j| (aug[j + ord] - aug[j]) / ord as f64)
        .collect();

    let full = tail_sum_matrix(points, knot_spec, &scales);
    let matrix = apply_intercept(full, knot_spec.intercept);

    let elevated_spec = KnotSpec {
        degree: degree + 1,
        intercept: true,
        ..knot_spec.clone()
    };
    let elevated = build_resolved(points, &elevated_spec, 0)?;

    Ok(BasisMatrix::new(
        matrix,
        points.to_owned(),
        knot_spec.clone(),
        0,
        SplineFamily::BSplineIntegral {
            elevated: Box::new(elevated),
        },
    ))
}
