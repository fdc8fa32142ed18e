use crate::error::BasisError;
use ndarray::{Array, Array1, ArrayView1};

/// Where the internal knots of a basis come from.
#[derive(Clone, Debug)]
pub enum KnotChoice {
    /// Use these internal knots as given; they are sorted during resolution.
    Provided(Vec<f64>),
    /// Choose internal knots so the basis has this many columns, placing them
    /// at interior sample quantiles of the finite evaluation points.
    DegreesOfFreedom(usize),
}

/// Where the boundary knots of a basis come from.
#[derive(Clone, Copy, Debug)]
pub enum BoundaryChoice {
    Provided(f64, f64),
    /// Use the observed range of the finite evaluation points.
    FromData,
}

/// Build-time configuration shared by every spline family.
///
/// A `SplineSpec` is resolved exactly once, at the start of a build call,
/// into a concrete [`KnotSpec`]; nothing downstream re-derives knots or
/// boundaries from the data implicitly.
#[derive(Clone, Debug)]
pub struct SplineSpec {
    pub knots: KnotChoice,
    pub boundary: BoundaryChoice,
    pub degree: usize,
    pub intercept: bool,
}

impl Default for SplineSpec {
    /// Cubic basis with no internal knots, data-range boundary, no intercept.
    fn default() -> Self {
        Self::new(3)
    }
}

impl SplineSpec {
    pub fn new(degree: usize) -> Self {
        Self {
            knots: KnotChoice::Provided(Vec::new()),
            boundary: BoundaryChoice::FromData,
            degree,
            intercept: false,
        }
    }

    pub fn with_internal_knots(mut self, knots: &[f64]) -> Self {
        self.knots = KnotChoice::Provided(knots.to_vec());
        self
    }

    pub fn with_degrees_of_freedom(mut self, df: usize) -> Self {
        self.knots = KnotChoice::DegreesOfFreedom(df);
        self
    }

    pub fn with_boundary(mut self, lower: f64, upper: f64) -> Self {
        self.boundary = BoundaryChoice::Provided(lower, upper);
        self
    }

    pub fn with_intercept(mut self, intercept: bool) -> Self {
        self.intercept = intercept;
        self
    }

    /// Resolves the configuration against the finite evaluation points into a
    /// concrete knot layout.
    pub(crate) fn resolve(&self, finite_points: &[f64]) -> Result<KnotSpec, BasisError> {
        let (lower, upper) = match self.boundary {
            BoundaryChoice::Provided(lower, upper) => (lower, upper),
            BoundaryChoice::FromData => {
                let mut min_val = f64::INFINITY;
                let mut max_val = f64::NEG_INFINITY;
                for &value in finite_points {
                    min_val = min_val.min(value);
                    max_val = max_val.max(value);
                }
                (min_val, max_val)
            }
        };
        if !lower.is_finite() || !upper.is_finite() {
            return Err(BasisError::InvalidKnotRange(format!(
                "boundary knots ({lower}, {upper}) are not finite"
            )));
        }
        if lower >= upper {
            return Err(BasisError::InvalidKnotRange(format!(
                "lower boundary knot ({lower}) must be strictly less than the upper ({upper})"
            )));
        }

        let internal_knots = match &self.knots {
            KnotChoice::Provided(knots) => {
                let mut sorted = knots.clone();
                sorted.sort_by(f64::total_cmp);
                sorted
            }
            KnotChoice::DegreesOfFreedom(df) => {
                let minimum = (self.degree + usize::from(self.intercept)).max(1);
                if *df < minimum {
                    return Err(BasisError::DegreesOfFreedomTooSmall {
                        requested: *df,
                        minimum,
                    });
                }
                let count = df - self.degree - usize::from(self.intercept);
                log::debug!(
                    "resolving {df} degrees of freedom as {count} interior quantile knot(s)"
                );
                interior_quantile_knots(finite_points, count, lower, upper)
            }
        };

        for &knot in &internal_knots {
            if !knot.is_finite() {
                return Err(BasisError::InvalidKnotRange(format!(
                    "internal knot ({knot}) is not finite"
                )));
            }
            if knot < lower || knot > upper {
                return Err(BasisError::InvalidKnotRange(format!(
                    "internal knot ({knot}) lies outside the boundary [{lower}, {upper}]"
                )));
            }
        }

        Ok(KnotSpec {
            boundary_knots: (lower, upper),
            internal_knots,
            degree: self.degree,
            intercept: self.intercept,
        })
    }
}

/// A fully resolved knot layout: the generating parameters every basis
/// matrix carries.
#[derive(Clone, Debug, PartialEq)]
pub struct KnotSpec {
    pub boundary_knots: (f64, f64),
    pub internal_knots: Vec<f64>,
    pub degree: usize,
    pub intercept: bool,
}

impl KnotSpec {
    /// Number of columns the basis exposes after the intercept policy.
    pub fn num_columns(&self) -> usize {
        self.degree + self.internal_knots.len() + usize::from(self.intercept)
    }

    /// The augmented, non-decreasing knot sequence: each boundary knot
    /// repeated `degree + 1` times around the sorted internal knots.
    pub fn augmented_knots(&self) -> Array1<f64> {
        self.augmented_with_degree(self.degree)
    }

    /// Augmented sequence at a different boundary multiplicity, used by the
    /// order-elevation integral transforms.
    pub(crate) fn augmented_with_degree(&self, degree: usize) -> Array1<f64> {
        let (lower, upper) = self.boundary_knots;
        let mut knots = Vec::with_capacity(self.internal_knots.len() + 2 * (degree + 1));
        for _ in 0..=degree {
            knots.push(lower);
        }
        knots.extend_from_slice(&self.internal_knots);
        for _ in 0..=degree {
            knots.push(upper);
        }
        Array::from_vec(knots)
    }
}

/// Interior sample quantiles of the finite points, used by the
/// degrees-of-freedom convenience. Linear interpolation between order
/// statistics; results are clamped into the boundary interval.
fn interior_quantile_knots(finite_points: &[f64], count: usize, lower: f64, upper: f64) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let mut sorted: Vec<f64> = finite_points.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let mut knots = Vec::with_capacity(count);
    for j in 1..=count {
        let p = j as f64 / (count + 1) as f64;
        let pos = p * (n.saturating_sub(1) as f64);
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = pos - lo as f64;
        let q = if lo == hi {
            sorted[lo]
        } else {
            sorted[lo] * (1.0 - frac) + sorted[hi] * frac
        };
        knots.push(q.clamp(lower, upper));
    }
    knots
}

/// Filters the points to finite values, resolves the spec against them, and
/// flags points beyond the boundary. Shared preamble of every public builder.
pub(crate) fn prepare(
    points: ArrayView1<f64>,
    spec: &SplineSpec,
) -> Result<KnotSpec, BasisError> {
    let finite: Vec<f64> = points.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return Err(BasisError::EmptyDomain);
    }
    let knot_spec = spec.resolve(&finite)?;
    let (lower, upper) = knot_spec.boundary_knots;
    let outside = finite.iter().filter(|&&x| x < lower || x > upper).count();
    if outside > 0 {
        log::warn!(
            "{outside} evaluation point(s) lie beyond the boundary knots [{lower}, {upper}]; the boundary-span polynomial is extended there"
        );
    }
    Ok(knot_spec)
}
