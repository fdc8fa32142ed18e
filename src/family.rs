use crate::bspline;
use crate::cspline;
use crate::error::BasisError;
use crate::ispline;
use crate::knots::KnotSpec;
use crate::mspline;
use ndarray::{Array1, Array2, ArrayView1};

/// The spline family a basis matrix belongs to. The set is closed; each
/// variant carries exactly the cached sub-bases its derivative rule consumes.
///
/// The `rescale` factors of a boundary-scaled C-spline ride along on every
/// basis in its chain: differentiation commutes with a constant per-column
/// rescaling, so any derivative that is rebuilt rather than read from a
/// cache must re-apply the same factors.
#[derive(Clone, Debug)]
pub enum SplineFamily {
    BSpline,
    BSplineDerivative,
    /// Antiderivative of the B-spline basis, carrying the order-elevation
    /// basis it was built from.
    BSplineIntegral { elevated: Box<BasisMatrix> },
    MSpline { rescale: Option<Array1<f64>> },
    /// Carries the generating M-spline basis, which is its first derivative.
    ISpline {
        rescale: Option<Array1<f64>>,
        mspline: Box<BasisMatrix>,
    },
    /// Carries the generating I- and M-spline bases, pre-scaled when the
    /// boundary rescaling is on.
    CSpline {
        rescale: Option<Array1<f64>>,
        ispline: Box<BasisMatrix>,
        mspline: Box<BasisMatrix>,
    },
}

/// A basis matrix together with the metadata needed to differentiate it or
/// re-evaluate it at new points. Immutable after construction: derivative
/// requests produce a new value, never mutate this one.
#[derive(Clone, Debug)]
pub struct BasisMatrix {
    matrix: Array2<f64>,
    points: Array1<f64>,
    knot_spec: KnotSpec,
    derivative_order: usize,
    family: SplineFamily,
}

impl BasisMatrix {
    pub(crate) fn new(
        matrix: Array2<f64>,
        points: Array1<f64>,
        knot_spec: KnotSpec,
        derivative_order: usize,
        family: SplineFamily,
    ) -> Self {
        Self {
            matrix,
            points,
            knot_spec,
            derivative_order,
            family,
        }
    }

    /// The basis values: rows are evaluation points (all-NaN for missing
    /// inputs), columns are basis functions.
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// The evaluation points this matrix was built at, missing values
    /// included.
    pub fn points(&self) -> &Array1<f64> {
        &self.points
    }

    /// The resolved knot layout the basis was generated from.
    pub fn knot_spec(&self) -> &KnotSpec {
        &self.knot_spec
    }

    /// The derivative order already baked into the matrix.
    pub fn derivative_order(&self) -> usize {
        self.derivative_order
    }

    pub fn family(&self) -> &SplineFamily {
        &self.family
    }

    /// Differentiates the represented basis `order` more times, consuming
    /// cached sub-bases where the family carries them and rebuilding through
    /// the B -> M -> I -> C chain otherwise. Order 0 returns a copy.
    ///
    /// Nesting `differentiate` calls is equivalent to a single call with the
    /// summed order, up to floating-point rounding.
    pub fn differentiate(&self, order: usize) -> Result<BasisMatrix, BasisError> {
        if order == 0 {
            return Ok(self.clone());
        }
        let points = self.points.view();
        match &self.family {
            SplineFamily::BSpline => bspline::build_resolved(points, &self.knot_spec, order),
            SplineFamily::BSplineDerivative => {
                bspline::build_resolved(points, &self.knot_spec, self.derivative_order + order)
            }
            SplineFamily::BSplineIntegral { .. } => {
                // The first derivative undoes the integral exactly.
                bspline::build_resolved(points, &self.knot_spec, order - 1)
            }
            SplineFamily::MSpline { rescale } => {
                let basis =
                    mspline::build_resolved(points, &self.knot_spec, self.derivative_order + order)?;
                Ok(apply_rescale(basis, rescale))
            }
            SplineFamily::ISpline { rescale, mspline } => match order {
                1 => Ok((**mspline).clone()),
                d => {
                    let basis = mspline::build_resolved(points, &self.knot_spec, d - 1)?;
                    Ok(apply_rescale(basis, rescale))
                }
            },
            SplineFamily::CSpline {
                rescale,
                ispline,
                mspline,
            } => match order {
                1 => Ok((**ispline).clone()),
                2 => Ok((**mspline).clone()),
                d => {
                    let basis = mspline::build_resolved(points, &self.knot_spec, d - 2)?;
                    Ok(apply_rescale(basis, rescale))
                }
            },
        }
    }

    /// Re-evaluates the originating family at new points, with the stored
    /// knot layout, derivative order, and scaling.
    pub fn evaluate_at(&self, points: ArrayView1<f64>) -> Result<BasisMatrix, BasisError> {
        match &self.family {
            SplineFamily::BSpline | SplineFamily::BSplineDerivative => {
                bspline::build_resolved(points, &self.knot_spec, self.derivative_order)
            }
            SplineFamily::BSplineIntegral { .. } => {
                bspline::build_integral_resolved(points, &self.knot_spec)
            }
            SplineFamily::MSpline { rescale } => {
                let basis =
                    mspline::build_resolved(points, &self.knot_spec, self.derivative_order)?;
                Ok(apply_rescale(basis, rescale))
            }
            SplineFamily::ISpline { rescale, .. } => {
                let basis = ispline::build_resolved(points, &self.knot_spec, 0)?;
                Ok(apply_rescale(basis, rescale))
            }
            SplineFamily::CSpline { rescale, .. } => {
                cspline::build_resolved(points, &self.knot_spec, rescale.is_some(), 0)
            }
        }
    }

    /// Multiplies every column (and the columns of every cached sub-basis)
    /// by the given factors, remembering them for later rebuilds. Used by
    /// the C-spline boundary rescaling.
    pub(crate) fn scaled_columns(&self, factors: ArrayView1<f64>) -> BasisMatrix {
        let family = match &self.family {
            SplineFamily::MSpline { rescale } => SplineFamily::MSpline {
                rescale: Some(compose_rescale(rescale, factors)),
            },
            SplineFamily::ISpline { rescale, mspline } => SplineFamily::ISpline {
                rescale: Some(compose_rescale(rescale, factors)),
                mspline: Box::new(mspline.scaled_columns(factors)),
            },
            other => other.clone(),
        };
        BasisMatrix {
            matrix: &self.matrix * &factors,
            points: self.points.clone(),
            knot_spec: self.knot_spec.clone(),
            derivative_order: self.derivative_order,
            family,
        }
    }
}

fn compose_rescale(existing: &Option<Array1<f64>>, factors: ArrayView1<f64>) -> Array1<f64> {
    match existing {
        Some(current) => current * &factors,
        None => factors.to_owned(),
    }
}

fn apply_rescale(basis: BasisMatrix, rescale: &Option<Array1<f64>>) -> BasisMatrix {
    match rescale {
        Some(factors) => basis.scaled_columns(factors.view()),
        None => basis,
    }
}
