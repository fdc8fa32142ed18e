use approx::assert_abs_diff_eq;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use splinebasis::{
    bspline_basis, bspline_integral, cspline_basis, ispline_basis, mspline_basis, BasisOptions,
    CSplineOptions, SplineSpec,
};

fn sorted_random_points(n: usize, seed: u64) -> Array1<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points: Vec<f64> = (0..n).map(|_| rng.random_range(0.0..=1.0)).collect();
    points.sort_by(f64::total_cmp);
    Array1::from_vec(points)
}

fn spec(degree: usize) -> SplineSpec {
    SplineSpec::new(degree)
        .with_internal_knots(&[0.3, 0.5, 0.6])
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
fn differentiating_the_integral_round_trips_for_every_degree() {
    let x = sorted_random_points(80, 11);
    for degree in 0..=4 {
        let integral = bspline_integral(x.view(), &spec(degree)).unwrap();
        let recovered = integral.differentiate(1).unwrap();
        let direct = bspline_basis(x.view(), &spec(degree), &BasisOptions::value()).unwrap();
        assert_abs_diff_eq!(
            recovered.matrix().as_slice().unwrap(),
            direct.matrix().as_slice().unwrap(),
            epsilon = 1e-12
        );
    }
}

#[test]
fn derivative_chain_walks_back_through_the_families() {
    let x = sorted_random_points(60, 12);
    for degree in 0..=3 {
        let cspline = cspline_basis(x.view(), &spec(degree), &unscaled()).unwrap();
        let ispline = ispline_basis(x.view(), &spec(degree), &BasisOptions::value()).unwrap();
        let mspline = mspline_basis(x.view(), &spec(degree), &BasisOptions::value()).unwrap();

        assert_abs_diff_eq!(
            cspline.differentiate(1).unwrap().matrix().as_slice().unwrap(),
            ispline.matrix().as_slice().unwrap(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            cspline.differentiate(2).unwrap().matrix().as_slice().unwrap(),
            mspline.matrix().as_slice().unwrap(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            ispline.differentiate(1).unwrap().matrix().as_slice().unwrap(),
            mspline.matrix().as_slice().unwrap(),
            epsilon = 1e-12
        );
    }
}

#[test]
fn ispline_derivative_entry_point_equals_mspline() {
    // Building an I-spline with derivative order 1 and building the M-spline
    // directly must agree exactly.
    let x = sorted_random_points(60, 13);
    let from_entry = ispline_basis(x.view(), &spec(2), &BasisOptions::derivative(1)).unwrap();
    let direct = mspline_basis(x.view(), &spec(2), &BasisOptions::value()).unwrap();
    assert_abs_diff_eq!(
        from_entry.matrix().as_slice().unwrap(),
        direct.matrix().as_slice().unwrap(),
        epsilon = 0.0
    );
}

#[test]
fn nested_differentiation_matches_summed_order_for_every_family() {
    let x = sorted_random_points(50, 14);
    let spec = spec(3);
    let bases = [
        bspline_basis(x.view(), &spec, &BasisOptions::value()).unwrap(),
        bspline_integral(x.view(), &spec).unwrap(),
        mspline_basis(x.view(), &spec, &BasisOptions::value()).unwrap(),
        ispline_basis(x.view(), &spec, &BasisOptions::value()).unwrap(),
        cspline_basis(x.view(), &spec, &CSplineOptions::default()).unwrap(),
    ];
    for basis in &bases {
        for (a, b) in [(1, 1), (1, 2), (2, 1)] {
            let nested = basis.differentiate(a).unwrap().differentiate(b).unwrap();
            let direct = basis.differentiate(a + b).unwrap();
            assert_abs_diff_eq!(
                nested.matrix().as_slice().unwrap(),
                direct.matrix().as_slice().unwrap(),
                epsilon = 1e-9
            );
        }
    }
}

#[test]
fn ispline_is_monotone_and_cspline_is_convex_on_a_random_grid() {
    let x = sorted_random_points(400, 15);
    for degree in 0..=3 {
        let ispline = ispline_basis(x.view(), &spec(degree), &BasisOptions::value()).unwrap();
        for c in 0..ispline.matrix().ncols() {
            let col = ispline.matrix().column(c);
            for r in 1..col.len() {
                assert!(col[r] >= col[r - 1] - 1e-10);
            }
        }

        let cspline = cspline_basis(x.view(), &spec(degree), &unscaled()).unwrap();
        for c in 0..cspline.matrix().ncols() {
            let col = cspline.matrix().column(c);
            for r in 1..col.len() - 1 {
                let h1 = x[r] - x[r - 1];
                let h2 = x[r + 1] - x[r];
                if h1 < 1e-6 || h2 < 1e-6 {
                    continue;
                }
                // Divided second difference of a convex function.
                let second = (col[r + 1] - col[r]) / h2 - (col[r] - col[r - 1]) / h1;
                assert!(second >= -1e-7, "column {c} is concave at row {r}");
            }
        }
    }
}

#[test]
fn high_order_derivatives_vanish_for_every_family() {
    let x = sorted_random_points(30, 16);
    let spec = spec(2);
    // Polynomial degrees: B-spline 2, I-spline 3, C-spline 4; one past each
    // is identically zero.
    let bspline = bspline_basis(x.view(), &spec, &BasisOptions::value()).unwrap();
    assert!(bspline
        .differentiate(3)
        .unwrap()
        .matrix()
        .iter()
        .all(|&v| v == 0.0));
    let ispline = ispline_basis(x.view(), &spec, &BasisOptions::value()).unwrap();
    assert!(ispline
        .differentiate(4)
        .unwrap()
        .matrix()
        .iter()
        .all(|&v| v == 0.0));
    let cspline = cspline_basis(x.view(), &spec, &unscaled()).unwrap();
    assert!(cspline
        .differentiate(5)
        .unwrap()
        .matrix()
        .iter()
        .all(|&v| v == 0.0));
}
