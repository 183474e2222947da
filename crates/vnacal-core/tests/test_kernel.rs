//! Numeric kernel tests
//!
//! Randomized checks of LU, division, inversion and QR against products of
//! seeded random matrices.

use approx::assert_relative_eq;
use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vnacal_core::math::linalg::{determinant, minverse, mldivide, mrdivide};
use vnacal_core::math::matrix_ops::{identity, max_abs_diff};
use vnacal_core::math::qr::{qr, qrsolve};

fn random_matrix(rng: &mut StdRng, rows: usize, columns: usize) -> Array2<Complex64> {
    Array2::from_shape_fn((rows, columns), |_| {
        Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    })
}

fn conj_t(a: &Array2<Complex64>) -> Array2<Complex64> {
    a.t().mapv(|v| v.conj())
}

fn residual(a: &Array2<Complex64>, x: &Array2<Complex64>, b: &Array2<Complex64>) -> f64 {
    (a.dot(x) - b).iter().map(|v| v.norm_sqr()).sum::<f64>()
}

// ============================================================================
// LU based operations
// ============================================================================

#[test]
fn test_minverse_round_trip() {
    let mut rng = StdRng::seed_from_u64(1);
    for n in 1..=6 {
        for _ in 0..10 {
            let a = random_matrix(&mut rng, n, n);
            let (inverse, det) = minverse(&mut a.clone());
            assert!(det.norm() > 0.0);
            let product = a.dot(&inverse);
            assert!(max_abs_diff(&product.view(), &identity(n).view()) < 1e-9, "n = {n}");
        }
    }
}

#[test]
fn test_determinant_of_product() {
    let mut rng = StdRng::seed_from_u64(2);
    for n in 1..=5 {
        let a = random_matrix(&mut rng, n, n);
        let b = random_matrix(&mut rng, n, n);
        let expected = determinant(&a.view()) * determinant(&b.view());
        let got = determinant(&a.dot(&b).view());
        assert_relative_eq!(got.re, expected.re, epsilon = 1e-10, max_relative = 1e-9);
        assert_relative_eq!(got.im, expected.im, epsilon = 1e-10, max_relative = 1e-9);
    }
}

#[test]
fn test_mldivide_recovers_x() {
    let mut rng = StdRng::seed_from_u64(3);
    for n in 1..=5 {
        for m in 1..=4 {
            let a = random_matrix(&mut rng, n, n);
            let x = random_matrix(&mut rng, n, m);
            let b = a.dot(&x);
            let (got, det) = mldivide(&mut a.clone(), &b.view());
            assert!(det.norm() > 0.0);
            assert!(max_abs_diff(&got.view(), &x.view()) < 1e-8, "{n}x{m}");
        }
    }
}

#[test]
fn test_mrdivide_recovers_x() {
    let mut rng = StdRng::seed_from_u64(4);
    for n in 1..=5 {
        for m in 1..=4 {
            let a = random_matrix(&mut rng, n, n);
            let x = random_matrix(&mut rng, m, n);
            let b = x.dot(&a);
            let (got, _) = mrdivide(&b.view(), &mut a.clone());
            assert!(max_abs_diff(&got.view(), &x.view()) < 1e-8, "{m}x{n}");
        }
    }
}

// ============================================================================
// QR
// ============================================================================

#[test]
fn test_qr_orthogonality_and_reconstruction() {
    let mut rng = StdRng::seed_from_u64(5);
    for rows in 1..=5 {
        for columns in 1..=5 {
            let a = random_matrix(&mut rng, rows, columns);
            let factors = qr(&mut a.clone());
            assert_eq!(factors.q.dim(), (rows, rows));
            assert_eq!(factors.r.dim(), (rows, columns));

            let qhq = conj_t(&factors.q).dot(&factors.q);
            assert!(max_abs_diff(&qhq.view(), &identity(rows).view()) < 1e-12);

            let back = factors.q.dot(&factors.r);
            assert!(max_abs_diff(&back.view(), &a.view()) < 1e-12);

            for i in 0..rows {
                for j in 0..columns.min(i) {
                    assert_eq!(factors.r[[i, j]], Complex64::new(0.0, 0.0));
                }
            }
            assert_eq!(factors.rank, rows.min(columns));
        }
    }
}

#[test]
fn test_qrsolve_least_squares_is_optimal() {
    let mut rng = StdRng::seed_from_u64(6);
    for (rows, columns) in [(4, 2), (6, 3), (8, 5)] {
        let a = random_matrix(&mut rng, rows, columns);
        let b = random_matrix(&mut rng, rows, 1);
        let (x, rank) = qrsolve(&mut a.clone(), &mut b.clone());
        assert_eq!(rank, columns);
        let best = residual(&a, &x, &b);
        for k in 0..columns {
            for delta in [
                Complex64::new(0.001, 0.0),
                Complex64::new(-0.001, 0.0),
                Complex64::new(0.0, 0.001),
                Complex64::new(0.0, -0.001),
            ] {
                let mut moved = x.clone();
                moved[[k, 0]] += delta;
                assert!(residual(&a, &moved, &b) > best);
            }
        }
    }
}

#[test]
fn test_qrsolve_square_matches_mldivide() {
    let mut rng = StdRng::seed_from_u64(7);
    let a = random_matrix(&mut rng, 4, 4);
    let b = random_matrix(&mut rng, 4, 2);
    let (via_qr, rank) = qrsolve(&mut a.clone(), &mut b.clone());
    let (via_lu, _) = mldivide(&mut a.clone(), &b.view());
    assert_eq!(rank, 4);
    assert!(max_abs_diff(&via_qr.view(), &via_lu.view()) < 1e-10);
}

#[test]
fn test_rank_of_deficient_products() {
    let mut rng = StdRng::seed_from_u64(8);
    for (rows, inner, columns) in [(6, 2, 4), (5, 1, 5), (4, 3, 4)] {
        let a = random_matrix(&mut rng, rows, inner).dot(&random_matrix(&mut rng, inner, columns));
        assert_eq!(qr(&mut a.clone()).rank, inner, "{rows}x{columns} of rank {inner}");
        let mut b = random_matrix(&mut rng, rows, 1);
        let (_, rank) = qrsolve(&mut a.clone(), &mut b);
        assert_eq!(rank, inner);
    }
}
