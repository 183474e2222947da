//! LU factorization and the operations built on it
//!
//! Crout LU decomposition with scaled partial pivoting, plus left division,
//! right division and inversion. Every routine here is numerically total: a
//! singular operand never panics, it produces a zero (or tiny) determinant
//! which callers must check before trusting the result.
//!
//! Operands that are factored in place are taken as `&mut Array2` and are
//! overwritten with the factors.

use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;

/// Result of an in-place LU factorization
#[derive(Debug, Clone)]
pub struct Lu {
    /// Row interchanges: at step `j` row `j` was swapped with `perm[j]`
    pub perm: Vec<usize>,
    /// Determinant of the original matrix
    pub det: Complex64,
}

impl Lu {
    /// True if the factorization hit an exactly zero pivot
    pub fn is_singular(&self) -> bool {
        self.det == Complex64::new(0.0, 0.0)
    }

    /// Solve `A X = B` in place, given `lu_a` holding the factors of `A`.
    ///
    /// Each column of `b` is overwritten with the corresponding column of `X`.
    ///
    /// # Panics
    /// Panics if `b` does not have as many rows as `lu_a`.
    pub fn solve_in_place(&self, lu_a: &Array2<Complex64>, b: &mut Array2<Complex64>) {
        let n = lu_a.nrows();
        assert_eq!(b.nrows(), n, "right-hand side must have {} rows", n);

        for col in 0..b.ncols() {
            // forward substitution, unscrambling the permutation as we go
            let mut first_nonzero: Option<usize> = None;
            for i in 0..n {
                let ip = self.perm[i];
                let mut sum = b[[ip, col]];
                b[[ip, col]] = b[[i, col]];
                match first_nonzero {
                    Some(start) => {
                        for j in start..i {
                            sum -= lu_a[[i, j]] * b[[j, col]];
                        }
                    }
                    None => {
                        if sum != Complex64::new(0.0, 0.0) {
                            first_nonzero = Some(i);
                        }
                    }
                }
                b[[i, col]] = sum;
            }

            // back substitution
            for i in (0..n).rev() {
                let mut sum = b[[i, col]];
                for j in i + 1..n {
                    sum -= lu_a[[i, j]] * b[[j, col]];
                }
                b[[i, col]] = sum / lu_a[[i, i]];
            }
        }
    }
}

/// Crout LU factorization with scaled partial pivoting.
///
/// On return `a` holds L (unit diagonal, strictly below the diagonal) and U
/// (on and above the diagonal) of the row-permuted matrix. The pivot for each
/// column is the candidate with the largest magnitude relative to the largest
/// element of its row.
///
/// # Panics
/// Panics if `a` is not square.
pub fn lu(a: &mut Array2<Complex64>) -> Lu {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "LU requires a square matrix");

    let zero = Complex64::new(0.0, 0.0);
    let mut perm: Vec<usize> = (0..n).collect();
    let mut det = Complex64::new(1.0, 0.0);

    // implicit scaling of each row
    let mut scale = vec![0.0; n];
    for i in 0..n {
        let big = a.row(i).iter().fold(0.0_f64, |m, v| m.max(v.norm()));
        if big == 0.0 {
            return Lu { perm, det: zero };
        }
        scale[i] = 1.0 / big;
    }

    for j in 0..n {
        for i in 0..j {
            let mut sum = a[[i, j]];
            for k in 0..i {
                sum -= a[[i, k]] * a[[k, j]];
            }
            a[[i, j]] = sum;
        }

        let mut big = 0.0;
        let mut imax = j;
        for i in j..n {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= a[[i, k]] * a[[k, j]];
            }
            a[[i, j]] = sum;
            let figure = scale[i] * sum.norm();
            if figure >= big {
                big = figure;
                imax = i;
            }
        }

        if imax != j {
            for k in 0..n {
                a.swap([imax, k], [j, k]);
            }
            det = -det;
            scale[imax] = scale[j];
        }
        perm[j] = imax;

        let pivot = a[[j, j]];
        if pivot == zero {
            return Lu { perm, det: zero };
        }
        det *= pivot;

        if j + 1 < n {
            let inv = Complex64::new(1.0, 0.0) / pivot;
            for i in j + 1..n {
                a[[i, j]] *= inv;
            }
        }
    }

    Lu { perm, det }
}

/// Determinant of a square matrix (the input is not modified).
pub fn determinant(a: &ArrayView2<Complex64>) -> Complex64 {
    let mut work = a.to_owned();
    lu(&mut work).det
}

/// Left division: returns `(X, det(A))` with `X = A⁻¹ B`.
///
/// `a` (n×n) is destroyed. When the factorization finds an exactly zero pivot
/// the returned `X` is all zeros.
///
/// # Panics
/// Panics if `a` is not square or `b` does not have n rows.
pub fn mldivide(
    a: &mut Array2<Complex64>,
    b: &ArrayView2<Complex64>,
) -> (Array2<Complex64>, Complex64) {
    let factors = lu(a);
    let mut x = b.to_owned();
    if factors.is_singular() {
        x.fill(Complex64::new(0.0, 0.0));
        return (x, factors.det);
    }
    factors.solve_in_place(a, &mut x);
    (x, factors.det)
}

/// Right division: returns `(X, det(A))` with `X = B A⁻¹`.
///
/// `a` (n×n) is destroyed: it is replaced with the factors of its transpose.
///
/// # Panics
/// Panics if `a` is not square or `b` does not have n columns.
pub fn mrdivide(
    b: &ArrayView2<Complex64>,
    a: &mut Array2<Complex64>,
) -> (Array2<Complex64>, Complex64) {
    // X A = B  <=>  Aᵀ Xᵀ = Bᵀ
    let transposed = a.t().to_owned();
    a.assign(&transposed);
    let (xt, det) = mldivide(a, &b.t());
    (xt.reversed_axes(), det)
}

/// Matrix inverse: returns `(A⁻¹, det(A))`. `a` is destroyed.
///
/// # Panics
/// Panics if `a` is not square.
pub fn minverse(a: &mut Array2<Complex64>) -> (Array2<Complex64>, Complex64) {
    let n = a.nrows();
    let identity = Array2::<Complex64>::eye(n);
    mldivide(a, &identity.view())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_lu_determinant_2x2() {
        let mut a = Array2::from_shape_vec((2, 2), vec![c(1.0, 0.0), c(2.0, 0.0), c(3.0, 0.0), c(4.0, 0.0)])
            .unwrap();
        let factors = lu(&mut a);
        assert_relative_eq!(factors.det.re, -2.0, epsilon = 1e-12);
        assert_relative_eq!(factors.det.im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lu_needs_pivot() {
        // zero in the leading position forces a row interchange
        let mut a = Array2::from_shape_vec((2, 2), vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 0.0), c(0.0, 0.0)])
            .unwrap();
        let factors = lu(&mut a);
        assert_relative_eq!(factors.det.re, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_reports_zero_det() {
        let mut a = Array2::from_shape_vec((2, 2), vec![c(1.0, 1.0), c(2.0, 2.0), c(2.0, 2.0), c(4.0, 4.0)])
            .unwrap();
        let b = Array2::from_elem((2, 1), c(1.0, 0.0));
        let (_, det) = mldivide(&mut a, &b.view());
        assert!(det.norm() < 1e-12);
    }

    #[test]
    fn test_zero_row_is_singular() {
        let mut a = Array2::<Complex64>::zeros((3, 3));
        a[[0, 0]] = c(1.0, 0.0);
        a[[1, 1]] = c(1.0, 0.0);
        let factors = lu(&mut a);
        assert!(factors.is_singular());
    }

    #[test]
    fn test_mldivide_diagonal() {
        let mut a = Array2::<Complex64>::zeros((2, 2));
        a[[0, 0]] = c(2.0, 0.0);
        a[[1, 1]] = c(0.0, 4.0);
        let b = Array2::from_shape_vec((2, 1), vec![c(2.0, 2.0), c(4.0, 0.0)]).unwrap();
        let (x, _) = mldivide(&mut a, &b.view());
        assert_relative_eq!(x[[0, 0]].re, 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[[0, 0]].im, 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[[1, 0]].re, 0.0, epsilon = 1e-12);
        assert_relative_eq!(x[[1, 0]].im, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mrdivide_matches_product() {
        let a0 = Array2::from_shape_vec(
            (2, 2),
            vec![c(1.0, 0.5), c(-0.3, 0.2), c(0.7, -0.1), c(2.0, 0.0)],
        )
        .unwrap();
        let x0 = Array2::from_shape_vec((1, 2), vec![c(0.25, -1.0), c(3.0, 0.5)]).unwrap();
        let b = x0.dot(&a0);
        let mut a = a0.clone();
        let (x, _) = mrdivide(&b.view(), &mut a);
        for j in 0..2 {
            assert_relative_eq!(x[[0, j]].re, x0[[0, j]].re, epsilon = 1e-12);
            assert_relative_eq!(x[[0, j]].im, x0[[0, j]].im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_minverse_3x3() {
        let a0 = Array2::from_shape_vec(
            (3, 3),
            vec![
                c(4.0, 1.0),
                c(-2.0, 0.0),
                c(1.0, 0.0),
                c(0.5, 0.0),
                c(3.0, -1.0),
                c(0.0, 2.0),
                c(1.0, 1.0),
                c(0.0, 0.0),
                c(2.0, 0.0),
            ],
        )
        .unwrap();
        let mut a = a0.clone();
        let (inv, det) = minverse(&mut a);
        assert!(det.norm() > 1e-6);
        let product = a0.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(product[[i, j]].re, expected, epsilon = 1e-12);
                assert_relative_eq!(product[[i, j]].im, 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    #[should_panic(expected = "right-hand side must have 2 rows")]
    fn test_solve_rejects_wrong_rhs_rows() {
        let mut a = Array2::from_shape_vec((2, 2), vec![c(2.0, 0.0), c(1.0, 0.0), c(1.0, 0.0), c(3.0, 0.0)])
            .unwrap();
        let factors = lu(&mut a);
        let mut b = Array2::<Complex64>::zeros((3, 1));
        factors.solve_in_place(&a, &mut b);
    }
}
