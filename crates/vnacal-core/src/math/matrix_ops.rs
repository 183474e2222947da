//! Matrix operation helpers
//!
//! Small utilities shared by the calibration models to avoid repeating
//! nested loops: port swaps and residual checks.

use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;

use crate::constants::NEAR_ZERO;

/// Identity matrix of given size
#[inline]
pub fn identity(n: usize) -> Array2<Complex64> {
    Array2::<Complex64>::eye(n)
}

/// Exchange ports 0 and 1 of a square matrix: returns `P m P`.
///
/// Used to model a two-port DUT measured in reverse.
pub fn swap_ports(m: &ArrayView2<Complex64>) -> Array2<Complex64> {
    let n = m.nrows();
    let map = |i: usize| match i {
        0 if n > 1 => 1,
        1 => 0,
        other => other,
    };
    Array2::from_shape_fn(m.dim(), |(i, j)| m[[map(i), map(j)]])
}

/// Largest element-wise magnitude of `a - b`
pub fn max_abs_diff(a: &ArrayView2<Complex64>, b: &ArrayView2<Complex64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .fold(0.0_f64, |m, (x, y)| m.max((x - y).norm()))
}

/// True if a determinant is too small or not finite for the system to be trusted
#[inline]
pub fn is_singular(det: Complex64) -> bool {
    !(det.re.is_finite() && det.im.is_finite()) || det.norm() < NEAR_ZERO
}
