//! S-parameter transformations needed by the calibration core
//!
//! Waves follow the convention `a = (V + z I) / (2√z)`, `b = (V - z I) / (2√z)`
//! for a per-port reference impedance `z`, so that `Z = F (I + S)(I - S)⁻¹ F`
//! with `F = diag(√z)`.

use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;

use crate::error::{Result, VnaCalError};
use crate::math::linalg::mrdivide;
use crate::math::matrix_ops::is_singular;

/// Renormalize an n-port S matrix from reference impedances `z_from` to `z_to`.
///
/// Per port, the new waves are a linear mix of the old ones:
/// `a₂ = k (p a₁ + q b₁)`, `b₂ = k (q a₁ + p b₁)` with `p = z₁ + z₂`,
/// `q = z₁ - z₂`, `k = 1 / (2√(z₁z₂))`, giving
/// `S₂ = [K (Q + P S₁)] [K (P + Q S₁)]⁻¹`. This stays finite for ideal opens
/// and shorts where a detour through Z or Y parameters would not.
pub fn renormalize_s(
    s: &ArrayView2<Complex64>,
    z_from: &[Complex64],
    z_to: &[Complex64],
) -> Result<Array2<Complex64>> {
    let n = s.nrows();
    if s.ncols() != n || z_from.len() != n || z_to.len() != n {
        return Err(VnaCalError::InvalidDimensions(format!(
            "renormalization of a {}x{} matrix with {} and {} impedances",
            n,
            s.ncols(),
            z_from.len(),
            z_to.len()
        )));
    }
    if z_from.iter().zip(z_to).all(|(a, b)| a == b) {
        return Ok(s.to_owned());
    }

    let mut lhs = Array2::<Complex64>::zeros((n, n));
    let mut rhs = Array2::<Complex64>::zeros((n, n));
    for i in 0..n {
        let p = z_from[i] + z_to[i];
        let q = z_from[i] - z_to[i];
        let k = Complex64::new(1.0, 0.0) / (2.0 * (z_from[i] * z_to[i]).sqrt());
        for j in 0..n {
            let delta = if i == j { Complex64::new(1.0, 0.0) } else { Complex64::new(0.0, 0.0) };
            rhs[[i, j]] = k * (q * delta + p * s[[i, j]]);
            lhs[[i, j]] = k * (p * delta + q * s[[i, j]]);
        }
    }
    let (s2, det) = mrdivide(&rhs.view(), &mut lhs);
    if is_singular(det) {
        return Err(VnaCalError::NonFinite(
            "S-parameter renormalization is singular".into(),
        ));
    }
    Ok(s2)
}

/// Convert a two-port ABCD matrix to S parameters with port impedances `z1`, `z2`.
pub fn abcd_to_s(abcd: &ArrayView2<Complex64>, z1: Complex64, z2: Complex64) -> Array2<Complex64> {
    let (a, b, c, d) = (abcd[[0, 0]], abcd[[0, 1]], abcd[[1, 0]], abcd[[1, 1]]);
    let den = a * z2 + b + c * z1 * z2 + d * z1;
    let root = (z1 * z2).sqrt();
    let mut s = Array2::<Complex64>::zeros((2, 2));
    s[[0, 0]] = (a * z2 + b - c * z1 * z2 - d * z1) / den;
    s[[0, 1]] = 2.0 * (a * d - b * c) * root / den;
    s[[1, 0]] = 2.0 * root / den;
    s[[1, 1]] = (-a * z2 + b - c * z1 * z2 + d * z1) / den;
    s
}
