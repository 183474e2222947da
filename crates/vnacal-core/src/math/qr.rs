//! Householder QR factorization and QR-based least squares
//!
//! The factorization is stored compactly: after [`qrd`] the Householder
//! vectors occupy the lower triangle of the matrix (diagonal included), the
//! strict upper triangle holds R and the diagonal of R is returned
//! separately. Each reflector `v` is scaled so that `vᴴv = 2`, making the
//! reflection simply `H = I - v vᴴ`.

use ndarray::{s, Array2};
use num_complex::Complex64;

use crate::constants::RANK_TOLERANCE;

/// Explicit QR factors
#[derive(Debug, Clone)]
pub struct QrFactors {
    /// Unitary factor (rows × rows)
    pub q: Array2<Complex64>,
    /// Upper-triangular factor (rows × columns)
    pub r: Array2<Complex64>,
    /// Number of numerically nonzero diagonal entries of R
    pub rank: usize,
}

/// Householder QR decomposition in place; returns the diagonal of R.
///
/// One reflection per column (up to `min(rows, columns)`). The sign of each
/// diagonal element is chosen opposite to the phase of the current pivot so
/// the reflector never suffers cancellation.
pub fn qrd(a: &mut Array2<Complex64>) -> Vec<Complex64> {
    let (rows, columns) = a.dim();
    let steps = rows.min(columns);
    let mut d = vec![Complex64::new(0.0, 0.0); steps];

    for k in 0..steps {
        let norm = a
            .slice(s![k.., k])
            .iter()
            .map(|v| v.norm_sqr())
            .sum::<f64>()
            .sqrt();
        if norm == 0.0 {
            // nothing to reflect; leave a zero reflector behind
            a.slice_mut(s![k.., k]).fill(Complex64::new(0.0, 0.0));
            continue;
        }

        let pivot = a[[k, k]];
        let phase = if pivot.norm() == 0.0 {
            Complex64::new(1.0, 0.0)
        } else {
            pivot / pivot.norm()
        };
        let alpha = -phase * norm;
        d[k] = alpha;

        // v = x - alpha e1, scaled so that vᴴv = 2
        a[[k, k]] -= alpha;
        let vnorm = a
            .slice(s![k.., k])
            .iter()
            .map(|v| v.norm_sqr())
            .sum::<f64>()
            .sqrt();
        let factor = std::f64::consts::SQRT_2 / vnorm;
        for i in k..rows {
            a[[i, k]] *= factor;
        }

        // apply H = I - v vᴴ to the remaining columns
        for j in k + 1..columns {
            let mut dot = Complex64::new(0.0, 0.0);
            for i in k..rows {
                dot += a[[i, k]].conj() * a[[i, j]];
            }
            for i in k..rows {
                let v = a[[i, k]];
                a[[i, j]] -= v * dot;
            }
        }
    }
    d
}

/// Count the diagonal entries of R that are not negligible.
pub fn rank_of(d: &[Complex64]) -> usize {
    let largest = d.iter().fold(0.0_f64, |m, v| m.max(v.norm()));
    if largest == 0.0 {
        return 0;
    }
    d.iter()
        .filter(|v| v.norm() > RANK_TOLERANCE * largest)
        .count()
}

/// Apply the stored reflections (H_0 first) to the columns of `b`: `b := Qᴴ b`.
fn apply_reflections(qr_a: &Array2<Complex64>, steps: usize, b: &mut Array2<Complex64>) {
    let rows = qr_a.nrows();
    for k in 0..steps {
        for j in 0..b.ncols() {
            let mut dot = Complex64::new(0.0, 0.0);
            for i in k..rows {
                dot += qr_a[[i, k]].conj() * b[[i, j]];
            }
            if dot == Complex64::new(0.0, 0.0) {
                continue;
            }
            for i in k..rows {
                b[[i, j]] -= qr_a[[i, k]] * dot;
            }
        }
    }
}

/// QR decomposition with explicit Q and R. `a` is destroyed.
pub fn qr(a: &mut Array2<Complex64>) -> QrFactors {
    let (rows, columns) = a.dim();
    let d = qrd(a);
    let steps = d.len();

    let mut r = Array2::<Complex64>::zeros((rows, columns));
    for i in 0..steps {
        r[[i, i]] = d[i];
        for j in i + 1..columns {
            r[[i, j]] = a[[i, j]];
        }
    }
    // Q = H_0 H_1 ... H_{p-1}; build it by applying the reflections in
    // reverse order to the identity.
    let mut q = Array2::<Complex64>::eye(rows);
    for k in (0..steps).rev() {
        for j in 0..rows {
            let mut dot = Complex64::new(0.0, 0.0);
            for i in k..rows {
                dot += a[[i, k]].conj() * q[[i, j]];
            }
            if dot == Complex64::new(0.0, 0.0) {
                continue;
            }
            for i in k..rows {
                let v = a[[i, k]];
                q[[i, j]] -= v * dot;
            }
        }
    }

    QrFactors {
        q,
        r,
        rank: rank_of(&d),
    }
}

/// Solve `A X = B` for any shape of `A` (rows × columns), returning `(X, rank)`.
///
/// Over-determined systems give the least-squares solution. Unknowns that
/// correspond to negligible diagonal entries of R, and unknowns past the
/// number of rows, are set to zero. Both `a` and `b` are destroyed.
///
/// # Panics
/// Panics if `b` does not have as many rows as `a`.
pub fn qrsolve(a: &mut Array2<Complex64>, b: &mut Array2<Complex64>) -> (Array2<Complex64>, usize) {
    let (rows, columns) = a.dim();
    assert_eq!(b.nrows(), rows, "right-hand side must have {} rows", rows);
    let outputs = b.ncols();

    let d = qrd(a);
    let steps = d.len();
    let rank = rank_of(&d);
    apply_reflections(a, steps, b);

    let largest = d.iter().fold(0.0_f64, |m, v| m.max(v.norm()));
    let mut x = Array2::<Complex64>::zeros((columns, outputs));
    for j in 0..outputs {
        for k in (0..steps).rev() {
            if largest == 0.0 || d[k].norm() <= RANK_TOLERANCE * largest {
                continue;
            }
            let mut sum = b[[k, j]];
            for l in k + 1..columns {
                sum -= a[[k, l]] * x[[l, j]];
            }
            x[[k, j]] = sum / d[k];
        }
    }
    (x, rank)
}
