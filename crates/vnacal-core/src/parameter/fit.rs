//! Polynomial fits for calibration-kit reactances
//!
//! A real short is an inductance L with a small parasitic capacitance C in
//! parallel. Kit definitions want its effective inductance
//! `L_eff(f) = L / (1 - ω²LC)` as a cubic in f; [`compute_l_coefficients`]
//! finds the cubic that is closest to `L_eff` over a band in the
//! continuous least-squares sense. [`compute_c_coefficients`] is the dual for
//! opens.

use std::f64::consts::PI;

use nalgebra::{Matrix4, Vector4};

use crate::error::{Result, VnaCalError};

/// Intervals used for the Simpson-rule inner products
const SIMPSON_INTERVALS: usize = 512;

/// Cubic `[l0, l1, l2, l3]` closest to `L / (1 - ω²LC)` on `[fmin, fmax]`.
pub fn compute_l_coefficients(l: f64, c: f64, fmin: f64, fmax: f64) -> Result<[f64; 4]> {
    fit_resonant(l, l, c, fmin, fmax)
}

/// Cubic `[c0, c1, c2, c3]` closest to `C / (1 - ω²LC)` on `[fmin, fmax]`.
pub fn compute_c_coefficients(c: f64, l: f64, fmin: f64, fmax: f64) -> Result<[f64; 4]> {
    fit_resonant(c, l, c, fmin, fmax)
}

fn fit_resonant(value: f64, l: f64, c: f64, fmin: f64, fmax: f64) -> Result<[f64; 4]> {
    if !(fmin >= 0.0) || !(fmax > fmin) || !fmax.is_finite() {
        return Err(VnaCalError::InvalidArgument(format!(
            "fit band must satisfy 0 <= fmin < fmax, got {fmin} .. {fmax}"
        )));
    }
    if !(l >= 0.0) || !(c >= 0.0) || !l.is_finite() || !c.is_finite() {
        return Err(VnaCalError::InvalidArgument(
            "inductance and capacitance must be non-negative".into(),
        ));
    }
    if l * c > 0.0 {
        let resonance = 1.0 / (2.0 * PI * (l * c).sqrt());
        if resonance <= fmax {
            return Err(VnaCalError::InvalidArgument(format!(
                "resonance at {resonance} Hz lies inside the fit band"
            )));
        }
    }

    // work in t = f / fmax to keep the Gram matrix well scaled
    let t0 = fmin / fmax;
    let target = |t: f64| {
        let omega = 2.0 * PI * t * fmax;
        value / (1.0 - omega * omega * l * c)
    };

    // Gram matrix of the monomials under ∫_{t0}^{1} u(t) v(t) dt
    let gram = Matrix4::from_fn(|i, j| {
        let p = (i + j + 1) as i32;
        (1.0 - t0.powi(p)) / p as f64
    });

    let h = (1.0 - t0) / SIMPSON_INTERVALS as f64;
    let mut rhs = Vector4::zeros();
    for k in 0..=SIMPSON_INTERVALS {
        let t = t0 + k as f64 * h;
        let weight = match k {
            0 => 1.0,
            k if k == SIMPSON_INTERVALS => 1.0,
            k if k % 2 == 1 => 4.0,
            _ => 2.0,
        } * h
            / 3.0;
        let y = target(t);
        let mut tp = 1.0;
        for i in 0..4 {
            rhs[i] += weight * tp * y;
            tp *= t;
        }
    }

    let chol = gram.cholesky().ok_or_else(|| VnaCalError::Singular {
        frequency: fmax,
        context: "fit band too narrow for a cubic".into(),
    })?;
    let a = chol.solve(&rhs);

    let mut scale = 1.0;
    let mut out = [0.0; 4];
    for (i, coefficient) in out.iter_mut().enumerate() {
        *coefficient = a[i] / scale;
        scale *= fmax;
    }
    Ok(out)
}
