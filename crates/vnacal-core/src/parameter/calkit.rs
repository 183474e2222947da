//! Calibration-kit physical models
//!
//! Each kit standard is an ideal termination (short, open, load) or a
//! through, behind a lossy offset transmission line described the usual way
//! by characteristic impedance, one-way delay and loss in Ω/s at 1 GHz.

use std::f64::consts::PI;

use ndarray::{arr2, Array2};
use num_complex::Complex64;

use crate::constants::{DEFAULT_Z0, OFFSET_LOSS_REFERENCE_HZ};
use crate::error::{Result, VnaCalError};
use crate::math::transforms::abcd_to_s;

/// How offset loss enters the line model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetModel {
    /// First-order approximation used by most published kit definitions
    #[default]
    Classic,
    /// Exact skin-effect line model
    Revised,
}

/// Offset transmission line in front of a kit standard
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetLine {
    /// Lossless characteristic impedance (Ω)
    pub z0: f64,
    /// One-way delay (s)
    pub delay: f64,
    /// Loss (Ω/s at 1 GHz)
    pub loss: f64,
    pub model: OffsetModel,
}

impl Default for OffsetLine {
    fn default() -> Self {
        Self {
            z0: DEFAULT_Z0,
            delay: 0.0,
            loss: 0.0,
            model: OffsetModel::Classic,
        }
    }
}

impl OffsetLine {
    /// Characteristic impedance Zc and propagation term γl at `f`.
    pub fn propagation(&self, f: f64) -> (Complex64, Complex64) {
        let j = Complex64::new(0.0, 1.0);
        let z0 = Complex64::new(self.z0, 0.0);
        let omega = 2.0 * PI * f;
        if f == 0.0 || self.loss == 0.0 {
            return (z0, j * omega * self.delay);
        }

        let root_f = (f / OFFSET_LOSS_REFERENCE_HZ).sqrt();
        match self.model {
            OffsetModel::Classic => {
                let zc = z0 + Complex64::new(1.0, -1.0) * (self.loss / (2.0 * omega) * root_f);
                let gl = j * omega * self.delay
                    + Complex64::new(1.0, 1.0) * (self.loss * self.delay / (2.0 * self.z0) * root_f);
                (zc, gl)
            }
            OffsetModel::Revised => {
                let x = self.loss * root_f / (omega * self.z0);
                let k = (Complex64::new(1.0, 0.0) + Complex64::new(1.0, -1.0) * x).sqrt();
                (z0 * k, j * omega * self.delay * k)
            }
        }
    }
}

/// Termination at the end of the offset line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalkitElement {
    /// Short with inductance L(f) = l0 + l1·f + l2·f² + l3·f³ (H)
    Short { l: [f64; 4] },
    /// Open with capacitance C(f) = c0 + c1·f + c2·f² + c3·f³ (F)
    Open { c: [f64; 4] },
    /// Load with a fixed impedance
    Load { zl: Complex64 },
    /// Two-port through made of the offset line alone
    Through,
}

/// A calibration-kit standard
#[derive(Debug, Clone, PartialEq)]
pub struct CalkitStandard {
    pub element: CalkitElement,
    pub offset: OffsetLine,
    /// Reference impedance of the kit
    pub z0: f64,
}

fn poly(coefficients: &[f64; 4], f: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &k| acc * f + k)
}

impl CalkitStandard {
    pub fn new(element: CalkitElement, offset: OffsetLine) -> Self {
        Self {
            element,
            offset,
            z0: DEFAULT_Z0,
        }
    }

    pub fn short(l: [f64; 4], offset: OffsetLine) -> Self {
        Self::new(CalkitElement::Short { l }, offset)
    }

    pub fn open(c: [f64; 4], offset: OffsetLine) -> Self {
        Self::new(CalkitElement::Open { c }, offset)
    }

    pub fn load(zl: Complex64, offset: OffsetLine) -> Self {
        Self::new(CalkitElement::Load { zl }, offset)
    }

    pub fn through(offset: OffsetLine) -> Self {
        Self::new(CalkitElement::Through, offset)
    }

    pub fn ports(&self) -> usize {
        match self.element {
            CalkitElement::Through => 2,
            _ => 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let o = &self.offset;
        if !(o.z0 > 0.0) || !(self.z0 > 0.0) {
            return Err(VnaCalError::InvalidArgument(
                "calkit impedances must be positive".into(),
            ));
        }
        if !(o.delay >= 0.0) || !(o.loss >= 0.0) {
            return Err(VnaCalError::InvalidArgument(
                "offset delay and loss must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// Evaluate the S matrix at `f`, referenced to the kit impedance.
    pub fn eval(&self, f: f64) -> Result<Array2<Complex64>> {
        if !f.is_finite() || f < 0.0 {
            return Err(VnaCalError::InvalidArgument(format!(
                "invalid frequency {f} for calkit standard"
            )));
        }
        let z_ref = Complex64::new(self.z0, 0.0);
        let (zc, gl) = self.offset.propagation(f);
        let omega = 2.0 * PI * f;
        let j = Complex64::new(0.0, 1.0);
        let one = Complex64::new(1.0, 0.0);

        // reflection of the termination relative to Zc
        let gamma_t = match self.element {
            CalkitElement::Short { l } => {
                let zt = j * omega * poly(&l, f);
                (zt - zc) / (zt + zc)
            }
            CalkitElement::Open { c } => {
                let cap = poly(&c, f);
                if f == 0.0 || cap == 0.0 {
                    one
                } else {
                    // (Zt - Zc)/(Zt + Zc) with Zt = 1/(jωC)
                    let yzc = j * omega * cap * zc;
                    (one - yzc) / (one + yzc)
                }
            }
            CalkitElement::Load { zl } => (zl - zc) / (zl + zc),
            CalkitElement::Through => return Ok(self.through_s(zc, gl, z_ref)),
        };

        let gamma_in = gamma_t * (-2.0 * gl).exp();
        // change reference from Zc to the kit impedance
        let gamma = ((zc - z_ref) + gamma_in * (zc + z_ref)) / ((zc + z_ref) + gamma_in * (zc - z_ref));
        Ok(Array2::from_elem((1, 1), gamma))
    }

    /// Line S parameters from its chain matrix, scaled by 2e^{-γl} so that
    /// long lossy lines never overflow `cosh`/`sinh`.
    fn through_s(&self, zc: Complex64, gl: Complex64, z_ref: Complex64) -> Array2<Complex64> {
        let one = Complex64::new(1.0, 0.0);
        let e = (-gl).exp();
        let e2 = e * e;
        let scaled = arr2(&[[one + e2, zc * (one - e2)], [(one - e2) / zc, one + e2]]);
        let mut s = abcd_to_s(&scaled.view(), z_ref, z_ref);
        // transmission is not homogeneous in the chain matrix scale
        let scale = 2.0 * e;
        s[[1, 0]] *= scale;
        s[[0, 1]] = s[[1, 0]];
        s
    }
}
