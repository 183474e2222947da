//! Natural cubic splines over real-valued tables
//!
//! Used for smooth frequency-dependent real quantities such as the sigma of
//! a correlated parameter. Outside the table the spline continues linearly
//! with the slope it has at the end point.

use crate::error::{Result, VnaCalError};

/// Natural cubic spline through `(x[i], y[i])`
#[derive(Debug, Clone, PartialEq)]
pub struct Spline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivative at each node
    y2: Vec<f64>,
}

impl Spline {
    /// Compute the spline coefficients.
    ///
    /// `x` must be strictly increasing and the same length as `y`.
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(VnaCalError::InvalidDimensions(format!(
                "spline needs matching non-empty tables, got {} x and {} y values",
                x.len(),
                y.len()
            )));
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(VnaCalError::InvalidArgument(
                "spline abscissae must be strictly increasing".into(),
            ));
        }

        let n = x.len();
        let mut y2 = vec![0.0; n];
        if n > 2 {
            // tridiagonal system with natural end conditions y2[0] = y2[n-1] = 0
            let mut u = vec![0.0; n];
            for i in 1..n - 1 {
                let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
                let p = sig * y2[i - 1] + 2.0;
                y2[i] = (sig - 1.0) / p;
                let slope_diff =
                    (y[i + 1] - y[i]) / (x[i + 1] - x[i]) - (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
                u[i] = (6.0 * slope_diff / (x[i + 1] - x[i - 1]) - sig * u[i - 1]) / p;
            }
            y2[n - 1] = 0.0;
            for k in (0..n - 1).rev() {
                y2[k] = y2[k] * y2[k + 1] + u[k];
            }
        }

        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            y2,
        })
    }

    /// Second derivatives at the nodes
    pub fn coefficients(&self) -> &[f64] {
        &self.y2
    }

    /// Evaluate the spline at `x0`.
    pub fn eval(&self, x0: f64) -> f64 {
        let n = self.x.len();
        if n == 1 {
            return self.y[0];
        }
        let (x, y, y2) = (&self.x, &self.y, &self.y2);

        if x0 < x[0] {
            let h = x[1] - x[0];
            let slope = (y[1] - y[0]) / h - (2.0 * y2[0] + y2[1]) * h / 6.0;
            return y[0] + slope * (x0 - x[0]);
        }
        if x0 > x[n - 1] {
            let h = x[n - 1] - x[n - 2];
            let slope = (y[n - 1] - y[n - 2]) / h + (2.0 * y2[n - 1] + y2[n - 2]) * h / 6.0;
            return y[n - 1] + slope * (x0 - x[n - 1]);
        }

        let hi = x.partition_point(|&v| v < x0).clamp(1, n - 1);
        let lo = hi - 1;
        let h = x[hi] - x[lo];
        let a = (x[hi] - x0) / h;
        let b = (x0 - x[lo]) / h;
        a * y[lo] + b * y[hi] + ((a * a * a - a) * y2[lo] + (b * b * b - b) * y2[hi]) * h * h / 6.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spline_through_nodes() {
        let x = [0.0, 1.0, 2.5, 4.0];
        let y = [1.0, -1.0, 0.5, 2.0];
        let spline = Spline::new(&x, &y).unwrap();
        for i in 0..x.len() {
            assert_relative_eq!(spline.eval(x[i]), y[i], epsilon = 1e-12);
        }
        assert_eq!(spline.coefficients()[0], 0.0);
        assert_eq!(spline.coefficients()[3], 0.0);
    }

    #[test]
    fn test_spline_linear_data_is_linear() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let spline = Spline::new(&x, &y).unwrap();
        assert_relative_eq!(spline.eval(1.7), 4.4, epsilon = 1e-12);
        // linear extrapolation on both sides
        assert_relative_eq!(spline.eval(-1.0), -1.0, epsilon = 1e-12);
        assert_relative_eq!(spline.eval(6.0), 13.0, epsilon = 1e-12);
    }

    #[test]
    fn test_spline_single_point() {
        let spline = Spline::new(&[3.0], &[0.25]).unwrap();
        assert_eq!(spline.eval(-10.0), 0.25);
        assert_eq!(spline.eval(10.0), 0.25);
    }

    #[test]
    fn test_spline_rejects_unsorted() {
        assert!(Spline::new(&[0.0, 2.0, 1.0], &[0.0, 0.0, 0.0]).is_err());
        assert!(Spline::new(&[0.0, 1.0], &[0.0]).is_err());
    }
}
