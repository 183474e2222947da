//! Rational-function interpolation over frequency tables
//!
//! Calibration data is tabulated at discrete frequencies; evaluating at an
//! arbitrary frequency uses Bulirsch–Stoer rational interpolation over a small
//! window of points around the bracketing segment. The caller keeps a segment
//! hint between calls so sweeps through nearby frequencies find their segment
//! in constant time. The hint only speeds up the search: results never depend
//! on it.

use num_complex::Complex64;

use crate::constants::RFI_NODE_TOLERANCE;

const TINY: f64 = 1.0e-25;

/// Find the segment `s` with `x[s] <= x0 <= x[s + 1]`, starting from `hint`.
///
/// Values outside the table clamp to the first or last segment. `x` must be
/// sorted ascending.
pub fn locate_segment(x: &[f64], hint: usize, x0: f64) -> usize {
    let n = x.len();
    if n < 2 {
        return 0;
    }
    let last = n - 2;
    let s = hint.min(last);

    if x0 >= x[s] && x0 <= x[s + 1] {
        return s;
    }
    // neighbouring segments cover the common case of a monotonic sweep
    if x0 > x[s + 1] && s < last && x0 <= x[s + 2] {
        return s + 1;
    }
    if x0 < x[s] && s > 0 && x0 >= x[s - 1] {
        return s - 1;
    }
    let idx = x.partition_point(|&v| v <= x0);
    idx.saturating_sub(1).min(last)
}

/// Interpolate `y(x0)` from the table `(x, y)`.
///
/// `window` points are used (at least the two bracketing ones, at most the
/// whole table), centred on the segment bracketing `x0`; `segment` is the search hint and is updated to
/// the segment found. A node within tolerance of `x0` is returned exactly
/// and a single-point table always returns its only value.
pub fn rfi(x: &[f64], y: &[Complex64], window: usize, segment: &mut usize, x0: f64) -> Complex64 {
    let n = x.len().min(y.len());
    if n == 0 {
        return Complex64::new(0.0, 0.0);
    }
    if n == 1 {
        return y[0];
    }

    let seg = locate_segment(&x[..n], *segment, x0);
    *segment = seg;

    for i in [seg, seg + 1] {
        if (x0 - x[i]).abs() <= RFI_NODE_TOLERANCE * x[i].abs().max(1.0) {
            return y[i];
        }
    }

    let m = window.clamp(2, n);
    let start = (seg + 1).saturating_sub(m / 2).min(n - m);
    ratint(&x[start..start + m], &y[start..start + m], x0)
}

/// Bulirsch–Stoer rational interpolation through all given points.
fn ratint(xa: &[f64], ya: &[Complex64], x: f64) -> Complex64 {
    let n = xa.len();
    let mut c = ya.to_vec();
    let mut d: Vec<Complex64> = ya.iter().map(|v| *v + TINY).collect();

    let mut ns = 0;
    let mut hh = (x - xa[0]).abs();
    for i in 0..n {
        let h = (x - xa[i]).abs();
        if h == 0.0 {
            return ya[i];
        }
        if h < hh {
            ns = i;
            hh = h;
        }
    }

    let mut y = ya[ns];
    // ns now points one before the next correction to take from `d`
    let mut ns = ns as isize - 1;
    for m in 1..n {
        for i in 0..n - m {
            let w = c[i + 1] - d[i];
            let h = xa[i + m] - x;
            let t = d[i] * ((xa[i] - x) / h);
            let mut dd = t - c[i + 1];
            if dd == Complex64::new(0.0, 0.0) {
                // pole at x; keep the estimate built so far
                return y;
            }
            dd = w / dd;
            d[i] = c[i + 1] * dd;
            c[i] = t * dd;
        }
        let dy = if 2 * (ns + 1) < (n - m) as isize {
            c[(ns + 1) as usize]
        } else {
            let v = d[ns as usize];
            ns -= 1;
            v
        };
        y += dy;
    }
    y
}
