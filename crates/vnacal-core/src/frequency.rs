//! Frequency vectors
//!
//! Calibration data, error terms and measured standards are tabulated over
//! a strictly increasing frequency vector in Hz. Interpolation and segment
//! search rely on that ordering, so every table is validated on entry.

use crate::error::{Result, VnaCalError};

/// Check that `f` is a usable frequency table.
///
/// The vector must be non-empty and hold finite, non-negative values in
/// strictly increasing order.
pub fn validate_frequencies(f: &[f64]) -> Result<()> {
    if f.is_empty() {
        return Err(VnaCalError::InvalidDimensions(
            "frequency vector must not be empty".into(),
        ));
    }
    if let Some((i, &bad)) = f.iter().enumerate().find(|(_, x)| !x.is_finite() || **x < 0.0) {
        return Err(VnaCalError::InvalidArgument(format!(
            "frequency {i} is {bad}; frequencies must be finite and non-negative"
        )));
    }
    if let Some(i) = f.windows(2).position(|w| w[1] <= w[0]) {
        return Err(VnaCalError::InvalidArgument(format!(
            "frequencies must increase strictly: f[{}] = {} follows f[{}] = {}",
            i + 1,
            f[i + 1],
            i,
            f[i]
        )));
    }
    Ok(())
}

/// True if `f` lies within `[table[0], table[n-1]]` widened by the relative
/// `tolerance`.
pub fn in_range(table: &[f64], f: f64, tolerance: f64) -> bool {
    match (table.first(), table.last()) {
        (Some(&lo), Some(&hi)) => {
            let slack = tolerance * hi.abs().max(lo.abs()).max(1.0);
            f.is_finite() && f >= lo - slack && f <= hi + slack
        }
        _ => false,
    }
}

/// Range check returning a usage error that names the frequency and range.
pub fn check_range(table: &[f64], f: f64, tolerance: f64) -> Result<()> {
    if in_range(table, f, tolerance) {
        Ok(())
    } else {
        Err(VnaCalError::FrequencyOutOfRange {
            frequency: f,
            min: table.first().copied().unwrap_or(0.0),
            max: table.last().copied().unwrap_or(0.0),
        })
    }
}
