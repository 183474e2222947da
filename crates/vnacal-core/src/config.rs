//! Interpolation and range settings
//!
//! Every evaluation of tabulated data (error terms, vector parameters, data
//! standards) uses the same window and frequency tolerance, taken from the
//! [`CalibrationConfig`] of the owning container.

use crate::constants::{DEFAULT_RFI_WINDOW, FREQUENCY_TOLERANCE};

/// Tunables shared by every operation of a [`Calibration`](crate::Calibration)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationConfig {
    /// Points used for rational interpolation of tabulated data
    pub rfi_window: usize,
    /// Relative slack allowed outside a table's frequency range
    pub frequency_tolerance: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            rfi_window: DEFAULT_RFI_WINDOW,
            frequency_tolerance: FREQUENCY_TOLERANCE,
        }
    }
}
