//! Numerical constants for calibration calculations
//!
//! Provides standardized tolerance values and defaults used throughout
//! the library.

/// Tolerance for detecting near-zero values in division and singularity checks.
/// Determinants with a smaller magnitude are reported as singular systems.
pub const NEAR_ZERO: f64 = 1e-15;

/// Relative tolerance used when testing whether a frequency lies inside a
/// calibration or data range.
pub const FREQUENCY_TOLERANCE: f64 = 1e-6;

/// Relative tolerance applied to the diagonal of R when counting rank in QR.
pub const RANK_TOLERANCE: f64 = 1e-10;

/// Relative distance under which rational interpolation returns a table node as-is.
pub const RFI_NODE_TOLERANCE: f64 = 1e-12;

/// Default number of points used for rational-function interpolation.
pub const DEFAULT_RFI_WINDOW: usize = 4;

/// Default system reference impedance in ohms.
pub const DEFAULT_Z0: f64 = 50.0;

/// Frequency at which calibration-kit offset loss is specified (1 GHz).
pub const OFFSET_LOSS_REFERENCE_HZ: f64 = 1e9;
