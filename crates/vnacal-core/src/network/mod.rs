//! Network module - structured network data
//!
//! Provides the Network container used to exchange measured and corrected
//! parameter data with the calibration core.

mod core;
mod interpolation;

pub use core::{Network, ParameterType};
