//! Calibration models, construction and correction
//!
//! - [`layout`]: where each error term of each model lives
//! - [`error_terms`]: solved error terms over frequency
//! - [`calset`]: E12 error terms from raw standard measurements
//! - [`apply`] and [`apply_map`]: correction of DUT measurements
//! - [`container`]: the [`Calibration`] that owns all of the above

pub mod apply;
pub mod apply_map;
pub mod calset;
pub mod container;
pub mod error_terms;
pub mod layout;

pub use apply::{apply, Measurement};
pub use apply_map::ApplyMap;
pub use calset::{CalSet, Reference, TERM_LEAKAGE, TERM_THROUGH, TERM_THROUGH_MATCH};
pub use container::{Calibration, ErrorFn};
pub use crate::config::CalibrationConfig;
pub use error_terms::ErrorTerms;
pub use layout::{Block, BlockShape, CalType, Layout};
