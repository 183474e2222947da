//! Error types
//!
//! Every failure reported by the library is a [`VnaCalError`]. Each variant
//! belongs to one [`ErrorCategory`] so that front ends can route messages the
//! same way regardless of which operation failed.

use std::fmt;

use thiserror::Error;

/// Broad classification of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid arguments, dimensions, indices or inconsistent input
    Usage,
    /// Resource exhaustion
    System,
    /// Singular or otherwise numerically unusable systems
    Math,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage => write!(f, "usage"),
            Self::System => write!(f, "system"),
            Self::Math => write!(f, "math"),
        }
    }
}

/// Calibration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VnaCalError {
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("{what} index {index} out of range (limit {limit})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        limit: usize,
    },

    #[error("no parameter with index {0}")]
    UnknownParameter(usize),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("frequency {frequency} Hz outside of range {min} .. {max} Hz")]
    FrequencyOutOfRange { frequency: f64, min: f64, max: f64 },

    #[error("parameter matrix cell [{row}][{column}]: {message}")]
    ParameterMatrix {
        row: usize,
        column: usize,
        message: String,
    },

    #[error("missing measurement: {0}")]
    MissingMeasurement(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),

    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("singular system at {frequency} Hz: {context}")]
    Singular { frequency: f64, context: String },

    #[error("non-finite result: {0}")]
    NonFinite(String),
}

impl VnaCalError {
    /// Category used by diagnostic sinks
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidDimensions(_)
            | Self::IndexOutOfRange { .. }
            | Self::UnknownParameter(_)
            | Self::InvalidArgument(_)
            | Self::FrequencyOutOfRange { .. }
            | Self::ParameterMatrix { .. }
            | Self::MissingMeasurement(_)
            | Self::InsufficientData(_)
            | Self::UnsupportedShape(_) => ErrorCategory::Usage,
            Self::Allocation(_) => ErrorCategory::System,
            Self::Singular { .. } | Self::NonFinite(_) => ErrorCategory::Math,
        }
    }

    pub(crate) fn singular(frequency: f64, context: impl Into<String>) -> Self {
        Self::Singular {
            frequency,
            context: context.into(),
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, VnaCalError>;
