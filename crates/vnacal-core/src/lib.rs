//! vnacal-core: multi-port vector network analyzer calibration
//!
//! Solves error terms from measurements of calibration standards and uses
//! them to correct raw measurements of a device under test into its
//! scattering parameters.
//!
//! ## Modules
//!
//! - `math` - complex LU, QR, rational interpolation and splines
//! - `calibration` - error-term models, calibration sets, correction and the
//!   [`Calibration`] container
//! - `parameter` - parameters, calibration standards and parameter-matrix analysis
//! - `network` - network data exchanged with the core
//! - `frequency` - frequency vectors and range checks
//! - `config` - interpolation window and frequency tolerance
//! - `properties` - user metadata attached to calibrations
//!
//! ## Example
//!
//! ```
//! use ndarray::Array3;
//! use num_complex::Complex64;
//! use vnacal_core::calibration::{CalSet, Calibration, Reference};
//!
//! # fn main() -> vnacal_core::Result<()> {
//! let f = vec![1e9, 2e9];
//! let mut calset = CalSet::new("port1", 1, 1, f.clone(), Complex64::new(50.0, 0.0))?;
//! for (k, g) in [-1.0, 1.0, 0.0].into_iter().enumerate() {
//!     let g = Complex64::new(g, 0.0);
//!     calset.set_reference(k, Reference::Constant(g))?;
//!     calset.add(0, 0, k, &[g; 2])?;
//! }
//! let mut cal = Calibration::new();
//! let index = cal.add_calset(&calset)?;
//!
//! let m = Array3::from_elem((2, 1, 1), Complex64::new(0.25, 0.0));
//! let dut = cal.apply_m(index, &f, &m)?;
//! assert!((dut.get_cell(0, 0, 0)? - Complex64::new(0.25, 0.0)).norm() < 1e-12);
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod config;
pub mod constants;
pub mod error;
pub mod frequency;
pub mod math;
pub mod network;
pub mod parameter;
pub mod properties;

pub use calibration::{CalSet, CalType, Calibration, ErrorTerms, Layout, Measurement};
pub use config::CalibrationConfig;
pub use error::{ErrorCategory, Result, VnaCalError};
pub use network::{Network, ParameterType};
pub use parameter::{Parameter, ParameterRef, Standard, StandardRef};
pub use properties::Properties;
