//! Complex linear algebra and interpolation
//!
//! Everything here works on `ndarray` matrices of `Complex64` and reports
//! degeneracy through returned determinants or ranks instead of failing.

pub mod interpolation;
pub mod linalg;
pub mod matrix_ops;
pub mod qr;
pub mod spline;
pub mod transforms;

pub use interpolation::rfi;
pub use linalg::{determinant, lu, minverse, mldivide, mrdivide, Lu};
pub use qr::{qr, qrd, qrsolve, QrFactors};
pub use spline::Spline;
