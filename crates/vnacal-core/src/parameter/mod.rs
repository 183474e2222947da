//! Parameters and standards
//!
//! A parameter is anything that gives a reflection or transmission
//! coefficient at a frequency: a constant, a tabulated vector, an unknown
//! to be solved for, a value correlated with another parameter, or one cell
//! of a calibration standard. Parameters are shared through `Rc` and live
//! until the last holder drops them.

pub mod analyze;
pub mod calkit;
pub mod fit;
pub mod standard;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use num_complex::Complex64;

use crate::config::CalibrationConfig;
use crate::error::{Result, VnaCalError};
use crate::frequency::{check_range, validate_frequencies};
use crate::math::interpolation::rfi;
use crate::math::spline::Spline;

pub use analyze::{analyze, eval_matrix, ParameterMatrixMap, PlainCell, StandardCell, StandardMap};
pub use calkit::{CalkitElement, CalkitStandard, OffsetLine, OffsetModel};
pub use fit::{compute_c_coefficients, compute_l_coefficients};
pub use standard::{DataStandard, Standard, StandardKind, StandardRef};

/// Shared handle to a parameter
pub type ParameterRef = Rc<Parameter>;

/// Index of the predefined perfect match (Γ = 0)
pub const MATCH: usize = 0;
/// Index of the predefined perfect open (Γ = +1)
pub const OPEN: usize = 1;
/// Index of the predefined perfect short (Γ = -1)
pub const SHORT: usize = 2;

/// Frequency-dependent value tabulated over a frequency vector
#[derive(Debug, Clone)]
pub struct VectorParameter {
    frequencies: Vec<f64>,
    values: Vec<Complex64>,
    segment: Cell<usize>,
}

impl VectorParameter {
    pub fn new(frequencies: Vec<f64>, values: Vec<Complex64>) -> Result<Self> {
        validate_frequencies(&frequencies)?;
        if values.len() != frequencies.len() {
            return Err(VnaCalError::InvalidDimensions(format!(
                "{} values for {} frequencies",
                values.len(),
                frequencies.len()
            )));
        }
        Ok(Self {
            frequencies,
            values,
            segment: Cell::new(0),
        })
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn values(&self) -> &[Complex64] {
        &self.values
    }

    /// Interpolated value at `f` using the window and tolerance of `config`
    pub fn eval(&self, f: f64, config: &CalibrationConfig) -> Result<Complex64> {
        check_range(&self.frequencies, f, config.frequency_tolerance)?;
        let mut segment = self.segment.get();
        let value = rfi(&self.frequencies, &self.values, config.rfi_window, &mut segment, f);
        self.segment.set(segment);
        Ok(value)
    }
}

/// Parameter solved for during calibration
#[derive(Debug)]
pub struct UnknownParameter {
    initial: ParameterRef,
    solution: RefCell<Option<VectorParameter>>,
}

impl UnknownParameter {
    /// Parameter giving the initial guess
    pub fn initial(&self) -> &ParameterRef {
        &self.initial
    }

    pub fn is_solved(&self) -> bool {
        self.solution.borrow().is_some()
    }
}

/// Parameter equal to another one with a frequency-dependent uncertainty
#[derive(Debug)]
pub struct CorrelatedParameter {
    target: ParameterRef,
    sigma: Spline,
}

impl CorrelatedParameter {
    pub fn target(&self) -> &ParameterRef {
        &self.target
    }
}

/// One cell of a standard's S matrix
#[derive(Debug, Clone)]
pub struct StandardElement {
    pub standard: StandardRef,
    pub row: usize,
    pub column: usize,
}

/// A calibration parameter
#[derive(Debug)]
pub enum Parameter {
    Scalar(Complex64),
    Vector(VectorParameter),
    Unknown(UnknownParameter),
    Correlated(CorrelatedParameter),
    Calkit(StandardElement),
    Data(StandardElement),
}

impl Parameter {
    pub fn scalar(value: Complex64) -> Self {
        Self::Scalar(value)
    }

    pub fn vector(frequencies: Vec<f64>, values: Vec<Complex64>) -> Result<Self> {
        Ok(Self::Vector(VectorParameter::new(frequencies, values)?))
    }

    pub fn unknown(initial: ParameterRef) -> Self {
        Self::Unknown(UnknownParameter {
            initial,
            solution: RefCell::new(None),
        })
    }

    /// Correlated parameter; `sigma` is tabulated over `sigma_frequencies`.
    pub fn correlated(target: ParameterRef, sigma_frequencies: &[f64], sigma: &[f64]) -> Result<Self> {
        if let Some(bad) = sigma.iter().find(|s| !(**s >= 0.0) || !s.is_finite()) {
            return Err(VnaCalError::InvalidArgument(format!(
                "sigma must be finite and non-negative, got {bad}"
            )));
        }
        Ok(Self::Correlated(CorrelatedParameter {
            target,
            sigma: Spline::new(sigma_frequencies, sigma)?,
        }))
    }

    /// Cell (row, column) of a standard; the variant follows the standard kind.
    pub fn standard_element(standard: StandardRef, row: usize, column: usize) -> Result<Self> {
        let ports = standard.ports();
        if row >= ports || column >= ports {
            return Err(VnaCalError::IndexOutOfRange {
                what: "standard port",
                index: row.max(column),
                limit: ports,
            });
        }
        let element = StandardElement {
            standard,
            row,
            column,
        };
        Ok(match element.standard.kind() {
            StandardKind::Calkit(_) => Self::Calkit(element),
            StandardKind::Data(_) => Self::Data(element),
        })
    }

    /// Short type name used in messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Vector(_) => "vector",
            Self::Unknown(_) => "unknown",
            Self::Correlated(_) => "correlated",
            Self::Calkit(_) => "calkit",
            Self::Data(_) => "data",
        }
    }

    /// The standard cell this parameter names, if any
    pub fn standard_element_ref(&self) -> Option<&StandardElement> {
        match self {
            Self::Calkit(e) | Self::Data(e) => Some(e),
            _ => None,
        }
    }

    /// True only for a scalar exactly equal to zero
    pub fn is_exact_zero(&self) -> bool {
        matches!(self, Self::Scalar(v) if *v == Complex64::new(0.0, 0.0))
    }

    /// Value at frequency `f` with reference impedance `z0`.
    ///
    /// Tabulated values (vectors, solved unknowns, data standards) are
    /// interpolated and range checked with the settings in `config`.
    pub fn eval(&self, f: f64, z0: Complex64, config: &CalibrationConfig) -> Result<Complex64> {
        match self {
            Self::Scalar(v) => Ok(*v),
            Self::Vector(v) => v.eval(f, config),
            Self::Unknown(u) => match &*u.solution.borrow() {
                Some(solved) => solved.eval(f, config),
                None => u.initial.eval(f, z0, config),
            },
            Self::Correlated(c) => c.target.eval(f, z0, config),
            Self::Calkit(e) | Self::Data(e) => {
                let z = vec![z0; e.standard.ports()];
                let s = e.standard.eval_renormalized(f, &z, config)?;
                Ok(s[[e.row, e.column]])
            }
        }
    }

    /// Like [`Self::eval`] but unknowns give their initial guess even once solved.
    pub fn eval_initial(&self, f: f64, z0: Complex64, config: &CalibrationConfig) -> Result<Complex64> {
        match self {
            Self::Unknown(u) => u.initial.eval_initial(f, z0, config),
            Self::Correlated(c) => c.target.eval_initial(f, z0, config),
            other => other.eval(f, z0, config),
        }
    }

    /// Standard deviation of a correlated parameter at `f`
    pub fn sigma(&self, f: f64) -> Result<f64> {
        match self {
            Self::Correlated(c) => Ok(c.sigma.eval(f)),
            other => Err(VnaCalError::InvalidArgument(format!(
                "{} parameter has no sigma",
                other.kind_name()
            ))),
        }
    }

    /// Store the solved values of an unknown parameter.
    pub fn set_solution(&self, frequencies: Vec<f64>, values: Vec<Complex64>) -> Result<()> {
        match self {
            Self::Unknown(u) => {
                let solved = VectorParameter::new(frequencies, values)?;
                *u.solution.borrow_mut() = Some(solved);
                Ok(())
            }
            other => Err(VnaCalError::InvalidArgument(format!(
                "cannot set the solution of a {} parameter",
                other.kind_name()
            ))),
        }
    }

    /// Follow correlated links, and unknown links when `initial` is set or
    /// the unknown is unsolved, to the parameter that gives the value.
    pub fn resolve(self: &Rc<Self>, initial: bool) -> ParameterRef {
        let mut current = Rc::clone(self);
        loop {
            let next = match &*current {
                Self::Correlated(c) => Rc::clone(&c.target),
                Self::Unknown(u) if initial || !u.is_solved() => Rc::clone(&u.initial),
                _ => return current,
            };
            current = next;
        }
    }
}
