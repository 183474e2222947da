//! Calibration container
//!
//! [`Calibration`] owns the parameters used to describe standards, the
//! solved calibrations and the user properties attached to them. Every
//! fallible operation returns a [`Result`]; the error is also logged and,
//! when a sink is installed with [`Calibration::set_error_fn`], passed to it.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use ndarray::Array3;
use num_complex::Complex64;
use tracing::{debug, trace, warn};

use super::apply::{apply, Measurement};
use super::apply_map::ApplyMap;
use super::calset::CalSet;
use super::error_terms::ErrorTerms;
use crate::config::CalibrationConfig;
use crate::error::{ErrorCategory, Result, VnaCalError};
use crate::network::Network;
use crate::parameter::{
    analyze, Parameter, ParameterMatrixMap, ParameterRef, StandardKind, StandardRef, MATCH, OPEN,
    SHORT,
};
use crate::properties::Properties;

/// Diagnostic sink receiving the message and category of every error
pub type ErrorFn = Box<dyn Fn(&str, ErrorCategory)>;

/// Logs failed results and forwards them to the installed sink, if any.
///
/// Borrowed from the container by objects that outlive a single call, such
/// as an [`ApplyMap`].
#[derive(Clone, Copy, Default)]
pub(crate) struct Reporter<'a> {
    sink: Option<&'a ErrorFn>,
}

impl fmt::Debug for Reporter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl Reporter<'_> {
    pub(crate) fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(category = %e.category(), error = %e, "calibration operation failed");
            if let Some(sink) = self.sink {
                sink(&e.to_string(), e.category());
            }
        }
        result
    }
}

/// Parameters, solved calibrations and their metadata
pub struct Calibration {
    parameters: HashMap<usize, ParameterRef>,
    next_index: usize,
    calibrations: Vec<ErrorTerms>,
    /// User metadata for the whole container
    pub properties: Properties,
    config: CalibrationConfig,
    error_fn: Option<ErrorFn>,
}

impl fmt::Debug for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calibration")
            .field("parameters", &self.parameters.len())
            .field("calibrations", &self.calibration_names())
            .field("config", &self.config)
            .field("error_fn", &self.error_fn.is_some())
            .finish()
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibration {
    pub fn new() -> Self {
        Self::with_config(CalibrationConfig::default())
    }

    /// Empty container holding only the predefined match, open and short.
    pub fn with_config(config: CalibrationConfig) -> Self {
        let mut parameters = HashMap::new();
        parameters.insert(MATCH, Rc::new(Parameter::scalar(Complex64::new(0.0, 0.0))));
        parameters.insert(OPEN, Rc::new(Parameter::scalar(Complex64::new(1.0, 0.0))));
        parameters.insert(SHORT, Rc::new(Parameter::scalar(Complex64::new(-1.0, 0.0))));
        Self {
            parameters,
            next_index: SHORT + 1,
            calibrations: Vec::new(),
            properties: Properties::new(),
            config,
            error_fn: None,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CalibrationConfig) {
        self.config = config;
    }

    /// Install a sink that receives every error returned by this container.
    pub fn set_error_fn(&mut self, error_fn: ErrorFn) {
        self.error_fn = Some(error_fn);
    }

    pub fn clear_error_fn(&mut self) {
        self.error_fn = None;
    }

    fn reporter(&self) -> Reporter<'_> {
        Reporter {
            sink: self.error_fn.as_ref(),
        }
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        self.reporter().report(result)
    }

    // parameters

    fn insert(&mut self, parameter: Parameter) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        trace!(index, kind = parameter.kind_name(), "created parameter");
        self.parameters.insert(index, Rc::new(parameter));
        index
    }

    fn lookup(&self, index: usize) -> Result<ParameterRef> {
        self.parameters
            .get(&index)
            .cloned()
            .ok_or(VnaCalError::UnknownParameter(index))
    }

    /// Parameter by index
    pub fn get_parameter(&self, index: usize) -> Result<ParameterRef> {
        self.report(self.lookup(index))
    }

    /// Value of parameter `index` at `f`, interpolated with this container's
    /// window and frequency tolerance.
    pub fn eval_parameter(&self, index: usize, f: f64, z0: Complex64) -> Result<Complex64> {
        let result = self
            .lookup(index)
            .and_then(|p| p.eval(f, z0, &self.config));
        self.report(result)
    }

    /// Number of live parameters, including the predefined ones
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn make_scalar(&mut self, value: Complex64) -> usize {
        self.insert(Parameter::scalar(value))
    }

    pub fn make_vector(&mut self, frequencies: Vec<f64>, values: Vec<Complex64>) -> Result<usize> {
        let parameter = Parameter::vector(frequencies, values);
        let parameter = self.report(parameter)?;
        Ok(self.insert(parameter))
    }

    /// Unknown parameter with the parameter at `initial` as its first guess
    pub fn make_unknown(&mut self, initial: usize) -> Result<usize> {
        let initial = self.report(self.lookup(initial))?;
        Ok(self.insert(Parameter::unknown(initial)))
    }

    /// Parameter correlated with `other`, with sigma tabulated over frequency
    pub fn make_correlated(
        &mut self,
        other: usize,
        sigma_frequencies: &[f64],
        sigma: &[f64],
    ) -> Result<usize> {
        let result = self
            .lookup(other)
            .and_then(|target| Parameter::correlated(target, sigma_frequencies, sigma));
        let parameter = self.report(result)?;
        Ok(self.insert(parameter))
    }

    fn make_element(&mut self, standard: &StandardRef, row: usize, column: usize, data: bool) -> Result<usize> {
        let kind_matches = matches!(
            (standard.kind(), data),
            (StandardKind::Calkit(_), false) | (StandardKind::Data(_), true)
        );
        let result = if kind_matches {
            Parameter::standard_element(Rc::clone(standard), row, column)
        } else {
            Err(VnaCalError::InvalidArgument(format!(
                "standard {:?} is not a {} standard",
                standard.name(),
                if data { "data" } else { "calibration-kit" }
            )))
        };
        let parameter = self.report(result)?;
        Ok(self.insert(parameter))
    }

    /// Cell (row, column) of a calibration-kit standard
    pub fn make_calkit(&mut self, standard: &StandardRef, row: usize, column: usize) -> Result<usize> {
        self.make_element(standard, row, column, false)
    }

    /// Cell (row, column) of a measured-data standard
    pub fn make_data(&mut self, standard: &StandardRef, row: usize, column: usize) -> Result<usize> {
        self.make_element(standard, row, column, true)
    }

    /// Remove a parameter. Holders of the parameter keep it alive.
    pub fn delete_parameter(&mut self, index: usize) -> Result<()> {
        let result = if index <= SHORT {
            Err(VnaCalError::InvalidArgument(format!(
                "predefined parameter {index} cannot be deleted"
            )))
        } else {
            self.parameters
                .remove(&index)
                .map(|_| trace!(index, "deleted parameter"))
                .ok_or(VnaCalError::UnknownParameter(index))
        };
        self.report(result)
    }

    /// Store the solved values of an unknown parameter.
    pub fn set_unknown_solution(
        &mut self,
        index: usize,
        frequencies: Vec<f64>,
        values: Vec<Complex64>,
    ) -> Result<()> {
        let result = self
            .lookup(index)
            .and_then(|p| p.set_solution(frequencies, values));
        self.report(result)
    }

    /// Analyze a row-major matrix of parameter indices.
    pub fn analyze(
        &self,
        indices: &[usize],
        rows: usize,
        columns: usize,
        resolve_initial: bool,
    ) -> Result<ParameterMatrixMap> {
        let result = indices
            .iter()
            .map(|&k| self.lookup(k))
            .collect::<Result<Vec<_>>>()
            .and_then(|cells| analyze(&cells, rows, columns, resolve_initial));
        self.report(result)
    }

    // calibrations

    /// Solve a calibration set and store the result under its name.
    pub fn add_calset(&mut self, calset: &CalSet) -> Result<usize> {
        let solved = calset.solve_with(&self.config);
        let error_terms = self.report(solved)?;
        Ok(self.store(error_terms))
    }

    /// Store error terms built elsewhere, e.g. loaded from a file.
    pub fn add_error_terms(&mut self, error_terms: ErrorTerms) -> usize {
        self.store(error_terms)
    }

    fn store(&mut self, error_terms: ErrorTerms) -> usize {
        debug!(
            name = %error_terms.name(),
            cal_type = %error_terms.cal_type(),
            rows = error_terms.layout().rows(),
            columns = error_terms.layout().columns(),
            frequencies = error_terms.frequencies().len(),
            "stored calibration"
        );
        match self.find_calibration(error_terms.name()) {
            Some(index) => {
                warn!(name = %error_terms.name(), "replacing calibration");
                self.calibrations[index] = error_terms;
                index
            }
            None => {
                self.calibrations.push(error_terms);
                self.calibrations.len() - 1
            }
        }
    }

    pub fn calibration_count(&self) -> usize {
        self.calibrations.len()
    }

    pub fn calibration_names(&self) -> Vec<&str> {
        self.calibrations.iter().map(|c| c.name()).collect()
    }

    /// Index of the calibration called `name`
    pub fn find_calibration(&self, name: &str) -> Option<usize> {
        self.calibrations.iter().position(|c| c.name() == name)
    }

    fn check_calibration(&self, index: usize) -> Result<()> {
        if index < self.calibrations.len() {
            Ok(())
        } else {
            Err(VnaCalError::IndexOutOfRange {
                what: "calibration",
                index,
                limit: self.calibrations.len(),
            })
        }
    }

    pub fn get_calibration(&self, index: usize) -> Result<&ErrorTerms> {
        self.report(self.check_calibration(index))?;
        Ok(&self.calibrations[index])
    }

    /// Properties of one calibration
    pub fn calibration_properties_mut(&mut self, index: usize) -> Result<&mut Properties> {
        self.report(self.check_calibration(index))?;
        Ok(&mut self.calibrations[index].properties)
    }

    pub fn rename_calibration(&mut self, index: usize, name: &str) -> Result<()> {
        let result = self.check_calibration(index).and_then(|()| {
            match self.find_calibration(name) {
                Some(other) if other != index => Err(VnaCalError::InvalidArgument(format!(
                    "a calibration called {name:?} already exists"
                ))),
                _ => Ok(()),
            }
        });
        self.report(result)?;
        self.calibrations[index].set_name(name);
        Ok(())
    }

    /// Remove a calibration; later calibrations move down by one index.
    pub fn delete_calibration(&mut self, index: usize) -> Result<ErrorTerms> {
        self.report(self.check_calibration(index))?;
        Ok(self.calibrations.remove(index))
    }

    // correction

    /// Correct a measurement with calibration `index`.
    pub fn apply(
        &self,
        index: usize,
        frequencies: &[f64],
        measurement: Measurement<'_>,
    ) -> Result<Network> {
        let result = self
            .check_calibration(index)
            .and_then(|()| apply(&self.calibrations[index], &self.config, frequencies, measurement));
        self.report(result)
    }

    /// Shorthand for [`Self::apply`] with ratioed measurements
    pub fn apply_m(&self, index: usize, frequencies: &[f64], m: &Array3<Complex64>) -> Result<Network> {
        self.apply(index, frequencies, Measurement::M(m))
    }

    /// Start a port-mapped correction of a `dut_ports`-port DUT.
    ///
    /// Errors from the returned map are reported like those of the container.
    pub fn apply_alloc(&self, index: usize, frequencies: &[f64], dut_ports: usize) -> Result<ApplyMap<'_>> {
        let result = self.check_calibration(index).and_then(|()| {
            ApplyMap::new(&self.calibrations[index], &self.config, frequencies, dut_ports)
                .map(|map| map.with_reporter(self.reporter()))
        });
        self.report(result)
    }
}
