//! Calibration standards
//!
//! A [`Standard`] is a 1- or n-port artifact whose S matrix is known either
//! from a calibration-kit model or from measured data. Standards are shared
//! through `Rc` by every parameter that names one of their cells.

use std::cell::Cell;
use std::rc::Rc;

use ndarray::Array2;
use num_complex::Complex64;

use super::calkit::CalkitStandard;
use crate::config::CalibrationConfig;
use crate::error::{Result, VnaCalError};
use crate::frequency::validate_frequencies;
use crate::math::transforms::renormalize_s;
use crate::network::{Network, ParameterType};

/// Standard described by measured S-parameter data
#[derive(Debug, Clone)]
pub struct DataStandard {
    network: Network,
    segment: Cell<usize>,
}

impl DataStandard {
    /// Wrap a square S-parameter network.
    pub fn new(network: Network) -> Result<Self> {
        if network.ptype() != ParameterType::S {
            return Err(VnaCalError::InvalidArgument(format!(
                "data standards need S parameters, got {}",
                network.ptype()
            )));
        }
        if network.rows() != network.columns() {
            return Err(VnaCalError::InvalidDimensions(format!(
                "data standard must be square, got {}x{}",
                network.rows(),
                network.columns()
            )));
        }
        validate_frequencies(network.frequency_vector())?;
        Ok(Self {
            network,
            segment: Cell::new(0),
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn eval(&self, f: f64, config: &CalibrationConfig) -> Result<Array2<Complex64>> {
        let mut segment = self.segment.get();
        let s = self.network.interpolate_matrix(f, config, &mut segment)?;
        self.segment.set(segment);
        Ok(s)
    }
}

/// What a standard is made of
#[derive(Debug, Clone)]
pub enum StandardKind {
    Calkit(CalkitStandard),
    Data(DataStandard),
}

/// Named calibration standard
#[derive(Debug, Clone)]
pub struct Standard {
    name: String,
    kind: StandardKind,
}

/// Shared handle to a standard
pub type StandardRef = Rc<Standard>;

impl Standard {
    /// Standard from a calibration-kit model
    pub fn calkit(name: impl Into<String>, model: CalkitStandard) -> Result<StandardRef> {
        model.validate()?;
        Ok(Rc::new(Self {
            name: name.into(),
            kind: StandardKind::Calkit(model),
        }))
    }

    /// Standard from measured S parameters
    pub fn data(name: impl Into<String>, network: Network) -> Result<StandardRef> {
        Ok(Rc::new(Self {
            name: name.into(),
            kind: StandardKind::Data(DataStandard::new(network)?),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &StandardKind {
        &self.kind
    }

    pub fn ports(&self) -> usize {
        match &self.kind {
            StandardKind::Calkit(model) => model.ports(),
            StandardKind::Data(data) => data.network.rows(),
        }
    }

    /// Reference impedance of each port the S matrix is natively given in
    pub fn native_z0(&self) -> Vec<Complex64> {
        match &self.kind {
            StandardKind::Calkit(model) => vec![Complex64::new(model.z0, 0.0); model.ports()],
            StandardKind::Data(data) => data.network.z0_vector().to_vec(),
        }
    }

    /// S matrix at `f` in the native reference impedances.
    ///
    /// Data standards are interpolated with the window and tolerance of
    /// `config`; calkit models are evaluated directly.
    pub fn eval(&self, f: f64, config: &CalibrationConfig) -> Result<Array2<Complex64>> {
        match &self.kind {
            StandardKind::Calkit(model) => model.eval(f),
            StandardKind::Data(data) => data.eval(f, config),
        }
    }

    /// S matrix at `f` renormalized to `z0` (one impedance per port).
    pub fn eval_renormalized(
        &self,
        f: f64,
        z0: &[Complex64],
        config: &CalibrationConfig,
    ) -> Result<Array2<Complex64>> {
        let s = self.eval(f, config)?;
        renormalize_s(&s.view(), &self.native_z0(), z0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::calkit::OffsetLine;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    #[test]
    fn test_calkit_standard_renormalized() {
        let load = Standard::calkit(
            "load",
            CalkitStandard::load(Complex64::new(50.0, 0.0), OffsetLine::default()),
        )
        .unwrap();
        assert_eq!(load.ports(), 1);
        let g = load
            .eval_renormalized(1e9, &[Complex64::new(25.0, 0.0)], &CalibrationConfig::default())
            .unwrap()[[0, 0]];
        assert_relative_eq!(g.re, 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_data_standard_eval() {
        let f = vec![1e9, 2e9, 3e9];
        let s = Array3::from_shape_fn((3, 2, 2), |(k, i, j)| {
            Complex64::new(0.1 * (k + 1) as f64, (i + j) as f64 * 0.01)
        });
        let ntwk = Network::from_s(f, s.clone(), &[Complex64::new(50.0, 0.0); 2]).unwrap();
        let std = Standard::data("dut", ntwk).unwrap();
        assert_eq!(std.ports(), 2);
        let config = CalibrationConfig::default();
        let m = std.eval(2e9, &config).unwrap();
        assert_eq!(m[[0, 1]], s[[1, 0, 1]]);
        assert!(std.eval(4e9, &config).is_err());

        // a wider tolerance admits a frequency just past the last point
        assert!(std.eval(3.01e9, &config).is_err());
        let wide = CalibrationConfig {
            frequency_tolerance: 0.01,
            ..config
        };
        assert!(std.eval(3.01e9, &wide).is_ok());
    }

    #[test]
    fn test_data_standard_rejects_rectangular() {
        let ntwk = Network::init(ParameterType::S, 1, 2, 1).unwrap();
        assert!(Standard::data("bad", ntwk).is_err());
    }
}
