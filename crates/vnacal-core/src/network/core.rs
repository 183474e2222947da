//! Core Network struct and accessors
//!
//! A [`Network`] holds a rows × columns complex matrix per frequency plus a
//! per-port reference impedance and a tag saying what kind of parameters the
//! matrix contains. It is the exchange format of the calibration core: data
//! standards are built from one and apply results are returned as one.

use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array1, Array2, Array3, ArrayView2};
use num_complex::Complex64;

use crate::constants::DEFAULT_Z0;
use crate::error::{Result, VnaCalError};
use crate::frequency::validate_frequencies;

/// Kind of network parameters stored in a [`Network`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterType {
    /// Scattering parameters
    #[default]
    S,
    /// Scattering transfer parameters
    T,
    /// Inverse scattering transfer parameters
    U,
    /// Impedance parameters
    Z,
    /// Admittance parameters
    Y,
    /// Hybrid parameters
    H,
    /// Inverse hybrid parameters
    G,
    /// ABCD (chain) parameters
    A,
    /// Inverse chain parameters
    B,
    /// Input impedance at each port
    Zin,
}

impl ParameterType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::S => "S",
            Self::T => "T",
            Self::U => "U",
            Self::Z => "Z",
            Self::Y => "Y",
            Self::H => "H",
            Self::G => "G",
            Self::A => "A",
            Self::B => "B",
            Self::Zin => "Zin",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParameterType {
    type Err = VnaCalError;

    fn from_str(s: &str) -> Result<Self> {
        let all = [
            Self::S,
            Self::T,
            Self::U,
            Self::Z,
            Self::Y,
            Self::H,
            Self::G,
            Self::A,
            Self::B,
            Self::Zin,
        ];
        all.into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| VnaCalError::InvalidArgument(format!("unknown parameter type {s:?}")))
    }
}

/// Network data over frequency
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    ptype: ParameterType,
    /// Frequency vector in Hz
    frequency: Vec<f64>,
    /// Parameter data [nfreq, rows, columns]
    data: Array3<Complex64>,
    /// Reference impedance per port
    z0: Array1<Complex64>,
    /// Network name
    pub name: Option<String>,
}

impl Network {
    /// Create a zero-filled network.
    ///
    /// Frequencies start at zero and the reference impedance at the default
    /// for every one of the `max(rows, columns)` ports.
    pub fn init(ptype: ParameterType, rows: usize, columns: usize, nfreq: usize) -> Result<Self> {
        if rows == 0 || columns == 0 {
            return Err(VnaCalError::InvalidDimensions(format!(
                "network must have at least one row and column, got {rows}x{columns}"
            )));
        }
        if ptype == ParameterType::Zin && rows != 1 {
            return Err(VnaCalError::InvalidDimensions(
                "Zin networks hold a single row".into(),
            ));
        }
        let ports = rows.max(columns);
        Ok(Self {
            ptype,
            frequency: vec![0.0; nfreq],
            data: Array3::zeros((nfreq, rows, columns)),
            z0: Array1::from_elem(ports, Complex64::new(DEFAULT_Z0, 0.0)),
            name: None,
        })
    }

    /// Build an S-parameter network from a frequency vector and data.
    ///
    /// `s` is indexed `[frequency, row, column]`; `z0` must have one entry
    /// per port.
    pub fn from_s(frequency: Vec<f64>, s: Array3<Complex64>, z0: &[Complex64]) -> Result<Self> {
        let (nfreq, rows, columns) = s.dim();
        if frequency.len() != nfreq {
            return Err(VnaCalError::InvalidDimensions(format!(
                "{} frequencies for {} data matrices",
                frequency.len(),
                nfreq
            )));
        }
        validate_frequencies(&frequency)?;
        let mut ntwk = Self::init(ParameterType::S, rows, columns, 0)?;
        ntwk.frequency = frequency;
        ntwk.data = s;
        ntwk.set_z0_vector(z0)?;
        Ok(ntwk)
    }

    /// Parameter type tag
    #[inline]
    pub fn ptype(&self) -> ParameterType {
        self.ptype
    }

    /// Change the parameter type tag without touching the data
    pub fn set_ptype(&mut self, ptype: ParameterType) {
        self.ptype = ptype;
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.data.shape()[1]
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.data.shape()[2]
    }

    /// Get the number of ports
    #[inline]
    pub fn nports(&self) -> usize {
        self.rows().max(self.columns())
    }

    /// Get the number of frequency points
    #[inline]
    pub fn nfreq(&self) -> usize {
        self.data.shape()[0]
    }

    /// Raw data [nfreq, rows, columns]
    pub fn data(&self) -> &Array3<Complex64> {
        &self.data
    }

    /// Change dimensions, keeping the overlapping data.
    ///
    /// Reference impedances of new ports take the default value.
    pub fn resize(&mut self, ptype: ParameterType, rows: usize, columns: usize, nfreq: usize) -> Result<()> {
        let mut resized = Self::init(ptype, rows, columns, nfreq)?;
        let (f, r, c) = (
            nfreq.min(self.nfreq()),
            rows.min(self.rows()),
            columns.min(self.columns()),
        );
        resized
            .data
            .slice_mut(s![..f, ..r, ..c])
            .assign(&self.data.slice(s![..f, ..r, ..c]));
        resized.frequency[..f].copy_from_slice(&self.frequency[..f]);
        let p = resized.z0.len().min(self.z0.len());
        resized.z0.slice_mut(s![..p]).assign(&self.z0.slice(s![..p]));
        resized.name = self.name.take();
        *self = resized;
        Ok(())
    }

    fn check_index(&self, findex: usize) -> Result<()> {
        if findex >= self.nfreq() {
            return Err(VnaCalError::IndexOutOfRange {
                what: "frequency",
                index: findex,
                limit: self.nfreq(),
            });
        }
        Ok(())
    }

    fn check_cell(&self, findex: usize, row: usize, column: usize) -> Result<()> {
        self.check_index(findex)?;
        if row >= self.rows() {
            return Err(VnaCalError::IndexOutOfRange {
                what: "row",
                index: row,
                limit: self.rows(),
            });
        }
        if column >= self.columns() {
            return Err(VnaCalError::IndexOutOfRange {
                what: "column",
                index: column,
                limit: self.columns(),
            });
        }
        Ok(())
    }

    pub fn get_cell(&self, findex: usize, row: usize, column: usize) -> Result<Complex64> {
        self.check_cell(findex, row, column)?;
        Ok(self.data[[findex, row, column]])
    }

    pub fn set_cell(&mut self, findex: usize, row: usize, column: usize, value: Complex64) -> Result<()> {
        self.check_cell(findex, row, column)?;
        self.data[[findex, row, column]] = value;
        Ok(())
    }

    /// Copy of the matrix at frequency index `findex`
    pub fn get_matrix(&self, findex: usize) -> Result<Array2<Complex64>> {
        self.check_index(findex)?;
        Ok(self.data.slice(s![findex, .., ..]).to_owned())
    }

    pub fn set_matrix(&mut self, findex: usize, m: &ArrayView2<Complex64>) -> Result<()> {
        self.check_index(findex)?;
        if m.dim() != (self.rows(), self.columns()) {
            return Err(VnaCalError::InvalidDimensions(format!(
                "expected a {}x{} matrix, got {}x{}",
                self.rows(),
                self.columns(),
                m.nrows(),
                m.ncols()
            )));
        }
        self.data.slice_mut(s![findex, .., ..]).assign(m);
        Ok(())
    }

    pub fn get_frequency(&self, findex: usize) -> Result<f64> {
        self.check_index(findex)?;
        Ok(self.frequency[findex])
    }

    pub fn set_frequency(&mut self, findex: usize, f: f64) -> Result<()> {
        self.check_index(findex)?;
        self.frequency[findex] = f;
        Ok(())
    }

    /// Get frequency vector in Hz
    #[inline]
    pub fn frequency_vector(&self) -> &[f64] {
        &self.frequency
    }

    pub fn set_frequency_vector(&mut self, f: &[f64]) -> Result<()> {
        if f.len() != self.nfreq() {
            return Err(VnaCalError::InvalidDimensions(format!(
                "expected {} frequencies, got {}",
                self.nfreq(),
                f.len()
            )));
        }
        self.frequency.copy_from_slice(f);
        Ok(())
    }

    /// Get reference impedance per port
    #[inline]
    pub fn z0_vector(&self) -> &[Complex64] {
        self.z0.as_slice().unwrap_or(&[])
    }

    pub fn set_z0_vector(&mut self, z0: &[Complex64]) -> Result<()> {
        if z0.len() != self.nports() {
            return Err(VnaCalError::InvalidDimensions(format!(
                "expected {} reference impedances, got {}",
                self.nports(),
                z0.len()
            )));
        }
        self.z0 = Array1::from_vec(z0.to_vec());
        Ok(())
    }

    /// Set every port's reference impedance to `z0`
    pub fn set_z0(&mut self, z0: Complex64) {
        self.z0.fill(z0);
    }
}
