//! Calibration from raw standard measurements
//!
//! A [`CalSet`] collects averaged measurements of three reflection
//! references on each diagonal cell and of a through (plus optional
//! isolation) on each off-diagonal cell, then solves them into E12 error
//! terms.
//!
//! Diagonal cell j, reference k with actual reflection `g` and measurement `m`:
//!
//! ```text
//! m = e00 + (g·m)·e11 + g·Δ,   e10e01 = Δ + e00·e11
//! ```
//!
//! Off-diagonal cell (i, j) with the through connected:
//!
//! ```text
//! e22    = (m_jj - e00) / (e10e01 + e11·(m_jj - e00))
//! e10e32 = (m_ij - e30) · (1 - e11·e22)
//! ```

use num_complex::Complex64;
use tracing::{debug, trace};

use super::error_terms::ErrorTerms;
use super::layout::{CalType, Layout};
use crate::config::CalibrationConfig;
use crate::error::{Result, VnaCalError};
use crate::frequency::validate_frequencies;
use crate::math::matrix_ops::is_singular;
use crate::parameter::{ParameterRef, VectorParameter};

/// Actual reflection of a reference standard
#[derive(Debug, Clone)]
pub enum Reference {
    Constant(Complex64),
    Vector {
        frequencies: Vec<f64>,
        values: Vec<Complex64>,
    },
    /// Any parameter, evaluated at the calibration frequencies and impedance
    Parameter(ParameterRef),
}

/// Off-diagonal term: isolation (leakage) measurement
pub const TERM_LEAKAGE: usize = 0;
/// Off-diagonal term: transmission with the through connected
pub const TERM_THROUGH: usize = 1;
/// Off-diagonal term: reflection at the driven port with the through connected
pub const TERM_THROUGH_MATCH: usize = 2;

#[derive(Debug, Clone)]
struct Accumulator {
    sum: Vec<Complex64>,
    count: usize,
}

impl Accumulator {
    fn mean(&self) -> Vec<Complex64> {
        let n = self.count as f64;
        self.sum.iter().map(|v| v / n).collect()
    }
}

/// Raw calibration data for one calibration
#[derive(Debug, Clone)]
pub struct CalSet {
    name: String,
    rows: usize,
    columns: usize,
    frequencies: Vec<f64>,
    z0: Complex64,
    references: [Option<Reference>; 3],
    /// cells[row * columns + column][term]
    cells: Vec<[Option<Accumulator>; 3]>,
}

impl CalSet {
    pub fn new(
        name: impl Into<String>,
        rows: usize,
        columns: usize,
        frequencies: Vec<f64>,
        z0: Complex64,
    ) -> Result<Self> {
        if rows == 0 || columns == 0 {
            return Err(VnaCalError::InvalidDimensions(format!(
                "calibration set needs at least one row and column, got {rows}x{columns}"
            )));
        }
        validate_frequencies(&frequencies)?;
        Ok(Self {
            name: name.into(),
            rows,
            columns,
            frequencies,
            z0,
            references: [None, None, None],
            cells: vec![[None, None, None]; rows * columns],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Set the actual reflection of reference `k` (0, 1 or 2).
    pub fn set_reference(&mut self, k: usize, reference: Reference) -> Result<()> {
        if k >= 3 {
            return Err(VnaCalError::IndexOutOfRange {
                what: "reference",
                index: k,
                limit: 3,
            });
        }
        if let Reference::Vector {
            frequencies,
            values,
        } = &reference
        {
            VectorParameter::new(frequencies.clone(), values.clone())?;
        }
        self.references[k] = Some(reference);
        Ok(())
    }

    /// Add one measurement of `term` at cell (row, column).
    ///
    /// Repeated additions to the same cell and term are averaged.
    pub fn add(&mut self, row: usize, column: usize, term: usize, values: &[Complex64]) -> Result<()> {
        if row >= self.rows {
            return Err(VnaCalError::IndexOutOfRange {
                what: "row",
                index: row,
                limit: self.rows,
            });
        }
        if column >= self.columns {
            return Err(VnaCalError::IndexOutOfRange {
                what: "column",
                index: column,
                limit: self.columns,
            });
        }
        if term >= 3 {
            return Err(VnaCalError::IndexOutOfRange {
                what: "term",
                index: term,
                limit: 3,
            });
        }
        if values.len() != self.frequencies.len() {
            return Err(VnaCalError::InvalidDimensions(format!(
                "{} values for {} frequencies",
                values.len(),
                self.frequencies.len()
            )));
        }
        let slot = &mut self.cells[row * self.columns + column][term];
        match slot {
            Some(acc) => {
                for (s, v) in acc.sum.iter_mut().zip(values) {
                    *s += v;
                }
                acc.count += 1;
            }
            None => {
                *slot = Some(Accumulator {
                    sum: values.to_vec(),
                    count: 1,
                })
            }
        }
        Ok(())
    }

    fn measurement(&self, row: usize, column: usize, term: usize) -> Option<Vec<Complex64>> {
        self.cells[row * self.columns + column][term]
            .as_ref()
            .map(Accumulator::mean)
    }

    fn require(&self, row: usize, column: usize, term: usize, what: &str) -> Result<Vec<Complex64>> {
        self.measurement(row, column, term).ok_or_else(|| {
            VnaCalError::MissingMeasurement(format!(
                "{what} for cell [{row}][{column}] of {:?}",
                self.name
            ))
        })
    }

    /// Reference gammas at every calibration frequency
    fn reference_values(&self, config: &CalibrationConfig) -> Result<[Vec<Complex64>; 3]> {
        let mut out: [Vec<Complex64>; 3] = Default::default();
        for (k, slot) in self.references.iter().enumerate() {
            let reference = slot.as_ref().ok_or_else(|| {
                VnaCalError::MissingMeasurement(format!("reference {k} of {:?}", self.name))
            })?;
            out[k] = match reference {
                Reference::Constant(g) => vec![*g; self.frequencies.len()],
                Reference::Vector {
                    frequencies,
                    values,
                } => {
                    let vector = VectorParameter::new(frequencies.clone(), values.clone())?;
                    self.frequencies
                        .iter()
                        .map(|&f| vector.eval(f, config))
                        .collect::<Result<_>>()?
                }
                Reference::Parameter(p) => self
                    .frequencies
                    .iter()
                    .map(|&f| p.eval(f, self.z0, config))
                    .collect::<Result<_>>()?,
            };
        }
        Ok(out)
    }

    /// Solve into E12 error terms with the default settings.
    pub fn solve(&self) -> Result<ErrorTerms> {
        self.solve_with(&CalibrationConfig::default())
    }

    /// Solve into E12 error terms.
    ///
    /// Tabulated references are interpolated and range checked with the
    /// window and tolerance of `config`.
    pub fn solve_with(&self, config: &CalibrationConfig) -> Result<ErrorTerms> {
        let layout = Layout::new(CalType::E12, self.rows, self.columns)?;
        let nfreq = self.frequencies.len();
        let mut terms = vec![vec![Complex64::new(0.0, 0.0); nfreq]; layout.term_count()];
        let diagonals = self.rows.min(self.columns);
        let gammas = self.reference_values(config)?;

        // diagonal cells: directivity, reflection tracking, source match
        for j in 0..diagonals {
            let m: Vec<Vec<Complex64>> = (0..3)
                .map(|k| self.require(j, j, k, &format!("reference {k}")))
                .collect::<Result<_>>()?;
            let el = layout.e12_el(j).offset + j;
            let er = layout.e12_er(j).offset + j;
            let em = layout.e12_em(j).offset + j;
            for f in 0..nfreq {
                let mk = [m[0][f], m[1][f], m[2][f]];
                let gk = [gammas[0][f], gammas[1][f], gammas[2][f]];
                let (e00, e11, delta) =
                    solve_reflection(mk, gk).ok_or_else(|| {
                        VnaCalError::singular(
                            self.frequencies[f],
                            format!("reference standards of cell [{j}][{j}] are not distinct"),
                        )
                    })?;
                terms[el][f] = e00;
                terms[er][f] = delta + e00 * e11;
                terms[em][f] = e11;
            }
            trace!(port = j, "solved reflection terms");
        }

        // off-diagonal cells: leakage, transmission tracking, load match
        for i in 0..self.rows {
            for j in 0..self.columns {
                if i == j {
                    continue;
                }
                let leakage = self
                    .measurement(i, j, TERM_LEAKAGE)
                    .unwrap_or_else(|| vec![Complex64::new(0.0, 0.0); nfreq]);
                let through = self.require(i, j, TERM_THROUGH, "through transmission")?;
                let has_diagonal = j < self.rows;
                let through_match = if has_diagonal {
                    Some(self.require(i, j, TERM_THROUGH_MATCH, "through reflection")?)
                } else {
                    None
                };
                let el = layout.e12_el(j).offset;
                let er = layout.e12_er(j).offset;
                let em = layout.e12_em(j).offset;
                for f in 0..nfreq {
                    let e30 = leakage[f];
                    let e22 = match &through_match {
                        Some(mjj) => {
                            let e00 = terms[el + j][f];
                            let e10e01 = terms[er + j][f];
                            let e11 = terms[em + j][f];
                            let d = mjj[f] - e00;
                            let den = e10e01 + e11 * d;
                            if is_singular(den) {
                                return Err(VnaCalError::singular(
                                    self.frequencies[f],
                                    format!("through match of cell [{i}][{j}]"),
                                ));
                            }
                            d / den
                        }
                        None => Complex64::new(0.0, 0.0),
                    };
                    let e11 = if has_diagonal {
                        terms[em + j][f]
                    } else {
                        Complex64::new(0.0, 0.0)
                    };
                    terms[el + i][f] = e30;
                    terms[er + i][f] = (through[f] - e30) * (Complex64::new(1.0, 0.0) - e11 * e22);
                    terms[em + i][f] = e22;
                }
            }
        }

        debug!(
            name = %self.name,
            rows = self.rows,
            columns = self.columns,
            frequencies = nfreq,
            "solved calibration set"
        );
        ErrorTerms::new(self.name.clone(), layout, self.frequencies.clone(), terms, self.z0)
    }
}

/// Solve the three reflection equations for (e00, e11, Δ) by Cramer's rule.
///
/// Returns `None` when the determinant is too small, i.e. two references
/// coincide.
fn solve_reflection(m: [Complex64; 3], g: [Complex64; 3]) -> Option<(Complex64, Complex64, Complex64)> {
    let one = Complex64::new(1.0, 0.0);
    // rows: [1, g·m, g] · [e00, e11, Δ] = m
    let a = [
        [one, g[0] * m[0], g[0]],
        [one, g[1] * m[1], g[1]],
        [one, g[2] * m[2], g[2]],
    ];
    let det3 = |a: &[[Complex64; 3]; 3]| {
        a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
            - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
            + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
    };
    let d = det3(&a);
    if is_singular(d) {
        return None;
    }
    let mut x = [Complex64::new(0.0, 0.0); 3];
    for (col, value) in x.iter_mut().enumerate() {
        let mut replaced = a;
        for row in 0..3 {
            replaced[row][col] = m[row];
        }
        *value = det3(&replaced) / d;
    }
    Some((x[0], x[1], x[2]))
}
