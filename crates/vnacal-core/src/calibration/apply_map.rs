//! Port-mapped correction
//!
//! A VNA with fewer ports than the DUT can still measure it: connect a
//! subset of the DUT ports, terminate the rest, measure, move the cables
//! and repeat. [`ApplyMap`] collects such partial measurements. Every
//! measured cell whose receiver and driven port both reach the DUT gives
//! one linear equation in one row of the DUT's S matrix:
//!
//! ```text
//! Σ_k S[d(i)][d(k)]·a_k = b_i
//! ```
//!
//! with `d` the VNA-to-DUT port map and `a`, `b` the corrected waves of the
//! driven column. Once every S cell has been reached by at least one
//! measurement, [`ApplyMap::get_data`] solves each row in the least-squares
//! sense.
//!
//! Only calibrations whose correction separates by measurement column
//! (U8, UE10, U16, UE14, E12) support this.

use ndarray::{s, Array2, Array3};
use num_complex::Complex64;
use tracing::{debug, trace};

use super::apply::{column_waves, Ratio};
use super::container::Reporter;
use super::error_terms::ErrorTerms;
use crate::config::CalibrationConfig;
use crate::error::{Result, VnaCalError};
use crate::math::qr::qrsolve;
use crate::network::{Network, ParameterType};

/// Equations collected for one row of the DUT's S matrix
#[derive(Debug, Clone)]
struct RowEquations {
    count: usize,
    /// Per frequency: `count` rows of `ports` coefficients, row-major
    coefficients: Vec<Vec<Complex64>>,
    /// Per frequency: one right-hand side per equation
    rhs: Vec<Vec<Complex64>>,
}

/// Make room for `additional` more elements, growing capacity by half.
fn grow<T>(v: &mut Vec<T>, additional: usize) -> Result<()> {
    let needed = v.len() + additional;
    if needed > v.capacity() {
        let target = (v.capacity() + v.capacity() / 2).max(needed);
        v.try_reserve_exact(target - v.len()).map_err(|e| {
            VnaCalError::Allocation(format!("equation storage for {target} entries: {e}"))
        })?;
    }
    Ok(())
}

impl RowEquations {
    fn new(nfreq: usize) -> Self {
        Self {
            count: 0,
            coefficients: vec![Vec::new(); nfreq],
            rhs: vec![Vec::new(); nfreq],
        }
    }
}

/// One equation for all frequencies before it is committed
struct Pending {
    row: usize,
    column: usize,
    coefficients: Vec<Vec<Complex64>>,
    rhs: Vec<Complex64>,
}

/// Over-determined correction of a DUT from port-mapped measurements
#[derive(Debug)]
pub struct ApplyMap<'a> {
    error_terms: &'a ErrorTerms,
    frequencies: Vec<f64>,
    /// Error terms at each frequency
    terms: Vec<Vec<Complex64>>,
    ports: usize,
    rows: Vec<RowEquations>,
    /// `measured[p * ports + q]` is set once some equation directly measured S[p][q]
    measured: Vec<bool>,
    reporter: Reporter<'a>,
}

impl<'a> ApplyMap<'a> {
    pub(crate) fn new(
        error_terms: &'a ErrorTerms,
        config: &CalibrationConfig,
        frequencies: &[f64],
        ports: usize,
    ) -> Result<Self> {
        let layout = error_terms.layout();
        if !layout.cal_type().is_column_separable() {
            return Err(VnaCalError::UnsupportedShape(format!(
                "{} calibrations cannot be applied through a port map",
                layout.cal_type()
            )));
        }
        if ports == 0 {
            return Err(VnaCalError::InvalidDimensions("DUT must have at least one port".into()));
        }
        if frequencies.is_empty() {
            return Err(VnaCalError::InvalidDimensions("no frequencies to correct".into()));
        }
        let mut segments = vec![0; layout.term_count()];
        let terms = frequencies
            .iter()
            .map(|&f| {
                error_terms.at_frequency(
                    f,
                    config.rfi_window,
                    config.frequency_tolerance,
                    &mut segments,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(
            calibration = %error_terms.name(),
            ports,
            frequencies = frequencies.len(),
            "allocated port-mapped correction"
        );
        Ok(Self {
            error_terms,
            frequencies: frequencies.to_vec(),
            terms,
            ports,
            rows: vec![RowEquations::new(frequencies.len()); ports],
            measured: vec![false; ports * ports],
            reporter: Reporter::default(),
        })
    }

    pub(crate) fn with_reporter(mut self, reporter: Reporter<'a>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Number of DUT ports
    pub fn ports(&self) -> usize {
        self.ports
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Equations collected so far for DUT row `row`
    pub fn equation_count(&self, row: usize) -> usize {
        self.rows.get(row).map_or(0, |r| r.count)
    }

    fn resolve_map(&self, map: Option<&[Option<usize>]>) -> Result<Vec<Option<usize>>> {
        let vna_ports = self.error_terms.layout().ports();
        let map = match map {
            Some(map) => map.to_vec(),
            None => {
                if vna_ports > self.ports {
                    return Err(VnaCalError::InvalidArgument(format!(
                        "{vna_ports}-port calibration needs a port map for a {}-port DUT",
                        self.ports
                    )));
                }
                (0..vna_ports).map(Some).collect()
            }
        };
        if map.len() != vna_ports {
            return Err(VnaCalError::InvalidDimensions(format!(
                "port map has {} entries for {vna_ports} VNA ports",
                map.len()
            )));
        }
        let mut seen = vec![false; self.ports];
        for &port in map.iter().flatten() {
            if port >= self.ports {
                return Err(VnaCalError::IndexOutOfRange {
                    what: "DUT port",
                    index: port,
                    limit: self.ports,
                });
            }
            if std::mem::replace(&mut seen[port], true) {
                return Err(VnaCalError::InvalidArgument(format!(
                    "DUT port {} is connected to two VNA ports",
                    port + 1
                )));
            }
        }
        Ok(map)
    }

    /// Add ratioed measurements, `[frequency, row, column]`.
    ///
    /// `map[k]` is the DUT port connected to VNA port `k`, or `None` when
    /// that VNA port is not connected. Without a map VNA port k connects to
    /// DUT port k.
    pub fn add_m(&mut self, m: &Array3<Complex64>, map: Option<&[Option<usize>]>) -> Result<()> {
        let result = self.push_m(m, map);
        self.reporter.report(result)
    }

    fn push_m(&mut self, m: &Array3<Complex64>, map: Option<&[Option<usize>]>) -> Result<()> {
        let layout = *self.error_terms.layout();
        let (rows, columns) = (layout.rows(), layout.columns());
        if m.dim() != (self.frequencies.len(), rows, columns) {
            let (nf, r, c) = m.dim();
            return Err(VnaCalError::InvalidDimensions(format!(
                "expected {}x{rows}x{columns} measurements, got {nf}x{r}x{c}",
                self.frequencies.len()
            )));
        }
        let map = self.resolve_map(map)?;

        let mut pending: Vec<Pending> = Vec::new();
        for j in 0..columns {
            let Some(driven) = map[j] else { continue };
            for i in 0..rows {
                if let Some(row) = map[i] {
                    pending.push(Pending {
                        row,
                        column: driven,
                        coefficients: Vec::with_capacity(self.frequencies.len()),
                        rhs: Vec::with_capacity(self.frequencies.len()),
                    });
                }
            }
        }
        if pending.is_empty() {
            return Err(VnaCalError::InsufficientData(
                "no measured cell connects to the DUT".into(),
            ));
        }

        for (findex, &f) in self.frequencies.iter().enumerate() {
            let terms = &self.terms[findex];
            let mut next = pending.iter_mut();
            for j in 0..columns {
                if map[j].is_none() {
                    continue;
                }
                let column = m.slice(s![findex, .., j]).to_vec();
                let (a, b) = column_waves(&layout, terms, j, &column, f)?;
                let mut coefficients = vec![Complex64::new(0.0, 0.0); self.ports];
                for (k, port) in map.iter().enumerate() {
                    if let Some(q) = port {
                        coefficients[*q] = a[k];
                    }
                }
                for (i, port) in map.iter().enumerate().take(rows) {
                    if port.is_none() {
                        continue;
                    }
                    if let Some(equation) = next.next() {
                        equation.coefficients.push(coefficients.clone());
                        equation.rhs.push(b[i]);
                    }
                }
            }
        }

        let n = self.ports;
        for equation in pending {
            let target = &mut self.rows[equation.row];
            for (findex, coefficients) in equation.coefficients.into_iter().enumerate() {
                grow(&mut target.coefficients[findex], n)?;
                target.coefficients[findex].extend_from_slice(&coefficients);
                grow(&mut target.rhs[findex], 1)?;
                target.rhs[findex].push(equation.rhs[findex]);
            }
            target.count += 1;
            self.measured[equation.row * n + equation.column] = true;
            trace!(row = equation.row, column = equation.column, "added equation");
        }
        Ok(())
    }

    /// Add raw voltages; see [`Measurement::Ab`](super::apply::Measurement::Ab).
    pub fn add_ab(
        &mut self,
        a: &Array3<Complex64>,
        b: &Array3<Complex64>,
        map: Option<&[Option<usize>]>,
    ) -> Result<()> {
        let result = self.push_ab(a, b, map);
        self.reporter.report(result)
    }

    fn push_ab(
        &mut self,
        a: &Array3<Complex64>,
        b: &Array3<Complex64>,
        map: Option<&[Option<usize>]>,
    ) -> Result<()> {
        let ratio = Ratio::for_type(self.error_terms.cal_type());
        ratio.check_dims(a, b)?;
        if b.dim().0 != self.frequencies.len() {
            return Err(VnaCalError::InvalidDimensions(format!(
                "{} voltage matrices for {} frequencies",
                b.dim().0,
                self.frequencies.len()
            )));
        }
        let mut m = Array3::<Complex64>::zeros(b.dim());
        for (findex, &f) in self.frequencies.iter().enumerate() {
            let ratioed = ratio.apply(
                a.slice(s![findex, .., ..]),
                b.slice(s![findex, .., ..]),
                f,
            )?;
            m.slice_mut(s![findex, .., ..]).assign(&ratioed);
        }
        self.push_m(&m, map)
    }

    /// Solve for the DUT's S parameters.
    ///
    /// Fails when some S cell was never measured or a row system is rank
    /// deficient.
    pub fn get_data(&self) -> Result<Network> {
        self.reporter.report(self.solve())
    }

    fn solve(&self) -> Result<Network> {
        let n = self.ports;
        if let Some(missing) = self.measured.iter().position(|m| !m) {
            return Err(VnaCalError::InsufficientData(format!(
                "no measurement of S{}{}",
                missing / n + 1,
                missing % n + 1
            )));
        }

        let mut out = Network::init(ParameterType::S, n, n, self.frequencies.len())?;
        out.set_frequency_vector(&self.frequencies)?;
        out.set_z0(self.error_terms.z0());
        for (findex, &f) in self.frequencies.iter().enumerate() {
            let mut s = Array2::<Complex64>::zeros((n, n));
            for (p, row) in self.rows.iter().enumerate() {
                let mut a = Array2::from_shape_vec((row.count, n), row.coefficients[findex].clone())
                    .map_err(|e| VnaCalError::InvalidDimensions(e.to_string()))?;
                let mut b = Array2::from_shape_vec((row.count, 1), row.rhs[findex].clone())
                    .map_err(|e| VnaCalError::InvalidDimensions(e.to_string()))?;
                let (x, rank) = qrsolve(&mut a, &mut b);
                if rank < n {
                    return Err(VnaCalError::singular(
                        f,
                        format!("row {} has rank {rank} of {n}", p + 1),
                    ));
                }
                s.row_mut(p).assign(&x.column(0));
            }
            out.set_matrix(findex, &s.view())?;
        }
        debug!(ports = n, frequencies = self.frequencies.len(), "solved port-mapped correction");
        Ok(out)
    }
}
