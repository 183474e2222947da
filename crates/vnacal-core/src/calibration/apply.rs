//! Error correction of measured data
//!
//! [`apply`] turns measurements of a DUT into its S parameters using one set
//! of [`ErrorTerms`]. At each requested frequency the error terms are
//! interpolated, a linear system is filled from the terms and the measured
//! matrix and the system is solved:
//!
//! | family | system |
//! |--------|--------|
//! | T8, TE10, T16 | `(Ts - M'·Tx)·S = M'·Tm - Ti` |
//! | U8, UE10, U16 | `S·(Ux·M' + Us) = Um·M' + Ui` |
//! | UE14, E12 | `S·a_j = b_j` for every measured column j |
//!
//! where `M'` is the measurement with leakage removed. Square calibrations
//! correct a square measurement. The 1×2 and 2×1 calibrations correct a
//! two-port DUT from a 2×2 matrix whose second row (1×2) or second column
//! (2×1) was measured with the DUT turned around. That row or column is
//! passed with its entries exchanged, so that `M[1][1]` is always the
//! reflection seen at DUT port 2. Any other rectangular shape goes through
//! [`ApplyMap`](super::apply_map::ApplyMap).

use ndarray::{arr2, s, Array2, Array3, ArrayView2};
use num_complex::Complex64;
use tracing::{debug, trace};

use super::error_terms::ErrorTerms;
use super::layout::{Block, CalType, Layout};
use crate::config::CalibrationConfig;
use crate::error::{Result, VnaCalError};
use crate::math::linalg::{mldivide, mrdivide};
use crate::math::matrix_ops::is_singular;
use crate::network::{Network, ParameterType};

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);

/// Measured DUT data, indexed `[frequency, row, column]`
#[derive(Debug, Clone, Copy)]
pub enum Measurement<'a> {
    /// Ratioed measurements
    M(&'a Array3<Complex64>),
    /// Raw voltages: `a` incident on the driven ports, `b` at the receivers
    ///
    /// For T and U calibrations `a` is columns × columns and `M = B·A⁻¹`.
    /// For UE14 and E12 `a` is 1 × columns or columns × columns (only the
    /// diagonal is used) and each column of `b` is divided by its drive.
    Ab {
        a: &'a Array3<Complex64>,
        b: &'a Array3<Complex64>,
    },
}

impl<'a> Measurement<'a> {
    /// The array holding one entry per measured cell
    fn cells(&self) -> &'a Array3<Complex64> {
        match *self {
            Measurement::M(m) => m,
            Measurement::Ab { b, .. } => b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Square,
    /// 1×2 calibration, second row measured with the DUT reversed
    ReversedRow,
    /// 2×1 calibration, second column measured with the DUT reversed
    ReversedColumn,
}

impl Shape {
    fn of(layout: &Layout) -> Result<Self> {
        match (layout.rows(), layout.columns()) {
            (r, c) if r == c => Ok(Self::Square),
            (1, 2) => Ok(Self::ReversedRow),
            (2, 1) => Ok(Self::ReversedColumn),
            (r, c) => Err(VnaCalError::UnsupportedShape(format!(
                "a {r}x{c} {} calibration cannot correct a full matrix; use apply_alloc",
                layout.cal_type()
            ))),
        }
    }

    fn measured_dim(self, layout: &Layout) -> (usize, usize) {
        match self {
            Self::Square => (layout.rows(), layout.columns()),
            Self::ReversedRow | Self::ReversedColumn => (2, 2),
        }
    }
}

/// How raw voltages are reduced to ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ratio {
    /// `M = B·A⁻¹`
    Matrix,
    /// Each column of B divided by its drive voltage
    Columns,
}

impl Ratio {
    pub(crate) fn for_type(ctype: CalType) -> Self {
        if ctype.is_column_system() {
            Self::Columns
        } else {
            Self::Matrix
        }
    }

    pub(crate) fn check_dims(self, a: &Array3<Complex64>, b: &Array3<Complex64>) -> Result<()> {
        let (nfreq, rows, columns) = b.dim();
        let (af, ar, ac) = a.dim();
        let ok = af == nfreq
            && ac == columns
            && match self {
                Self::Matrix => ar == columns,
                Self::Columns => ar == 1 || ar == columns,
            };
        if ok {
            Ok(())
        } else {
            Err(VnaCalError::InvalidDimensions(format!(
                "incident voltages are {af}x{ar}x{ac}, which does not fit {nfreq}x{rows}x{columns} \
                 receiver voltages"
            )))
        }
    }

    pub(crate) fn apply(
        self,
        a: ArrayView2<Complex64>,
        b: ArrayView2<Complex64>,
        f: f64,
    ) -> Result<Array2<Complex64>> {
        match self {
            Self::Matrix => {
                let mut a = a.to_owned();
                let (m, det) = mrdivide(&b, &mut a);
                if is_singular(det) {
                    return Err(VnaCalError::singular(f, "incident voltage matrix"));
                }
                Ok(m)
            }
            Self::Columns => {
                let mut m = b.to_owned();
                for (j, mut column) in m.columns_mut().into_iter().enumerate() {
                    let drive = if a.nrows() == 1 { a[[0, j]] } else { a[[j, j]] };
                    if is_singular(drive) {
                        return Err(VnaCalError::singular(
                            f,
                            format!("zero drive voltage on port {}", j + 1),
                        ));
                    }
                    column.mapv_inplace(|v| v / drive);
                }
                Ok(m)
            }
        }
    }
}

/// Linear system for the corrected S matrix
enum System {
    /// `A·S = B`
    Left {
        a: Array2<Complex64>,
        b: Array2<Complex64>,
    },
    /// `S·A = B`
    Right {
        a: Array2<Complex64>,
        b: Array2<Complex64>,
    },
    /// `row_i(S)·A_i = row_i(B)`
    Rows {
        a: Vec<Array2<Complex64>>,
        b: Array2<Complex64>,
    },
}

fn check_det(det: Complex64, f: f64) -> Result<()> {
    if is_singular(det) {
        Err(VnaCalError::singular(f, "error-corrected system"))
    } else {
        Ok(())
    }
}

impl System {
    fn solve(self, f: f64) -> Result<Array2<Complex64>> {
        match self {
            Self::Left { mut a, b } => {
                let (x, det) = mldivide(&mut a, &b.view());
                check_det(det, f)?;
                Ok(x)
            }
            Self::Right { mut a, b } => {
                let (x, det) = mrdivide(&b.view(), &mut a);
                check_det(det, f)?;
                Ok(x)
            }
            Self::Rows { a, b } => {
                let mut x = Array2::<Complex64>::zeros((b.nrows(), b.ncols()));
                for (i, mut ai) in a.into_iter().enumerate() {
                    let (row, det) = mrdivide(&b.slice(s![i..i + 1, ..]), &mut ai);
                    check_det(det, f)?;
                    x.row_mut(i).assign(&row.row(0));
                }
                Ok(x)
            }
        }
    }
}

#[inline]
fn at(terms: &[Complex64], block: Block, i: usize, j: usize) -> Complex64 {
    block.index(i, j).map_or(ZERO, |k| terms[k])
}

fn block_matrix(terms: &[Complex64], block: Block) -> Array2<Complex64> {
    let mut m = Array2::<Complex64>::zeros((block.rows, block.columns));
    for (i, j, k) in block.cells() {
        m[[i, j]] = terms[k];
    }
    m
}

/// Off-diagonal leakage of TE10, UE10 and UE14; zero for the others
#[inline]
fn leakage(layout: &Layout, terms: &[Complex64], i: usize, j: usize) -> Complex64 {
    layout.el().map_or(ZERO, |block| at(terms, block, i, j))
}

/// Waves at the DUT for measurement column `j`.
///
/// Returns `(a, b)` where `a` holds the wave incident on every DUT port and
/// `b` the wave leaving the DUT at every port with a receiver; together they
/// satisfy `S·a = b` on the receiver rows. Only the column-separable models
/// (U family, UE14 and E12) define these.
pub(crate) fn column_waves(
    layout: &Layout,
    terms: &[Complex64],
    j: usize,
    column: &[Complex64],
    f: f64,
) -> Result<(Vec<Complex64>, Vec<Complex64>)> {
    let rows = layout.rows();
    let ports = layout.ports();
    let corrected = |i: usize| {
        if i == j {
            column[i]
        } else {
            column[i] - leakage(layout, terms, i, j)
        }
    };
    match layout.cal_type() {
        CalType::U8 | CalType::UE10 | CalType::U16 => {
            let (um, ui, ux, us) = (layout.um(), layout.ui(), layout.ux(), layout.us());
            let mut a = vec![ZERO; ports];
            let mut b = vec![ZERO; ports];
            for i in 0..ports {
                a[i] = at(terms, us, i, j);
                b[i] = at(terms, ui, i, j);
                for k in 0..rows {
                    let m = corrected(k);
                    a[i] += at(terms, ux, i, k) * m;
                    b[i] += at(terms, um, i, k) * m;
                }
            }
            Ok((a, b))
        }
        CalType::UE14 => {
            let (um, ux) = (layout.ue14_um(j), layout.ue14_ux(j));
            let mut a: Vec<Complex64> = (0..rows).map(|i| at(terms, ux, i, i) * corrected(i)).collect();
            let mut b: Vec<Complex64> = (0..rows).map(|i| at(terms, um, i, i) * corrected(i)).collect();
            a[j] += terms[layout.ue14_us(j)];
            b[j] += terms[layout.ue14_ui(j)];
            Ok((a, b))
        }
        CalType::E12 => {
            let el = layout.e12_el(j).offset;
            let er = layout.e12_er(j).offset;
            let em = layout.e12_em(j).offset;
            let mut b = Vec::with_capacity(rows);
            for i in 0..rows {
                let tracking = terms[er + i];
                if is_singular(tracking) {
                    return Err(VnaCalError::singular(
                        f,
                        format!("tracking term of cell [{i}][{j}] is zero"),
                    ));
                }
                b.push((column[i] - terms[el + i]) / tracking);
            }
            // ports without a receiver are taken as perfectly matched
            let a = (0..ports)
                .map(|k| {
                    let reflected = if k < rows { terms[em + k] * b[k] } else { ZERO };
                    if k == j {
                        ONE + reflected
                    } else {
                        reflected
                    }
                })
                .collect();
            Ok((a, b))
        }
        other => Err(VnaCalError::UnsupportedShape(format!(
            "{other} calibrations do not separate by measurement column"
        ))),
    }
}

fn fill_t(layout: &Layout, terms: &[Complex64], m: &Array2<Complex64>, shape: Shape) -> System {
    let ts = block_matrix(terms, layout.ts());
    let ti = block_matrix(terms, layout.ti());
    let tx = block_matrix(terms, layout.tx());
    let tm = block_matrix(terms, layout.tm());
    let el = layout
        .el()
        .map(|block| block_matrix(terms, block))
        .unwrap_or_else(|| Array2::zeros((layout.rows(), layout.columns())));
    let equations = |measured: &Array2<Complex64>| {
        let corrected = measured - &el;
        (&ts - &corrected.dot(&tx), corrected.dot(&tm) - &ti)
    };

    match shape {
        Shape::ReversedRow => {
            let (a0, b0) = equations(&m.slice(s![0..1, ..]).to_owned());
            let (a1, b1) = equations(&arr2(&[[m[[1, 1]], m[[1, 0]]]]));
            // the reversed row describes P·S·P; move P onto its coefficients
            System::Left {
                a: arr2(&[[a0[[0, 0]], a0[[0, 1]]], [a1[[0, 1]], a1[[0, 0]]]]),
                b: arr2(&[[b0[[0, 0]], b0[[0, 1]]], [b1[[0, 1]], b1[[0, 0]]]]),
            }
        }
        _ => {
            let (a, b) = equations(m);
            System::Left { a, b }
        }
    }
}

fn fill_columns(layout: &Layout, terms: &[Complex64], m: &Array2<Complex64>, f: f64) -> Result<System> {
    let n = layout.ports();
    let mut a = Array2::<Complex64>::zeros((n, n));
    let mut b = Array2::<Complex64>::zeros((n, n));
    for j in 0..n {
        let column = m.column(j).to_vec();
        let (aj, bj) = column_waves(layout, terms, j, &column, f)?;
        for i in 0..n {
            a[[i, j]] = aj[i];
            b[[i, j]] = bj[i];
        }
    }
    Ok(System::Right { a, b })
}

fn fill_reversed_column(
    layout: &Layout,
    terms: &[Complex64],
    m: &Array2<Complex64>,
    f: f64,
) -> Result<System> {
    let (a0, b0) = column_waves(layout, terms, 0, &[m[[0, 0]], m[[1, 0]]], f)?;
    let (a1, b1) = column_waves(layout, terms, 0, &[m[[1, 1]], m[[0, 1]]], f)?;
    Ok(System::Right {
        a: arr2(&[[a0[0], a1[1]], [a0[1], a1[0]]]),
        b: arr2(&[[b0[0], b1[1]], [b0[1], b1[0]]]),
    })
}

fn fill_reversed_row(
    layout: &Layout,
    terms: &[Complex64],
    m: &Array2<Complex64>,
    f: f64,
) -> Result<System> {
    let row_system = |row: [Complex64; 2]| -> Result<(Array2<Complex64>, [Complex64; 2])> {
        let (a0, b0) = column_waves(layout, terms, 0, &[row[0]], f)?;
        let (a1, b1) = column_waves(layout, terms, 1, &[row[1]], f)?;
        Ok((arr2(&[[a0[0], a1[0]], [a0[1], a1[1]]]), [b0[0], b1[0]]))
    };
    let (a_forward, b_forward) = row_system([m[[0, 0]], m[[0, 1]]])?;
    let (a_reversed, b_reversed) = row_system([m[[1, 1]], m[[1, 0]]])?;
    let a_second = arr2(&[
        [a_reversed[[1, 0]], a_reversed[[1, 1]]],
        [a_reversed[[0, 0]], a_reversed[[0, 1]]],
    ]);
    Ok(System::Rows {
        a: vec![a_forward, a_second],
        b: arr2(&[b_forward, b_reversed]),
    })
}

fn fill(layout: &Layout, terms: &[Complex64], m: &Array2<Complex64>, shape: Shape, f: f64) -> Result<System> {
    if layout.cal_type().is_t() {
        return Ok(fill_t(layout, terms, m, shape));
    }
    match shape {
        Shape::Square => fill_columns(layout, terms, m, f),
        Shape::ReversedColumn => fill_reversed_column(layout, terms, m, f),
        Shape::ReversedRow => fill_reversed_row(layout, terms, m, f),
    }
}

/// Correct `measurement` taken at `frequencies` with `error_terms`.
///
/// Returns an S-parameter network with one port per DUT port, the given
/// frequencies and the calibration's reference impedance on every port.
pub fn apply(
    error_terms: &ErrorTerms,
    config: &CalibrationConfig,
    frequencies: &[f64],
    measurement: Measurement<'_>,
) -> Result<Network> {
    let layout = *error_terms.layout();
    let shape = Shape::of(&layout)?;
    let (rows, columns) = shape.measured_dim(&layout);
    if frequencies.is_empty() {
        return Err(VnaCalError::InvalidDimensions("no frequencies to correct".into()));
    }
    let cells = measurement.cells();
    if cells.dim() != (frequencies.len(), rows, columns) {
        let (nf, r, c) = cells.dim();
        return Err(VnaCalError::InvalidDimensions(format!(
            "expected {}x{rows}x{columns} measurements for a {}x{} {} calibration, got {nf}x{r}x{c}",
            frequencies.len(),
            layout.rows(),
            layout.columns(),
            layout.cal_type()
        )));
    }
    let ratio = match shape {
        Shape::ReversedColumn => Ratio::Columns,
        _ => Ratio::for_type(layout.cal_type()),
    };
    if let Measurement::Ab { a, b } = measurement {
        if shape == Shape::ReversedRow {
            return Err(VnaCalError::UnsupportedShape(
                "1x2 calibrations need ratioed measurements".into(),
            ));
        }
        ratio.check_dims(a, b)?;
    }

    let ports = layout.ports();
    let mut out = Network::init(ParameterType::S, ports, ports, frequencies.len())?;
    out.set_frequency_vector(frequencies)?;
    out.set_z0(error_terms.z0());

    let mut segments = vec![0; layout.term_count()];
    for (findex, &f) in frequencies.iter().enumerate() {
        let terms = error_terms.at_frequency(
            f,
            config.rfi_window,
            config.frequency_tolerance,
            &mut segments,
        )?;
        let m = match measurement {
            Measurement::M(m) => m.slice(s![findex, .., ..]).to_owned(),
            Measurement::Ab { a, b } => ratio.apply(
                a.slice(s![findex, .., ..]),
                b.slice(s![findex, .., ..]),
                f,
            )?,
        };
        let s = fill(&layout, &terms, &m, shape, f)?.solve(f)?;
        trace!(frequency = f, "corrected measurement");
        out.set_matrix(findex, &s.view())?;
    }

    debug!(
        calibration = %error_terms.name(),
        cal_type = %layout.cal_type(),
        ports,
        frequencies = frequencies.len(),
        "applied calibration"
    );
    Ok(out)
}
