//! Parameter-matrix analysis
//!
//! A calibration step describes what is connected to the VNA as a matrix of
//! parameters. Cells may name elements of multi-port standards, in which
//! case the standard's ports have to line up with the matrix ports
//! consistently. [`analyze`] checks that and records, per standard, the
//! mapping from standard ports to matrix ports, so that [`eval_matrix`] can
//! evaluate each standard once per frequency.

use std::rc::Rc;

use ndarray::Array2;
use num_complex::Complex64;

use super::{ParameterRef, StandardRef};
use crate::config::CalibrationConfig;
use crate::error::{Result, VnaCalError};

/// A matrix cell filled from a standard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardCell {
    pub row: usize,
    pub column: usize,
    pub standard_row: usize,
    pub standard_column: usize,
}

/// Placement of one standard in the matrix
#[derive(Debug, Clone)]
pub struct StandardMap {
    pub standard: StandardRef,
    /// `port_map[p]` is the matrix port of standard port `p`
    pub port_map: Vec<usize>,
    pub cells: Vec<StandardCell>,
}

/// A matrix cell holding an ordinary parameter
#[derive(Debug, Clone)]
pub struct PlainCell {
    pub row: usize,
    pub column: usize,
    pub parameter: ParameterRef,
}

/// Result of [`analyze`]
#[derive(Debug, Clone)]
pub struct ParameterMatrixMap {
    rows: usize,
    columns: usize,
    standards: Vec<StandardMap>,
    plain: Vec<PlainCell>,
}

impl ParameterMatrixMap {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn standards(&self) -> &[StandardMap] {
        &self.standards
    }

    pub fn plain_cells(&self) -> &[PlainCell] {
        &self.plain
    }
}

fn cell_error(row: usize, column: usize, message: String) -> VnaCalError {
    VnaCalError::ParameterMatrix {
        row,
        column,
        message,
    }
}

struct Partial {
    standard: StandardRef,
    ports: Vec<Option<usize>>,
    cells: Vec<StandardCell>,
}

/// Analyze a row-major `rows` × `columns` matrix of parameters.
///
/// Unknown parameters resolve to their initial guess when `resolve_initial`
/// is set or when they have not been solved yet; correlated parameters
/// resolve to their target.
pub fn analyze(
    cells: &[ParameterRef],
    rows: usize,
    columns: usize,
    resolve_initial: bool,
) -> Result<ParameterMatrixMap> {
    if rows == 0 || columns == 0 || cells.len() != rows * columns {
        return Err(VnaCalError::InvalidDimensions(format!(
            "{} cells for a {rows}x{columns} parameter matrix",
            cells.len()
        )));
    }
    let ports = rows.max(columns);
    let mut owner: Vec<Option<usize>> = vec![None; ports];
    let mut partial: Vec<Partial> = Vec::new();
    let mut plain: Vec<PlainCell> = Vec::new();

    for (k, cell) in cells.iter().enumerate() {
        let (row, column) = (k / columns, k % columns);
        let resolved = cell.resolve(resolve_initial);
        let element = match resolved.standard_element_ref() {
            Some(e) => e.clone(),
            None => {
                plain.push(PlainCell {
                    row,
                    column,
                    parameter: resolved,
                });
                continue;
            }
        };
        let name = element.standard.name().to_string();

        if (element.row == element.column) != (row == column) {
            let what = if element.row == element.column {
                "diagonal element of standard"
            } else {
                "off-diagonal element of standard"
            };
            let place = if row == column { "on" } else { "off" };
            return Err(cell_error(
                row,
                column,
                format!("{what} {name:?} cannot appear {place} the matrix diagonal"),
            ));
        }

        let index = match partial
            .iter()
            .position(|p| Rc::ptr_eq(&p.standard, &element.standard))
        {
            Some(i) => i,
            None => {
                partial.push(Partial {
                    standard: Rc::clone(&element.standard),
                    ports: vec![None; element.standard.ports()],
                    cells: Vec::new(),
                });
                partial.len() - 1
            }
        };

        for (standard_port, matrix_port) in [(element.row, row), (element.column, column)] {
            if let Some(o) = owner[matrix_port].filter(|&o| o != index) {
                return Err(cell_error(
                    row,
                    column,
                    format!(
                        "port {} is already used by standard {:?}",
                        matrix_port + 1,
                        partial[o].standard.name()
                    ),
                ));
            }
            let entry = &mut partial[index];
            if let Some(previous) = entry.ports[standard_port] {
                if previous != matrix_port {
                    return Err(cell_error(
                        row,
                        column,
                        format!(
                            "port {} of standard {name:?} is already mapped to port {}",
                            standard_port + 1,
                            previous + 1
                        ),
                    ));
                }
            }
            if let Some(other) = entry
                .ports
                .iter()
                .enumerate()
                .position(|(p, m)| p != standard_port && *m == Some(matrix_port))
            {
                return Err(cell_error(
                    row,
                    column,
                    format!(
                        "ports {} and {} of standard {name:?} both map to port {}",
                        other + 1,
                        standard_port + 1,
                        matrix_port + 1
                    ),
                ));
            }
            owner[matrix_port] = Some(index);
            entry.ports[standard_port] = Some(matrix_port);
        }
        partial[index].cells.push(StandardCell {
            row,
            column,
            standard_row: element.row,
            standard_column: element.column,
        });
    }

    for cell in &plain {
        let (row_owner, column_owner) = (owner[cell.row], owner[cell.column]);
        if let (Some(a), Some(b)) = (row_owner, column_owner) {
            if a == b {
                return Err(cell_error(
                    cell.row,
                    cell.column,
                    format!(
                        "cell belongs to standard {:?} but holds a {} parameter",
                        partial[a].standard.name(),
                        cell.parameter.kind_name()
                    ),
                ));
            }
        }
        if let Some(o) = row_owner.or(column_owner) {
            if !cell.parameter.is_exact_zero() {
                return Err(cell_error(
                    cell.row,
                    cell.column,
                    format!(
                        "row or column of standard {:?} cannot hold a {} parameter",
                        partial[o].standard.name(),
                        cell.parameter.kind_name()
                    ),
                ));
            }
        }
    }

    let mut standards = Vec::with_capacity(partial.len());
    for entry in partial {
        let mut port_map = Vec::with_capacity(entry.ports.len());
        for (p, m) in entry.ports.iter().enumerate() {
            match m {
                Some(m) => port_map.push(*m),
                None => {
                    let first = entry.cells[0];
                    return Err(cell_error(
                        first.row,
                        first.column,
                        format!(
                            "port {} of standard {:?} is not connected",
                            p + 1,
                            entry.standard.name()
                        ),
                    ));
                }
            }
        }
        standards.push(StandardMap {
            standard: entry.standard,
            port_map,
            cells: entry.cells,
        });
    }

    Ok(ParameterMatrixMap {
        rows,
        columns,
        standards,
        plain,
    })
}

/// Evaluate an analyzed matrix at frequency `f` with reference impedance `z0`.
///
/// Each standard is evaluated once and scattered into its cells.
pub fn eval_matrix(
    map: &ParameterMatrixMap,
    f: f64,
    z0: Complex64,
    config: &CalibrationConfig,
) -> Result<Array2<Complex64>> {
    let mut out = Array2::<Complex64>::zeros((map.rows, map.columns));
    for entry in &map.standards {
        let z = vec![z0; entry.standard.ports()];
        let s = entry.standard.eval_renormalized(f, &z, config)?;
        for cell in &entry.cells {
            out[[cell.row, cell.column]] = s[[cell.standard_row, cell.standard_column]];
        }
    }
    for cell in &map.plain {
        out[[cell.row, cell.column]] = cell.parameter.eval(f, z0, config)?;
    }
    Ok(out)
}
