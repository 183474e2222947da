//! Error-term layout
//!
//! A calibration stores its error terms as one flat vector per frequency.
//! [`Layout`] describes how that vector is sliced into the named
//! sub-matrices of each calibration model, given the dimensions of the VNA
//! measurement matrix. Layouts are cheap to compute and are recomputed
//! wherever they are needed.
//!
//! With `r` measurement rows, `c` measurement columns and `s = max(r, c)`
//! DUT ports:
//!
//! | type | sub-matrices (terms) |
//! |------|----------------------|
//! | T8   | ts: r, ti: r, tx: s, tm: s (diagonals) |
//! | TE10 | T8 + el: r·c − min(r, c) |
//! | T16  | ts: r·s, ti: r·s, tx: c·s, tm: c·s |
//! | U8   | um: s, ui: c, ux: s, us: c (diagonals) |
//! | UE10 | U8 + el |
//! | U16  | um: s·r, ui: s·c, ux: s·r, us: s·c |
//! | UE14 | per column: um r, ui 1, ux r, us 1; then el |
//! | E12  | per column: el r, er r, em r |

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, VnaCalError};

/// Calibration model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalType {
    T8,
    U8,
    TE10,
    UE10,
    T16,
    U16,
    UE14,
    E12,
}

impl CalType {
    pub const ALL: [CalType; 8] = [
        CalType::T8,
        CalType::U8,
        CalType::TE10,
        CalType::UE10,
        CalType::T16,
        CalType::U16,
        CalType::UE14,
        CalType::E12,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::T8 => "T8",
            Self::U8 => "U8",
            Self::TE10 => "TE10",
            Self::UE10 => "UE10",
            Self::T16 => "T16",
            Self::U16 => "U16",
            Self::UE14 => "UE14",
            Self::E12 => "E12",
        }
    }

    /// True for the scattering-transfer models solved as `A·S = B`
    pub fn is_t(&self) -> bool {
        matches!(self, Self::T8 | Self::TE10 | Self::T16)
    }

    /// True for the inverse transfer models solved as `S·A = B` with global matrices
    pub fn is_u(&self) -> bool {
        matches!(self, Self::U8 | Self::UE10 | Self::U16)
    }

    /// True when each measurement column is an independent linear system
    pub fn is_column_system(&self) -> bool {
        matches!(self, Self::UE14 | Self::E12)
    }

    /// True when the model carries explicit off-diagonal leakage terms
    pub fn has_leakage(&self) -> bool {
        matches!(self, Self::TE10 | Self::UE10 | Self::UE14 | Self::E12)
    }

    /// True for models the port-mapped apply path can use
    pub fn is_column_separable(&self) -> bool {
        !self.is_t()
    }
}

impl fmt::Display for CalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CalType {
    type Err = VnaCalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| VnaCalError::InvalidArgument(format!("unknown calibration type {s:?}")))
    }
}

/// Shape of a sub-matrix inside the flat error-term vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockShape {
    /// Only the diagonal of a rows × columns matrix is stored
    Diagonal,
    /// Every element, row-major
    Full,
    /// Every element except the diagonal, row-major
    OffDiagonal,
}

/// One named sub-matrix of the error-term vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub offset: usize,
    pub rows: usize,
    pub columns: usize,
    pub shape: BlockShape,
}

impl Block {
    fn new(offset: usize, rows: usize, columns: usize, shape: BlockShape) -> Self {
        Self {
            offset,
            rows,
            columns,
            shape,
        }
    }

    /// Number of stored terms
    pub fn count(&self) -> usize {
        match self.shape {
            BlockShape::Diagonal => self.rows.min(self.columns),
            BlockShape::Full => self.rows * self.columns,
            BlockShape::OffDiagonal => self.rows * self.columns - self.rows.min(self.columns),
        }
    }

    /// Offset one past the last term
    pub fn end(&self) -> usize {
        self.offset + self.count()
    }

    /// Position of element (i, j) in the flat vector, if it is stored.
    pub fn index(&self, i: usize, j: usize) -> Option<usize> {
        if i >= self.rows || j >= self.columns {
            return None;
        }
        match self.shape {
            BlockShape::Diagonal => (i == j).then_some(self.offset + i),
            BlockShape::Full => Some(self.offset + i * self.columns + j),
            BlockShape::OffDiagonal => {
                if i == j {
                    return None;
                }
                // diagonal cells before (i, j) in row-major order
                let skipped = i.min(self.columns) + usize::from(i < self.columns && j > i);
                Some(self.offset + i * self.columns + j - skipped)
            }
        }
    }

    /// Every stored element as `(i, j, flat index)`, in storage order
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..self.rows)
            .flat_map(move |i| (0..self.columns).map(move |j| (i, j)))
            .filter_map(move |(i, j)| self.index(i, j).map(|k| (i, j, k)))
    }
}

/// Error-term layout for one calibration type and measurement shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    ctype: CalType,
    rows: usize,
    columns: usize,
}

impl Layout {
    /// Validate the shape against the calibration type.
    pub fn new(ctype: CalType, rows: usize, columns: usize) -> Result<Self> {
        if rows == 0 || columns == 0 {
            return Err(VnaCalError::InvalidDimensions(format!(
                "calibration needs at least one row and column, got {rows}x{columns}"
            )));
        }
        if ctype.is_t() && rows > columns {
            return Err(VnaCalError::InvalidDimensions(format!(
                "{ctype} calibrations need rows <= columns, got {rows}x{columns}"
            )));
        }
        if (ctype.is_u() || ctype == CalType::UE14) && rows < columns {
            return Err(VnaCalError::InvalidDimensions(format!(
                "{ctype} calibrations need rows >= columns, got {rows}x{columns}"
            )));
        }
        Ok(Self {
            ctype,
            rows,
            columns,
        })
    }

    #[inline]
    pub fn cal_type(&self) -> CalType {
        self.ctype
    }

    /// Measurement matrix rows (VNA receivers)
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Measurement matrix columns (driven VNA ports)
    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// DUT ports of the full correction
    #[inline]
    pub fn ports(&self) -> usize {
        self.rows.max(self.columns)
    }

    fn shape(&self) -> BlockShape {
        match self.ctype {
            CalType::T16 | CalType::U16 => BlockShape::Full,
            _ => BlockShape::Diagonal,
        }
    }

    // T family: (Ts - M'·Tx)·S = M'·Tm - Ti

    pub fn ts(&self) -> Block {
        Block::new(0, self.rows, self.ports(), self.shape())
    }

    pub fn ti(&self) -> Block {
        let prev = self.ts();
        Block::new(prev.end(), self.rows, self.ports(), self.shape())
    }

    pub fn tx(&self) -> Block {
        let prev = self.ti();
        Block::new(prev.end(), self.columns, self.ports(), self.shape())
    }

    pub fn tm(&self) -> Block {
        let prev = self.tx();
        Block::new(prev.end(), self.columns, self.ports(), self.shape())
    }

    // U family: S·(Ux·M' + Us) = Um·M' + Ui

    pub fn um(&self) -> Block {
        Block::new(0, self.ports(), self.rows, self.shape())
    }

    pub fn ui(&self) -> Block {
        let prev = self.um();
        Block::new(prev.end(), self.ports(), self.columns, self.shape())
    }

    pub fn ux(&self) -> Block {
        let prev = self.ui();
        Block::new(prev.end(), self.ports(), self.rows, self.shape())
    }

    pub fn us(&self) -> Block {
        let prev = self.ux();
        Block::new(prev.end(), self.ports(), self.columns, self.shape())
    }

    // UE14: one system per column j

    fn ue14_stride(&self) -> usize {
        2 * self.rows + 2
    }

    /// Diagonal of Um for column j
    pub fn ue14_um(&self, j: usize) -> Block {
        Block::new(j * self.ue14_stride(), self.rows, self.rows, BlockShape::Diagonal)
    }

    /// Scalar Ui for column j
    pub fn ue14_ui(&self, j: usize) -> usize {
        j * self.ue14_stride() + self.rows
    }

    /// Diagonal of Ux for column j
    pub fn ue14_ux(&self, j: usize) -> Block {
        Block::new(
            j * self.ue14_stride() + self.rows + 1,
            self.rows,
            self.rows,
            BlockShape::Diagonal,
        )
    }

    /// Scalar Us for column j
    pub fn ue14_us(&self, j: usize) -> usize {
        j * self.ue14_stride() + 2 * self.rows + 1
    }

    // E12: one system per column j

    /// Directivity (diagonal) and leakage terms of column j
    pub fn e12_el(&self, j: usize) -> Block {
        Block::new(3 * self.rows * j, self.rows, 1, BlockShape::Full)
    }

    /// Reflection (diagonal) and transmission tracking of column j
    pub fn e12_er(&self, j: usize) -> Block {
        Block::new(3 * self.rows * j + self.rows, self.rows, 1, BlockShape::Full)
    }

    /// Source match (diagonal) and load match of column j
    pub fn e12_em(&self, j: usize) -> Block {
        Block::new(3 * self.rows * j + 2 * self.rows, self.rows, 1, BlockShape::Full)
    }

    /// Off-diagonal leakage of TE10, UE10 and UE14.
    ///
    /// Returns `None` for models without a separate leakage matrix.
    pub fn el(&self) -> Option<Block> {
        let offset = match self.ctype {
            CalType::TE10 => self.tm().end(),
            CalType::UE10 => self.us().end(),
            CalType::UE14 => self.columns * self.ue14_stride(),
            _ => return None,
        };
        Some(Block::new(offset, self.rows, self.columns, BlockShape::OffDiagonal))
    }

    /// Total number of error terms
    pub fn term_count(&self) -> usize {
        match self.ctype {
            CalType::T8 | CalType::T16 => self.tm().end(),
            CalType::U8 | CalType::U16 => self.us().end(),
            CalType::TE10 | CalType::UE10 | CalType::UE14 => {
                self.el().map(|b| b.end()).unwrap_or(0)
            }
            CalType::E12 => 3 * self.rows * self.columns,
        }
    }

    /// Names of all error terms in storage order.
    ///
    /// Names are a sub-matrix prefix followed by 1-based row and column
    /// indices, e.g. `ts11` or `em21`. When any dimension exceeds nine the
    /// indices are written with two digits each.
    pub fn term_names(&self) -> Vec<String> {
        let wide = self.ports() > 9;
        let name = |prefix: &str, i: usize, j: usize| {
            if wide {
                format!("{prefix}{:02}{:02}", i + 1, j + 1)
            } else {
                format!("{prefix}{}{}", i + 1, j + 1)
            }
        };

        let mut names = vec![String::new(); self.term_count()];
        let mut put = |prefix: &str, block: Block| {
            for (i, j, k) in block.cells() {
                names[k] = name(prefix, i, j);
            }
        };
        match self.ctype {
            CalType::T8 | CalType::TE10 | CalType::T16 => {
                put("ts", self.ts());
                put("ti", self.ti());
                put("tx", self.tx());
                put("tm", self.tm());
            }
            CalType::U8 | CalType::UE10 | CalType::U16 => {
                put("um", self.um());
                put("ui", self.ui());
                put("ux", self.ux());
                put("us", self.us());
            }
            CalType::UE14 => {
                for j in 0..self.columns {
                    // the per-column diagonals are named by (receiver, column)
                    for i in 0..self.rows {
                        if let Some(k) = self.ue14_um(j).index(i, i) {
                            names[k] = name("um", i, j);
                        }
                        if let Some(k) = self.ue14_ux(j).index(i, i) {
                            names[k] = name("ux", i, j);
                        }
                    }
                    names[self.ue14_ui(j)] = name("ui", j, j);
                    names[self.ue14_us(j)] = name("us", j, j);
                }
            }
            CalType::E12 => {
                for j in 0..self.columns {
                    for i in 0..self.rows {
                        names[self.e12_el(j).offset + i] = name("el", i, j);
                        names[self.e12_er(j).offset + i] = name("er", i, j);
                        names[self.e12_em(j).offset + i] = name("em", i, j);
                    }
                }
            }
        }
        if let Some(el) = self.el() {
            for (i, j, k) in el.cells() {
                names[k] = name("el", i, j);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_port_term_counts() {
        let expected = [
            (CalType::T8, 8),
            (CalType::U8, 8),
            (CalType::TE10, 10),
            (CalType::UE10, 10),
            (CalType::T16, 16),
            (CalType::U16, 16),
            (CalType::UE14, 14),
            (CalType::E12, 12),
        ];
        for (ctype, count) in expected {
            let layout = Layout::new(ctype, 2, 2).unwrap();
            assert_eq!(layout.term_count(), count, "{ctype}");
            assert_eq!(layout.term_names().len(), count);
        }
    }

    #[test]
    fn test_shape_constraints() {
        assert!(Layout::new(CalType::T8, 2, 1).is_err());
        assert!(Layout::new(CalType::T8, 1, 2).is_ok());
        assert!(Layout::new(CalType::U16, 1, 2).is_err());
        assert!(Layout::new(CalType::UE14, 3, 2).is_ok());
        assert!(Layout::new(CalType::UE14, 2, 3).is_err());
        assert!(Layout::new(CalType::E12, 1, 3).is_ok());
        assert!(Layout::new(CalType::E12, 0, 3).is_err());
    }

    #[test]
    fn test_rectangular_counts() {
        // 1x2 T8: ts 1, ti 1, tx 2, tm 2
        let t8 = Layout::new(CalType::T8, 1, 2).unwrap();
        assert_eq!(t8.term_count(), 6);
        // 3x2 UE14: per column 3+1+3+1, leakage 6-2
        let ue14 = Layout::new(CalType::UE14, 3, 2).unwrap();
        assert_eq!(ue14.term_count(), 2 * 8 + 4);
        assert_eq!(Layout::new(CalType::E12, 2, 3).unwrap().term_count(), 18);
    }

    #[test]
    fn test_off_diagonal_index() {
        let block = Block::new(10, 3, 2, BlockShape::OffDiagonal);
        let got: Vec<_> = block.cells().collect();
        assert_eq!(
            got,
            vec![(0, 1, 10), (1, 0, 11), (2, 0, 12), (2, 1, 13)]
        );
        assert_eq!(block.count(), 4);
        assert_eq!(block.index(1, 1), None);

        let wide = Block::new(0, 2, 3, BlockShape::OffDiagonal);
        let got: Vec<_> = wide.cells().map(|(_, _, k)| k).collect();
        assert_eq!(got, vec![0, 1, 2, 3]);
        assert_eq!(wide.index(1, 2), Some(3));
    }

    #[test]
    fn test_term_names() {
        let names = Layout::new(CalType::TE10, 2, 2).unwrap().term_names();
        assert_eq!(
            names,
            vec!["ts11", "ts22", "ti11", "ti22", "tx11", "tx22", "tm11", "tm22", "el12", "el21"]
        );
        let names = Layout::new(CalType::E12, 2, 2).unwrap().term_names();
        assert_eq!(&names[..6], &["el11", "el21", "er11", "er21", "em11", "em21"]);
        let names = Layout::new(CalType::UE14, 2, 2).unwrap().term_names();
        assert_eq!(&names[..6], &["um11", "um21", "ui11", "ux11", "ux21", "us11"]);
        assert!(names.iter().all(|n| !n.is_empty()));
    }

    #[test]
    fn test_cal_type_parse() {
        for ctype in CalType::ALL {
            assert_eq!(ctype.name().parse::<CalType>().unwrap(), ctype);
        }
        assert!("X9".parse::<CalType>().is_err());
    }
}
