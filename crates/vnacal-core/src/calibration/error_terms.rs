//! Solved error terms
//!
//! [`ErrorTerms`] is the result of a calibration: for every term of the
//! [`Layout`] one complex value per calibration frequency.

use std::collections::HashMap;

use num_complex::Complex64;

use super::layout::{CalType, Layout};
use crate::error::{Result, VnaCalError};
use crate::frequency::{check_range, validate_frequencies};
use crate::math::interpolation::rfi;
use crate::properties::Properties;

/// Error terms of one solved calibration
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorTerms {
    name: String,
    layout: Layout,
    frequencies: Vec<f64>,
    /// terms[k][f]: term k at frequency index f
    terms: Vec<Vec<Complex64>>,
    z0: Complex64,
    /// User metadata carried with the calibration
    pub properties: Properties,
}

impl ErrorTerms {
    /// Create from term vectors in layout order.
    pub fn new(
        name: impl Into<String>,
        layout: Layout,
        frequencies: Vec<f64>,
        terms: Vec<Vec<Complex64>>,
        z0: Complex64,
    ) -> Result<Self> {
        validate_frequencies(&frequencies)?;
        if terms.len() != layout.term_count() {
            return Err(VnaCalError::InvalidDimensions(format!(
                "{} calibration of {}x{} needs {} error terms, got {}",
                layout.cal_type(),
                layout.rows(),
                layout.columns(),
                layout.term_count(),
                terms.len()
            )));
        }
        if let Some(bad) = terms.iter().position(|t| t.len() != frequencies.len()) {
            return Err(VnaCalError::InvalidDimensions(format!(
                "error term {} has {} values for {} frequencies",
                bad,
                terms[bad].len(),
                frequencies.len()
            )));
        }
        Ok(Self {
            name: name.into(),
            layout,
            frequencies,
            terms,
            z0,
            properties: Properties::new(),
        })
    }

    /// Create from `(name, values)` pairs as produced by [`Self::named_terms`].
    ///
    /// Pairs may come in any order; every name of the layout must appear
    /// exactly once and no other names are accepted.
    pub fn from_named_terms(
        name: impl Into<String>,
        ctype: CalType,
        rows: usize,
        columns: usize,
        frequencies: Vec<f64>,
        named: Vec<(String, Vec<Complex64>)>,
        z0: Complex64,
    ) -> Result<Self> {
        let layout = Layout::new(ctype, rows, columns)?;
        let positions: HashMap<String, usize> = layout
            .term_names()
            .into_iter()
            .enumerate()
            .map(|(k, n)| (n, k))
            .collect();

        let mut terms: Vec<Option<Vec<Complex64>>> = vec![None; positions.len()];
        for (term, values) in named {
            let k = *positions.get(&term).ok_or_else(|| {
                VnaCalError::InvalidArgument(format!("{term:?} is not a {ctype} error term"))
            })?;
            if terms[k].replace(values).is_some() {
                return Err(VnaCalError::InvalidArgument(format!(
                    "error term {term:?} given twice"
                )));
            }
        }
        let names = layout.term_names();
        let terms = terms
            .into_iter()
            .enumerate()
            .map(|(k, t)| {
                t.ok_or_else(|| {
                    VnaCalError::MissingMeasurement(format!("error term {:?}", names[k]))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, layout, frequencies, terms, z0)
    }

    /// `(name, values)` for every term in layout order
    pub fn named_terms(&self) -> Vec<(String, &[Complex64])> {
        self.layout
            .term_names()
            .into_iter()
            .zip(self.terms.iter().map(|t| t.as_slice()))
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[inline]
    pub fn cal_type(&self) -> CalType {
        self.layout.cal_type()
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Reference impedance the corrected S parameters are given in
    pub fn z0(&self) -> Complex64 {
        self.z0
    }

    /// Values of term `k` over frequency
    pub fn term(&self, k: usize) -> Option<&[Complex64]> {
        self.terms.get(k).map(|t| t.as_slice())
    }

    /// All terms at frequency `f`.
    ///
    /// `segments` holds one interpolation hint per term and is updated in
    /// place; pass a zeroed vector of [`Layout::term_count`] entries.
    /// `tolerance` is the relative slack allowed outside the frequency range.
    pub fn at_frequency(
        &self,
        f: f64,
        window: usize,
        tolerance: f64,
        segments: &mut [usize],
    ) -> Result<Vec<Complex64>> {
        check_range(&self.frequencies, f, tolerance)?;
        Ok(self
            .terms
            .iter()
            .zip(segments.iter_mut())
            .map(|(values, seg)| rfi(&self.frequencies, values, window, seg, f))
            .collect())
    }
}
