//! Frequency interpolation
//!
//! Evaluates network data between stored frequency points using rational
//! function interpolation, cell by cell.

use ndarray::{s, Array2};
use num_complex::Complex64;

use super::core::Network;
use crate::config::CalibrationConfig;
use crate::error::Result;
use crate::frequency::check_range;
use crate::math::interpolation::rfi;

impl Network {
    /// Interpolate the full matrix at frequency `f` (Hz).
    ///
    /// `segment` is a search hint shared by all cells (they share the same
    /// frequency table). Frequencies outside the stored range, widened by
    /// the configured tolerance, are rejected.
    pub fn interpolate_matrix(
        &self,
        f: f64,
        config: &CalibrationConfig,
        segment: &mut usize,
    ) -> Result<Array2<Complex64>> {
        let freqs = self.frequency_vector();
        check_range(freqs, f, config.frequency_tolerance)?;

        let data = self.data();
        let mut out = Array2::<Complex64>::zeros((self.rows(), self.columns()));
        for ((i, j), value) in out.indexed_iter_mut() {
            let column = data.slice(s![.., i, j]).to_vec();
            *value = rfi(freqs, &column, config.rfi_window, segment, f);
        }
        Ok(out)
    }
}
