//! Shared helpers for the integration tests: random error terms and a
//! forward model that synthesizes what a VNA with those errors would read.

#![allow(dead_code)]

use ndarray::{arr2, Array2};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::Rng;
use vnacal_core::calibration::{Block, CalType, ErrorTerms, Layout};
use vnacal_core::math::linalg::minverse;
use vnacal_core::math::matrix_ops::swap_ports;

pub const ONE: Complex64 = Complex64::new(1.0, 0.0);
pub const ZERO: Complex64 = Complex64::new(0.0, 0.0);

pub fn random_complex(rng: &mut StdRng) -> Complex64 {
    Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
}

pub fn random_dut(rng: &mut StdRng, ports: usize) -> Array2<Complex64> {
    Array2::from_shape_fn((ports, ports), |_| random_complex(rng) * 0.5)
}

/// Random but well-conditioned error terms: tracking-like terms near one,
/// everything else small.
pub fn random_error_terms(
    rng: &mut StdRng,
    ctype: CalType,
    rows: usize,
    columns: usize,
    frequencies: &[f64],
) -> ErrorTerms {
    let layout = Layout::new(ctype, rows, columns).unwrap();
    let mut terms = Vec::new();
    for name in layout.term_names() {
        let (prefix, digits) = name.split_at(2);
        let (i, j) = digits.split_at(digits.len() / 2);
        let leading = matches!(prefix, "ts" | "tm" | "um" | "us" | "er")
            && (i == j || matches!(ctype, CalType::UE14 | CalType::E12));
        let mut values = Vec::with_capacity(frequencies.len());
        for _ in frequencies {
            let noise = random_complex(rng) * 0.2;
            values.push(if leading { ONE + noise } else { noise });
        }
        terms.push(values);
    }
    ErrorTerms::new(
        format!("{ctype} {rows}x{columns}"),
        layout,
        frequencies.to_vec(),
        terms,
        Complex64::new(50.0, 0.0),
    )
    .unwrap()
}

/// All terms at frequency index `findex`
pub fn terms_at(error_terms: &ErrorTerms, findex: usize) -> Vec<Complex64> {
    (0..error_terms.layout().term_count())
        .map(|k| error_terms.term(k).unwrap()[findex])
        .collect()
}

pub fn block(terms: &[Complex64], block: Block) -> Array2<Complex64> {
    let mut m = Array2::zeros((block.rows, block.columns));
    for (i, j, k) in block.cells() {
        m[[i, j]] = terms[k];
    }
    m
}

fn inverse(m: &Array2<Complex64>) -> Array2<Complex64> {
    minverse(&mut m.clone()).0
}

fn leakage(layout: &Layout, terms: &[Complex64]) -> Array2<Complex64> {
    layout
        .el()
        .map(|b| block(terms, b))
        .unwrap_or_else(|| Array2::zeros((layout.rows(), layout.columns())))
}

/// Rows × columns measurement of `dut` as seen through the error terms.
pub fn native_measurement(layout: &Layout, terms: &[Complex64], dut: &Array2<Complex64>) -> Array2<Complex64> {
    let (rows, columns) = (layout.rows(), layout.columns());
    let ports = layout.ports();
    match layout.cal_type() {
        CalType::T8 | CalType::TE10 | CalType::T16 => {
            let ts = block(terms, layout.ts());
            let ti = block(terms, layout.ti());
            let tx = block(terms, layout.tx());
            let tm = block(terms, layout.tm());
            (ts.dot(dut) + &ti).dot(&inverse(&(tx.dot(dut) + &tm))) + leakage(layout, terms)
        }
        CalType::U8 | CalType::UE10 | CalType::U16 => {
            let um = block(terms, layout.um());
            let ui = block(terms, layout.ui());
            let ux = block(terms, layout.ux());
            let us = block(terms, layout.us());
            inverse(&(dut.dot(&ux) - &um)).dot(&(ui - dut.dot(&us))) + leakage(layout, terms)
        }
        CalType::UE14 => {
            let el = leakage(layout, terms);
            let mut m = Array2::zeros((rows, columns));
            for j in 0..columns {
                let um = block(terms, layout.ue14_um(j));
                let ux = block(terms, layout.ue14_ux(j));
                let ui = terms[layout.ue14_ui(j)];
                let us = terms[layout.ue14_us(j)];
                let mut rhs = dut.column(j).mapv(|v| -us * v);
                rhs[j] += ui;
                let column = inverse(&(dut.dot(&ux) - &um)).dot(&rhs);
                for i in 0..rows {
                    m[[i, j]] = column[i] + el[[i, j]];
                }
            }
            m
        }
        CalType::E12 => {
            let mut m = Array2::zeros((rows, columns));
            for j in 0..columns {
                let el = layout.e12_el(j).offset;
                let er = layout.e12_er(j).offset;
                let em = layout.e12_em(j).offset;
                let mut system = Array2::<Complex64>::eye(ports);
                for k in 0..rows.min(ports) {
                    for i in 0..ports {
                        system[[i, k]] -= dut[[i, k]] * terms[em + k];
                    }
                }
                let b = inverse(&system).dot(&dut.column(j));
                for i in 0..rows {
                    m[[i, j]] = terms[el + i] + terms[er + i] * b[i];
                }
            }
            m
        }
    }
}

/// Measurement in the layout `apply` expects: the native measurement for
/// square calibrations, and for 1×2 / 2×1 calibrations a 2×2 matrix whose
/// second row / column comes from the reversed DUT with its entries exchanged.
pub fn measurement(layout: &Layout, terms: &[Complex64], dut: &Array2<Complex64>) -> Array2<Complex64> {
    let forward = native_measurement(layout, terms, dut);
    match (layout.rows(), layout.columns()) {
        (r, c) if r == c => forward,
        (1, 2) => {
            let reversed = native_measurement(layout, terms, &swap_ports(&dut.view()));
            arr2(&[
                [forward[[0, 0]], forward[[0, 1]]],
                [reversed[[0, 1]], reversed[[0, 0]]],
            ])
        }
        (2, 1) => {
            let reversed = native_measurement(layout, terms, &swap_ports(&dut.view()));
            arr2(&[
                [forward[[0, 0]], reversed[[1, 0]]],
                [forward[[1, 0]], reversed[[0, 0]]],
            ])
        }
        (r, c) => panic!("no whole-matrix measurement for {r}x{c}"),
    }
}

pub fn assert_matrix_close(got: &Array2<Complex64>, expected: &Array2<Complex64>, tolerance: f64, what: &str) {
    assert_eq!(got.dim(), expected.dim(), "{what}: shape");
    for ((i, j), e) in expected.indexed_iter() {
        let g = got[[i, j]];
        assert!(
            (g - e).norm() <= tolerance * e.norm().max(1.0),
            "{what}: [{i}][{j}] got {g}, expected {e}"
        );
    }
}
