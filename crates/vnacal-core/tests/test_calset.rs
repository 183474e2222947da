//! Calibration set tests
//!
//! Measurements of short, open, load and through standards are synthesized
//! from known E12 error terms; solving must recover those terms and the
//! resulting calibration must reproduce DUTs measured through them.

mod common;

use approx::assert_relative_eq;
use common::{assert_matrix_close, native_measurement, random_complex, random_dut, random_error_terms, terms_at, ONE, ZERO};
use ndarray::{arr2, s, Array2, Array3};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use vnacal_core::calibration::{
    CalSet, CalType, Calibration, ErrorTerms, Reference, TERM_LEAKAGE, TERM_THROUGH, TERM_THROUGH_MATCH,
};
use vnacal_core::parameter::{CalkitStandard, OffsetLine, Standard};
use vnacal_core::{CalibrationConfig, Network, VnaCalError};

const FREQUENCIES: [f64; 4] = [1.0e9, 2.0e9, 4.0e9, 8.0e9];
const Z0: Complex64 = Complex64::new(50.0, 0.0);

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

/// Measurements of `dut` at every frequency, `[frequency][row][column]`
fn measure_all(error_terms: &ErrorTerms, dut: impl Fn(usize) -> Array2<Complex64>) -> Vec<Array2<Complex64>> {
    (0..error_terms.frequencies().len())
        .map(|findex| native_measurement(error_terms.layout(), &terms_at(error_terms, findex), &dut(findex)))
        .collect()
}

fn cell(measured: &[Array2<Complex64>], row: usize, column: usize) -> Vec<Complex64> {
    measured.iter().map(|m| m[[row, column]]).collect()
}

/// Fill a square calset from the E12 terms with reflection references
/// given per frequency, a through between every port pair and isolation.
fn fill_calset(calset: &mut CalSet, truth: &ErrorTerms, gammas: &[Vec<Complex64>; 3]) {
    let ports = truth.layout().rows();
    for (k, g) in gammas.iter().enumerate() {
        let measured = measure_all(truth, |findex| Array2::from_diag_elem(ports, g[findex]));
        for j in 0..ports {
            calset.add(j, j, k, &cell(&measured, j, j)).unwrap();
        }
    }
    let isolation = measure_all(truth, |_| Array2::zeros((ports, ports)));
    for i in 0..ports {
        for j in 0..ports {
            if i == j {
                continue;
            }
            let through = measure_all(truth, |_| {
                let mut s = Array2::zeros((ports, ports));
                s[[i, j]] = ONE;
                s[[j, i]] = ONE;
                s
            });
            calset.add(i, j, TERM_LEAKAGE, &cell(&isolation, i, j)).unwrap();
            calset.add(i, j, TERM_THROUGH, &cell(&through, i, j)).unwrap();
            calset.add(i, j, TERM_THROUGH_MATCH, &cell(&through, j, j)).unwrap();
        }
    }
}

fn assert_terms_match(got: &ErrorTerms, expected: &ErrorTerms) {
    let got = got.named_terms();
    let expected = expected.named_terms();
    assert_eq!(got.len(), expected.len());
    for ((gname, gvalues), (ename, evalues)) in got.iter().zip(&expected) {
        assert_eq!(gname, ename);
        for (g, e) in gvalues.iter().zip(evalues.iter()) {
            assert!((g - e).norm() < 1e-9, "{gname}: got {g}, expected {e}");
        }
    }
}

fn constant_gammas() -> [Vec<Complex64>; 3] {
    let n = FREQUENCIES.len();
    [vec![c(-1.0, 0.0); n], vec![ONE; n], vec![ZERO; n]]
}

#[test]
fn test_two_port_terms_recovered() {
    let mut rng = StdRng::seed_from_u64(11);
    let truth = random_error_terms(&mut rng, CalType::E12, 2, 2, &FREQUENCIES);
    let gammas = constant_gammas();

    let mut calset = CalSet::new("two-port", 2, 2, FREQUENCIES.to_vec(), Z0).unwrap();
    for (k, g) in gammas.iter().enumerate() {
        calset.set_reference(k, Reference::Constant(g[0])).unwrap();
    }
    fill_calset(&mut calset, &truth, &gammas);

    let solved = calset.solve().unwrap();
    assert_eq!(solved.cal_type(), CalType::E12);
    assert_eq!(solved.name(), "two-port");
    assert_terms_match(&solved, &truth);
}

#[test]
fn test_three_port_calset_corrects_dut() {
    let mut rng = StdRng::seed_from_u64(12);
    let truth = random_error_terms(&mut rng, CalType::E12, 3, 3, &FREQUENCIES);
    let gammas = constant_gammas();
    let mut calset = CalSet::new("three-port", 3, 3, FREQUENCIES.to_vec(), Z0).unwrap();
    for (k, g) in gammas.iter().enumerate() {
        calset.set_reference(k, Reference::Constant(g[0])).unwrap();
    }
    fill_calset(&mut calset, &truth, &gammas);

    let mut calibration = Calibration::new();
    let index = calibration.add_calset(&calset).unwrap();
    assert_eq!(calibration.find_calibration("three-port"), Some(index));

    let duts: Vec<Array2<Complex64>> = FREQUENCIES.iter().map(|_| random_dut(&mut rng, 3)).collect();
    let measured = measure_all(&truth, |findex| duts[findex].clone());
    let mut m = Array3::zeros((FREQUENCIES.len(), 3, 3));
    for (findex, mf) in measured.iter().enumerate() {
        m.slice_mut(s![findex, .., ..]).assign(mf);
    }
    let corrected = calibration.apply_m(index, &FREQUENCIES, &m).unwrap();
    for (findex, dut) in duts.iter().enumerate() {
        assert_matrix_close(&corrected.get_matrix(findex).unwrap(), dut, 1e-9, "three-port");
    }
}

#[test]
fn test_ideal_two_port_reproduces_dut_at_node() -> anyhow::Result<()> {
    // error-free analyzer: every measurement equals the standard itself
    let f = vec![1.0e9];
    let mut calset = CalSet::new("ideal", 2, 2, f.clone(), Z0)?;
    for (k, g) in [c(-1.0, 0.0), ONE, ZERO].into_iter().enumerate() {
        calset.set_reference(k, Reference::Constant(g))?;
        calset.add(0, 0, k, &[g])?;
        calset.add(1, 1, k, &[g])?;
    }
    for (i, j) in [(0, 1), (1, 0)] {
        calset.add(i, j, TERM_THROUGH, &[ONE])?;
        calset.add(i, j, TERM_THROUGH_MATCH, &[ZERO])?;
    }

    let mut calibration = Calibration::new();
    let index = calibration.add_calset(&calset)?;
    let dut = arr2(&[[c(0.1, 0.2), c(0.7, -0.1)], [c(0.7, -0.1), c(-0.3, 0.05)]]);
    let m = dut.clone().into_shape_with_order((1, 2, 2))?;
    let corrected = calibration.apply_m(index, &f, &m)?;
    assert_matrix_close(&corrected.get_matrix(0)?, &dut, 1e-12, "ideal");
    Ok(())
}

#[test]
fn test_calkit_references() {
    let mut rng = StdRng::seed_from_u64(13);
    let truth = random_error_terms(&mut rng, CalType::E12, 1, 1, &FREQUENCIES);

    let offset = OffsetLine {
        delay: 31.8e-12,
        loss: 2.0e9,
        ..OffsetLine::default()
    };
    let short = Standard::calkit("short", CalkitStandard::short([2.0e-12, 0.0, 0.0, 0.0], offset)).unwrap();
    let open = Standard::calkit("open", CalkitStandard::open([50.0e-15, 1.0e-27, 0.0, 0.0], offset)).unwrap();
    let load = Standard::calkit("load", CalkitStandard::load(c(50.5, 0.2), OffsetLine::default())).unwrap();

    let mut calibration = Calibration::new();
    let mut calset = CalSet::new("kit", 1, 1, FREQUENCIES.to_vec(), Z0).unwrap();
    let mut gammas: [Vec<Complex64>; 3] = Default::default();
    for (k, standard) in [short, open, load].iter().enumerate() {
        let index = calibration.make_calkit(standard, 0, 0).unwrap();
        let parameter = calibration.get_parameter(index).unwrap();
        gammas[k] = FREQUENCIES.iter().map(|&f| calibration.eval_parameter(index, f, Z0).unwrap()).collect();
        calset.set_reference(k, Reference::Parameter(parameter)).unwrap();
    }
    // the offset makes the short and open rotate away from -1 and +1
    assert!((gammas[0][3] - c(-1.0, 0.0)).norm() > 0.1);
    fill_calset(&mut calset, &truth, &gammas);

    assert_terms_match(&calset.solve().unwrap(), &truth);
}

#[test]
fn test_data_and_vector_references() {
    let mut rng = StdRng::seed_from_u64(14);
    let truth = random_error_terms(&mut rng, CalType::E12, 1, 1, &FREQUENCIES);

    // references tabulated on a grid that contains every calibration frequency
    let grid: Vec<f64> = (1..=8).map(|k| k as f64 * 1.0e9).collect();
    let short: Vec<Complex64> = grid.iter().map(|&f| Complex64::from_polar(0.99, std::f64::consts::PI - f * 1e-10)).collect();
    let open: Vec<Complex64> = grid.iter().map(|&f| Complex64::from_polar(0.98, -f * 1e-10)).collect();
    let load: Vec<Complex64> = grid.iter().map(|_| random_complex(&mut rng) * 0.05).collect();

    let s = Array3::from_shape_vec((grid.len(), 1, 1), short.clone()).unwrap();
    let network = Network::from_s(grid.clone(), s, &[Z0]).unwrap();
    let short_standard = Standard::data("measured short", network).unwrap();

    let mut calibration = Calibration::new();
    let short_index = calibration.make_data(&short_standard, 0, 0).unwrap();
    let open_index = calibration.make_vector(grid.clone(), open.clone()).unwrap();

    let mut calset = CalSet::new("data", 1, 1, FREQUENCIES.to_vec(), Z0).unwrap();
    calset
        .set_reference(0, Reference::Parameter(calibration.get_parameter(short_index).unwrap()))
        .unwrap();
    calset
        .set_reference(1, Reference::Parameter(calibration.get_parameter(open_index).unwrap()))
        .unwrap();
    calset
        .set_reference(2, Reference::Vector { frequencies: grid.clone(), values: load.clone() })
        .unwrap();

    let at_nodes = |values: &[Complex64]| -> Vec<Complex64> {
        FREQUENCIES
            .iter()
            .map(|f| values[grid.iter().position(|g| g == f).unwrap()])
            .collect()
    };
    let gammas = [at_nodes(&short), at_nodes(&open), at_nodes(&load)];
    fill_calset(&mut calset, &truth, &gammas);

    assert_terms_match(&calset.solve().unwrap(), &truth);
}

#[test]
fn test_reference_out_of_range() {
    let mut calset = CalSet::new("narrow", 1, 1, vec![1.0e9, 5.0e9], Z0).unwrap();
    calset
        .set_reference(
            0,
            Reference::Vector {
                frequencies: vec![1.0e9, 2.0e9],
                values: vec![c(-1.0, 0.0); 2],
            },
        )
        .unwrap();
    calset.set_reference(1, Reference::Constant(ONE)).unwrap();
    calset.set_reference(2, Reference::Constant(ZERO)).unwrap();
    for k in 0..3 {
        calset.add(0, 0, k, &[ZERO, ZERO]).unwrap();
    }
    assert!(matches!(calset.solve(), Err(VnaCalError::FrequencyOutOfRange { .. })));
}

#[test]
fn test_configured_tolerance_admits_edge_frequency() {
    let mut rng = StdRng::seed_from_u64(16);
    // the calset reaches 100 kHz past the end of the short's table
    let frequencies = vec![1.0e9, 8.0001e9];
    let truth = random_error_terms(&mut rng, CalType::E12, 1, 1, &frequencies);
    let grid: Vec<f64> = (1..=8).map(|k| k as f64 * 1.0e9).collect();

    let mut calset = CalSet::new("edge", 1, 1, frequencies.clone(), Z0).unwrap();
    calset
        .set_reference(0, Reference::Vector { frequencies: grid.clone(), values: vec![c(-1.0, 0.0); grid.len()] })
        .unwrap();
    calset.set_reference(1, Reference::Constant(ONE)).unwrap();
    calset.set_reference(2, Reference::Constant(ZERO)).unwrap();
    fill_calset(&mut calset, &truth, &constant_gammas());

    let mut strict = Calibration::new();
    assert!(matches!(
        strict.add_calset(&calset),
        Err(VnaCalError::FrequencyOutOfRange { .. })
    ));

    let config = CalibrationConfig {
        frequency_tolerance: 1e-4,
        ..CalibrationConfig::default()
    };
    let mut relaxed = Calibration::with_config(config);
    let index = relaxed.add_calset(&calset).unwrap();
    assert_terms_match(&calset.solve_with(&config).unwrap(), &truth);

    // correcting just past the solved range needs the same slack
    let strict_index = strict.add_error_terms(calset.solve_with(&config).unwrap());
    let beyond = [8.0002e9];
    let m = Array3::from_elem((1, 1, 1), c(0.1, 0.0));
    assert!(matches!(
        strict.apply_m(strict_index, &beyond, &m),
        Err(VnaCalError::FrequencyOutOfRange { .. })
    ));
    assert!(relaxed.apply_m(index, &beyond, &m).is_ok());
}

#[test]
fn test_missing_through() {
    let mut calset = CalSet::new("partial", 2, 2, vec![1.0e9], Z0).unwrap();
    for (k, g) in [c(-1.0, 0.0), ONE, ZERO].into_iter().enumerate() {
        calset.set_reference(k, Reference::Constant(g)).unwrap();
        calset.add(0, 0, k, &[g]).unwrap();
        calset.add(1, 1, k, &[g]).unwrap();
    }
    calset.add(1, 0, TERM_THROUGH, &[ONE]).unwrap();
    calset.add(1, 0, TERM_THROUGH_MATCH, &[ZERO]).unwrap();
    let err = calset.solve().unwrap_err();
    assert!(matches!(err, VnaCalError::MissingMeasurement(_)), "{err}");
}

#[test]
fn test_single_receiver_calset() {
    // 1x2: with no receiver on the second port the match seen while driving it
    // cannot be observed
    let mut rng = StdRng::seed_from_u64(15);
    let mut truth = random_error_terms(&mut rng, CalType::E12, 1, 2, &FREQUENCIES);
    let layout = *truth.layout();
    let mut terms: Vec<Vec<Complex64>> = (0..layout.term_count())
        .map(|k| truth.term(k).unwrap().to_vec())
        .collect();
    terms[layout.e12_em(1).offset] = vec![ZERO; FREQUENCIES.len()];
    truth = ErrorTerms::new("truth", layout, FREQUENCIES.to_vec(), terms, Z0).unwrap();

    let gammas = constant_gammas();
    let mut calset = CalSet::new("reflectometer", 1, 2, FREQUENCIES.to_vec(), Z0).unwrap();
    for (k, g) in gammas.iter().enumerate() {
        calset.set_reference(k, Reference::Constant(g[0])).unwrap();
        let measured = measure_all(&truth, |findex| Array2::from_diag_elem(2, g[findex]));
        calset.add(0, 0, k, &cell(&measured, 0, 0)).unwrap();
    }
    let isolation = measure_all(&truth, |_| Array2::zeros((2, 2)));
    let through = measure_all(&truth, |_| arr2(&[[ZERO, ONE], [ONE, ZERO]]));
    calset.add(0, 1, TERM_LEAKAGE, &cell(&isolation, 0, 1)).unwrap();
    calset.add(0, 1, TERM_THROUGH, &cell(&through, 0, 1)).unwrap();

    let solved = calset.solve().unwrap();
    assert_terms_match(&solved, &truth);
    let em = solved.term(layout.e12_em(1).offset).unwrap();
    assert_relative_eq!(em[0].norm(), 0.0);
}
