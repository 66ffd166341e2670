//! Tests for the Lyapunov spectrum analyzer

use approx::assert_abs_diff_eq;
use ctrnn_learn::cells::CtrnnCell;
use ctrnn_learn::config::{AnalysisConfig, ModelConfig};
use ctrnn_learn::lyapunov::LyapunovAnalyzer;
use ctrnn_learn::rnn::Ctrnn;
use ctrnn_learn::wirings::{Edge, WiringConfig};
use ndarray::{array, Array1};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn disconnected_network(n: usize, tau: f64, delay: usize) -> Ctrnn {
    let config = ModelConfig {
        c_state_size: n,
        delay_length: delay,
        init_tau: vec![tau],
        input_to_context: WiringConfig::None,
        context_to_context: WiringConfig::None,
        context_to_output: WiringConfig::None,
        ..ModelConfig::default()
    };
    let cell = CtrnnCell::new(&config, 1, &mut StdRng::seed_from_u64(3)).unwrap();
    Ctrnn::new(cell, delay)
}

/// Two neurons with a rotating recurrent matrix whose origin is unstable.
fn oscillator() -> Ctrnn {
    let config = ModelConfig {
        c_state_size: 2,
        init_tau: vec![20.0],
        input_to_context: WiringConfig::None,
        context_to_context: WiringConfig::Explicit {
            edges: vec![
                vec![Edge::fixed(1.2), Edge::fixed(-1.0)],
                vec![Edge::fixed(1.0), Edge::fixed(1.2)],
            ],
        },
        ..ModelConfig::default()
    };
    let mut cell = CtrnnCell::new(&config, 1, &mut StdRng::seed_from_u64(0)).unwrap();
    cell.context_threshold.fill(0.0);
    Ctrnn::new(cell, 1)
}

#[test]
fn test_pure_leak_decays_at_one_over_tau() {
    let net = disconnected_network(3, 50.0, 1);
    let report = LyapunovAnalyzer::new(AnalysisConfig::default())
        .analyze(&net, Array1::from_elem(3, 0.4).view())
        .unwrap();

    assert_eq!(report.exponents.len(), 3);
    for &exponent in &report.exponents {
        assert_abs_diff_eq!(exponent, (0.98f64).ln(), epsilon = 1e-10);
    }
    assert_eq!(report.entropy, 0.0);
    assert_eq!(report.period, Some(1));
    assert_eq!(report.degenerate_vectors, 0);
    assert_eq!(report.reorthonormalizations, 500);
}

#[test]
fn test_segments_are_averaged() {
    let net = disconnected_network(2, 10.0, 1);
    let settings = AnalysisConfig {
        divide_num: 4,
        threshold_period: 50,
        transient_length: Some(0),
        ..AnalysisConfig::default()
    };
    let report = LyapunovAnalyzer::new(settings)
        .analyze(&net, Array1::zeros(2).view())
        .unwrap();
    assert_eq!(report.reorthonormalizations, 200);
    assert_abs_diff_eq!(report.exponents[0], (0.9f64).ln(), epsilon = 1e-10);
}

#[test]
fn test_delayed_loop_spectrum_prefix() {
    // Extended state [c(t), c(t-1)]: the history block contributes nothing new.
    let net = disconnected_network(2, 50.0, 2);
    let settings = AnalysisConfig {
        lyapunov_spectrum_size: Some(2),
        threshold_period: 2000,
        ..AnalysisConfig::default()
    };
    let report = LyapunovAnalyzer::new(settings)
        .analyze(&net, array![0.3, -0.3].view())
        .unwrap();
    assert_eq!(report.exponents.len(), 2);
    for &exponent in &report.exponents {
        assert_abs_diff_eq!(exponent, (0.98f64).ln(), epsilon = 1e-3);
    }
}

#[test]
fn test_full_delayed_spectrum_flags_degenerate_directions() {
    let net = disconnected_network(1, 5.0, 2);
    let settings = AnalysisConfig {
        threshold_period: 20,
        ..AnalysisConfig::default()
    };
    let report = LyapunovAnalyzer::new(settings)
        .analyze(&net, array![0.1].view())
        .unwrap();
    assert_eq!(report.exponents.len(), 2);
    assert!(report.degenerate_vectors > 0);
    assert!(report.exponents[1] < report.exponents[0]);
}

#[test]
fn test_limit_cycle_has_neutral_direction() {
    let settings = AnalysisConfig {
        threshold_period: 4000,
        transient_length: Some(4000),
        ..AnalysisConfig::default()
    };
    let report = LyapunovAnalyzer::new(settings)
        .analyze(&oscillator(), array![0.1, 0.0].view())
        .unwrap();

    assert!(
        report.exponents[0].abs() < 0.01,
        "tangent exponent {:?}",
        report.exponents
    );
    assert!(report.exponents[1] < -0.002);
    assert!(report.max_exponent().unwrap().abs() < 0.01);
    assert!(report.entropy < 0.01);
}

#[test]
fn test_spectrum_size_is_checked() {
    let net = disconnected_network(2, 2.0, 1);
    let settings = AnalysisConfig {
        lyapunov_spectrum_size: Some(3),
        ..AnalysisConfig::default()
    };
    assert!(LyapunovAnalyzer::new(settings)
        .analyze(&net, Array1::zeros(2).view())
        .is_err());
}

#[test]
fn test_diverging_state_is_a_numerical_error() {
    let mut net = disconnected_network(2, 2.0, 1);
    net.cell.context_threshold[0] = f64::NAN;
    assert!(LyapunovAnalyzer::new(AnalysisConfig::default())
        .analyze(&net, Array1::zeros(2).view())
        .is_err());
}
