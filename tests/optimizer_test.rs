//! Tests for the parameter update rule

use approx::assert_abs_diff_eq;
use ctrnn_learn::cells::CtrnnCell;
use ctrnn_learn::config::{ModelConfig, OptimizerConfig};
use ctrnn_learn::training::{ElasticPenalty, Gradients, Optimizer};
use ctrnn_learn::wirings::WiringConfig;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn create_test_cell() -> CtrnnCell {
    let config = ModelConfig {
        c_state_size: 4,
        init_tau: vec![2.0],
        context_to_context: WiringConfig::Random {
            sparsity_level: 0.5,
        },
        ..ModelConfig::default()
    };
    CtrnnCell::new(&config, 2, &mut StdRng::seed_from_u64(77)).unwrap()
}

fn filled_gradients(cell: &CtrnnCell, value: f64) -> Gradients {
    let mut grads = Gradients::zeros_like(cell, 2);
    grads.input_to_context.fill(value);
    grads.context_to_context.fill(value);
    grads.context_to_output.fill(value);
    grads.context_threshold.fill(value);
    grads.output_threshold.fill(value);
    grads.tau.fill(value);
    grads.representative_points.fill(value);
    grads
}

fn plain_descent(rho: f64) -> OptimizerConfig {
    OptimizerConfig {
        rho,
        momentum: 0.0,
        ..OptimizerConfig::default()
    }
}

#[test]
fn test_plain_gradient_step() {
    let mut cell = create_test_cell();
    let before = cell.clone();
    let mut points = Array2::zeros((2, 4));
    let grads = filled_gradients(&cell, 0.5);
    let mut optimizer = Optimizer::new(plain_descent(0.1), &cell, 2);

    optimizer
        .step(&mut cell, &mut points, &grads, 2.0, &ElasticPenalty::default())
        .unwrap();

    // Every free parameter moves by -rho * scale * g = -0.1.
    for (after, before) in cell.output_threshold.iter().zip(before.output_threshold.iter()) {
        assert_abs_diff_eq!(*after, before - 0.1, epsilon = 1e-12);
    }
    for (after, before) in cell.tau.iter().zip(before.tau.iter()) {
        assert_abs_diff_eq!(*after, before - 0.1, epsilon = 1e-12);
    }
    assert!(points.iter().all(|&p| (p + 0.1).abs() < 1e-12));
}

#[test]
fn test_momentum_accumulates_velocity() {
    let mut cell = create_test_cell();
    let start = cell.context_threshold[0];
    let mut points = Array2::zeros((2, 4));
    let grads = filled_gradients(&cell, 1.0);
    let config = OptimizerConfig {
        rho: 0.01,
        momentum: 0.5,
        ..OptimizerConfig::default()
    };
    let mut optimizer = Optimizer::new(config, &cell, 2);
    let penalty = ElasticPenalty::default();
    optimizer
        .step(&mut cell, &mut points, &grads, 1.0, &penalty)
        .unwrap();
    optimizer
        .step(&mut cell, &mut points, &grads, 1.0, &penalty)
        .unwrap();
    // v1 = -0.01, v2 = 0.5 * v1 - 0.01
    assert_abs_diff_eq!(cell.context_threshold[0], start - 0.01 - 0.015, epsilon = 1e-12);
}

#[test]
fn test_masked_weights_stay_zero() {
    let mut cell = create_test_cell();
    let mut points = Array2::zeros((2, 4));
    let grads = filled_gradients(&cell, 3.0);
    let config = OptimizerConfig {
        prior_strength: 0.5,
        alpha: 0.1,
        ..plain_descent(0.2)
    };
    let mut optimizer = Optimizer::new(config, &cell, 2);
    optimizer
        .step(&mut cell, &mut points, &grads, 1.0, &ElasticPenalty::new(0.0, 0.1))
        .unwrap();

    let conn = &cell.context_to_context;
    for (w, &present) in conn.weight.iter().zip(conn.mask.iter()) {
        if !present {
            assert_eq!(*w, 0.0);
        }
    }
    let velocity = &optimizer.state().velocity.context_to_context;
    for (v, &present) in velocity.iter().zip(conn.mask.iter()) {
        if !present {
            assert_eq!(*v, 0.0);
        }
    }
}

#[test]
fn test_prior_shrinks_weights_without_data_gradient() {
    let mut cell = create_test_cell();
    let before = cell.context_to_output.weight.clone();
    let mut points = Array2::zeros((2, 4));
    let grads = Gradients::zeros_like(&cell, 2);
    let config = OptimizerConfig {
        prior_strength: 1.0,
        ..plain_descent(0.1)
    };
    let mut optimizer = Optimizer::new(config, &cell, 2);
    optimizer
        .step(&mut cell, &mut points, &grads, 1.0, &ElasticPenalty::default())
        .unwrap();
    for (after, before) in cell.context_to_output.weight.iter().zip(before.iter()) {
        assert_abs_diff_eq!(*after, 0.9 * before, epsilon = 1e-12);
    }
}

#[test]
fn test_fixed_groups_are_untouched() {
    let mut cell = create_test_cell();
    let before = cell.clone();
    let mut points = Array2::from_elem((2, 4), 0.25);
    let grads = filled_gradients(&cell, 1.0);
    let config = OptimizerConfig {
        fixed_weight: true,
        fixed_threshold: true,
        fixed_tau: true,
        fixed_init_c_state: true,
        ..plain_descent(0.5)
    };
    let mut optimizer = Optimizer::new(config, &cell, 2);
    optimizer
        .step(&mut cell, &mut points, &grads, 1.0, &ElasticPenalty::default())
        .unwrap();
    assert_eq!(cell, before);
    assert!(points.iter().all(|&p| p == 0.25));
}

#[test]
fn test_tau_is_clamped_to_one() {
    let mut cell = create_test_cell();
    let mut points = Array2::zeros((2, 4));
    let mut grads = Gradients::zeros_like(&cell, 2);
    grads.tau.fill(100.0);
    let config = OptimizerConfig {
        momentum: 0.9,
        ..plain_descent(0.1)
    };
    let mut optimizer = Optimizer::new(config, &cell, 2);
    optimizer
        .step(&mut cell, &mut points, &grads, 1.0, &ElasticPenalty::default())
        .unwrap();
    assert!(cell.tau.iter().all(|&t| t == 1.0));
    assert!(optimizer.state().velocity.tau.iter().all(|&v| v == 0.0));
}

#[test]
fn test_adaptive_rate_scales_learning_rate() {
    let cell = create_test_cell();
    let config = OptimizerConfig {
        rho: 0.1,
        use_adaptive_lr: true,
        ..OptimizerConfig::default()
    };
    let mut optimizer = Optimizer::new(config, &cell, 1);
    optimizer.observe_error(1.0);
    optimizer.observe_error(0.5);
    assert_abs_diff_eq!(optimizer.learning_rate(), 0.105, epsilon = 1e-12);

    let mut fixed = Optimizer::new(plain_descent(0.1), &cell, 1);
    fixed.observe_error(1.0);
    fixed.observe_error(2.0);
    assert_eq!(fixed.learning_rate(), 0.1);
}

#[test]
fn test_non_finite_update_is_reported() {
    let mut cell = create_test_cell();
    let mut points = Array2::zeros((2, 4));
    let mut grads = Gradients::zeros_like(&cell, 2);
    grads.output_threshold[0] = f64::NAN;
    let mut optimizer = Optimizer::new(plain_descent(0.1), &cell, 2);
    assert!(optimizer
        .step(&mut cell, &mut points, &grads, 1.0, &ElasticPenalty::default())
        .is_err());
}
