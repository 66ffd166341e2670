//! Sine Wave Example
//!
//! Trains a small CTRNN to continue a sine wave, then lets it run closed-loop
//! on its own delayed output and checkpoints the result.

use ctrnn_learn::checkpoint;
use ctrnn_learn::prelude::*;
use ndarray::Array2;
use std::f64::consts::PI;

fn main() -> ctrnn_learn::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    println!("=== CTRNN Sine Wave Example ===\n");

    let series = Array2::from_shape_fn((100, 1), |(t, _)| {
        0.8 * (2.0 * PI * t as f64 / 25.0).sin()
    });
    let dataset = Dataset::from_arrays(vec![series], 1)?;

    let mut config = TrainingConfig::default();
    config.epochs = 2000;
    config.model.c_state_size = 4;
    config.model.init_tau = vec![3.0];
    config.optimizer.rho = 0.01;
    config.optimizer.momentum = 0.9;
    config.optimizer.use_adaptive_lr = true;
    config.analysis.threshold_period = 1000;
    config.report = ReportConfig {
        default_interval: 0,
        ..ReportConfig::default()
    }
    .with_policy(ReportStream::Error, IntervalPolicy::every(1).with_logscale(true))
    .with_policy(ReportStream::Lyapunov, IntervalPolicy::every(500))
    .with_policy(ReportStream::Save, IntervalPolicy::every(500));

    let path = std::env::temp_dir().join("sine_wave.ckpt");
    println!("Training...");
    println!("  Neurons: {}", config.model.c_state_size);
    println!("  Epochs:  {}", config.epochs);
    println!("  Checkpoint: {}", path.display());
    println!();

    let mut trainer = Trainer::new(config, dataset)?.with_checkpoint_path(&path);
    let history = trainer.run(&mut LogSink)?;
    if let (Some(first), Some(last)) = (history.first(), history.last()) {
        println!("  MSE: {:.6} -> {:.6}", first.mean_squared_error, last.mean_squared_error);
    }
    println!();

    println!("Closed-loop generation:");
    let closed = trainer.evaluate_closed_loop()?;
    for t in (0..closed[0].steps()).step_by(10) {
        println!("  t = {:3}  y = {:+.4}", t + 1, closed[0].output[[t, 0]]);
    }
    println!("  closed-loop MSE: {:.6}", closed[0].mean_squared_error());
    println!();

    println!("Lyapunov spectrum:");
    for (point, report) in trainer.analyze()?.iter().enumerate() {
        println!(
            "  point {}: {:?} (period {:?})",
            point, report.exponents, report.period
        );
    }
    println!();

    let restored = checkpoint::load(&path)?;
    println!("Checkpoint holds epoch {}", restored.epoch);
    println!();

    println!("=== Sine Wave Example completed! ===");
    Ok(())
}
