//! Lyapunov Scan Example
//!
//! Sweeps the self-excitation of a two-neuron rotating network and prints
//! how its closed-loop dynamics go from a stable fixed point to a limit
//! cycle.

use ctrnn_learn::prelude::*;
use ndarray::array;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn network(gain: f64) -> ctrnn_learn::Result<Ctrnn> {
    let config = ModelConfig {
        c_state_size: 2,
        init_tau: vec![20.0],
        input_to_context: WiringConfig::None,
        context_to_context: WiringConfig::Explicit {
            edges: vec![
                vec![Edge::fixed(gain), Edge::fixed(-1.0)],
                vec![Edge::fixed(1.0), Edge::fixed(gain)],
            ],
        },
        ..ModelConfig::default()
    };
    let mut cell = CtrnnCell::new(&config, 1, &mut StdRng::seed_from_u64(0))?;
    cell.context_threshold.fill(0.0);
    Ok(Ctrnn::new(cell, 1))
}

fn main() -> ctrnn_learn::Result<()> {
    println!("=== Lyapunov Scan Example ===\n");

    let analyzer = LyapunovAnalyzer::new(AnalysisConfig {
        threshold_period: 2000,
        divide_num: 2,
        period_tolerance: 1e-4,
        ..AnalysisConfig::default()
    });

    println!("  gain    lambda_1    lambda_2    period  regime");
    for step in 0..9 {
        let gain = 0.6 + 0.1 * step as f64;
        let report = analyzer.analyze(&network(gain)?, array![0.1, 0.0].view())?;
        let regime = match report.max_exponent() {
            Some(max) if max > 1e-3 => "chaotic",
            Some(max) if max > -1e-3 => "cycle",
            _ => "fixed point",
        };
        println!(
            "  {:.2}  {:+.6}  {:+.6}    {:?}  {}",
            gain, report.exponents[0], report.exponents[1], report.period, regime
        );
    }
    println!();

    println!("=== Lyapunov Scan completed! ===");
    Ok(())
}
