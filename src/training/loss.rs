//! Per-step prediction losses and their derivatives with respect to the
//! readout pre-activation `z` and log-variance `s`.
//!
//! | Output | Objective |
//! |--------|-----------|
//! | tanh | `½ Σ (y − d)²` |
//! | tanh + variance | `½ Σ [(y − d)² e^{−s} + s + ln 2π]` |
//! | softmax | `Σ_g Σ_{k∈g} d_k ln(d_k / y_k)` |

use crate::activation::{OutputActivation, OutputType};
use ndarray::{ArrayView1, ArrayViewMut1};
use std::f64::consts::PI;

/// Loss of one predicted step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepLoss {
    /// Value minimized by training.
    pub objective: f64,
    /// `Σ (y − d)²`, reported independently of the objective.
    pub squared_error: f64,
}

impl std::ops::AddAssign for StepLoss {
    fn add_assign(&mut self, rhs: Self) {
        self.objective += rhs.objective;
        self.squared_error += rhs.squared_error;
    }
}

pub fn step_loss(
    activation: &OutputActivation,
    variance: bool,
    output: ArrayView1<f64>,
    log_variance: ArrayView1<f64>,
    target: ArrayView1<f64>,
) -> StepLoss {
    let squared_error: f64 = output
        .iter()
        .zip(target.iter())
        .map(|(y, d)| (y - d) * (y - d))
        .sum();

    let objective: f64 = match activation.kind {
        OutputType::Tanh if variance => {
            let ln_2pi = (2.0 * PI).ln();
            output
                .iter()
                .zip(target.iter())
                .zip(log_variance.iter())
                .map(|((y, d), s)| 0.5 * ((y - d) * (y - d) * (-s).exp() + s + ln_2pi))
                .sum()
        }
        OutputType::Tanh => 0.5 * squared_error,
        OutputType::Softmax => output
            .iter()
            .zip(target.iter())
            .filter(|(_, d)| **d > 0.0)
            .map(|(&y, &d)| d * (d / y.max(f64::MIN_POSITIVE)).ln())
            .sum(),
    };

    StepLoss {
        objective,
        squared_error,
    }
}

/// Writes `∂L/∂z` into `dz` and `∂L/∂s` into `ds` (zero without variance).
pub fn output_error(
    activation: &OutputActivation,
    variance: bool,
    output: ArrayView1<f64>,
    log_variance: ArrayView1<f64>,
    target: ArrayView1<f64>,
    mut dz: ArrayViewMut1<f64>,
    mut ds: ArrayViewMut1<f64>,
) {
    ds.fill(0.0);
    match activation.kind {
        OutputType::Tanh => {
            for k in 0..output.len() {
                let y = output[k];
                let diff = y - target[k];
                if variance {
                    let precision = (-log_variance[k]).exp();
                    dz[k] = diff * precision * (1.0 - y * y);
                    ds[k] = 0.5 * (1.0 - diff * diff * precision);
                } else {
                    dz[k] = diff * (1.0 - y * y);
                }
            }
        }
        OutputType::Softmax => {
            for group in activation.groups.members() {
                let mass: f64 = group.iter().map(|&k| target[k]).sum();
                for &k in group {
                    dz[k] = output[k] * mass - target[k];
                }
            }
        }
    }
}
