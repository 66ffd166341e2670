//! Momentum gradient descent with an adaptive learning rate.
//!
//! For every free parameter `p` with velocity `v`:
//!
//! ```text
//! g = scale·g_data + prior_strength·w + penalty(w)     (prior and penalty on weights only)
//! v ← momentum·v − ρ_eff·g
//! p ← p + v
//! ```
//!
//! Masked synapses and fixed groups are never touched. Time constants are
//! clamped to `τ >= 1` after every update.

use super::gradients::Gradients;
use super::penalty::Penalty;
use crate::cells::CtrnnCell;
use crate::config::OptimizerConfig;
use crate::error::{ensure_finite, Result};
use crate::wirings::Connection;
use ndarray::{Array1, Array2, Zip};
use serde::{Deserialize, Serialize};
use tracing::warn;

const RATE_INCREASE: f64 = 1.05;
const RATE_DECREASE: f64 = 0.5;
const MIN_MULTIPLIER: f64 = 1e-6;
const MAX_MULTIPLIER: f64 = 1e6;
/// Weight of the newest epoch error in the running baseline.
const BASELINE_WEIGHT: f64 = 0.5;

/// Bold-driver learning-rate multiplier.
///
/// The multiplier grows while the epoch error beats its running baseline
/// and halves when it does worse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveRate {
    baseline: Option<f64>,
    multiplier: f64,
}

impl Default for AdaptiveRate {
    fn default() -> Self {
        Self {
            baseline: None,
            multiplier: 1.0,
        }
    }
}

impl AdaptiveRate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Feeds one epoch error and returns the updated multiplier.
    pub fn observe(&mut self, error: f64) -> f64 {
        match self.baseline {
            None => self.baseline = Some(error),
            Some(baseline) => {
                if error < baseline {
                    self.multiplier *= RATE_INCREASE;
                } else if error > baseline {
                    self.multiplier *= RATE_DECREASE;
                }
                self.multiplier = self.multiplier.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);
                self.baseline =
                    Some((1.0 - BASELINE_WEIGHT) * baseline + BASELINE_WEIGHT * error);
            }
        }
        self.multiplier
    }
}

/// Everything the optimizer carries between epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub velocity: Gradients,
    pub adaptive: AdaptiveRate,
}

impl OptimizerState {
    pub fn new(cell: &CtrnnCell, num_points: usize) -> Self {
        Self {
            velocity: Gradients::zeros_like(cell, num_points),
            adaptive: AdaptiveRate::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
    state: OptimizerState,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig, cell: &CtrnnCell, num_points: usize) -> Self {
        Self {
            config,
            state: OptimizerState::new(cell, num_points),
        }
    }

    /// Resumes from a saved state.
    pub fn from_state(config: OptimizerConfig, state: OptimizerState) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn state(&self) -> &OptimizerState {
        &self.state
    }

    /// `ρ_eff`: the base rate, times the adaptive multiplier when enabled.
    pub fn learning_rate(&self) -> f64 {
        if self.config.use_adaptive_lr {
            self.config.rho * self.state.adaptive.multiplier()
        } else {
            self.config.rho
        }
    }

    /// Records the epoch error with the adaptive rate. No-op when the
    /// adaptive rate is disabled.
    pub fn observe_error(&mut self, error: f64) {
        if self.config.use_adaptive_lr {
            self.state.adaptive.observe(error);
        }
    }

    /// Applies one update to the cell and the representative points.
    /// `scale` multiplies the data gradient (typically `1 / total_steps`).
    pub fn step(
        &mut self,
        cell: &mut CtrnnCell,
        points: &mut Array2<f64>,
        grads: &Gradients,
        scale: f64,
        penalty: &dyn Penalty,
    ) -> Result<()> {
        let rate = self.learning_rate();
        let momentum = self.config.momentum;
        let prior = self.config.prior_strength;
        let rule = Rule {
            rate,
            momentum,
            scale,
        };
        let velocity = &mut self.state.velocity;

        if !self.config.fixed_weight {
            let weights = [
                (
                    &mut cell.input_to_context,
                    &mut velocity.input_to_context,
                    &grads.input_to_context,
                ),
                (
                    &mut cell.context_to_context,
                    &mut velocity.context_to_context,
                    &grads.context_to_context,
                ),
                (
                    &mut cell.context_to_output,
                    &mut velocity.context_to_output,
                    &grads.context_to_output,
                ),
                (
                    &mut cell.context_to_variance,
                    &mut velocity.context_to_variance,
                    &grads.context_to_variance,
                ),
            ];
            for (connection, v, g) in weights {
                rule.descend_connection(connection, v, g, prior, penalty);
            }
        }

        if !self.config.fixed_threshold {
            rule.descend(
                &mut cell.context_threshold,
                &mut velocity.context_threshold,
                &grads.context_threshold,
            );
            rule.descend(
                &mut cell.output_threshold,
                &mut velocity.output_threshold,
                &grads.output_threshold,
            );
            if cell.has_variance() {
                rule.descend(
                    &mut cell.variance_threshold,
                    &mut velocity.variance_threshold,
                    &grads.variance_threshold,
                );
            }
        }

        if !self.config.fixed_tau {
            rule.descend(&mut cell.tau, &mut velocity.tau, &grads.tau);
            let mut clamped = 0;
            Zip::from(&mut cell.tau)
                .and(&mut velocity.tau)
                .for_each(|tau, v| {
                    if *tau < 1.0 {
                        *tau = 1.0;
                        *v = 0.0;
                        clamped += 1;
                    }
                });
            if clamped > 0 {
                warn!(clamped, "time constants clamped to 1");
            }
        }

        if !self.config.fixed_init_c_state {
            Zip::from(&mut *points)
                .and(&mut velocity.representative_points)
                .and(&grads.representative_points)
                .for_each(|p, v, &g| rule.apply(p, v, scale * g));
        }

        ensure_finite(
            cell.input_to_context
                .weight
                .iter()
                .chain(cell.context_to_context.weight.iter())
                .chain(cell.context_to_output.weight.iter())
                .chain(cell.context_to_variance.weight.iter())
                .chain(cell.context_threshold.iter())
                .chain(cell.output_threshold.iter())
                .chain(cell.variance_threshold.iter())
                .chain(cell.tau.iter())
                .chain(points.iter()),
            || "parameters after update".into(),
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    rate: f64,
    momentum: f64,
    scale: f64,
}

impl Rule {
    #[inline]
    fn apply(&self, p: &mut f64, v: &mut f64, g: f64) {
        *v = self.momentum * *v - self.rate * g;
        *p += *v;
    }

    fn descend(&self, param: &mut Array1<f64>, velocity: &mut Array1<f64>, grad: &Array1<f64>) {
        Zip::from(param)
            .and(velocity)
            .and(grad)
            .for_each(|p, v, &g| self.apply(p, v, self.scale * g));
    }

    fn descend_connection(
        &self,
        connection: &mut Connection,
        velocity: &mut Array2<f64>,
        grad: &Array2<f64>,
        prior: f64,
        penalty: &dyn Penalty,
    ) {
        Zip::from(&mut connection.weight)
            .and(velocity)
            .and(grad)
            .and(&connection.mask)
            .for_each(|w, v, &g, &present| {
                if present {
                    let total = self.scale * g + prior * *w + penalty.weight_gradient(*w);
                    self.apply(w, v, total);
                }
            });
    }
}
