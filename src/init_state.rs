//! Representative initial states.
//!
//! `K` candidate context states are trained alongside the network. Each
//! sequence is scored against every candidate by its open-loop loss; an
//! [`Assignment`] turns the scores into responsibilities, and the sequence
//! starts from the responsibility-weighted mix of candidates.

use crate::config::ModelConfig;
use crate::data::Sequence;
use crate::error::{CtrnnError, Result};
use crate::rnn::Ctrnn;
use ndarray::{Array2, ArrayView1, ArrayViewMut1, Axis};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Initial states are kept strictly inside the range of `tanh`.
const STATE_BOUND: f64 = 0.999999;

/// Turns candidate scores (lower is better) into responsibilities.
pub trait Assignment: Debug + Send + Sync {
    /// Fills `weights` with non-negative values summing to one.
    fn assign(&self, scores: &[f64], weights: &mut [f64]);
}

/// All responsibility on the best candidate; ties go to the lowest index.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardAssignment;

impl Assignment for HardAssignment {
    fn assign(&self, scores: &[f64], weights: &mut [f64]) {
        let mut best = 0;
        for (k, &score) in scores.iter().enumerate() {
            if score < scores[best] {
                best = k;
            }
        }
        weights.iter_mut().for_each(|w| *w = 0.0);
        if let Some(w) = weights.get_mut(best) {
            *w = 1.0;
        }
    }
}

/// Boltzmann weights `r_k ∝ exp(−(E_k − min E) / temperature)`.
#[derive(Debug, Clone, Copy)]
pub struct SoftAssignment {
    pub temperature: f64,
}

impl Assignment for SoftAssignment {
    fn assign(&self, scores: &[f64], weights: &mut [f64]) {
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let mut sum = 0.0;
        for (w, &score) in weights.iter_mut().zip(scores) {
            *w = (-(score - min) / self.temperature).exp();
            sum += *w;
        }
        weights.iter_mut().for_each(|w| *w /= sum);
    }
}

/// Serializable choice of [`Assignment`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentStrategy {
    #[default]
    Hard,
    Soft {
        temperature: f64,
    },
}

impl AssignmentStrategy {
    pub fn build(&self) -> Box<dyn Assignment> {
        match *self {
            AssignmentStrategy::Hard => Box::new(HardAssignment),
            AssignmentStrategy::Soft { temperature } => Box::new(SoftAssignment { temperature }),
        }
    }
}

/// Outcome of scoring one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Responsibility per candidate.
    pub weights: Vec<f64>,
    /// Open-loop loss per candidate; empty when scoring was skipped.
    pub scores: Vec<f64>,
}

impl Selection {
    /// Candidate with the largest responsibility (lowest index on ties).
    pub fn best(&self) -> usize {
        let mut best = 0;
        for (k, &w) in self.weights.iter().enumerate() {
            if w > self.weights[best] {
                best = k;
            }
        }
        best
    }
}

#[derive(Debug)]
pub struct InitialStateEstimator {
    points: Array2<f64>,
    shared: Vec<usize>,
    assignment: Box<dyn Assignment>,
}

impl InitialStateEstimator {
    /// Draws `rep_init_size` candidates from `Normal(0, √rep_init_variance)`.
    pub fn new(config: &ModelConfig, rng: &mut StdRng) -> Result<Self> {
        let normal = Normal::new(0.0, config.rep_init_variance.sqrt())
            .map_err(|e| CtrnnError::config("model.rep_init_variance", e.to_string()))?;
        let points = Array2::from_shape_fn((config.rep_init_size, config.c_state_size), |_| {
            normal.sample(rng).clamp(-STATE_BOUND, STATE_BOUND)
        });
        Self::from_points(points, config)
    }

    /// Wraps existing candidates, e.g. restored from a checkpoint.
    pub fn from_points(points: Array2<f64>, config: &ModelConfig) -> Result<Self> {
        if points.nrows() == 0 {
            return Err(CtrnnError::config(
                "model.rep_init_size",
                "at least one representative point is required",
            ));
        }
        if points.ncols() != config.c_state_size {
            return Err(CtrnnError::config(
                "model.c_state_size",
                format!(
                    "representative points have {} neurons, expected {}",
                    points.ncols(),
                    config.c_state_size
                ),
            ));
        }
        let mut estimator = Self {
            points,
            shared: config.shared_init_neurons.clone(),
            assignment: config.assignment.build(),
        };
        estimator.enforce_shared();
        Ok(estimator)
    }

    /// Replaces the assignment rule.
    pub fn with_assignment(mut self, assignment: Box<dyn Assignment>) -> Self {
        self.assignment = assignment;
        self
    }

    pub fn num_points(&self) -> usize {
        self.points.nrows()
    }

    pub fn points(&self) -> &Array2<f64> {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut Array2<f64> {
        &mut self.points
    }

    /// Scores every candidate against `sequence`. A single candidate is
    /// selected without simulation.
    pub fn select(&self, net: &Ctrnn, sequence: &Sequence) -> Result<Selection> {
        let k = self.num_points();
        if k == 1 {
            return Ok(Selection {
                weights: vec![1.0],
                scores: Vec::new(),
            });
        }
        let scores = self
            .points
            .outer_iter()
            .map(|p| net.loss(sequence, p).map(|l| l.objective))
            .collect::<Result<Vec<_>>>()?;
        let mut weights = vec![0.0; k];
        self.assignment.assign(&scores, &mut weights);
        Ok(Selection { weights, scores })
    }

    /// Writes `Σ r_k p_k` into `out`.
    pub fn initial_state(&self, selection: &Selection, mut out: ArrayViewMut1<f64>) {
        out.fill(0.0);
        for (p, &r) in self.points.outer_iter().zip(&selection.weights) {
            if r != 0.0 {
                out.scaled_add(r, &p);
            }
        }
    }

    /// Adds `r_k · gradient` to row `k` of `point_grads`.
    pub fn distribute(
        &self,
        selection: &Selection,
        gradient: ArrayView1<f64>,
        point_grads: &mut Array2<f64>,
    ) {
        for (mut g, &r) in point_grads.outer_iter_mut().zip(&selection.weights) {
            if r != 0.0 {
                g.scaled_add(r, &gradient);
            }
        }
    }

    /// Re-imposes one common value (the mean) on every shared neuron.
    pub fn enforce_shared(&mut self) {
        for &i in &self.shared {
            let mut column = self.points.index_axis_mut(Axis(1), i);
            let mean = column.mean().unwrap_or(0.0);
            column.fill(mean);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use rand::SeedableRng;

    #[test]
    fn test_hard_assignment_breaks_ties_low() {
        let mut w = [0.0; 3];
        HardAssignment.assign(&[0.5, 0.2, 0.2], &mut w);
        assert_eq!(w, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_soft_assignment_normalizes() {
        let mut w = [0.0; 2];
        SoftAssignment { temperature: 1.0 }.assign(&[0.0, 2f64.ln()], &mut w);
        assert!((w[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((w[1] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_points_are_bounded_and_shared() {
        let config = ModelConfig {
            c_state_size: 3,
            rep_init_size: 5,
            rep_init_variance: 100.0,
            shared_init_neurons: vec![1],
            ..ModelConfig::default()
        };
        let est = InitialStateEstimator::new(&config, &mut StdRng::seed_from_u64(9)).unwrap();
        assert!(est.points().iter().all(|v| v.abs() <= STATE_BOUND));
        let shared = est.points().column(1).to_owned();
        assert!(shared.iter().all(|&v| v == shared[0]));
    }

    #[test]
    fn test_mix_and_distribute() {
        let config = ModelConfig {
            c_state_size: 2,
            rep_init_size: 2,
            ..ModelConfig::default()
        };
        let est = InitialStateEstimator::from_points(array![[1.0, 0.0], [0.0, 1.0]], &config)
            .unwrap();
        let selection = Selection {
            weights: vec![0.25, 0.75],
            scores: vec![1.0, 0.0],
        };
        let mut c0 = Array1::zeros(2);
        est.initial_state(&selection, c0.view_mut());
        assert_eq!(c0, array![0.25, 0.75]);

        let mut grads = Array2::zeros((2, 2));
        est.distribute(&selection, array![4.0, 8.0].view(), &mut grads);
        assert_eq!(grads, array![[1.0, 2.0], [3.0, 6.0]]);
        assert_eq!(selection.best(), 1);
    }
}
