//! Truncated backpropagation through time.
//!
//! A sequence is simulated in blocks of `block_length` steps. At the end of
//! every block the adjoint is walked back from the block end to
//! `block_start − truncate_length` (never past the oldest retained step).
//! Output errors are injected only for steps inside the block, so each
//! prediction error is back-propagated exactly once.
//!
//! Adjoint recurrence at step `s`, with `δ = ∂L/∂c(s + 1)`:
//!
//! ```text
//! e      = δ ⊙ gain
//! ∇W^cc += e ⊗ c(s)      ∇W^ci += e ⊗ x(s)      ∇θ += e
//! ∇τ_i  += δ_i (c_i(s) − tanh a_i) / τ_i²
//! δ      ← δ ⊙ leak + W^ccᵀ·e
//! ```

use super::gradients::Gradients;
use super::loss::{output_error, StepLoss};
use super::penalty::Penalty;
use crate::cells::Linearization;
use crate::config::BpttConfig;
use crate::data::Sequence;
use crate::error::Result;
use crate::rnn::{Ctrnn, Trajectory};
use ndarray::{Array1, ArrayView1, Zip};
use tracing::trace;

/// Loss of one sequence as seen by the gradient computer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SequenceLoss {
    pub loss: StepLoss,
    /// Sum of the activation penalty over all steps.
    pub penalty: f64,
    pub steps: usize,
}

impl SequenceLoss {
    /// Objective plus activation penalty, the quantity being minimized.
    pub fn total(&self) -> f64 {
        self.loss.objective + self.penalty
    }
}

/// Gradient computer holding every buffer it needs across sequences.
#[derive(Debug, Clone)]
pub struct Bptt {
    config: BpttConfig,
    trajectory: Trajectory,
    lin: Linearization,
    delta: Array1<f64>,
    carry: Array1<f64>,
    e: Array1<f64>,
    dz: Array1<f64>,
    ds: Array1<f64>,
    initial_adjoint: Array1<f64>,
}

impl Bptt {
    pub fn new(config: BpttConfig, state_size: usize, dimension: usize) -> Self {
        Self {
            config,
            trajectory: Trajectory::default(),
            lin: Linearization::zeros(state_size),
            delta: Array1::zeros(state_size),
            carry: Array1::zeros(state_size),
            e: Array1::zeros(state_size),
            dz: Array1::zeros(dimension),
            ds: Array1::zeros(dimension),
            initial_adjoint: Array1::zeros(state_size),
        }
    }

    pub fn config(&self) -> BpttConfig {
        self.config
    }

    /// Steps per forward block for a sequence with `steps` predictions.
    pub fn block_size(&self, steps: usize) -> usize {
        match self.config.block_length {
            0 => steps,
            b => b.min(steps),
        }
    }

    /// Trajectory capacity needed for a sequence with `steps` predictions.
    pub fn capacity_for(&self, steps: usize) -> usize {
        match self.config.block_length {
            0 => steps,
            b => (b + self.config.truncate_length).min(steps),
        }
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// `∂L/∂c(0)` of the last processed sequence.
    pub fn initial_state_gradient(&self) -> ArrayView1<f64> {
        self.initial_adjoint.view()
    }

    /// Runs forward and backward over `sequence` from `initial_state`,
    /// adding the parameter gradients into `grads`.
    pub fn run_sequence(
        &mut self,
        net: &Ctrnn,
        sequence: &Sequence,
        initial_state: ArrayView1<f64>,
        penalty: &dyn Penalty,
        grads: &mut Gradients,
    ) -> Result<SequenceLoss> {
        let steps = net.steps(sequence);
        let block = self.block_size(steps).max(1);
        self.trajectory
            .prepare(self.capacity_for(steps), net.state_size(), net.output_size());
        self.trajectory.begin(initial_state);
        self.initial_adjoint.fill(0.0);

        let mut result = SequenceLoss {
            steps,
            ..SequenceLoss::default()
        };
        let mut block_start = 0;
        while block_start < steps {
            let block_end = (block_start + block).min(steps);
            for t in block_start..block_end {
                result.loss += net.forward_step(sequence, t, &mut self.trajectory)?;
                result.penalty += penalty.activation_value(self.trajectory.context(t));
            }
            self.backward(net, block_start, block_end, penalty, grads);
            block_start = block_end;
        }
        trace!(steps, objective = result.loss.objective, "sequence gradient");
        Ok(result)
    }

    fn backward(
        &mut self,
        net: &Ctrnn,
        block_start: usize,
        block_end: usize,
        penalty: &dyn Penalty,
        grads: &mut Gradients,
    ) {
        let cell = &net.cell;
        let variance = cell.has_variance();
        let traj = &self.trajectory;
        let lo = block_start
            .saturating_sub(self.config.truncate_length)
            .max(traj.first_retained());

        self.delta.fill(0.0);
        for s in (lo..block_end).rev() {
            if s >= block_start {
                let context = traj.context(s);
                output_error(
                    &cell.output,
                    variance,
                    traj.output(s),
                    traj.log_variance(s),
                    traj.target(s),
                    self.dz.view_mut(),
                    self.ds.view_mut(),
                );
                grads.output_threshold += &self.dz;
                cell.context_to_output
                    .accumulate_outer(self.dz.view(), context, &mut grads.context_to_output);
                cell.context_to_output
                    .accumulate_transposed(self.dz.view(), self.delta.view_mut());
                if variance {
                    grads.variance_threshold += &self.ds;
                    cell.context_to_variance.accumulate_outer(
                        self.ds.view(),
                        context,
                        &mut grads.context_to_variance,
                    );
                    cell.context_to_variance
                        .accumulate_transposed(self.ds.view(), self.delta.view_mut());
                }
                penalty.activation_gradient(context, self.delta.view_mut());
            }

            cell.linearize(traj.pre_activation(s), &mut self.lin);
            let prev = traj.prev_context(s);
            Zip::from(&mut self.e)
                .and(&self.delta)
                .and(&self.lin.gain)
                .for_each(|e, &d, &g| *e = d * g);

            cell.input_to_context
                .accumulate_outer(self.e.view(), traj.input(s), &mut grads.input_to_context);
            cell.context_to_context
                .accumulate_outer(self.e.view(), prev, &mut grads.context_to_context);
            grads.context_threshold += &self.e;
            Zip::from(&mut grads.tau)
                .and(&self.delta)
                .and(&prev)
                .and(&self.lin.transfer)
                .and(&cell.tau)
                .for_each(|g, &d, &c, &h, &tau| *g += d * (c - h) / (tau * tau));

            Zip::from(&mut self.carry)
                .and(&self.delta)
                .and(&self.lin.leak)
                .for_each(|c, &d, &leak| *c = d * leak);
            cell.context_to_context
                .accumulate_transposed(self.e.view(), self.carry.view_mut());
            std::mem::swap(&mut self.delta, &mut self.carry);
        }

        if lo == 0 {
            self.initial_adjoint += &self.delta;
        }
    }
}
