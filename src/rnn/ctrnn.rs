//! Continuous-Time Recurrent Neural Network (CTRNN) Sequence Layer
//!
//! Runs a [`CtrnnCell`] over a whole sequence, either open-loop (driven by
//! the observed samples) or closed-loop (fed back its own delayed output).

use super::trajectory::Trajectory;
use crate::cells::CtrnnCell;
use crate::data::Sequence;
use crate::error::{ensure_finite, Result};
use crate::training::loss::{step_loss, StepLoss};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Everything produced by simulating one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub initial_state: Array1<f64>,
    /// `[steps, state_size]`, row `t` is `c(t + 1)`
    pub context: Array2<f64>,
    /// `[steps, output_size]`
    pub output: Array2<f64>,
    /// `[steps, output_size]`, zero without a variance branch
    pub log_variance: Array2<f64>,
    pub loss: StepLoss,
}

impl Recording {
    pub fn steps(&self) -> usize {
        self.output.nrows()
    }

    /// Mean squared error per predicted step.
    pub fn mean_squared_error(&self) -> f64 {
        if self.steps() == 0 {
            0.0
        } else {
            self.loss.squared_error / self.steps() as f64
        }
    }
}

/// CTRNN with delayed output → input feedback.
///
/// With delay `d`, a sequence of length `L` yields `L − d` steps. Step `t`
/// consumes `x(t)` and predicts `sample(t + d)`. Open loop uses
/// `x(t) = sample(t)`; closed loop switches to `x(t) = y(t − d)` once
/// `t >= d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ctrnn {
    pub cell: CtrnnCell,
    pub delay: usize,
}

impl Ctrnn {
    pub fn new(cell: CtrnnCell, delay: usize) -> Self {
        Self { cell, delay }
    }

    pub fn state_size(&self) -> usize {
        self.cell.state_size()
    }

    pub fn output_size(&self) -> usize {
        self.cell.output_size()
    }

    /// Predicted steps for `sequence`.
    pub fn steps(&self, sequence: &Sequence) -> usize {
        sequence.steps(self.delay)
    }

    /// Runs open-loop step `t` from the trajectory's running state and
    /// records it.
    pub fn forward_step(
        &self,
        sequence: &Sequence,
        t: usize,
        trajectory: &mut Trajectory,
    ) -> Result<StepLoss> {
        let variance = self.cell.has_variance();
        let mut rec = trajectory.record_step();
        rec.prev_context.assign(&rec.state);
        rec.input.assign(&sequence.sample(t));
        rec.target.assign(&sequence.sample(t + self.delay));
        self.cell.advance(
            rec.prev_context.view(),
            rec.input.view(),
            rec.context.view_mut(),
            rec.pre_activation.view_mut(),
        );
        self.cell.readout(
            rec.context.view(),
            rec.output.view_mut(),
            rec.log_variance.view_mut(),
        );
        rec.state.assign(&rec.context);

        ensure_finite(rec.context.iter().chain(rec.output.iter()), || {
            format!("context state or output at step {}", t)
        })?;
        let loss = step_loss(
            &self.cell.output,
            variance,
            rec.output.view(),
            rec.log_variance.view(),
            rec.target.view(),
        );
        ensure_finite(&[loss.objective], || format!("loss at step {}", t))?;
        Ok(loss)
    }

    /// Simulates `sequence` from `initial_state`, calling `on_step` with
    /// `(t, c(t + 1), y(t), s(t))` after every step.
    fn simulate<F>(
        &self,
        sequence: &Sequence,
        initial_state: ArrayView1<f64>,
        closed_loop: bool,
        mut on_step: F,
    ) -> Result<StepLoss>
    where
        F: FnMut(usize, ArrayView1<f64>, ArrayView1<f64>, ArrayView1<f64>),
    {
        let n = self.state_size();
        let d = self.output_size();
        let delay = self.delay;
        let variance = self.cell.has_variance();

        let mut context = initial_state.to_owned();
        let mut next = Array1::zeros(n);
        let mut a = Array1::zeros(n);
        let mut input = Array1::zeros(d);
        let mut log_variance = Array1::zeros(d);
        // Last `delay` outputs, indexed by `t % delay`.
        let mut fed_back = Array2::zeros((delay.max(1), d));
        let mut total = StepLoss::default();

        for t in 0..self.steps(sequence) {
            if closed_loop && t >= delay {
                input.assign(&fed_back.row(t % delay));
            } else {
                input.assign(&sequence.sample(t));
            }
            self.cell
                .advance(context.view(), input.view(), next.view_mut(), a.view_mut());
            std::mem::swap(&mut context, &mut next);

            let mut output = fed_back.row_mut(t % delay.max(1));
            self.cell
                .readout(context.view(), output.view_mut(), log_variance.view_mut());
            ensure_finite(context.iter().chain(output.iter()), || {
                format!("context state or output at step {}", t)
            })?;

            total += step_loss(
                &self.cell.output,
                variance,
                output.view(),
                log_variance.view(),
                sequence.sample(t + delay),
            );
            on_step(t, context.view(), output.view(), log_variance.view());
        }
        ensure_finite(&[total.objective], || "sequence loss".into())?;
        Ok(total)
    }

    /// Open-loop loss of `sequence` when started from `initial_state`.
    pub fn loss(&self, sequence: &Sequence, initial_state: ArrayView1<f64>) -> Result<StepLoss> {
        self.simulate(sequence, initial_state, false, |_, _, _, _| {})
    }

    pub fn record_open_loop(
        &self,
        sequence: &Sequence,
        initial_state: ArrayView1<f64>,
    ) -> Result<Recording> {
        self.record(sequence, initial_state, false)
    }

    pub fn record_closed_loop(
        &self,
        sequence: &Sequence,
        initial_state: ArrayView1<f64>,
    ) -> Result<Recording> {
        self.record(sequence, initial_state, true)
    }

    fn record(
        &self,
        sequence: &Sequence,
        initial_state: ArrayView1<f64>,
        closed_loop: bool,
    ) -> Result<Recording> {
        let steps = self.steps(sequence);
        let mut context = Array2::zeros((steps, self.state_size()));
        let mut output = Array2::zeros((steps, self.output_size()));
        let mut log_variance = Array2::zeros((steps, self.output_size()));
        let loss = self.simulate(sequence, initial_state, closed_loop, |t, c, y, s| {
            context.row_mut(t).assign(&c);
            output.row_mut(t).assign(&y);
            log_variance.row_mut(t).assign(&s);
        })?;
        Ok(Recording {
            initial_state: initial_state.to_owned(),
            context,
            output,
            log_variance,
            loss,
        })
    }
}
