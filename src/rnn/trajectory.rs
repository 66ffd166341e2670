//! Bounded record of a forward pass, as needed by truncated BPTT.

use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1};

/// Mutable row views for the step being recorded, plus the running context
/// state that the step starts from.
pub struct StepRecord<'a> {
    pub state: ArrayViewMut1<'a, f64>,
    pub prev_context: ArrayViewMut1<'a, f64>,
    pub input: ArrayViewMut1<'a, f64>,
    pub pre_activation: ArrayViewMut1<'a, f64>,
    pub context: ArrayViewMut1<'a, f64>,
    pub output: ArrayViewMut1<'a, f64>,
    pub log_variance: ArrayViewMut1<'a, f64>,
    pub target: ArrayViewMut1<'a, f64>,
}

/// Ring buffer holding the most recent `capacity` steps of one sequence.
///
/// Steps are addressed by their absolute index within the sequence; only
/// indices in `first_retained()..recorded()` may be read. Buffers are
/// allocated by [`prepare`](Self::prepare) and reused across sequences.
#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    capacity: usize,
    recorded: usize,
    state: Array1<f64>,
    prev_context: Array2<f64>,
    input: Array2<f64>,
    pre_activation: Array2<f64>,
    context: Array2<f64>,
    output: Array2<f64>,
    log_variance: Array2<f64>,
    target: Array2<f64>,
}

impl Trajectory {
    pub fn new(capacity: usize, state_size: usize, dimension: usize) -> Self {
        let mut trajectory = Self::default();
        trajectory.prepare(capacity, state_size, dimension);
        trajectory
    }

    /// Makes room for `capacity` steps, reallocating only when the shape
    /// changes, and forgets every recorded step.
    pub fn prepare(&mut self, capacity: usize, state_size: usize, dimension: usize) {
        let capacity = capacity.max(1);
        let reshape = capacity != self.capacity
            || self.context.ncols() != state_size
            || self.output.ncols() != dimension;
        if reshape {
            self.capacity = capacity;
            self.state = Array1::zeros(state_size);
            self.prev_context = Array2::zeros((capacity, state_size));
            self.input = Array2::zeros((capacity, dimension));
            self.pre_activation = Array2::zeros((capacity, state_size));
            self.context = Array2::zeros((capacity, state_size));
            self.output = Array2::zeros((capacity, dimension));
            self.log_variance = Array2::zeros((capacity, dimension));
            self.target = Array2::zeros((capacity, dimension));
        }
        self.recorded = 0;
    }

    /// Forgets every recorded step and restarts from `initial_state`.
    pub fn begin(&mut self, initial_state: ArrayView1<f64>) {
        self.recorded = 0;
        self.state.assign(&initial_state);
    }

    /// Context state after the last recorded step.
    pub fn state(&self) -> ArrayView1<f64> {
        self.state.view()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of steps recorded since the last clear.
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Oldest step still held in the buffer.
    pub fn first_retained(&self) -> usize {
        self.recorded.saturating_sub(self.capacity)
    }

    pub fn is_retained(&self, t: usize) -> bool {
        t >= self.first_retained() && t < self.recorded
    }

    fn slot(&self, t: usize) -> usize {
        debug_assert!(self.is_retained(t), "step {} no longer retained", t);
        t % self.capacity
    }

    /// Claims the row for the next step, overwriting the oldest one when full.
    pub fn record_step(&mut self) -> StepRecord<'_> {
        let slot = self.recorded % self.capacity;
        self.recorded += 1;
        StepRecord {
            state: self.state.view_mut(),
            prev_context: self.prev_context.row_mut(slot),
            input: self.input.row_mut(slot),
            pre_activation: self.pre_activation.row_mut(slot),
            context: self.context.row_mut(slot),
            output: self.output.row_mut(slot),
            log_variance: self.log_variance.row_mut(slot),
            target: self.target.row_mut(slot),
        }
    }

    pub fn prev_context(&self, t: usize) -> ArrayView1<f64> {
        self.prev_context.row(self.slot(t))
    }

    pub fn input(&self, t: usize) -> ArrayView1<f64> {
        self.input.row(self.slot(t))
    }

    pub fn pre_activation(&self, t: usize) -> ArrayView1<f64> {
        self.pre_activation.row(self.slot(t))
    }

    pub fn context(&self, t: usize) -> ArrayView1<f64> {
        self.context.row(self.slot(t))
    }

    pub fn output(&self, t: usize) -> ArrayView1<f64> {
        self.output.row(self.slot(t))
    }

    pub fn log_variance(&self, t: usize) -> ArrayView1<f64> {
        self.log_variance.row(self.slot(t))
    }

    pub fn target(&self, t: usize) -> ArrayView1<f64> {
        self.target.row(self.slot(t))
    }
}
