//! Continuous-Time Recurrent Neural Network (CTRNN) Cell
//!
//! Each context neuron is a leaky integrator discretized with unit step:
//!
//! ```text
//! a_i  = θ_i + Σ_j W^cc_ij c_j + Σ_k W^ci_ik x_k
//! c'_i = c_i + (1/τ_i)(−c_i + tanh(a_i))
//! ```
//!
//! The readout maps the new context state to an output prediction and,
//! when the variance branch is wired, to a per-output log-variance.

use crate::activation::OutputActivation;
use crate::config::ModelConfig;
use crate::error::{CtrnnError, Result};
use crate::wirings::Connection;
use ndarray::{Array1, ArrayView1, ArrayViewMut1, Zip};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Half-width of the uniform range used for threshold initialization.
const THRESHOLD_INIT_RANGE: f64 = 0.1;

/// Local derivatives of one context update, evaluated at a pre-activation.
///
/// `∂c'/∂c = diag(leak) + diag(gain)·W^cc` and `∂c'/∂x = diag(gain)·W^ci`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linearization {
    /// `tanh(a)`
    pub transfer: Array1<f64>,
    /// `1 − 1/τ`
    pub leak: Array1<f64>,
    /// `(1 − tanh²(a)) / τ`
    pub gain: Array1<f64>,
}

impl Linearization {
    pub fn zeros(state_size: usize) -> Self {
        Self {
            transfer: Array1::zeros(state_size),
            leak: Array1::zeros(state_size),
            gain: Array1::zeros(state_size),
        }
    }
}

/// Result of a single allocating [`CtrnnCell::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub context: Array1<f64>,
    pub pre_activation: Array1<f64>,
    pub output: Array1<f64>,
    pub log_variance: Array1<f64>,
}

/// CTRNN cell: weights, thresholds, time constants and readout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtrnnCell {
    /// Input → context synapses, `[state_size, input_size]`
    pub input_to_context: Connection,
    /// Recurrent context synapses, `[state_size, state_size]`
    pub context_to_context: Connection,
    /// Context → output synapses, `[output_size, state_size]`
    pub context_to_output: Connection,
    /// Context → log-variance synapses, `[output_size, state_size]`
    pub context_to_variance: Connection,
    pub context_threshold: Array1<f64>,
    pub output_threshold: Array1<f64>,
    pub variance_threshold: Array1<f64>,
    /// Time constants (always >= 1)
    pub tau: Array1<f64>,
    pub output: OutputActivation,
}

impl CtrnnCell {
    /// Creates a cell for `dimension`-dimensional time series, drawing every
    /// random quantity from `rng`.
    pub fn new(config: &ModelConfig, dimension: usize, rng: &mut StdRng) -> Result<Self> {
        let n = config.c_state_size;
        let groups = config.softmax_partition(dimension)?;
        let output = match config.output_type {
            crate::activation::OutputType::Tanh => OutputActivation::tanh(dimension),
            crate::activation::OutputType::Softmax => OutputActivation::softmax(groups),
        };

        let i2c = config.input_to_context.build()?.edges(n, dimension, rng);
        let c2c = config.context_to_context.build()?.edges(n, n, rng);
        let c2o = config.context_to_output.build()?.edges(dimension, n, rng);
        let c2v = config.context_to_variance.build()?.edges(dimension, n, rng);

        // Fan-in scaled uniform initialization.
        let input_range = 1.0 / (dimension as f64).sqrt();
        let context_range = 1.0 / (n as f64).sqrt();
        let input_to_context = Connection::from_edges(&i2c, input_range, rng);
        let context_to_context = Connection::from_edges(&c2c, context_range, rng);
        let context_to_output = Connection::from_edges(&c2o, context_range, rng);
        let context_to_variance = Connection::from_edges(&c2v, context_range, rng);

        let context_threshold = Self::init_threshold(n, rng);
        let output_threshold = Self::init_threshold(dimension, rng);
        let variance_threshold = Array1::zeros(dimension);

        let tau = Array1::from(config.tau_vector());
        if tau.len() != n {
            return Err(CtrnnError::config(
                "model.init_tau",
                format!("expected {} values, got {}", n, tau.len()),
            ));
        }

        Ok(Self {
            input_to_context,
            context_to_context,
            context_to_output,
            context_to_variance,
            context_threshold,
            output_threshold,
            variance_threshold,
            tau,
            output,
        })
    }

    fn init_threshold(len: usize, rng: &mut StdRng) -> Array1<f64> {
        Array1::from_shape_fn(len, |_| {
            rng.gen_range(-THRESHOLD_INIT_RANGE..THRESHOLD_INIT_RANGE)
        })
    }

    pub fn state_size(&self) -> usize {
        self.tau.len()
    }

    pub fn input_size(&self) -> usize {
        self.input_to_context.cols()
    }

    pub fn output_size(&self) -> usize {
        self.context_to_output.rows()
    }

    /// True when the log-variance readout has at least one synapse.
    pub fn has_variance(&self) -> bool {
        !self.context_to_variance.is_empty()
    }

    /// `a = θ + W^cc·c + W^ci·x`
    pub fn pre_activation(
        &self,
        context: ArrayView1<f64>,
        input: ArrayView1<f64>,
        mut a: ArrayViewMut1<f64>,
    ) {
        a.assign(&self.context_threshold);
        self.context_to_context.accumulate(context, a.view_mut());
        self.input_to_context.accumulate(input, a.view_mut());
    }

    /// Advances the context state by one step, writing the new state and the
    /// pre-activation into the given buffers.
    pub fn advance(
        &self,
        context: ArrayView1<f64>,
        input: ArrayView1<f64>,
        mut next: ArrayViewMut1<f64>,
        mut a: ArrayViewMut1<f64>,
    ) {
        self.pre_activation(context, input, a.view_mut());
        Zip::from(&mut next)
            .and(&context)
            .and(&a)
            .and(&self.tau)
            .for_each(|n, &c, &a, &tau| {
                *n = c + (a.tanh() - c) / tau;
            });
    }

    /// Computes the output prediction and log-variance for a context state.
    /// The log-variance is left at zero when the variance branch is absent.
    pub fn readout(
        &self,
        context: ArrayView1<f64>,
        mut output: ArrayViewMut1<f64>,
        mut log_variance: ArrayViewMut1<f64>,
    ) {
        output.assign(&self.output_threshold);
        self.context_to_output.accumulate(context, output.view_mut());
        self.output.apply(output);

        if self.has_variance() {
            log_variance.assign(&self.variance_threshold);
            self.context_to_variance
                .accumulate(context, log_variance.view_mut());
        } else {
            log_variance.fill(0.0);
        }
    }

    /// Allocating single step: `(c, x) → (c', a, y, s)`.
    pub fn step(&self, context: ArrayView1<f64>, input: ArrayView1<f64>) -> Step {
        let n = self.state_size();
        let d = self.output_size();
        let mut next = Array1::zeros(n);
        let mut pre_activation = Array1::zeros(n);
        let mut output = Array1::zeros(d);
        let mut log_variance = Array1::zeros(d);
        self.advance(context, input, next.view_mut(), pre_activation.view_mut());
        self.readout(next.view(), output.view_mut(), log_variance.view_mut());
        Step {
            context: next,
            pre_activation,
            output,
            log_variance,
        }
    }

    /// Evaluates the local derivatives of the context update at `a`.
    pub fn linearize(&self, a: ArrayView1<f64>, lin: &mut Linearization) {
        Zip::from(&mut lin.transfer)
            .and(&mut lin.leak)
            .and(&mut lin.gain)
            .and(&a)
            .and(&self.tau)
            .for_each(|h, leak, gain, &a, &tau| {
                *h = a.tanh();
                *leak = 1.0 - 1.0 / tau;
                *gain = (1.0 - *h * *h) / tau;
            });
    }

    /// `out = leak ⊙ q + gain ⊙ (W^cc·q)`: the context-to-context tangent map.
    pub fn state_tangent(
        &self,
        lin: &Linearization,
        q: ArrayView1<f64>,
        mut out: ArrayViewMut1<f64>,
    ) {
        out.fill(0.0);
        self.context_to_context.accumulate(q, out.view_mut());
        Zip::from(&mut out)
            .and(&q)
            .and(&lin.leak)
            .and(&lin.gain)
            .for_each(|o, &q, &leak, &gain| *o = leak * q + gain * *o);
    }

    /// `out += gain ⊙ (W^ci·u)`: the input-to-context tangent map.
    pub fn input_tangent(
        &self,
        lin: &Linearization,
        u: ArrayView1<f64>,
        mut out: ArrayViewMut1<f64>,
        scratch: &mut Array1<f64>,
    ) {
        scratch.fill(0.0);
        self.input_to_context.accumulate(u, scratch.view_mut());
        Zip::from(&mut out)
            .and(&*scratch)
            .and(&lin.gain)
            .for_each(|o, &s, &gain| *o += gain * s);
    }

    /// `out = (∂y/∂z)·(W^oc·q)`, given the output `y` at the state where the
    /// tangent is taken.
    pub fn output_tangent(
        &self,
        output: ArrayView1<f64>,
        q: ArrayView1<f64>,
        mut out: ArrayViewMut1<f64>,
    ) {
        out.fill(0.0);
        self.context_to_output.accumulate(q, out.view_mut());
        self.output.tangent(output, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::SeedableRng;

    fn create_test_cell() -> CtrnnCell {
        let config = ModelConfig {
            c_state_size: 4,
            init_tau: vec![2.0],
            ..ModelConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1234);
        CtrnnCell::new(&config, 3, &mut rng).unwrap()
    }

    #[test]
    fn test_ctrnn_cell_creation() {
        let cell = create_test_cell();
        assert_eq!(cell.state_size(), 4);
        assert_eq!(cell.input_size(), 3);
        assert_eq!(cell.output_size(), 3);
        assert!(!cell.has_variance());
    }

    #[test]
    fn test_leaky_update() {
        let cell = create_test_cell();
        let c = array![0.1, -0.2, 0.3, 0.0];
        let x = array![0.5, -0.5, 0.25];
        let step = cell.step(c.view(), x.view());
        for i in 0..4 {
            let expected = c[i] + (step.pre_activation[i].tanh() - c[i]) / 2.0;
            assert_abs_diff_eq!(step.context[i], expected, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_state_tangent_matches_finite_difference() {
        let cell = create_test_cell();
        let c = array![0.1, -0.2, 0.3, 0.0];
        let x = array![0.5, -0.5, 0.25];
        let q = array![0.3, 0.1, -0.2, 0.4];
        let eps = 1e-6;

        let step = cell.step(c.view(), x.view());
        let mut lin = Linearization::zeros(4);
        cell.linearize(step.pre_activation.view(), &mut lin);
        let mut jvp = Array1::zeros(4);
        cell.state_tangent(&lin, q.view(), jvp.view_mut());

        let plus = cell.step((&c + &(&q * eps)).view(), x.view()).context;
        let minus = cell.step((&c - &(&q * eps)).view(), x.view()).context;
        let numeric = (&plus - &minus) / (2.0 * eps);
        for i in 0..4 {
            assert_abs_diff_eq!(jvp[i], numeric[i], epsilon = 1e-8);
        }
    }
}
