//! Secondary regularization applied next to the Gaussian weight prior.

use ndarray::{ArrayView1, ArrayViewMut1, Zip};
use std::fmt::Debug;

/// Regularizer on context activations and on free weights.
///
/// The activation terms enter backpropagation at every in-block step; the
/// weight term is added by the optimizer to every present synapse.
pub trait Penalty: Debug + Send + Sync {
    /// Penalty value for one context state, added to the objective.
    fn activation_value(&self, context: ArrayView1<f64>) -> f64;

    /// Adds `∂penalty/∂c` to `adjoint`.
    fn activation_gradient(&self, context: ArrayView1<f64>, adjoint: ArrayViewMut1<f64>);

    /// Gradient contribution for a single weight value.
    fn weight_gradient(&self, weight: f64) -> f64;
}

/// L2 on context activations (`lambda`) plus L1 on weights (`alpha`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ElasticPenalty {
    pub lambda: f64,
    pub alpha: f64,
}

impl ElasticPenalty {
    pub fn new(lambda: f64, alpha: f64) -> Self {
        Self { lambda, alpha }
    }
}

impl Penalty for ElasticPenalty {
    fn activation_value(&self, context: ArrayView1<f64>) -> f64 {
        if self.lambda == 0.0 {
            return 0.0;
        }
        0.5 * self.lambda * context.dot(&context)
    }

    fn activation_gradient(&self, context: ArrayView1<f64>, mut adjoint: ArrayViewMut1<f64>) {
        if self.lambda == 0.0 {
            return;
        }
        let lambda = self.lambda;
        Zip::from(&mut adjoint)
            .and(&context)
            .for_each(|d, &c| *d += lambda * c);
    }

    fn weight_gradient(&self, weight: f64) -> f64 {
        if weight == 0.0 {
            0.0
        } else {
            self.alpha * weight.signum()
        }
    }
}
