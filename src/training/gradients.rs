use crate::cells::CtrnnCell;
use crate::error::{ensure_finite, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Accumulated derivatives with the same layout as the trainable state:
/// every cell parameter group plus the representative initial states.
///
/// The optimizer reuses this layout for its momentum buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradients {
    pub input_to_context: Array2<f64>,
    pub context_to_context: Array2<f64>,
    pub context_to_output: Array2<f64>,
    pub context_to_variance: Array2<f64>,
    pub context_threshold: Array1<f64>,
    pub output_threshold: Array1<f64>,
    pub variance_threshold: Array1<f64>,
    pub tau: Array1<f64>,
    /// `[num_points, state_size]`
    pub representative_points: Array2<f64>,
}

impl Gradients {
    pub fn zeros_like(cell: &CtrnnCell, num_points: usize) -> Self {
        Self {
            input_to_context: Array2::zeros(cell.input_to_context.weight.dim()),
            context_to_context: Array2::zeros(cell.context_to_context.weight.dim()),
            context_to_output: Array2::zeros(cell.context_to_output.weight.dim()),
            context_to_variance: Array2::zeros(cell.context_to_variance.weight.dim()),
            context_threshold: Array1::zeros(cell.context_threshold.len()),
            output_threshold: Array1::zeros(cell.output_threshold.len()),
            variance_threshold: Array1::zeros(cell.variance_threshold.len()),
            tau: Array1::zeros(cell.tau.len()),
            representative_points: Array2::zeros((num_points, cell.state_size())),
        }
    }

    pub fn clear(&mut self) {
        self.input_to_context.fill(0.0);
        self.context_to_context.fill(0.0);
        self.context_to_output.fill(0.0);
        self.context_to_variance.fill(0.0);
        self.context_threshold.fill(0.0);
        self.output_threshold.fill(0.0);
        self.variance_threshold.fill(0.0);
        self.tau.fill(0.0);
        self.representative_points.fill(0.0);
    }

    fn values(&self) -> impl Iterator<Item = &f64> {
        self.input_to_context
            .iter()
            .chain(self.context_to_context.iter())
            .chain(self.context_to_output.iter())
            .chain(self.context_to_variance.iter())
            .chain(self.context_threshold.iter())
            .chain(self.output_threshold.iter())
            .chain(self.variance_threshold.iter())
            .chain(self.tau.iter())
            .chain(self.representative_points.iter())
    }

    /// Euclidean norm over every group.
    pub fn norm(&self) -> f64 {
        self.values().map(|g| g * g).sum::<f64>().sqrt()
    }

    pub fn ensure_finite(&self) -> Result<()> {
        ensure_finite(self.values(), || "accumulated gradient".into())
    }
}
