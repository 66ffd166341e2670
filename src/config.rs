//! Validated configuration record consumed by the training engine.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes. [`TrainingConfig::validate`] checks dimension-free ranges;
//! [`TrainingConfig::validate_for`] additionally checks everything that
//! depends on the data dimension.

use crate::activation::{OutputType, SoftmaxGroups};
use crate::error::{CtrnnError, Result};
use crate::init_state::AssignmentStrategy;
use crate::report::ReportConfig;
use crate::wirings::WiringConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Seed for the single generator behind every random initializer.
    pub seed: u64,
    /// Number of training epochs.
    pub epochs: usize,
    pub model: ModelConfig,
    pub optimizer: OptimizerConfig,
    pub bptt: BpttConfig,
    pub analysis: AnalysisConfig,
    pub report: ReportConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            epochs: 1000,
            model: ModelConfig::default(),
            optimizer: OptimizerConfig::default(),
            bptt: BpttConfig::default(),
            analysis: AnalysisConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

/// Network architecture and initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of context neurons.
    pub c_state_size: usize,
    /// Number of representative initial states.
    pub rep_init_size: usize,
    /// Variance of the representative initial states at initialization.
    pub rep_init_variance: f64,
    /// How sequences are assigned to representative initial states.
    pub assignment: AssignmentStrategy,
    /// Delay of the output → input self-feedback, in steps.
    pub delay_length: usize,
    pub output_type: OutputType,
    /// Group label per output unit (softmax output only). `None` puts every
    /// output in one group.
    pub softmax_groups: Option<Vec<usize>>,
    /// Initial time constants: one value for all neurons or one per neuron.
    pub init_tau: Vec<f64>,
    /// Neurons whose initial state is shared by all representative points.
    pub shared_init_neurons: Vec<usize>,
    pub input_to_context: WiringConfig,
    pub context_to_context: WiringConfig,
    pub context_to_output: WiringConfig,
    pub context_to_variance: WiringConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            c_state_size: 10,
            rep_init_size: 1,
            rep_init_variance: 0.01,
            assignment: AssignmentStrategy::default(),
            delay_length: 1,
            output_type: OutputType::Tanh,
            softmax_groups: None,
            init_tau: vec![1.0],
            shared_init_neurons: Vec::new(),
            input_to_context: WiringConfig::default(),
            context_to_context: WiringConfig::default(),
            context_to_output: WiringConfig::default(),
            context_to_variance: WiringConfig::None,
        }
    }
}

impl ModelConfig {
    /// Per-neuron initial τ.
    pub fn tau_vector(&self) -> Vec<f64> {
        if self.init_tau.len() == 1 {
            vec![self.init_tau[0]; self.c_state_size]
        } else {
            self.init_tau.clone()
        }
    }

    /// Output group partition for a `dimension`-dimensional output.
    pub fn softmax_partition(&self, dimension: usize) -> Result<SoftmaxGroups> {
        match (self.output_type, &self.softmax_groups) {
            (OutputType::Tanh, _) => Ok(SoftmaxGroups::singletons(dimension)),
            (OutputType::Softmax, None) => Ok(SoftmaxGroups::single(dimension)),
            (OutputType::Softmax, Some(labels)) => SoftmaxGroups::from_labels(labels),
        }
    }

    /// True when the variance branch has at least one synapse.
    pub fn has_variance_branch(&self) -> bool {
        match &self.context_to_variance {
            WiringConfig::None => false,
            WiringConfig::Explicit { edges } => edges.iter().flatten().any(|e| e.present),
            WiringConfig::Random { sparsity_level } => *sparsity_level < 1.0,
            WiringConfig::Full { .. } => true,
        }
    }
}

/// Update rule and regularization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Learning rate.
    pub rho: f64,
    pub momentum: f64,
    pub use_adaptive_lr: bool,
    /// Precision of the zero-mean Gaussian prior on weights.
    pub prior_strength: f64,
    /// L2 coefficient on context activations.
    pub lambda: f64,
    /// L1 coefficient on weights.
    pub alpha: f64,
    pub fixed_weight: bool,
    pub fixed_threshold: bool,
    pub fixed_tau: bool,
    pub fixed_init_c_state: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            rho: 0.001,
            momentum: 0.9,
            use_adaptive_lr: false,
            prior_strength: 0.0,
            lambda: 0.0,
            alpha: 0.0,
            fixed_weight: false,
            fixed_threshold: false,
            fixed_tau: false,
            fixed_init_c_state: false,
        }
    }
}

/// Truncated backpropagation through time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BpttConfig {
    /// How far the backward pass may reach past the start of a block.
    pub truncate_length: usize,
    /// Steps per forward block; 0 treats a whole sequence as one block.
    pub block_length: usize,
}

/// Lyapunov spectrum analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of consecutive segments averaged into the final spectrum.
    pub divide_num: usize,
    /// Number of exponents; `None` computes the full spectrum.
    pub lyapunov_spectrum_size: Option<usize>,
    /// Steps per segment, also the longest period looked for.
    pub threshold_period: usize,
    /// Steps discarded before measuring; defaults to `threshold_period`.
    pub transient_length: Option<usize>,
    /// Max-norm distance under which the trajectory counts as returned.
    pub period_tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            divide_num: 1,
            lyapunov_spectrum_size: None,
            threshold_period: 500,
            transient_length: None,
            period_tolerance: 1e-6,
        }
    }
}

fn non_negative(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CtrnnError::config(field, format!("must be >= 0, got {}", value)))
    }
}

fn positive(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CtrnnError::config(field, format!("must be > 0, got {}", value)))
    }
}

fn at_least_one(field: &str, value: usize) -> Result<()> {
    if value >= 1 {
        Ok(())
    } else {
        Err(CtrnnError::config(field, "must be greater than zero"))
    }
}

impl TrainingConfig {
    /// Reads a JSON config file and validates its dimension-free ranges.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CtrnnError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            CtrnnError::Serialization {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every range that does not depend on the data.
    pub fn validate(&self) -> Result<()> {
        let m = &self.model;
        at_least_one("model.c_state_size", m.c_state_size)?;
        at_least_one("model.rep_init_size", m.rep_init_size)?;
        at_least_one("model.delay_length", m.delay_length)?;
        positive("model.rep_init_variance", m.rep_init_variance)?;
        if let AssignmentStrategy::Soft { temperature } = m.assignment {
            positive("model.assignment.temperature", temperature)?;
        }
        if m.init_tau.is_empty() {
            return Err(CtrnnError::config("model.init_tau", "at least one value is required"));
        }
        if m.init_tau.len() != 1 && m.init_tau.len() != m.c_state_size {
            return Err(CtrnnError::config(
                "model.init_tau",
                format!(
                    "expected 1 or {} values, got {}",
                    m.c_state_size,
                    m.init_tau.len()
                ),
            ));
        }
        if let Some(tau) = m.init_tau.iter().find(|t| !(t.is_finite() && **t >= 1.0)) {
            return Err(CtrnnError::config(
                "model.init_tau",
                format!("time constants must be >= 1, got {}", tau),
            ));
        }
        if let Some(n) = m.shared_init_neurons.iter().find(|&&n| n >= m.c_state_size) {
            return Err(CtrnnError::config(
                "model.shared_init_neurons",
                format!("neuron {} out of range 0..{}", n, m.c_state_size),
            ));
        }

        let o = &self.optimizer;
        non_negative("optimizer.rho", o.rho)?;
        non_negative("optimizer.momentum", o.momentum)?;
        non_negative("optimizer.prior_strength", o.prior_strength)?;
        non_negative("optimizer.lambda", o.lambda)?;
        non_negative("optimizer.alpha", o.alpha)?;

        let a = &self.analysis;
        at_least_one("analysis.divide_num", a.divide_num)?;
        at_least_one("analysis.threshold_period", a.threshold_period)?;
        if let Some(size) = a.lyapunov_spectrum_size {
            at_least_one("analysis.lyapunov_spectrum_size", size)?;
        }
        positive("analysis.period_tolerance", a.period_tolerance)?;
        Ok(())
    }

    /// Checks the config against a data set of the given feature dimension.
    pub fn validate_for(&self, dimension: usize) -> Result<()> {
        self.validate()?;
        at_least_one("dimension", dimension)?;
        let m = &self.model;
        let n = m.c_state_size;

        match (m.output_type, &m.softmax_groups) {
            (OutputType::Tanh, Some(_)) => {
                return Err(CtrnnError::config(
                    "model.softmax_groups",
                    "only meaningful with softmax output",
                ));
            }
            (OutputType::Softmax, Some(labels)) if labels.len() != dimension => {
                return Err(CtrnnError::config(
                    "model.softmax_groups",
                    format!("expected {} labels, got {}", dimension, labels.len()),
                ));
            }
            _ => {}
        }
        if m.output_type == OutputType::Softmax && m.has_variance_branch() {
            return Err(CtrnnError::config(
                "model.context_to_variance",
                "the variance branch requires tanh output",
            ));
        }

        m.input_to_context.validate("model.input_to_context", n, dimension)?;
        m.context_to_context.validate("model.context_to_context", n, n)?;
        m.context_to_output.validate("model.context_to_output", dimension, n)?;
        m.context_to_variance.validate("model.context_to_variance", dimension, n)?;

        if let Some(size) = self.analysis.lyapunov_spectrum_size {
            let extended = n * m.delay_length;
            if size > extended {
                return Err(CtrnnError::config(
                    "analysis.lyapunov_spectrum_size",
                    format!("at most {} exponents exist, asked for {}", extended, size),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: CtrnnError) -> String {
        match err {
            CtrnnError::Configuration { field, .. } => field,
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        TrainingConfig::default().validate_for(3).unwrap();
    }

    #[test]
    fn test_negative_rate_names_field() {
        let mut config = TrainingConfig::default();
        config.optimizer.rho = -0.1;
        assert_eq!(field_of(config.validate().unwrap_err()), "optimizer.rho");
    }

    #[test]
    fn test_zero_neurons_rejected() {
        let mut config = TrainingConfig::default();
        config.model.c_state_size = 0;
        assert_eq!(field_of(config.validate().unwrap_err()), "model.c_state_size");
    }

    #[test]
    fn test_tau_below_one_rejected() {
        let mut config = TrainingConfig::default();
        config.model.init_tau = vec![0.5];
        assert_eq!(field_of(config.validate().unwrap_err()), "model.init_tau");
    }

    #[test]
    fn test_softmax_labels_must_cover_outputs() {
        let mut config = TrainingConfig::default();
        config.model.output_type = OutputType::Softmax;
        config.model.softmax_groups = Some(vec![0, 0]);
        assert_eq!(
            field_of(config.validate_for(3).unwrap_err()),
            "model.softmax_groups"
        );
    }

    #[test]
    fn test_spectrum_size_bounded_by_extended_state() {
        let mut config = TrainingConfig::default();
        config.model.c_state_size = 2;
        config.model.delay_length = 2;
        config.analysis.lyapunov_spectrum_size = Some(5);
        assert_eq!(
            field_of(config.validate_for(1).unwrap_err()),
            "analysis.lyapunov_spectrum_size"
        );
    }

    #[test]
    fn test_json_round_trip_with_partial_fields() {
        let json = r#"{ "seed": 7, "model": { "c_state_size": 4, "init_tau": [2.0] } }"#;
        let config: TrainingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.model.c_state_size, 4);
        assert_eq!(config.model.tau_vector(), vec![2.0; 4]);
        assert_eq!(config.optimizer, OptimizerConfig::default());
    }
}
