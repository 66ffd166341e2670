//! # ctrnn-learn - Continuous-Time Recurrent Neural Networks
//!
//! Fits a CTRNN to multivariate time series by truncated backpropagation
//! through time, then characterizes the learned dynamical system through its
//! Lyapunov spectrum.
//!
//! ## Features
//!
//! - **CTRNN cell**: leaky-integrator neurons with per-neuron time constants
//! - **Delayed self-feedback**: open-loop training, closed-loop generation
//! - **Output functions**: tanh, grouped softmax, optional log-variance readout
//! - **Sparsity Masks**: per-edge connectivity enforced in forward and backward passes
//! - **Truncated BPTT**: bounded trajectory memory with block-wise backprop
//! - **Optimizer**: momentum, bold-driver adaptive rate, Gaussian prior, elastic penalty
//! - **Representative initial states**: hard or soft assignment per sequence
//! - **Lyapunov analysis**: exponent spectrum, entropy and period detection
//!
//! ## Quick Start
//!
//! ```rust
//! use ctrnn_learn::prelude::*;
//! use ndarray::Array2;
//!
//! let series = Array2::from_shape_fn((30, 1), |(t, _)| (t as f64 * 0.3).sin() * 0.5);
//! let dataset = Dataset::from_arrays(vec![series], 1).unwrap();
//!
//! let mut config = TrainingConfig::default();
//! config.epochs = 3;
//! config.model.c_state_size = 4;
//!
//! let mut trainer = Trainer::new(config, dataset).unwrap();
//! let history = trainer.run(&mut NullSink).unwrap();
//! assert_eq!(history.len(), 3);
//! ```
//!
//! ## Cell-level Usage
//!
//! For direct cell access (single timestep processing):
//!
//! ```rust
//! use ctrnn_learn::cells::CtrnnCell;
//! use ctrnn_learn::config::ModelConfig;
//! use ctrnn_learn::wirings::WiringConfig;
//! use ndarray::Array1;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let config = ModelConfig {
//!     c_state_size: 6,
//!     context_to_context: WiringConfig::Random { sparsity_level: 0.5 },
//!     ..ModelConfig::default()
//! };
//! let cell = CtrnnCell::new(&config, 2, &mut StdRng::seed_from_u64(1234)).unwrap();
//! assert_eq!(cell.context_to_context.synapse_count(), 18);
//!
//! let step = cell.step(Array1::zeros(6).view(), Array1::zeros(2).view());
//! assert_eq!(step.context.len(), 6);
//! ```

pub mod activation;
pub mod cells;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod init_state;
pub mod lyapunov;
pub mod report;
pub mod rnn;
pub mod training;
pub mod wirings;

pub use error::{CtrnnError, Result};

pub mod prelude {
    pub use crate::activation::{OutputActivation, OutputType, SoftmaxGroups};
    pub use crate::cells::CtrnnCell;
    pub use crate::checkpoint::{Checkpoint, DeferredCheckpointWriter};
    pub use crate::config::{
        AnalysisConfig, BpttConfig, ModelConfig, OptimizerConfig, TrainingConfig,
    };
    pub use crate::data::{Dataset, Sequence};
    pub use crate::error::CtrnnError;
    pub use crate::init_state::{Assignment, AssignmentStrategy, InitialStateEstimator};
    pub use crate::lyapunov::{LyapunovAnalyzer, LyapunovReport};
    pub use crate::report::{
        IntervalPolicy, LogSink, NullSink, ReportConfig, ReportScheduler, ReportSink,
        ReportStream, Snapshot,
    };
    pub use crate::rnn::{Ctrnn, Recording};
    pub use crate::training::{ElasticPenalty, EpochStats, Penalty, Trainer};
    pub use crate::wirings::{Edge, FullyConnected, Random, Wiring, WiringConfig};
}
