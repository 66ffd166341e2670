//! # Training
//!
//! Gradient computation, parameter updates and the epoch loop.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`Bptt`] | truncated backpropagation through time over a bounded trajectory |
//! | [`Optimizer`] | momentum descent, adaptive rate, Gaussian weight prior |
//! | [`Penalty`] | pluggable secondary regularizer ([`ElasticPenalty`] by default) |
//! | [`Trainer`] | epochs, initial-state assignment, reports and checkpoints |
//!
//! ## Example
//!
//! ```no_run
//! use ctrnn_learn::config::TrainingConfig;
//! use ctrnn_learn::data::Dataset;
//! use ctrnn_learn::report::LogSink;
//! use ctrnn_learn::training::Trainer;
//! use ndarray::Array2;
//!
//! let series = Array2::from_shape_fn((50, 1), |(t, _)| (t as f64 * 0.25).sin() * 0.8);
//! let dataset = Dataset::from_arrays(vec![series], 1)?;
//! let mut trainer = Trainer::new(TrainingConfig::default(), dataset)?;
//! let history = trainer.run(&mut LogSink)?;
//! println!("final error {}", history.last().map_or(0.0, |s| s.error));
//! # Ok::<(), ctrnn_learn::CtrnnError>(())
//! ```

pub mod bptt;
pub mod gradients;
pub mod loss;
pub mod optimizer;
pub mod penalty;
pub mod trainer;

pub use bptt::{Bptt, SequenceLoss};
pub use gradients::Gradients;
pub use loss::StepLoss;
pub use optimizer::{AdaptiveRate, Optimizer, OptimizerState};
pub use penalty::{ElasticPenalty, Penalty};
pub use trainer::{EpochStats, Trainer};
