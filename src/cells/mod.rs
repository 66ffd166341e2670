//! # CTRNN Cell
//!
//! Single-timestep dynamics of a continuous-time recurrent neural network.
//! The cell is wrapped by [`crate::rnn::Ctrnn`] for sequence processing and
//! is shared by the gradient computer and the Lyapunov analyzer through its
//! local linearization.
//!
//! ## Update
//!
//! ```text
//! a  = θ + W^cc·c + W^ci·x
//! c' = c + (tanh(a) − c) / τ
//! y  = f(φ + W^oc·c')          f = tanh or grouped softmax
//! s  = ψ + W^vc·c'             log-variance, only when wired
//! ```
//!
//! ## Vector Shapes
//!
//! | Vector | Shape | Description |
//! |--------|-------|-------------|
//! | `context` | `[state_size]` | Context state `c` |
//! | `input` | `[input_size]` | Input `x` |
//! | `pre_activation` | `[state_size]` | `a` |
//! | `output` | `[output_size]` | Prediction `y` |
//! | `log_variance` | `[output_size]` | `s` |
//!
//! ## Example
//!
//! ```
//! use ctrnn_learn::cells::CtrnnCell;
//! use ctrnn_learn::config::ModelConfig;
//! use ndarray::Array1;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let config = ModelConfig { c_state_size: 8, ..ModelConfig::default() };
//! let mut rng = StdRng::seed_from_u64(1);
//! let cell = CtrnnCell::new(&config, 2, &mut rng).unwrap();
//!
//! let step = cell.step(Array1::zeros(8).view(), Array1::zeros(2).view());
//! assert_eq!(step.output.len(), 2);
//! ```

pub mod ctrnn_cell;

pub use ctrnn_cell::{CtrnnCell, Linearization, Step};
