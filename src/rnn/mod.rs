//! # Sequence Processing
//!
//! [`Ctrnn`] runs a [`CtrnnCell`](crate::cells::CtrnnCell) over whole
//! sequences. Training records open-loop steps into a bounded
//! [`Trajectory`]; reporting uses full [`Recording`]s.
//!
//! ## Task Framing
//!
//! | Mode | Input at step `t` | Target at step `t` |
//! |------|-------------------|--------------------|
//! | Open loop | `sample(t)` | `sample(t + d)` |
//! | Closed loop, `t < d` | `sample(t)` | `sample(t + d)` |
//! | Closed loop, `t >= d` | `y(t − d)` | `sample(t + d)` |
//!
//! ## Example
//!
//! ```
//! use ctrnn_learn::cells::CtrnnCell;
//! use ctrnn_learn::config::ModelConfig;
//! use ctrnn_learn::data::Sequence;
//! use ctrnn_learn::rnn::Ctrnn;
//! use ndarray::{Array1, Array2};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let config = ModelConfig { c_state_size: 4, ..ModelConfig::default() };
//! let mut rng = StdRng::seed_from_u64(7);
//! let net = Ctrnn::new(CtrnnCell::new(&config, 1, &mut rng).unwrap(), 1);
//!
//! let seq = Sequence::new(Array2::zeros((20, 1)));
//! let rec = net.record_closed_loop(&seq, Array1::zeros(4).view()).unwrap();
//! assert_eq!(rec.steps(), 19);
//! ```

pub mod ctrnn;
pub mod trajectory;

pub use ctrnn::{Ctrnn, Recording};
pub use trajectory::{StepRecord, Trajectory};
