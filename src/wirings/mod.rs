//! Connectivity of the four CTRNN connection groups.
//!
//! A [`Wiring`] decides which synapses of a group exist; a [`Connection`]
//! pairs the resulting mask with its trainable weights. Masked entries stay
//! at zero, are skipped by every matrix product in this module and are never
//! touched by the optimizer.

use crate::error::{CtrnnError, Result};
use serde::{Deserialize, Serialize};

mod base;
mod connection;
mod random;

pub use base::{Disconnected, Edge, Explicit, FullyConnected, Wiring};
pub use connection::Connection;
pub use random::Random;

/// Serializable description of a connection group's wiring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WiringConfig {
    Full {
        #[serde(default = "default_self_connections")]
        self_connections: bool,
    },
    None,
    Random {
        sparsity_level: f64,
    },
    /// Per-edge presence and value, `edges[dest][src]`.
    Explicit {
        edges: Vec<Vec<Edge>>,
    },
}

fn default_self_connections() -> bool {
    true
}

impl Default for WiringConfig {
    fn default() -> Self {
        WiringConfig::Full {
            self_connections: true,
        }
    }
}

impl WiringConfig {
    /// Checks that this wiring can be built for a `rows × cols` group.
    pub fn validate(&self, field: &str, rows: usize, cols: usize) -> Result<()> {
        match self {
            WiringConfig::Full { .. } | WiringConfig::None => Ok(()),
            WiringConfig::Random { sparsity_level } => Random::new(*sparsity_level)
                .map(|_| ())
                .map_err(|e| match e {
                    CtrnnError::Configuration { reason, .. } => {
                        CtrnnError::config(format!("{}.sparsity_level", field), reason)
                    }
                    other => other,
                }),
            WiringConfig::Explicit { edges } => {
                if edges.len() != rows || edges.iter().any(|row| row.len() != cols) {
                    return Err(CtrnnError::config(
                        field,
                        format!("explicit edge matrix must be {} x {}", rows, cols),
                    ));
                }
                for row in edges {
                    for edge in row {
                        if let Some(v) = edge.value {
                            if !v.is_finite() {
                                return Err(CtrnnError::config(
                                    field,
                                    "edge values must be finite",
                                ));
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Instantiates the wiring. Call [`validate`](Self::validate) first.
    pub fn build(&self) -> Result<Box<dyn Wiring>> {
        Ok(match self {
            WiringConfig::Full { self_connections } => {
                Box::new(FullyConnected::new(*self_connections))
            }
            WiringConfig::None => Box::new(Disconnected),
            WiringConfig::Random { sparsity_level } => Box::new(Random::new(*sparsity_level)?),
            WiringConfig::Explicit { edges } => {
                let rows = edges.len();
                let cols = edges.first().map_or(0, Vec::len);
                let flat: Vec<Edge> = edges.iter().flatten().copied().collect();
                let matrix = ndarray::Array2::from_shape_vec((rows, cols), flat).map_err(|e| {
                    CtrnnError::config("wiring.explicit", format!("ragged edge matrix: {}", e))
                })?;
                Box::new(Explicit::new(matrix))
            }
        })
    }
}
