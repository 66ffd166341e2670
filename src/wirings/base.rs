use ndarray::Array2;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// A potential synapse between a source and a destination unit.
///
/// Absent edges carry no weight and are never trained. A present edge may
/// pin its initial weight through `value`; otherwise it is drawn at random.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Edge {
    pub present: bool,
    #[serde(default)]
    pub value: Option<f64>,
}

impl Edge {
    pub const ABSENT: Edge = Edge {
        present: false,
        value: None,
    };

    pub const RANDOM: Edge = Edge {
        present: true,
        value: None,
    };

    pub fn fixed(value: f64) -> Self {
        Self {
            present: true,
            value: Some(value),
        }
    }
}

/// Connectivity pattern of one connection group.
///
/// `edges` returns a `rows × cols` matrix where rows index destination units
/// and columns index source units.
pub trait Wiring: Send + Sync {
    fn edges(&self, rows: usize, cols: usize, rng: &mut StdRng) -> Array2<Edge>;

    /// Number of present synapses for a `rows × cols` group.
    fn synapse_count(&self, rows: usize, cols: usize, rng: &mut StdRng) -> usize {
        self.edges(rows, cols, rng)
            .iter()
            .filter(|e| e.present)
            .count()
    }
}

/// Every source connects to every destination.
#[derive(Clone, Debug)]
pub struct FullyConnected {
    self_connections: bool,
}

impl FullyConnected {
    /// `self_connections` only matters for square groups, where it controls
    /// the diagonal.
    pub fn new(self_connections: bool) -> Self {
        Self { self_connections }
    }
}

impl Default for FullyConnected {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Wiring for FullyConnected {
    fn edges(&self, rows: usize, cols: usize, _rng: &mut StdRng) -> Array2<Edge> {
        Array2::from_shape_fn((rows, cols), |(dest, src)| {
            if rows == cols && dest == src && !self.self_connections {
                Edge::ABSENT
            } else {
                Edge::RANDOM
            }
        })
    }
}

/// No synapses at all. Used to switch off a connection group, e.g. the
/// variance branch.
#[derive(Clone, Debug, Default)]
pub struct Disconnected;

impl Wiring for Disconnected {
    fn edges(&self, rows: usize, cols: usize, _rng: &mut StdRng) -> Array2<Edge> {
        Array2::from_elem((rows, cols), Edge::ABSENT)
    }
}

/// Caller-supplied edge matrix.
#[derive(Clone, Debug)]
pub struct Explicit {
    edges: Array2<Edge>,
}

impl Explicit {
    pub fn new(edges: Array2<Edge>) -> Self {
        Self { edges }
    }
}

impl Wiring for Explicit {
    fn edges(&self, rows: usize, cols: usize, _rng: &mut StdRng) -> Array2<Edge> {
        if self.edges.dim() == (rows, cols) {
            self.edges.clone()
        } else {
            // Shapes are checked by `WiringConfig::validate`; fall back to an
            // empty group rather than indexing out of range.
            Array2::from_elem((rows, cols), Edge::ABSENT)
        }
    }
}
