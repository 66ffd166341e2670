use super::base::{Edge, Wiring};
use crate::error::{CtrnnError, Result};
use ndarray::Array2;
use rand::prelude::*;

/// Random sparsity wiring structure.
///
/// A fixed number of synapses, `round(rows * cols * (1 - sparsity_level))`,
/// is drawn without replacement from all possible pairs.
#[derive(Clone, Debug)]
pub struct Random {
    sparsity_level: f64,
}

impl Random {
    pub fn new(sparsity_level: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&sparsity_level) {
            return Err(CtrnnError::config(
                "sparsity_level",
                format!("must be in range [0, 1), got {}", sparsity_level),
            ));
        }
        Ok(Self { sparsity_level })
    }

    pub fn sparsity_level(&self) -> f64 {
        self.sparsity_level
    }
}

impl Wiring for Random {
    fn edges(&self, rows: usize, cols: usize, rng: &mut StdRng) -> Array2<Edge> {
        let mut edges = Array2::from_elem((rows, cols), Edge::ABSENT);

        let total_possible = rows * cols;
        let num_synapses = (total_possible as f64 * (1.0 - self.sparsity_level)).round() as usize;

        let mut all_synapses: Vec<(usize, usize)> = Vec::with_capacity(total_possible);
        for dest in 0..rows {
            for src in 0..cols {
                all_synapses.push((dest, src));
            }
        }

        for &(dest, src) in all_synapses.choose_multiple(rng, num_synapses) {
            edges[[dest, src]] = Edge::RANDOM;
        }
        edges
    }
}
