//! Training data: multivariate time series sharing one feature dimension.

use crate::error::{CtrnnError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};

/// One multivariate time series, rows are time steps and columns features.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    samples: Array2<f64>,
}

impl Sequence {
    pub fn new(samples: Array2<f64>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.nrows() == 0
    }

    pub fn dimension(&self) -> usize {
        self.samples.ncols()
    }

    pub fn sample(&self, t: usize) -> ArrayView1<f64> {
        self.samples.row(t)
    }

    pub fn samples(&self) -> ArrayView2<f64> {
        self.samples.view()
    }

    /// Number of predicted steps with feedback delay `delay`.
    pub fn steps(&self, delay: usize) -> usize {
        self.len().saturating_sub(delay)
    }
}

impl From<Array2<f64>> for Sequence {
    fn from(samples: Array2<f64>) -> Self {
        Self::new(samples)
    }
}

/// Non-empty collection of sequences with a common feature dimension, each
/// longer than the feedback delay.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    sequences: Vec<Sequence>,
    dimension: usize,
}

impl Dataset {
    pub fn new(sequences: Vec<Sequence>, delay: usize) -> Result<Self> {
        let dimension = match sequences.first() {
            Some(first) => first.dimension(),
            None => {
                return Err(CtrnnError::config(
                    "dataset",
                    "at least one sequence is required",
                ))
            }
        };
        if dimension == 0 {
            return Err(CtrnnError::config("dataset", "sequences have no features"));
        }
        for (i, seq) in sequences.iter().enumerate() {
            if seq.dimension() != dimension {
                return Err(CtrnnError::config(
                    "dataset",
                    format!(
                        "sequence {} has dimension {}, expected {}",
                        i,
                        seq.dimension(),
                        dimension
                    ),
                ));
            }
            if seq.len() <= delay {
                return Err(CtrnnError::config(
                    "dataset",
                    format!(
                        "sequence {} has length {}, must exceed delay {}",
                        i,
                        seq.len(),
                        delay
                    ),
                ));
            }
            if seq.samples.iter().any(|v| !v.is_finite()) {
                return Err(CtrnnError::config(
                    "dataset",
                    format!("sequence {} contains non-finite samples", i),
                ));
            }
        }
        Ok(Self {
            sequences,
            dimension,
        })
    }

    pub fn from_arrays(arrays: Vec<Array2<f64>>, delay: usize) -> Result<Self> {
        Self::new(arrays.into_iter().map(Sequence::new).collect(), delay)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sequence> {
        self.sequences.iter()
    }

    /// Total number of predicted steps across all sequences.
    pub fn total_steps(&self, delay: usize) -> usize {
        self.sequences.iter().map(|s| s.steps(delay)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_dimension_mismatch_rejected() {
        let err = Dataset::from_arrays(vec![Array2::zeros((5, 2)), Array2::zeros((5, 3))], 1)
            .unwrap_err();
        assert!(matches!(err, CtrnnError::Configuration { .. }));
    }

    #[test]
    fn test_sequence_must_exceed_delay() {
        assert!(Dataset::from_arrays(vec![Array2::zeros((2, 1))], 2).is_err());
        let data = Dataset::from_arrays(vec![Array2::zeros((3, 1))], 2).unwrap();
        assert_eq!(data.total_steps(2), 1);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        assert!(Dataset::new(Vec::new(), 1).is_err());
    }
}
