//! Output activation functions for the CTRNN readout.
//!
//! The readout is either an element-wise `tanh` or a softmax normalized
//! independently inside each group of output units. Both variants expose
//! their Jacobian-vector product so the gradient computer and the Lyapunov
//! analyzer can push tangent vectors through the readout.

use crate::error::{CtrnnError, Result};
use ndarray::{ArrayView1, ArrayViewMut1};
use serde::{Deserialize, Serialize};

/// Type of output function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// `y_k = tanh(z_k)`
    #[default]
    Tanh,
    /// `y_k = exp(z_k) / Σ_{j in group(k)} exp(z_j)`
    Softmax,
}

/// Partition of the output indices into softmax groups.
///
/// Every output index belongs to exactly one group. For `tanh` output each
/// unit is its own singleton group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftmaxGroups {
    group_of: Vec<usize>,
    members: Vec<Vec<usize>>,
}

impl SoftmaxGroups {
    /// One group per output unit.
    pub fn singletons(dimension: usize) -> Self {
        Self {
            group_of: (0..dimension).collect(),
            members: (0..dimension).map(|k| vec![k]).collect(),
        }
    }

    /// All outputs in a single group.
    pub fn single(dimension: usize) -> Self {
        Self {
            group_of: vec![0; dimension],
            members: vec![(0..dimension).collect()],
        }
    }

    /// Builds groups from per-output labels. Outputs sharing a label share a
    /// group; groups are numbered in order of first appearance.
    pub fn from_labels(labels: &[usize]) -> Result<Self> {
        if labels.is_empty() {
            return Err(CtrnnError::config(
                "model.softmax_groups",
                "at least one output unit is required",
            ));
        }
        let mut seen: Vec<usize> = Vec::new();
        let mut group_of = Vec::with_capacity(labels.len());
        let mut members: Vec<Vec<usize>> = Vec::new();
        for (k, label) in labels.iter().enumerate() {
            let g = match seen.iter().position(|l| l == label) {
                Some(g) => g,
                None => {
                    seen.push(*label);
                    members.push(Vec::new());
                    seen.len() - 1
                }
            };
            group_of.push(g);
            members[g].push(k);
        }
        Ok(Self { group_of, members })
    }

    pub fn dimension(&self) -> usize {
        self.group_of.len()
    }

    pub fn num_groups(&self) -> usize {
        self.members.len()
    }

    pub fn group_of(&self, output: usize) -> usize {
        self.group_of[output]
    }

    pub fn members(&self) -> &[Vec<usize>] {
        &self.members
    }
}

/// Readout nonlinearity together with its group structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputActivation {
    pub kind: OutputType,
    pub groups: SoftmaxGroups,
}

impl OutputActivation {
    pub fn tanh(dimension: usize) -> Self {
        Self {
            kind: OutputType::Tanh,
            groups: SoftmaxGroups::singletons(dimension),
        }
    }

    pub fn softmax(groups: SoftmaxGroups) -> Self {
        Self {
            kind: OutputType::Softmax,
            groups,
        }
    }

    pub fn dimension(&self) -> usize {
        self.groups.dimension()
    }

    /// Turns pre-activations `v = z` into outputs `v = f(z)` in place.
    pub fn apply(&self, mut v: ArrayViewMut1<f64>) {
        match self.kind {
            OutputType::Tanh => v.mapv_inplace(f64::tanh),
            OutputType::Softmax => {
                for group in self.groups.members() {
                    // Shift by the group maximum before exponentiating.
                    let max = group
                        .iter()
                        .map(|&k| v[k])
                        .fold(f64::NEG_INFINITY, f64::max);
                    let mut sum = 0.0;
                    for &k in group {
                        let e = (v[k] - max).exp();
                        v[k] = e;
                        sum += e;
                    }
                    for &k in group {
                        v[k] /= sum;
                    }
                }
            }
        }
    }

    /// Replaces `u` by `(∂y/∂z)·u`, given the activation output `y`.
    pub fn tangent(&self, y: ArrayView1<f64>, mut u: ArrayViewMut1<f64>) {
        match self.kind {
            OutputType::Tanh => u.zip_mut_with(&y, |u, &y| *u *= 1.0 - y * y),
            OutputType::Softmax => {
                for group in self.groups.members() {
                    let dot: f64 = group.iter().map(|&k| y[k] * u[k]).sum();
                    for &k in group {
                        u[k] = y[k] * (u[k] - dot);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_tanh_zero() {
        let act = OutputActivation::tanh(3);
        let mut y = Array1::zeros(3);
        act.apply(y.view_mut());
        assert_abs_diff_eq!(y.sum(), 0.0);
    }

    #[test]
    fn test_softmax_groups_sum_to_one() {
        let groups = SoftmaxGroups::from_labels(&[0, 0, 1, 1, 1]).unwrap();
        let act = OutputActivation::softmax(groups);
        let mut y = array![1.0, -2.0, 0.5, 3.0, -1.0];
        act.apply(y.view_mut());
        assert_abs_diff_eq!(y[0] + y[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y[2] + y[3] + y[4], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_labels_partition_in_first_appearance_order() {
        let groups = SoftmaxGroups::from_labels(&[7, 3, 7, 3, 9]).unwrap();
        assert_eq!(groups.num_groups(), 3);
        assert_eq!(groups.members(), &[vec![0, 2], vec![1, 3], vec![4]]);
        assert_eq!(groups.group_of(3), 1);
    }

    #[test]
    fn test_softmax_tangent_matches_finite_difference() {
        let act = OutputActivation::softmax(SoftmaxGroups::single(3));
        let z = array![0.3, -0.7, 1.1];
        let u = array![0.2, 0.5, -0.4];
        let eps = 1e-6;

        let mut y = z.clone();
        act.apply(y.view_mut());
        let mut jvp = u.clone();
        act.tangent(y.view(), jvp.view_mut());

        let mut y_plus: Array1<f64> = &z + &(&u * eps);
        let mut y_minus: Array1<f64> = &z - &(&u * eps);
        act.apply(y_plus.view_mut());
        act.apply(y_minus.view_mut());
        let numeric = (&y_plus - &y_minus) / (2.0 * eps);

        for k in 0..3 {
            assert_abs_diff_eq!(jvp[k], numeric[k], epsilon = 1e-8);
        }
    }
}
