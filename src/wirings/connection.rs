use super::base::Edge;
use ndarray::{Array2, ArrayView1, ArrayViewMut1, Zip};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Trainable weights of one connection group together with their mask.
///
/// Rows index destination units, columns source units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub weight: Array2<f64>,
    pub mask: Array2<bool>,
}

impl Connection {
    /// Materializes an edge matrix. Present edges without a pinned value are
    /// drawn uniformly from `[-init_range, init_range)`.
    pub fn from_edges(edges: &Array2<Edge>, init_range: f64, rng: &mut StdRng) -> Self {
        let mask = edges.mapv(|e| e.present);
        let mut weight = Array2::zeros(edges.dim());
        Zip::from(&mut weight).and(edges).for_each(|w, edge| {
            if !edge.present {
                return;
            }
            *w = match edge.value {
                Some(v) => v,
                None if init_range > 0.0 => rng.gen_range(-init_range..init_range),
                None => 0.0,
            };
        });
        Self { weight, mask }
    }

    pub fn rows(&self) -> usize {
        self.weight.nrows()
    }

    pub fn cols(&self) -> usize {
        self.weight.ncols()
    }

    pub fn synapse_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    /// True when no synapse is present.
    pub fn is_empty(&self) -> bool {
        !self.mask.iter().any(|&m| m)
    }

    /// `out += W·x`, present edges only.
    pub fn accumulate(&self, x: ArrayView1<f64>, mut out: ArrayViewMut1<f64>) {
        let rows = self.weight.outer_iter().zip(self.mask.outer_iter());
        for (i, (w_row, m_row)) in rows.enumerate() {
            let mut sum = 0.0;
            for j in 0..x.len() {
                if m_row[j] {
                    sum += w_row[j] * x[j];
                }
            }
            out[i] += sum;
        }
    }

    /// `out += Wᵀ·e`, present edges only.
    pub fn accumulate_transposed(&self, e: ArrayView1<f64>, mut out: ArrayViewMut1<f64>) {
        let rows = self.weight.outer_iter().zip(self.mask.outer_iter());
        for (i, (w_row, m_row)) in rows.enumerate() {
            let ei = e[i];
            if ei == 0.0 {
                continue;
            }
            for j in 0..out.len() {
                if m_row[j] {
                    out[j] += w_row[j] * ei;
                }
            }
        }
    }

    /// `grad += e ⊗ x`, present edges only.
    pub fn accumulate_outer(&self, e: ArrayView1<f64>, x: ArrayView1<f64>, grad: &mut Array2<f64>) {
        Zip::indexed(grad)
            .and(&self.mask)
            .for_each(|(i, j), g, &present| {
                if present {
                    *g += e[i] * x[j];
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use rand::SeedableRng;

    fn partial() -> Connection {
        Connection {
            weight: array![[1.0, 2.0], [3.0, 4.0]],
            mask: array![[true, false], [true, true]],
        }
    }

    #[test]
    fn test_masked_product_skips_absent_edges() {
        let c = partial();
        let mut out = Array1::zeros(2);
        c.accumulate(array![1.0, 1.0].view(), out.view_mut());
        assert_eq!(out, array![1.0, 7.0]);

        let mut back = Array1::zeros(2);
        c.accumulate_transposed(array![1.0, 1.0].view(), back.view_mut());
        assert_eq!(back, array![4.0, 4.0]);
    }

    #[test]
    fn test_outer_respects_mask() {
        let c = partial();
        let mut grad = Array2::zeros((2, 2));
        c.accumulate_outer(array![1.0, 2.0].view(), array![3.0, 5.0].view(), &mut grad);
        assert_eq!(grad, array![[3.0, 0.0], [6.0, 10.0]]);
    }

    #[test]
    fn test_from_edges_pins_values_and_zeroes_absent() {
        let edges = array![[Edge::fixed(0.5), Edge::ABSENT], [Edge::RANDOM, Edge::ABSENT]];
        let mut rng = StdRng::seed_from_u64(1);
        let c = Connection::from_edges(&edges, 0.1, &mut rng);
        assert_eq!(c.weight[[0, 0]], 0.5);
        assert_eq!(c.weight[[0, 1]], 0.0);
        assert!(c.weight[[1, 0]].abs() < 0.1);
        assert_eq!(c.synapse_count(), 2);
    }
}
