//! Lyapunov spectrum of the autonomous closed-loop network.
//!
//! With feedback delay `d` the closed loop is a map on the extended state
//! `z(t) = [c(t), c(t−1), …, c(t−d+1)]`:
//!
//! ```text
//! c(t+1) = F(c(t), g(c(t−d+1)))      g = readout
//! ```
//!
//! Tangent vectors are pushed through its Jacobian every step and
//! re-orthonormalized by modified Gram-Schmidt; the exponents are the
//! time-averaged logarithms of the stretch factors.

use crate::cells::Linearization;
use crate::config::AnalysisConfig;
use crate::error::{ensure_finite, CtrnnError, Result};
use crate::rnn::Ctrnn;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Tangent vectors shorter than this are treated as degenerate.
const DEGENERATE_NORM: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyapunovReport {
    /// Exponents per time step, in Gram-Schmidt order.
    pub exponents: Vec<f64>,
    /// Sum of the positive exponents.
    pub entropy: f64,
    /// Smallest return time of the final state, if one was found.
    pub period: Option<usize>,
    /// Tangent vectors replaced after collapsing.
    pub degenerate_vectors: usize,
    pub reorthonormalizations: usize,
}

impl LyapunovReport {
    pub fn max_exponent(&self) -> Option<f64> {
        self.exponents.iter().copied().reduce(f64::max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LyapunovAnalyzer {
    settings: AnalysisConfig,
}

impl LyapunovAnalyzer {
    pub fn new(settings: AnalysisConfig) -> Self {
        Self { settings }
    }

    /// Runs the analysis from context state `initial_state`, replicated
    /// over the whole feedback history.
    pub fn analyze(&self, net: &Ctrnn, initial_state: ArrayView1<f64>) -> Result<LyapunovReport> {
        let n = net.state_size();
        let extended = n * net.delay.max(1);
        let size = self.settings.lyapunov_spectrum_size.unwrap_or(extended);
        if size == 0 || size > extended {
            return Err(CtrnnError::config(
                "analysis.lyapunov_spectrum_size",
                format!("must be in 1..={}, got {}", extended, size),
            ));
        }
        let segment = self.settings.threshold_period;
        let segments = self.settings.divide_num;
        if segment == 0 || segments == 0 {
            return Err(CtrnnError::config(
                "analysis",
                "threshold_period and divide_num must be positive",
            ));
        }
        let transient = self.settings.transient_length.unwrap_or(segment);

        let mut system = ClosedLoop::new(net, initial_state);
        for _ in 0..transient {
            system.advance()?;
        }

        // `recent` holds the last `segment + 1` context states.
        let mut recent = Array2::zeros((segment + 1, n));
        recent.row_mut(0).assign(&system.current());
        let mut recorded = 1;

        let mut basis = Array2::zeros((size, extended));
        for i in 0..size {
            basis[[i, i]] = 1.0;
        }
        let mut stretch = vec![0.0; size];
        let mut exponents = vec![0.0; size];
        let mut degenerate_vectors = 0;
        let mut reorthonormalizations = 0;

        for _ in 0..segments {
            stretch.iter_mut().for_each(|s| *s = 0.0);
            for _ in 0..segment {
                system.advance_with_tangent(&mut basis)?;
                degenerate_vectors += orthonormalize(&mut basis, &mut stretch)?;
                reorthonormalizations += 1;
                recent.row_mut(recorded % (segment + 1)).assign(&system.current());
                recorded += 1;
            }
            for (exp, s) in exponents.iter_mut().zip(&stretch) {
                *exp += s / segment as f64;
            }
        }
        exponents.iter_mut().for_each(|e| *e /= segments as f64);

        let entropy: f64 = exponents.iter().filter(|&&e| e > 0.0).sum();
        let period = find_period(&recent, recorded, self.settings.period_tolerance);
        debug!(
            ?exponents,
            entropy,
            ?period,
            degenerate_vectors,
            "lyapunov analysis"
        );

        Ok(LyapunovReport {
            exponents,
            entropy,
            period,
            degenerate_vectors,
            reorthonormalizations,
        })
    }
}

/// Closed-loop network with its feedback history.
struct ClosedLoop<'a> {
    net: &'a Ctrnn,
    /// Context `c(τ)` lives in row `τ % d`.
    history: Array2<f64>,
    /// Readout `g(c(τ))`, same rows as `history`.
    outputs: Array2<f64>,
    time: usize,
    next: Array1<f64>,
    a: Array1<f64>,
    log_variance: Array1<f64>,
    lin: Linearization,
    fresh: Array1<f64>,
    feedback: Array1<f64>,
    scratch: Array1<f64>,
}

impl<'a> ClosedLoop<'a> {
    fn new(net: &'a Ctrnn, initial_state: ArrayView1<f64>) -> Self {
        let n = net.state_size();
        let dim = net.output_size();
        let delay = net.delay.max(1);
        let mut history = Array2::zeros((delay, n));
        let mut outputs = Array2::zeros((delay, dim));
        let mut log_variance = Array1::zeros(dim);
        for (mut c, y) in history.outer_iter_mut().zip(outputs.outer_iter_mut()) {
            c.assign(&initial_state);
            net.cell.readout(initial_state, y, log_variance.view_mut());
        }
        Self {
            net,
            history,
            outputs,
            time: 0,
            next: Array1::zeros(n),
            a: Array1::zeros(n),
            log_variance,
            lin: Linearization::zeros(n),
            fresh: Array1::zeros(n),
            feedback: Array1::zeros(dim),
            scratch: Array1::zeros(n),
        }
    }

    fn delay(&self) -> usize {
        self.history.nrows()
    }

    fn current(&self) -> ArrayView1<f64> {
        self.history.row(self.time % self.delay())
    }

    /// Row holding `c(t − d + 1)`, overwritten by `c(t + 1)`.
    fn oldest(&self) -> usize {
        (self.time + 1) % self.delay()
    }

    fn step_state(&mut self) {
        let cur = self.time % self.delay();
        let old = self.oldest();
        self.net.cell.advance(
            self.history.row(cur),
            self.outputs.row(old),
            self.next.view_mut(),
            self.a.view_mut(),
        );
    }

    fn commit(&mut self) -> Result<()> {
        let old = self.oldest();
        ensure_finite(self.next.iter(), || {
            format!("closed-loop context state at step {}", self.time)
        })?;
        self.history.row_mut(old).assign(&self.next);
        self.net.cell.readout(
            self.next.view(),
            self.outputs.row_mut(old),
            self.log_variance.view_mut(),
        );
        self.time += 1;
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        self.step_state();
        self.commit()
    }

    /// Advances the state and maps every row of `basis` through the
    /// Jacobian of the extended map.
    fn advance_with_tangent(&mut self, basis: &mut Array2<f64>) -> Result<()> {
        self.step_state();
        let cell = &self.net.cell;
        cell.linearize(self.a.view(), &mut self.lin);

        let n = cell.state_size();
        let delay = self.delay();
        let y_old = self.outputs.row(self.oldest());
        for mut q in basis.outer_iter_mut() {
            cell.state_tangent(&self.lin, q.slice(s![..n]), self.fresh.view_mut());
            cell.output_tangent(
                y_old,
                q.slice(s![(delay - 1) * n..]),
                self.feedback.view_mut(),
            );
            cell.input_tangent(
                &self.lin,
                self.feedback.view(),
                self.fresh.view_mut(),
                &mut self.scratch,
            );
            shift_blocks(q.view_mut(), n);
            q.slice_mut(s![..n]).assign(&self.fresh);
        }
        self.commit()
    }
}

/// Moves block `j` to block `j + 1`, dropping the last one.
fn shift_blocks(mut q: ArrayViewMut1<f64>, block: usize) {
    for idx in (block..q.len()).rev() {
        q[idx] = q[idx - block];
    }
}

/// Modified Gram-Schmidt on the rows of `basis`, adding `ln r_ii` to
/// `stretch`. Returns the number of degenerate rows that were replaced.
fn orthonormalize(basis: &mut Array2<f64>, stretch: &mut [f64]) -> Result<usize> {
    let mut degenerate = 0;
    for i in 0..basis.nrows() {
        let (done, mut rest) = basis.view_mut().split_at(Axis(0), i);
        let mut v = rest.row_mut(0);
        for u in done.outer_iter() {
            let proj = v.dot(&u);
            v.scaled_add(-proj, &u);
        }
        let norm = v.dot(&v).sqrt();
        if !norm.is_finite() {
            return Err(CtrnnError::numerical(format!(
                "tangent vector {} has non-finite norm",
                i
            )));
        }
        if norm < DEGENERATE_NORM {
            warn!(vector = i, norm, "degenerate tangent vector replaced");
            degenerate += 1;
            orthogonal_completion(done.view(), v);
        } else {
            v /= norm;
        }
        stretch[i] += norm.max(f64::MIN_POSITIVE).ln();
    }
    Ok(degenerate)
}

/// Overwrites `v` with the unit vector orthogonal to the rows of `done`
/// built from the standard basis vector with the largest residual.
fn orthogonal_completion(done: ArrayView2<f64>, mut v: ArrayViewMut1<f64>) {
    let dim = v.len();
    let mut best = Array1::zeros(dim);
    let mut best_norm = -1.0;
    for k in 0..dim {
        let mut candidate = Array1::zeros(dim);
        candidate[k] = 1.0;
        for u in done.outer_iter() {
            let proj = candidate.dot(&u);
            candidate.scaled_add(-proj, &u);
        }
        let norm = candidate.dot(&candidate).sqrt();
        if norm > best_norm {
            best_norm = norm;
            best = candidate;
        }
    }
    v.assign(&(best / best_norm));
}

/// Smallest `p` such that the last state is within `tolerance` (max norm)
/// of the state `p` steps earlier.
fn find_period(recent: &Array2<f64>, recorded: usize, tolerance: f64) -> Option<usize> {
    let slots = recent.nrows();
    let available = recorded.min(slots);
    if available < 2 {
        return None;
    }
    let last = recent.row((recorded - 1) % slots);
    (1..available).find(|&p| {
        let earlier = recent.row((recorded - 1 - p) % slots);
        last.iter()
            .zip(earlier.iter())
            .all(|(a, b)| (a - b).abs() < tolerance)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_gram_schmidt_accumulates_log_stretch() {
        let mut basis = array![[2.0, 0.0], [1.0, 3.0]];
        let mut stretch = vec![0.0; 2];
        let degenerate = orthonormalize(&mut basis, &mut stretch).unwrap();
        assert_eq!(degenerate, 0);
        assert!((stretch[0] - 2f64.ln()).abs() < 1e-12);
        assert!((stretch[1] - 3f64.ln()).abs() < 1e-12);
        assert!((basis.row(0).dot(&basis.row(1))).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_vector_is_completed() {
        let mut basis = array![[1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        let mut stretch = vec![0.0; 2];
        let degenerate = orthonormalize(&mut basis, &mut stretch).unwrap();
        assert_eq!(degenerate, 1);
        assert!((basis.row(1).dot(&basis.row(1)) - 1.0).abs() < 1e-12);
        assert!(basis.row(0).dot(&basis.row(1)).abs() < 1e-12);
        assert!(stretch[1] < -600.0);
    }

    #[test]
    fn test_non_finite_norm_is_an_error() {
        let mut basis = array![[f64::NAN, 0.0]];
        let mut stretch = vec![0.0];
        assert!(orthonormalize(&mut basis, &mut stretch).is_err());
    }

    #[test]
    fn test_shift_blocks() {
        let mut q = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        shift_blocks(q.view_mut(), 2);
        assert_eq!(q, array![1.0, 2.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_period_of_fixed_point_is_one() {
        let recent = Array2::from_elem((4, 2), 0.5);
        assert_eq!(find_period(&recent, 7, 1e-9), Some(1));
        let mut cycle = Array2::zeros((5, 1));
        for t in 0..5 {
            cycle[[t, 0]] = [0.1, 0.9][t % 2];
        }
        assert_eq!(find_period(&cycle, 5, 1e-9), Some(2));
    }
}
