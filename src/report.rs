//! Periodic reporting of training state.
//!
//! Each [`ReportStream`] has an [`IntervalPolicy`] deciding at which epochs
//! it is due. The trainer asks the [`ReportScheduler`] which streams are due,
//! builds the corresponding [`Snapshot`]s and hands them to a
//! [`ReportSink`]. Nothing is computed for streams that are not due.
//!
//! ## Interval policies
//!
//! | Mode | Due when |
//! |------|----------|
//! | linear | `init <= epoch <= end` and `(epoch − init) % interval == 0` |
//! | log-scale | `n = epoch − init` is 0, or a multiple of `interval · 10^k` |
//!
//! where `k = ⌊log10(n / interval)⌋`.
//!
//! An interval of 0 disables the stream.

use crate::cells::CtrnnCell;
use crate::error::Result;
use crate::rnn::Recording;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStream {
    /// Open-loop context states and outputs per sequence.
    State,
    /// Closed-loop context states and outputs per sequence.
    ClosedState,
    Weight,
    Threshold,
    Tau,
    /// Initial state used for each sequence.
    Init,
    /// Representative initial states.
    RepInit,
    AdaptLr,
    Error,
    ClosedError,
    Lyapunov,
    Entropy,
    Period,
    /// Checkpoint written.
    Save,
}

impl ReportStream {
    pub const ALL: [ReportStream; 14] = [
        ReportStream::State,
        ReportStream::ClosedState,
        ReportStream::Weight,
        ReportStream::Threshold,
        ReportStream::Tau,
        ReportStream::Init,
        ReportStream::RepInit,
        ReportStream::AdaptLr,
        ReportStream::Error,
        ReportStream::ClosedError,
        ReportStream::Lyapunov,
        ReportStream::Entropy,
        ReportStream::Period,
        ReportStream::Save,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReportStream::State => "state",
            ReportStream::ClosedState => "closed_state",
            ReportStream::Weight => "weight",
            ReportStream::Threshold => "threshold",
            ReportStream::Tau => "tau",
            ReportStream::Init => "init",
            ReportStream::RepInit => "rep_init",
            ReportStream::AdaptLr => "adapt_lr",
            ReportStream::Error => "error",
            ReportStream::ClosedError => "closed_error",
            ReportStream::Lyapunov => "lyapunov",
            ReportStream::Entropy => "entropy",
            ReportStream::Period => "period",
            ReportStream::Save => "save",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalPolicy {
    /// Epochs between reports; 0 disables the stream.
    pub interval: usize,
    /// First epoch that may be reported.
    pub init: usize,
    /// Last epoch that may be reported.
    pub end: usize,
    pub use_logscale_interval: bool,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self::every(DEFAULT_INTERVAL)
    }
}

const DEFAULT_INTERVAL: usize = 100;

impl IntervalPolicy {
    pub fn every(interval: usize) -> Self {
        Self {
            interval,
            init: 0,
            end: usize::MAX,
            use_logscale_interval: false,
        }
    }

    pub fn disabled() -> Self {
        Self::every(0)
    }

    pub fn with_logscale(mut self, use_logscale_interval: bool) -> Self {
        self.use_logscale_interval = use_logscale_interval;
        self
    }

    pub fn with_range(mut self, init: usize, end: usize) -> Self {
        self.init = init;
        self.end = end;
        self
    }

    pub fn is_due(&self, epoch: usize) -> bool {
        if self.interval == 0 || epoch < self.init || epoch > self.end {
            return false;
        }
        let n = epoch - self.init;
        if !self.use_logscale_interval {
            return n % self.interval == 0;
        }
        if n == 0 {
            return true;
        }
        if n < self.interval {
            return false;
        }
        // Largest interval · 10^k not exceeding n.
        let mut step = self.interval;
        while let Some(next) = step.checked_mul(10) {
            if next > n {
                break;
            }
            step = next;
        }
        n % step == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Linear interval for streams without an override.
    pub default_interval: usize,
    pub overrides: BTreeMap<ReportStream, IntervalPolicy>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_INTERVAL,
            overrides: BTreeMap::new(),
        }
    }
}

impl ReportConfig {
    pub fn with_policy(mut self, stream: ReportStream, policy: IntervalPolicy) -> Self {
        self.overrides.insert(stream, policy);
        self
    }

    pub fn policy(&self, stream: ReportStream) -> IntervalPolicy {
        self.overrides
            .get(&stream)
            .copied()
            .unwrap_or_else(|| IntervalPolicy::every(self.default_interval))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportScheduler {
    policies: [IntervalPolicy; 14],
}

impl ReportScheduler {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            policies: ReportStream::ALL.map(|stream| config.policy(stream)),
        }
    }

    pub fn policy(&self, stream: ReportStream) -> &IntervalPolicy {
        &self.policies[stream.index()]
    }

    pub fn is_due(&self, stream: ReportStream, epoch: usize) -> bool {
        self.policy(stream).is_due(epoch)
    }

    /// Streams due at `epoch`, in declaration order.
    pub fn due(&self, epoch: usize) -> Vec<ReportStream> {
        ReportStream::ALL
            .into_iter()
            .filter(|&stream| self.is_due(stream, epoch))
            .collect()
    }
}

/// Read-only view of one reported quantity.
#[derive(Debug, Clone, Copy)]
pub enum Snapshot<'a> {
    State {
        epoch: usize,
        sequence: usize,
        recording: &'a Recording,
    },
    ClosedState {
        epoch: usize,
        sequence: usize,
        recording: &'a Recording,
    },
    Weight {
        epoch: usize,
        cell: &'a CtrnnCell,
    },
    Threshold {
        epoch: usize,
        cell: &'a CtrnnCell,
    },
    Tau {
        epoch: usize,
        tau: ArrayView1<'a, f64>,
    },
    Init {
        epoch: usize,
        sequence: usize,
        initial_state: ArrayView1<'a, f64>,
        weights: &'a [f64],
    },
    RepInit {
        epoch: usize,
        points: ArrayView2<'a, f64>,
    },
    AdaptLr {
        epoch: usize,
        learning_rate: f64,
        multiplier: f64,
    },
    Error {
        epoch: usize,
        error: f64,
        mean_squared_error: f64,
    },
    ClosedError {
        epoch: usize,
        sequence: usize,
        error: f64,
        mean_squared_error: f64,
    },
    Lyapunov {
        epoch: usize,
        point: usize,
        exponents: &'a [f64],
    },
    Entropy {
        epoch: usize,
        point: usize,
        entropy: f64,
    },
    Period {
        epoch: usize,
        point: usize,
        period: Option<usize>,
    },
    Save {
        epoch: usize,
        path: &'a Path,
    },
}

impl Snapshot<'_> {
    pub fn stream(&self) -> ReportStream {
        match self {
            Snapshot::State { .. } => ReportStream::State,
            Snapshot::ClosedState { .. } => ReportStream::ClosedState,
            Snapshot::Weight { .. } => ReportStream::Weight,
            Snapshot::Threshold { .. } => ReportStream::Threshold,
            Snapshot::Tau { .. } => ReportStream::Tau,
            Snapshot::Init { .. } => ReportStream::Init,
            Snapshot::RepInit { .. } => ReportStream::RepInit,
            Snapshot::AdaptLr { .. } => ReportStream::AdaptLr,
            Snapshot::Error { .. } => ReportStream::Error,
            Snapshot::ClosedError { .. } => ReportStream::ClosedError,
            Snapshot::Lyapunov { .. } => ReportStream::Lyapunov,
            Snapshot::Entropy { .. } => ReportStream::Entropy,
            Snapshot::Period { .. } => ReportStream::Period,
            Snapshot::Save { .. } => ReportStream::Save,
        }
    }

    pub fn epoch(&self) -> usize {
        match *self {
            Snapshot::State { epoch, .. }
            | Snapshot::ClosedState { epoch, .. }
            | Snapshot::Weight { epoch, .. }
            | Snapshot::Threshold { epoch, .. }
            | Snapshot::Tau { epoch, .. }
            | Snapshot::Init { epoch, .. }
            | Snapshot::RepInit { epoch, .. }
            | Snapshot::AdaptLr { epoch, .. }
            | Snapshot::Error { epoch, .. }
            | Snapshot::ClosedError { epoch, .. }
            | Snapshot::Lyapunov { epoch, .. }
            | Snapshot::Entropy { epoch, .. }
            | Snapshot::Period { epoch, .. }
            | Snapshot::Save { epoch, .. } => epoch,
        }
    }
}

/// Destination of reported snapshots.
pub trait ReportSink {
    fn record(&mut self, snapshot: Snapshot<'_>) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn record(&mut self, _snapshot: Snapshot<'_>) -> Result<()> {
        Ok(())
    }
}

/// Emits scalar snapshots as `tracing` events; array snapshots are
/// summarized by their shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn record(&mut self, snapshot: Snapshot<'_>) -> Result<()> {
        let stream = snapshot.stream().name();
        match snapshot {
            Snapshot::Error {
                epoch,
                error,
                mean_squared_error,
            } => info!(stream, epoch, error, mean_squared_error),
            Snapshot::ClosedError {
                epoch,
                sequence,
                error,
                mean_squared_error,
            } => info!(stream, epoch, sequence, error, mean_squared_error),
            Snapshot::AdaptLr {
                epoch,
                learning_rate,
                multiplier,
            } => info!(stream, epoch, learning_rate, multiplier),
            Snapshot::Lyapunov {
                epoch,
                point,
                exponents,
            } => info!(stream, epoch, point, ?exponents),
            Snapshot::Entropy {
                epoch,
                point,
                entropy,
            } => info!(stream, epoch, point, entropy),
            Snapshot::Period {
                epoch,
                point,
                period,
            } => info!(stream, epoch, point, ?period),
            Snapshot::Tau { epoch, tau } => info!(stream, epoch, tau = ?tau.as_slice()),
            Snapshot::Save { epoch, path } => info!(stream, epoch, path = %path.display()),
            Snapshot::State {
                epoch,
                sequence,
                recording,
            }
            | Snapshot::ClosedState {
                epoch,
                sequence,
                recording,
            } => info!(stream, epoch, sequence, steps = recording.steps()),
            Snapshot::Init {
                epoch,
                sequence,
                initial_state,
                ..
            } => info!(stream, epoch, sequence, initial_state = ?initial_state.as_slice()),
            Snapshot::RepInit { epoch, points } => {
                info!(stream, epoch, points = points.nrows())
            }
            Snapshot::Weight { epoch, cell } | Snapshot::Threshold { epoch, cell } => {
                info!(stream, epoch, neurons = cell.state_size())
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_policy() {
        let policy = IntervalPolicy::every(10).with_range(5, 40);
        assert!(!policy.is_due(0));
        assert!(policy.is_due(5));
        assert!(!policy.is_due(10));
        assert!(policy.is_due(15));
        assert!(policy.is_due(35));
        assert!(!policy.is_due(45));
    }

    #[test]
    fn test_logscale_policy_reports_nine_per_decade() {
        let policy = IntervalPolicy::every(1).with_logscale(true);
        let due: Vec<usize> = (0..=200).filter(|&e| policy.is_due(e)).collect();
        assert_eq!(
            due,
            vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 200]
        );
    }

    #[test]
    fn test_zero_interval_disables() {
        assert!(!IntervalPolicy::disabled().is_due(0));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = ReportConfig::default()
            .with_policy(ReportStream::Lyapunov, IntervalPolicy::every(7));
        let scheduler = ReportScheduler::new(&config);
        assert!(scheduler.is_due(ReportStream::Lyapunov, 14));
        assert!(!scheduler.is_due(ReportStream::Error, 14));
        assert_eq!(scheduler.due(0).len(), ReportStream::ALL.len());
    }
}
