//! Tests for report scheduling and delivery

use ctrnn_learn::prelude::*;
use ctrnn_learn::Result;
use ndarray::Array2;

#[derive(Default)]
struct CollectingSink {
    seen: Vec<(ReportStream, usize)>,
    errors: Vec<f64>,
    closed_mse: Vec<f64>,
    init_weights: Vec<Vec<f64>>,
    exponent_counts: Vec<usize>,
    flushed: bool,
}

impl ReportSink for CollectingSink {
    fn record(&mut self, snapshot: Snapshot<'_>) -> Result<()> {
        self.seen.push((snapshot.stream(), snapshot.epoch()));
        match snapshot {
            Snapshot::Error { error, .. } => self.errors.push(error),
            Snapshot::ClosedError {
                mean_squared_error, ..
            } => self.closed_mse.push(mean_squared_error),
            Snapshot::Init { weights, .. } => self.init_weights.push(weights.to_vec()),
            Snapshot::Lyapunov { exponents, .. } => self.exponent_counts.push(exponents.len()),
            _ => {}
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushed = true;
        Ok(())
    }
}

impl CollectingSink {
    fn epochs_of(&self, stream: ReportStream) -> Vec<usize> {
        self.seen
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|&(_, e)| e)
            .collect()
    }
}

fn dataset() -> Dataset {
    let a = Array2::from_shape_fn((20, 1), |(t, _)| 0.6 * (0.4 * t as f64).sin());
    let b = Array2::from_shape_fn((15, 1), |(t, _)| 0.6 * (0.4 * t as f64).cos());
    Dataset::from_arrays(vec![a, b], 1).unwrap()
}

fn config(report: ReportConfig, epochs: usize) -> TrainingConfig {
    let mut config = TrainingConfig::default();
    config.epochs = epochs;
    config.model.c_state_size = 3;
    config.model.rep_init_size = 2;
    config.analysis.threshold_period = 20;
    config.report = report;
    config
}

#[test]
fn test_linear_interval_with_range() {
    let policy = IntervalPolicy::every(3).with_range(2, 11);
    let due: Vec<usize> = (0..15).filter(|&e| policy.is_due(e)).collect();
    assert_eq!(due, vec![2, 5, 8, 11]);
}

#[test]
fn test_disabled_stream_is_never_due() {
    let policy = IntervalPolicy::disabled();
    assert!((0..1000).all(|e| !policy.is_due(e)));
}

#[test]
fn test_scheduler_overrides_default_interval() {
    let report = ReportConfig {
        default_interval: 5,
        ..ReportConfig::default()
    }
    .with_policy(ReportStream::Error, IntervalPolicy::every(1))
    .with_policy(ReportStream::Lyapunov, IntervalPolicy::disabled());
    let scheduler = ReportScheduler::new(&report);

    assert_eq!(scheduler.due(3), vec![ReportStream::Error]);
    let at_ten = scheduler.due(10);
    assert_eq!(at_ten.len(), ReportStream::ALL.len() - 1);
    assert!(!at_ten.contains(&ReportStream::Lyapunov));
}

#[test]
fn test_report_config_from_json() {
    let json = r#"{
        "default_interval": 0,
        "overrides": {
            "error": { "interval": 2 },
            "closed_error": { "interval": 10, "use_logscale_interval": true }
        }
    }"#;
    let report: ReportConfig = serde_json::from_str(json).unwrap();
    assert_eq!(report.policy(ReportStream::Error), IntervalPolicy::every(2));
    assert!(report.policy(ReportStream::ClosedError).use_logscale_interval);
    assert_eq!(report.policy(ReportStream::Tau).interval, 0);
}

#[test]
fn test_trainer_emits_only_due_streams() {
    let report = ReportConfig {
        default_interval: 0,
        ..ReportConfig::default()
    }
    .with_policy(ReportStream::Error, IntervalPolicy::every(2))
    .with_policy(ReportStream::ClosedError, IntervalPolicy::every(3))
    .with_policy(ReportStream::Init, IntervalPolicy::every(5));
    let mut trainer = Trainer::new(config(report, 6), dataset()).unwrap();
    let mut sink = CollectingSink::default();
    let history = trainer.run(&mut sink).unwrap();

    assert!(sink.flushed);
    assert_eq!(sink.epochs_of(ReportStream::Error), vec![0, 2, 4]);
    // One closed-loop error per sequence.
    assert_eq!(sink.epochs_of(ReportStream::ClosedError), vec![0, 0, 3, 3]);
    assert_eq!(sink.epochs_of(ReportStream::Init), vec![0, 0, 5, 5]);
    assert!(sink.epochs_of(ReportStream::Weight).is_empty());

    assert_eq!(sink.errors, vec![history[0].error, history[2].error, history[4].error]);
    assert!(sink.closed_mse.iter().all(|m| m.is_finite() && *m >= 0.0));
    for weights in &sink.init_weights {
        assert_eq!(weights.len(), 2);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_spectral_streams_report_every_point() {
    let report = ReportConfig {
        default_interval: 0,
        ..ReportConfig::default()
    }
    .with_policy(ReportStream::Lyapunov, IntervalPolicy::every(1))
    .with_policy(ReportStream::Period, IntervalPolicy::every(1));
    let mut trainer = Trainer::new(config(report, 1), dataset()).unwrap();
    let mut sink = CollectingSink::default();
    trainer.run(&mut sink).unwrap();

    assert_eq!(sink.exponent_counts, vec![3, 3]);
    assert_eq!(sink.epochs_of(ReportStream::Period), vec![0, 0]);
    assert!(sink.epochs_of(ReportStream::Entropy).is_empty());
}

#[test]
fn test_log_sink_accepts_every_snapshot() {
    let report = ReportConfig {
        default_interval: 1,
        ..ReportConfig::default()
    };
    let mut trainer = Trainer::new(config(report, 2), dataset()).unwrap();
    trainer.run(&mut LogSink).unwrap();
    assert_eq!(trainer.epoch(), 2);
}
