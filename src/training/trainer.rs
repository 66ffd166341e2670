//! Epoch loop tying the engine together.
//!
//! Per epoch: for every sequence the estimator picks an initial state, BPTT
//! accumulates gradients, and the representative points receive their share
//! of the initial-state gradient. The adaptive rate then observes the epoch
//! error, the optimizer updates every free parameter, and due report
//! streams are emitted for the updated model.

use super::bptt::Bptt;
use super::gradients::Gradients;
use super::loss::StepLoss;
use super::optimizer::Optimizer;
use super::penalty::{ElasticPenalty, Penalty};
use crate::cells::CtrnnCell;
use crate::checkpoint::{Checkpoint, DeferredCheckpointWriter};
use crate::config::TrainingConfig;
use crate::data::Dataset;
use crate::error::{CtrnnError, Result};
use crate::init_state::InitialStateEstimator;
use crate::lyapunov::{LyapunovAnalyzer, LyapunovReport};
use crate::report::{ReportScheduler, ReportSink, ReportStream, Snapshot};
use crate::rnn::{Ctrnn, Recording};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Summary of one training epoch, measured before the update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    /// 0-based index of the epoch.
    pub epoch: usize,
    /// Objective plus activation penalty per predicted step.
    pub error: f64,
    pub mean_squared_error: f64,
    /// Rate used for the update.
    pub learning_rate: f64,
    pub gradient_norm: f64,
}

pub struct Trainer {
    config: TrainingConfig,
    dataset: Dataset,
    network: Ctrnn,
    estimator: InitialStateEstimator,
    optimizer: Optimizer,
    penalty: Box<dyn Penalty>,
    bptt: Bptt,
    gradients: Gradients,
    scheduler: ReportScheduler,
    analyzer: LyapunovAnalyzer,
    epoch: usize,
    checkpoint_path: Option<PathBuf>,
    /// Completed-epoch count of the last checkpoint written.
    last_saved: Option<usize>,
    writer: DeferredCheckpointWriter,
    initial_state: Array1<f64>,
}

impl Trainer {
    /// Validates `config` against `dataset` and initializes every parameter
    /// from one generator seeded with `config.seed`.
    pub fn new(config: TrainingConfig, dataset: Dataset) -> Result<Self> {
        config.validate_for(dataset.dimension())?;
        check_dataset(&config, &dataset)?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let cell = CtrnnCell::new(&config.model, dataset.dimension(), &mut rng)?;
        let estimator = InitialStateEstimator::new(&config.model, &mut rng)?;
        let optimizer = Optimizer::new(config.optimizer.clone(), &cell, estimator.num_points());
        let network = Ctrnn::new(cell, config.model.delay_length);
        Ok(Self::assemble(config, dataset, network, estimator, optimizer, 0))
    }

    /// Restores a trainer that continues exactly where `checkpoint` left off.
    pub fn from_checkpoint(checkpoint: Checkpoint, dataset: Dataset) -> Result<Self> {
        let Checkpoint {
            epoch,
            config,
            network,
            representative_points,
            optimizer,
        } = checkpoint;
        config.validate_for(dataset.dimension())?;
        check_dataset(&config, &dataset)?;
        if network.output_size() != dataset.dimension() {
            return Err(CtrnnError::config(
                "dataset",
                format!(
                    "checkpoint expects dimension {}, got {}",
                    network.output_size(),
                    dataset.dimension()
                ),
            ));
        }
        if network.state_size() != config.model.c_state_size
            || network.delay != config.model.delay_length
        {
            return Err(CtrnnError::config(
                "model",
                format!(
                    "checkpoint network has {} neurons and delay {}, config expects {} and {}",
                    network.state_size(),
                    network.delay,
                    config.model.c_state_size,
                    config.model.delay_length
                ),
            ));
        }
        let estimator = InitialStateEstimator::from_points(representative_points, &config.model)?;
        let optimizer = Optimizer::from_state(config.optimizer.clone(), optimizer);
        Ok(Self::assemble(config, dataset, network, estimator, optimizer, epoch))
    }

    fn assemble(
        config: TrainingConfig,
        dataset: Dataset,
        network: Ctrnn,
        estimator: InitialStateEstimator,
        optimizer: Optimizer,
        epoch: usize,
    ) -> Self {
        let n = network.state_size();
        let penalty = ElasticPenalty::new(config.optimizer.lambda, config.optimizer.alpha);
        Self {
            bptt: Bptt::new(config.bptt, n, dataset.dimension()),
            gradients: Gradients::zeros_like(&network.cell, estimator.num_points()),
            scheduler: ReportScheduler::new(&config.report),
            analyzer: LyapunovAnalyzer::new(config.analysis.clone()),
            penalty: Box::new(penalty),
            initial_state: Array1::zeros(n),
            writer: DeferredCheckpointWriter::new(),
            checkpoint_path: None,
            last_saved: None,
            config,
            dataset,
            network,
            estimator,
            optimizer,
            epoch,
        }
    }

    /// Replaces the default elastic penalty.
    pub fn with_penalty(mut self, penalty: Box<dyn Penalty>) -> Self {
        self.penalty = penalty;
        self
    }

    /// Where checkpoints go when the `Save` stream is due and when training
    /// ends.
    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn network(&self) -> &Ctrnn {
        &self.network
    }

    pub fn estimator(&self) -> &InitialStateEstimator {
        &self.estimator
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    /// Number of completed epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Runs one epoch of forward, backward and update.
    pub fn train_epoch(&mut self) -> Result<EpochStats> {
        let epoch = self.epoch;
        self.gradients.clear();
        let mut loss = StepLoss::default();
        let mut penalty = 0.0;

        for (i, sequence) in self.dataset.iter().enumerate() {
            let selection = self.estimator.select(&self.network, sequence)?;
            self.estimator
                .initial_state(&selection, self.initial_state.view_mut());
            let result = self.bptt.run_sequence(
                &self.network,
                sequence,
                self.initial_state.view(),
                self.penalty.as_ref(),
                &mut self.gradients,
            )?;
            self.estimator.distribute(
                &selection,
                self.bptt.initial_state_gradient(),
                &mut self.gradients.representative_points,
            );
            debug!(
                epoch,
                sequence = i,
                objective = result.loss.objective,
                point = selection.best(),
                "sequence processed"
            );
            loss += result.loss;
            penalty += result.penalty;
        }
        self.gradients.ensure_finite()?;

        let steps = self.dataset.total_steps(self.network.delay) as f64;
        let error = (loss.objective + penalty) / steps;
        self.optimizer.observe_error(error);
        let learning_rate = self.optimizer.learning_rate();
        self.optimizer.step(
            &mut self.network.cell,
            self.estimator.points_mut(),
            &self.gradients,
            1.0 / steps,
            self.penalty.as_ref(),
        )?;
        self.estimator.enforce_shared();
        self.epoch += 1;

        Ok(EpochStats {
            epoch,
            error,
            mean_squared_error: loss.squared_error / steps,
            learning_rate,
            gradient_norm: self.gradients.norm() / steps,
        })
    }

    /// Trains until `config.epochs` epochs are complete, reporting due
    /// streams to `sink` after every update. The final model is always
    /// written when a checkpoint path is set.
    pub fn run(&mut self, sink: &mut dyn ReportSink) -> Result<Vec<EpochStats>> {
        let mut history = Vec::with_capacity(self.config.epochs.saturating_sub(self.epoch));
        while self.epoch < self.config.epochs {
            let stats = self.train_epoch()?;
            self.report(&stats, sink)?;
            history.push(stats);
        }
        if let Some(path) = self.checkpoint_path.clone() {
            if self.last_saved != Some(self.epoch) {
                self.save(self.epoch.saturating_sub(1), path, sink)?;
            }
        }
        self.writer.finish()?;
        sink.flush()?;
        Ok(history)
    }

    /// Emits a snapshot for every stream due at `stats.epoch`.
    pub fn report(&mut self, stats: &EpochStats, sink: &mut dyn ReportSink) -> Result<()> {
        let epoch = stats.epoch;
        let due = self.scheduler.due(epoch);
        if due.is_empty() {
            return Ok(());
        }
        let is_due = |stream| due.contains(&stream);

        if is_due(ReportStream::Error) {
            info!(
                epoch,
                error = stats.error,
                mse = stats.mean_squared_error,
                rate = stats.learning_rate,
                "epoch"
            );
            sink.record(Snapshot::Error {
                epoch,
                error: stats.error,
                mean_squared_error: stats.mean_squared_error,
            })?;
        }
        if is_due(ReportStream::AdaptLr) {
            sink.record(Snapshot::AdaptLr {
                epoch,
                learning_rate: self.optimizer.learning_rate(),
                multiplier: self.optimizer.state().adaptive.multiplier(),
            })?;
        }
        if is_due(ReportStream::Weight) {
            sink.record(Snapshot::Weight {
                epoch,
                cell: &self.network.cell,
            })?;
        }
        if is_due(ReportStream::Threshold) {
            sink.record(Snapshot::Threshold {
                epoch,
                cell: &self.network.cell,
            })?;
        }
        if is_due(ReportStream::Tau) {
            sink.record(Snapshot::Tau {
                epoch,
                tau: self.network.cell.tau.view(),
            })?;
        }
        if is_due(ReportStream::RepInit) {
            sink.record(Snapshot::RepInit {
                epoch,
                points: self.estimator.points().view(),
            })?;
        }

        let per_sequence = [
            ReportStream::State,
            ReportStream::ClosedState,
            ReportStream::Init,
            ReportStream::ClosedError,
        ];
        if per_sequence.iter().any(|&s| is_due(s)) {
            for (i, sequence) in self.dataset.iter().enumerate() {
                let selection = self.estimator.select(&self.network, sequence)?;
                let mut c0 = Array1::zeros(self.network.state_size());
                self.estimator.initial_state(&selection, c0.view_mut());
                if is_due(ReportStream::Init) {
                    sink.record(Snapshot::Init {
                        epoch,
                        sequence: i,
                        initial_state: c0.view(),
                        weights: &selection.weights,
                    })?;
                }
                if is_due(ReportStream::State) {
                    let recording = self.network.record_open_loop(sequence, c0.view())?;
                    sink.record(Snapshot::State {
                        epoch,
                        sequence: i,
                        recording: &recording,
                    })?;
                }
                if is_due(ReportStream::ClosedState) || is_due(ReportStream::ClosedError) {
                    let recording = self.network.record_closed_loop(sequence, c0.view())?;
                    if is_due(ReportStream::ClosedState) {
                        sink.record(Snapshot::ClosedState {
                            epoch,
                            sequence: i,
                            recording: &recording,
                        })?;
                    }
                    if is_due(ReportStream::ClosedError) {
                        let steps = recording.steps().max(1) as f64;
                        sink.record(Snapshot::ClosedError {
                            epoch,
                            sequence: i,
                            error: recording.loss.objective / steps,
                            mean_squared_error: recording.mean_squared_error(),
                        })?;
                    }
                }
            }
        }

        let spectral = [
            ReportStream::Lyapunov,
            ReportStream::Entropy,
            ReportStream::Period,
        ];
        if spectral.iter().any(|&s| is_due(s)) {
            for (point, report) in self.analyze()?.iter().enumerate() {
                if is_due(ReportStream::Lyapunov) {
                    sink.record(Snapshot::Lyapunov {
                        epoch,
                        point,
                        exponents: &report.exponents,
                    })?;
                }
                if is_due(ReportStream::Entropy) {
                    sink.record(Snapshot::Entropy {
                        epoch,
                        point,
                        entropy: report.entropy,
                    })?;
                }
                if is_due(ReportStream::Period) {
                    sink.record(Snapshot::Period {
                        epoch,
                        point,
                        period: report.period,
                    })?;
                }
            }
        }

        if is_due(ReportStream::Save) {
            match self.checkpoint_path.clone() {
                Some(path) => self.save(epoch, path, sink)?,
                None => warn!(epoch, "save due but no checkpoint path set"),
            }
        }
        Ok(())
    }

    fn save(&mut self, epoch: usize, path: PathBuf, sink: &mut dyn ReportSink) -> Result<()> {
        let checkpoint = self.checkpoint();
        self.writer.write(&checkpoint, path.clone())?;
        self.last_saved = Some(self.epoch);
        sink.record(Snapshot::Save { epoch, path: &path })
    }

    /// Lyapunov analysis of the closed loop from every representative point.
    pub fn analyze(&self) -> Result<Vec<LyapunovReport>> {
        self.estimator
            .points()
            .outer_iter()
            .map(|p| self.analyzer.analyze(&self.network, p))
            .collect()
    }

    /// Open-loop recordings of every sequence from its selected initial state.
    pub fn evaluate_open_loop(&self) -> Result<Vec<Recording>> {
        self.evaluate(false)
    }

    /// Closed-loop recordings of every sequence from its selected initial state.
    pub fn evaluate_closed_loop(&self) -> Result<Vec<Recording>> {
        self.evaluate(true)
    }

    fn evaluate(&self, closed_loop: bool) -> Result<Vec<Recording>> {
        let mut c0 = Array1::zeros(self.network.state_size());
        self.dataset
            .iter()
            .map(|sequence| {
                let selection = self.estimator.select(&self.network, sequence)?;
                self.estimator.initial_state(&selection, c0.view_mut());
                if closed_loop {
                    self.network.record_closed_loop(sequence, c0.view())
                } else {
                    self.network.record_open_loop(sequence, c0.view())
                }
            })
            .collect()
    }

    /// Snapshot of everything needed to resume training.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            epoch: self.epoch,
            config: self.config.clone(),
            network: self.network.clone(),
            representative_points: self.estimator.points().clone(),
            optimizer: self.optimizer.state().clone(),
        }
    }

    /// Waits for any checkpoint write still in flight.
    pub fn finish(&mut self) -> Result<()> {
        self.writer.finish()
    }
}

fn check_dataset(config: &TrainingConfig, dataset: &Dataset) -> Result<()> {
    let delay = config.model.delay_length;
    if let Some(short) = dataset.iter().position(|s| s.len() <= delay) {
        return Err(CtrnnError::config(
            "model.delay_length",
            format!("sequence {} is not longer than the delay {}", short, delay),
        ));
    }
    Ok(())
}
