use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::checkpoint::record::CheckpointRecord;
use crate::checkpoint::store::CheckpointStore;
use crate::config::Config;
use crate::data::batch::Batch;
use crate::data::dataset::BatchSource;
use crate::error::{CheckpointError, ConfigError, DataError, StepError, TrainError};
use crate::loss::loss_function::LossFunction;
use crate::metrics::average_meter::AverageMeter;
use crate::metrics::running_score::RunningScore;
use crate::model::segmentation_model::SegmentationModel;
use crate::optim::optimizer::Optimizer;
use crate::schedule::lr_scheduler::LrScheduler;
use crate::sink::metrics_sink::MetricsSink;
use crate::train::report::{RunSummary, ValidationReport};
use crate::train::train_step::train_step;
use crate::train::validation::run_validation;

/// Best-score value before any validation has run. Lower than any mean IoU,
/// so the first validation always writes a checkpoint.
pub const INITIAL_BEST_SCORE: f64 = -100.0;

/// Where the orchestrator is in its life cycle.
///
/// `Validating` and `Checkpointing` are entered from `Running` and return to
/// it, unless the iteration budget was just reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Running,
    Validating,
    Checkpointing,
    Terminated,
}

/// The opaque pieces a run is assembled from.
pub struct Collaborators {
    pub model: Box<dyn SegmentationModel>,
    pub optimizer: Box<dyn Optimizer>,
    pub scheduler: Box<dyn LrScheduler>,
    pub loss_fn: Box<dyn LossFunction>,
    pub train_data: Box<dyn BatchSource>,
    pub val_data: Box<dyn BatchSource>,
    pub sink: Box<dyn MetricsSink>,
}

/// Drives training for a fixed number of iterations, validating periodically
/// and persisting the best model by validation mean IoU.
///
/// All loop state (iteration counter, meters, scorer, best score) lives here
/// and is mutated only by [`run`](TrainingOrchestrator::run).
pub struct TrainingOrchestrator {
    train_data: Box<dyn BatchSource>,
    val_data: Box<dyn BatchSource>,
    core: LoopCore,
}

// Everything except the two data sources, so a training batch iterator can
// stay borrowed while the rest of the state is updated.
struct LoopCore {
    train_iters: u64,
    batch_size: usize,
    print_interval: u64,
    val_interval: u64,
    resume: Option<PathBuf>,
    save_last: bool,
    description: String,

    model: Box<dyn SegmentationModel>,
    optimizer: Box<dyn Optimizer>,
    scheduler: Box<dyn LrScheduler>,
    loss_fn: Box<dyn LossFunction>,
    sink: Box<dyn MetricsSink>,
    store: CheckpointStore,

    phase: Phase,
    iteration: u64,
    best_score: f64,
    epoch: u64,

    train_loss: AverageMeter,
    time_meter: AverageMeter,
    val_loss: AverageMeter,
    scorer: RunningScore,

    start_iteration: u64,
    validations: Vec<ValidationReport>,
    checkpoints_written: u64,
    best_checkpoint: Option<PathBuf>,
    last_checkpoint: Option<PathBuf>,
    finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

impl TrainingOrchestrator {
    /// Assembles an orchestrator from a validated config and its collaborators.
    ///
    /// # Arguments
    /// - `config`         : hyperparameters; checked with [`Config::validate`]
    /// - `checkpoint_dir` : where the best and last models are written, named
    ///   after the configured architecture and dataset
    /// - `parts`          : model, optimizer, scheduler, loss, data and sink
    ///
    /// # Errors
    /// [`ConfigError`] if the configuration is invalid or the model's class
    /// count disagrees with `data.n_classes`.
    pub fn new(
        config: &Config,
        checkpoint_dir: impl Into<PathBuf>,
        parts: Collaborators,
    ) -> Result<TrainingOrchestrator, ConfigError> {
        config.validate()?;
        let n_classes = config.data.n_classes;
        if parts.model.n_classes() != n_classes {
            return Err(ConfigError::invalid(
                "data.n_classes",
                format!("{} but the model predicts {} classes", n_classes, parts.model.n_classes()),
            ));
        }

        let t = &config.training;
        let store = CheckpointStore::new(
            checkpoint_dir,
            config.model.arch.name(),
            config.data.dataset.name(),
        );
        let description = format!(
            "arch={} dataset={} n_classes={} train_iters={} batch_size={} lr={} schedule={} loss={:?}",
            config.model.arch,
            config.data.dataset,
            n_classes,
            t.train_iters,
            t.batch_size,
            t.optimizer.learning_rate(),
            t.lr_schedule.name(),
            t.loss,
        );
        let Collaborators { model, optimizer, scheduler, loss_fn, train_data, val_data, sink } = parts;

        Ok(TrainingOrchestrator {
            train_data,
            val_data,
            core: LoopCore {
                train_iters: t.train_iters,
                batch_size: t.batch_size,
                print_interval: t.print_interval,
                val_interval: t.val_interval,
                resume: t.resume.clone(),
                save_last: t.save_last,
                description,
                model,
                optimizer,
                scheduler,
                loss_fn,
                sink,
                store,
                phase: Phase::Initializing,
                iteration: 0,
                best_score: INITIAL_BEST_SCORE,
                epoch: 0,
                train_loss: AverageMeter::new(),
                time_meter: AverageMeter::new(),
                val_loss: AverageMeter::new(),
                scorer: RunningScore::new(n_classes),
                start_iteration: 0,
                validations: Vec::new(),
                checkpoints_written: 0,
                best_checkpoint: None,
                last_checkpoint: None,
                finished: false,
            },
        })
    }

    pub fn phase(&self) -> Phase {
        self.core.phase
    }

    /// Completed training iterations, including those restored on resume.
    pub fn iteration(&self) -> u64 {
        self.core.iteration
    }

    pub fn best_score(&self) -> f64 {
        self.core.best_score
    }

    /// Full epochs completed by this process.
    pub fn epoch(&self) -> u64 {
        self.core.epoch
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.core.store
    }

    pub fn validations(&self) -> &[ValidationReport] {
        &self.core.validations
    }

    /// Restores state from the configured resume checkpoint, if any.
    ///
    /// A missing file is logged and the run starts fresh. A file that exists
    /// but cannot be decoded, or whose state a collaborator rejects, is fatal.
    /// Called by [`run`](Self::run) when not done explicitly; does nothing
    /// after the first call.
    pub fn initialize(&mut self) -> Result<(), TrainError> {
        if self.core.phase != Phase::Initializing {
            return Ok(());
        }
        self.core.restore()?;
        self.core.start_iteration = self.core.iteration;
        self.core.describe();
        if self.core.phase == Phase::Initializing {
            self.core.phase = Phase::Running;
        }
        Ok(())
    }

    /// Trains until `train_iters` iterations have been completed in total.
    ///
    /// Each epoch pulls a fresh batch stream from the training source. The
    /// budget may end mid-epoch; the scheduler only steps after full epochs.
    /// On termination the last model is written once (when `save_last` is
    /// set), including for a resumed run that had no iterations left.
    ///
    /// # Errors
    /// Any [`TrainError`] stops the loop immediately. The best checkpoint
    /// written before the failure stays the recovery point.
    pub fn run(&mut self) -> Result<RunSummary, TrainError> {
        self.initialize()?;
        let started = Instant::now();
        let Self { train_data, val_data, core } = self;

        if core.phase != Phase::Terminated {
            info!(
                iteration = core.iteration,
                train_iters = core.train_iters,
                best_score = core.best_score,
                checkpoint_dir = %core.store.dir().display(),
                "starting training"
            );
            'epochs: while core.iteration < core.train_iters {
                // ── One pass over the training data, or until the budget ───────
                let mut n_batches = 0_usize;
                for batch in train_data.batches() {
                    let batch = batch.map_err(|e| core.step_failure(StepError::Data(e)))?;
                    n_batches += 1;
                    if core.advance(&batch, val_data.as_mut())? == Flow::Stop {
                        break 'epochs;
                    }
                }
                if n_batches == 0 {
                    return Err(core.step_failure(StepError::Data(DataError::EmptyEpoch)));
                }

                // ── Full epoch: step the learning-rate schedule ──────────────
                core.finish_epoch();
            }
            core.phase = Phase::Terminated;
        }

        if !core.finished {
            core.finish()?;
        }
        Ok(core.summary(started.elapsed().as_millis() as u64))
    }
}

// ---------------------------------------------------------------------------
// Loop internals
// ---------------------------------------------------------------------------

impl LoopCore {
    fn restore(&mut self) -> Result<(), TrainError> {
        let Some(path) = self.resume.clone() else {
            info!("no resume checkpoint configured, starting from scratch");
            return Ok(());
        };

        let record = match self.store.load(&path) {
            Ok(record) => record,
            Err(CheckpointError::NotFound(missing)) => {
                warn!(path = %missing.display(), "no checkpoint found at resume path, starting from scratch");
                return Ok(());
            }
            Err(e) => return Err(TrainError::Resume(e)),
        };

        let incompatible = |component: &'static str, e: StepError| {
            TrainError::Resume(CheckpointError::Incompatible {
                path: path.clone(),
                component,
                reason: e.to_string(),
            })
        };
        self.model.load_state(&record.model_state).map_err(|e| incompatible("model", e))?;
        self.optimizer.load_state(&record.optimizer_state).map_err(|e| incompatible("optimizer", e))?;
        self.scheduler.load_state(&record.scheduler_state).map_err(|e| incompatible("scheduler", e))?;

        self.iteration = record.iteration;
        self.best_score = record.best_score;
        info!(
            path = %path.display(),
            iteration = record.iteration,
            best_score = record.best_score,
            "loaded checkpoint"
        );
        if self.iteration >= self.train_iters {
            warn!(
                iteration = self.iteration,
                train_iters = self.train_iters,
                "resumed run has already used its iteration budget"
            );
            self.phase = Phase::Terminated;
        }
        Ok(())
    }

    // The error names the 1-based iteration that was being attempted.
    fn step_failure(&self, source: StepError) -> TrainError {
        TrainError::Training { iteration: self.iteration + 1, source }
    }

    /// One training iteration plus whatever reporting, validation and
    /// checkpointing falls on it.
    ///
    /// # Arguments
    /// - `batch`    : the next training batch of the current epoch
    /// - `val_data` : drained in full when a validation falls on this step
    ///
    /// Returns [`Flow::Stop`] once `train_iters` iterations are complete.
    fn advance(&mut self, batch: &Batch, val_data: &mut dyn BatchSource) -> Result<Flow, TrainError> {
        let started = Instant::now();
        let loss = train_step(self.model.as_mut(), self.optimizer.as_mut(), self.loss_fn.as_ref(), batch)
            .map_err(|e| self.step_failure(e))?;
        self.iteration += 1;
        self.train_loss.update(loss);
        self.time_meter.update(started.elapsed().as_secs_f64());

        let completed = self.iteration;
        debug!(iteration = completed, loss, "step");

        // ── Cadences, all keyed on the completed count ───────────────────────
        if completed % self.print_interval == 0 {
            self.report_training(completed);
        }

        if completed % self.val_interval == 0 || completed == self.train_iters {
            self.validate(completed, val_data)?;
        }

        if completed >= self.train_iters {
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }

    fn report_training(&mut self, completed: u64) {
        let loss = self.train_loss.average();
        let time_per_image = self.time_meter.average() / self.batch_size as f64;
        let lr = self.optimizer.learning_rate();
        info!(
            iteration = completed,
            train_iters = self.train_iters,
            loss,
            time_per_image,
            lr,
            "Iter [{}/{}]  Loss: {:.4}  Time/Image: {:.4}",
            completed,
            self.train_iters,
            loss,
            time_per_image
        );
        self.scalar("loss/train_loss", loss, completed);
        self.scalar("time/per_image", time_per_image, completed);
        self.scalar("lr", lr, completed);
        self.train_loss.reset();
        self.time_meter.reset();
    }

    fn validate(&mut self, completed: u64, val_data: &mut dyn BatchSource) -> Result<(), TrainError> {
        self.phase = Phase::Validating;
        let outcome = run_validation(
            self.model.as_mut(),
            self.loss_fn.as_ref(),
            val_data,
            &mut self.scorer,
            &mut self.val_loss,
        )
        .map_err(|source| TrainError::Validation { iteration: completed, source })?;

        let snap = &outcome.snapshot;
        info!(
            iteration = completed,
            val_loss = outcome.val_loss,
            overall_acc = snap.overall_acc,
            mean_acc = snap.mean_acc,
            fwavacc = snap.freq_weighted_iou,
            mean_iou = snap.mean_iou,
            "Iter {}  Val Loss: {:.4}  Mean IoU: {:.4}",
            completed,
            outcome.val_loss,
            snap.mean_iou
        );
        self.scalar("loss/val_loss", outcome.val_loss, completed);
        self.scalar("val_metrics/overall_acc", snap.overall_acc, completed);
        self.scalar("val_metrics/mean_acc", snap.mean_acc, completed);
        self.scalar("val_metrics/fwavacc", snap.freq_weighted_iou, completed);
        self.scalar("val_metrics/mean_iou", snap.mean_iou, completed);
        for (k, iou) in outcome.snapshot.class_iou.iter().enumerate() {
            let value = iou.unwrap_or(f64::NAN);
            debug!(iteration = completed, class = k, iou = value, "class IoU");
            self.scalar(&format!("val_metrics/cls_{k}"), value, completed);
        }

        self.val_loss.reset();
        self.scorer.reset();

        let improved = outcome.snapshot.mean_iou >= self.best_score;
        if improved {
            self.phase = Phase::Checkpointing;
            self.best_score = outcome.snapshot.mean_iou;
            let record = self
                .capture(completed, &self.store.best_path())
                .map_err(|source| TrainError::Checkpoint { iteration: completed, source })?;
            let path = self
                .store
                .save_best(&record)
                .map_err(|source| TrainError::Checkpoint { iteration: completed, source })?;
            info!(iteration = completed, best_score = self.best_score, path = %path.display(), "saved best model");
            self.checkpoints_written += 1;
            self.best_checkpoint = Some(path);
        }

        self.validations.push(ValidationReport {
            iteration: completed,
            val_loss: outcome.val_loss,
            snapshot: outcome.snapshot,
            improved,
        });
        self.phase = Phase::Running;
        Ok(())
    }

    fn finish_epoch(&mut self) {
        self.scheduler.step();
        let lr = self.scheduler.learning_rate();
        self.optimizer.set_learning_rate(lr);
        self.epoch += 1;
        info!(epoch = self.epoch, iteration = self.iteration, lr, "epoch complete");
    }

    // Reports the run's setup once, at the step training starts from.
    fn describe(&mut self) {
        if let Err(e) = self.sink.add_text("config", &self.description, self.start_iteration) {
            warn!(step = self.start_iteration, error = %e, "metrics sink rejected config report");
        }
    }

    fn finish(&mut self) -> Result<(), TrainError> {
        self.write_last()?;
        self.finished = true;
        if let Err(e) = self.sink.flush() {
            warn!(error = %e, "metrics sink flush failed");
        }
        info!(
            iteration = self.iteration,
            best_score = self.best_score,
            "training finished"
        );
        Ok(())
    }

    fn write_last(&mut self) -> Result<(), TrainError> {
        if !self.save_last {
            return Ok(());
        }
        let iteration = self.iteration;
        let record = self
            .capture(iteration, &self.store.last_path())
            .map_err(|source| TrainError::Checkpoint { iteration, source })?;
        let path = self
            .store
            .save_last(&record)
            .map_err(|source| TrainError::Checkpoint { iteration, source })?;
        info!(iteration, path = %path.display(), "saved last model");
        self.checkpoints_written += 1;
        self.last_checkpoint = Some(path);
        Ok(())
    }

    fn capture(&self, iteration: u64, destination: &Path) -> Result<CheckpointRecord, CheckpointError> {
        let unserializable = |component: &'static str, e: StepError| CheckpointError::Incompatible {
            path: destination.to_path_buf(),
            component,
            reason: e.to_string(),
        };
        Ok(CheckpointRecord {
            iteration,
            model_state: self.model.state().map_err(|e| unserializable("model", e))?,
            optimizer_state: self.optimizer.state().map_err(|e| unserializable("optimizer", e))?,
            scheduler_state: self.scheduler.state().map_err(|e| unserializable("scheduler", e))?,
            best_score: self.best_score,
        })
    }

    // Reports are best-effort: a failing sink is logged and skipped.
    fn scalar(&mut self, tag: &str, value: f64, step: u64) {
        if let Err(e) = self.sink.add_scalar(tag, value, step) {
            warn!(tag, step, error = %e, "metrics sink rejected report");
        }
    }

    fn summary(&self, elapsed_ms: u64) -> RunSummary {
        RunSummary {
            start_iteration: self.start_iteration,
            final_iteration: self.iteration,
            steps_taken: self.iteration.saturating_sub(self.start_iteration),
            epochs_completed: self.epoch,
            best_score: self.best_score,
            validations: self.validations.clone(),
            checkpoints_written: self.checkpoints_written,
            best_checkpoint: self.best_checkpoint.clone(),
            last_checkpoint: self.last_checkpoint.clone(),
            elapsed_ms,
        }
    }
}
