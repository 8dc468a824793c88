use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::metrics::score_snapshot::ScoreSnapshot;

/// Outcome of one validation window, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Completed iterations when the validation ran.
    pub iteration: u64,
    pub val_loss: f64,
    pub snapshot: ScoreSnapshot,
    /// Mean IoU was `>=` the best score, so a checkpoint was written.
    pub improved: bool,
}

/// Returned by `TrainingOrchestrator::run` when the iteration budget is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Counter value the run started from (non-zero after a resume).
    pub start_iteration: u64,
    pub final_iteration: u64,
    /// Steps performed by this process.
    pub steps_taken: u64,
    /// Full epochs completed, i.e. scheduler steps taken.
    pub epochs_completed: u64,
    pub best_score: f64,
    pub validations: Vec<ValidationReport>,
    pub checkpoints_written: u64,
    pub best_checkpoint: Option<PathBuf>,
    pub last_checkpoint: Option<PathBuf>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn last_validation(&self) -> Option<&ValidationReport> {
        self.validations.last()
    }
}
